//! Category photo storage

mod service;

pub use service::{PhotoError, PhotoService};
