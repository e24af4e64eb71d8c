//! Domain types and models

pub mod photo;

pub use photo::{Category, UploadedFile, DEFAULT_CONTENT_TYPE};
