pub mod models;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod document_extractor;

pub use document_extractor::{BatchJob, DocumentExtractor};
