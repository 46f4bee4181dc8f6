pub mod confidence;
pub mod licence_number;

pub use confidence::FieldConfidenceScorer;
pub use licence_number::{DecodedLicenceNumber, LicenceNumberDecoder, Sex};
