pub mod debug;
pub mod error;

pub use debug::DebugArtifacts;
pub use error::ExtractionError;
