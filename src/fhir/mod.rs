pub mod error;
pub mod http;
pub mod resource;

pub use error::FhirError;
