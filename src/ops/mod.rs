//! The FHIR interactions this tool performs, one module per operation.

pub mod collect;
pub mod evaluate;
pub mod groups;
pub mod measures;
pub mod patients;
pub mod reports;
pub mod requirements;
pub mod submit;
