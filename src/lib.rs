//! Clinical quality measure testing workbench for FHIR servers.

pub mod compare;
pub mod config;
pub mod fhir;
pub mod ops;
pub mod output;
pub mod server;
