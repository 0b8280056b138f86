//! Report generation collaborator.
//!
//! Produces a synthetic financial report as a CSV file and returns metadata
//! describing it. Generation is a pure, possibly slow function of the input
//! payload: the transaction stream is seeded from a hash of the report name,
//! so identical payloads produce identical figures. The pipeline treats this
//! crate as an external collaborator and only depends on its contract.

#![forbid(unsafe_code)]

mod generator;

pub use generator::{GeneratorConfig, GeneratorError, ReportGenerator};
