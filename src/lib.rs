//! Collation of per-sample MOI reports into one CSV report.
//!
//! The MOI reporter is run on each VCF file of a batch, its comma-separated output is classified
//! and projected onto a fixed column schema, and the rows of all samples are written in a
//! deterministic order.

pub mod collate;
pub mod common;
