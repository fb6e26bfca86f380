//! School admissions back office: public application intake, staff review, and reporting.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
