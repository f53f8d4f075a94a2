//! Rental tenancy lifecycle: inventory, applications, invitations, leases and the
//! background sweep that keeps them consistent.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod tenancy;
