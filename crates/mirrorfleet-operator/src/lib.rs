//! The mirrorfleet reconciliation control plane.
//!
//! Watches `Job`, `Manager` and `Announcement` resources and converges the
//! derived workload objects (PVCs, Deployments, Services, Ingresses, RBAC).

pub mod config;
pub mod controller;
pub mod error;
pub mod monitoring;

pub use config::ControllerConfig;
pub use error::{Error, Result};
