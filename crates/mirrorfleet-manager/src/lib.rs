//! The mirrorfleet coordinator service.
//!
//! Serves the reporting and command API workers and operators talk to, backed
//! by a read-through cache of the cluster store. All list/get traffic hits the
//! cache; writes go through the API server and come back via the watch.

pub mod error;
pub mod external;
pub mod mirrorz;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, Result};
pub use server::ManagerServer;
pub use state::{AppState, ManagerOptions};
