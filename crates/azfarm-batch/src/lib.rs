//! azfarm-batch: the Azure Batch control plane as seen by azfarm.
//!
//! # Architecture
//!
//! [`BatchService`] is the seam between the pool lifecycle logic and the
//! vendor. It covers exactly the calls the plugins make: pools (list, get,
//! add, delete, resize, stop resize, remove nodes), compute nodes (list,
//! reboot, fetch a file) and jobs (add, delete, add task).
//!
//! Two implementations ship here:
//! - [`RestBatchClient`] speaks the Batch REST API with a blocking HTTP
//!   client, authenticating as a service principal.
//! - [`InMemoryBatchService`] keeps pools and jobs in memory and records
//!   every call, for tests.
//!
//! Vendor failures surface as [`BatchError::Service`] carrying the Batch
//! error code, so callers can treat codes like `PoolNotFound` as benign.

pub mod credentials;
pub mod error;
pub mod memory;
pub mod models;
pub mod rest;
pub mod service;

#[cfg(test)]
mod testing;

pub use credentials::ServicePrincipalCredentials;
pub use error::{BatchError, BatchResult, ErrorDetail};
pub use memory::{BatchCall, InMemoryBatchService};
pub use models::*;
pub use rest::RestBatchClient;
pub use service::BatchService;
