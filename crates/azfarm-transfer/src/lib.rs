//! Asset synchronisation between render nodes and Azure Blob Storage.
//!
//! Transfers are delegated to AzCopy: this crate decides when to run it,
//! builds its command line for the local OS, and logs the outcome.

pub mod azcopy;
pub mod error;
pub mod listener;
pub mod runner;

pub use azcopy::{AzCopyCommand, AzCopyFlag, locate_azcopy};
pub use error::{TransferError, TransferResult};
pub use listener::{AzureDataTransfer, SyncDirection, TransferConfig};
pub use runner::{ProcessRunner, SystemRunner};
