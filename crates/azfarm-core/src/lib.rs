//! azfarm-core: host-facing model shared by the azfarm plugins.
//!
//! The render-farm host talks to plugins through a small set of
//! capability traits ([`CloudProvider`], [`EventListener`]) and hands them
//! configuration through a [`ConfigStore`]. Everything in here is
//! vendor-agnostic; the Azure specifics live in `azfarm-batch`,
//! `azfarm-provider` and `azfarm-transfer`.

pub mod config;
pub mod plugin;
pub mod types;

pub use config::{ConfigError, ConfigResult, ConfigStore, MapConfigStore, split_list};
pub use plugin::{CloudProvider, EventListener};
pub use types::*;
