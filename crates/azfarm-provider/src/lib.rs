//! Azure Batch cloud provider.
//!
//! Maps the host's instance model onto Batch pools: one pool per
//! (region moniker, image, VM size, priority tier), one instance per
//! compute node.

pub mod config;
pub mod hardware;
pub mod images;
pub mod lifecycle;
pub mod mappers;
pub mod plugin;
pub mod provision;
pub mod starttask;

pub use config::{BatchPluginConfig, ManagedImage};
pub use hardware::vm_sizes_to_hardware_types;
pub use images::{BatchImageSpec, abr_images, image_display_name, image_id_to_image_spec};
pub use lifecycle::{LifecycleError, LifecycleResult, PoolManager};
pub use mappers::{cloud_instance_id, pool_name, split_instance_id};
pub use plugin::AzureBatchCloudPlugin;
pub use starttask::StartTaskCommand;
