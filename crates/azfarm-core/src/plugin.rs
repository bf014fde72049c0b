//! Capability traits the host calls into.
//!
//! The host holds a plugin behind one of these traits and invokes one
//! method per lifecycle event. Calls are synchronous and made from a single
//! host thread.

use crate::types::{CloudInstance, HardwareType, InstanceId, JobInfo, OsImage};

/// A cloud provider plugin: maps the host's instance model onto a vendor's
/// compute service.
pub trait CloudProvider {
    /// Confirm the configured credentials can reach the vendor service.
    fn verify_access(&self) -> anyhow::Result<bool>;

    /// Hardware types the host may request.
    fn available_hardware_types(&self) -> anyhow::Result<Vec<HardwareType>>;

    /// OS images the host may request.
    fn available_os_images(&self) -> anyhow::Result<Vec<OsImage>>;

    /// Start `count` more instances like `instance`.
    fn clone_instance(
        &self,
        instance: &CloudInstance,
        count: u32,
    ) -> anyhow::Result<Vec<CloudInstance>>;

    /// Start `count` instances of the given hardware and image.
    ///
    /// Returns the provider's full current instance list, not just the new
    /// instances.
    fn create_instances(
        &self,
        hardware_id: &str,
        image_id: &str,
        count: u32,
    ) -> anyhow::Result<Vec<CloudInstance>>;

    /// Every instance the provider currently owns.
    fn active_instances(&self) -> anyhow::Result<Vec<CloudInstance>>;

    /// Terminate instances. The result holds one flag per instance the
    /// provider could confirm; it may be empty.
    fn terminate_instances(&self, instance_ids: &[InstanceId]) -> anyhow::Result<Vec<bool>>;

    fn stop_instances(&self, instance_ids: &[InstanceId]) -> anyhow::Result<Vec<bool>>;

    fn start_instances(&self, instance_ids: &[InstanceId]) -> anyhow::Result<Vec<bool>>;

    fn reboot_instances(&self, instance_ids: &[InstanceId]) -> anyhow::Result<Vec<bool>>;

    /// Hostname of an instance, or an empty string when unknown.
    fn hostname(&self, instance_id: &str) -> anyhow::Result<String>;

    /// Capture an image from an instance.
    fn create_image(&self, source: &str) -> anyhow::Result<bool>;

    /// Instances that can be used as image capture sources.
    fn image_sources(&self) -> anyhow::Result<Vec<String>>;
}

/// A job event listener plugin.
pub trait EventListener {
    /// A job was submitted to the farm.
    fn on_job_submitted(&self, job: &JobInfo) -> anyhow::Result<()>;

    /// A worker (`slave_name`) is about to start rendering `job`.
    fn on_slave_starting_job(&self, slave_name: &str, job: &JobInfo) -> anyhow::Result<()>;
}
