//! The Azure Batch cloud provider plugin.

use std::collections::BTreeMap;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use azfarm_batch::{
    AllocationState, BatchService, PoolState, RestBatchClient, ServicePrincipalCredentials,
};
use azfarm_core::{
    CloudInstance, CloudProvider, ConfigStore, HardwareType, InstanceId, OsImage, Platform,
};

use crate::config::BatchPluginConfig;
use crate::hardware::vm_sizes_to_hardware_types;
use crate::images::{abr_images, image_id_to_image_spec};
use crate::lifecycle::{LifecycleError, LifecycleResult, PoolManager};
use crate::mappers::{compute_node_to_instance, mock_compute_node, pool_name, split_instance_id};
use crate::provision::{PoolRequest, pool_add_parameter};

/// Cloud provider that runs the farm's workers as Azure Batch compute
/// nodes.
pub struct AzureBatchCloudPlugin<S> {
    config: BatchPluginConfig,
    pools: PoolManager<S>,
}

impl AzureBatchCloudPlugin<RestBatchClient> {
    /// Read configuration from the host store and connect to the
    /// configured Batch account.
    pub fn from_store<C: ConfigStore + ?Sized>(store: &C) -> anyhow::Result<Self> {
        let config =
            BatchPluginConfig::from_store(store).context("invalid cloud provider configuration")?;
        let credentials = ServicePrincipalCredentials::new(
            &config.batch_sp_app_id,
            &config.batch_sp_app_key,
            &config.authority_uri,
        );
        let client = RestBatchClient::new(&config.batch_url, credentials)
            .context("failed to create Batch client")?;
        Ok(Self::new(config, client))
    }
}

impl<S: BatchService> AzureBatchCloudPlugin<S> {
    pub fn new(config: BatchPluginConfig, service: S) -> Self {
        let pools = PoolManager::new(service, config.resize_poll_interval, config.resize_timeout);
        Self { config, pools }
    }

    pub fn pools(&self) -> &PoolManager<S> {
        &self.pools
    }

    fn stamp(&self, mut instance: CloudInstance) -> CloudInstance {
        instance.region_name = Some(self.config.deadline_region.clone());
        instance.zone = self.config.azure_region.clone();
        instance
    }

    /// Walk this region's pools, deleting idle ones and mapping the rest.
    ///
    /// Instances are appended to `out` as they are found so the caller keeps
    /// whatever was collected before a failure.
    fn scan(&self, out: &mut Vec<CloudInstance>) -> LifecycleResult<()> {
        let prefix = format!("{}-", self.config.deadline_cloud_region);

        for pool in self.pools.list_pools()? {
            if !pool.id.starts_with(&prefix) {
                continue;
            }

            if pool.allocation_state == AllocationState::Steady
                && pool.state == PoolState::Active
                && pool.current_dedicated_nodes == 0
                && pool.current_low_priority_nodes == 0
            {
                info!(pool_id = %pool.id, "deleting idle pool");
                self.pools.delete_pool(&pool.id)?;
                if let Err(e) = self.pools.delete_job(&pool.id) {
                    warn!(pool_id = %pool.id, error = %e, "failed to delete licensing job");
                }
                continue;
            }

            let nodes = self.pools.list_compute_nodes(&pool.id)?.unwrap_or_default();
            for node in &nodes {
                out.push(self.stamp(compute_node_to_instance(&pool, node)));
            }

            if pool.allocation_state == AllocationState::Resizing {
                let current = pool.current_nodes();
                let target = pool.target_nodes();
                for i in current..target {
                    let mock = mock_compute_node(&format!("not-available-{}", i - current));
                    out.push(self.stamp(compute_node_to_instance(&pool, &mock)));
                }
                if current < target {
                    debug!(pool_id = %pool.id, count = target - current, "added placeholder instances");
                }
            }
        }
        Ok(())
    }

    /// Every instance in this region; a failed scan yields the instances
    /// collected before the failure.
    fn collect_instances(&self) -> Vec<CloudInstance> {
        let mut instances = Vec::new();
        if let Err(e) = self.scan(&mut instances) {
            error!(error = %e, count = instances.len(), "instance enumeration failed, returning partial result");
        }
        instances
    }

    fn os_images(&self) -> Vec<OsImage> {
        let mut images = self.config.os_images();
        images.extend(abr_images());
        images
    }

    fn create_pool(
        &self,
        pool_id: &str,
        hardware_id: &str,
        image_id: &str,
        platform: Platform,
        count: u32,
    ) -> LifecycleResult<()> {
        let image = image_id_to_image_spec(&self.config, image_id)
            .ok_or_else(|| LifecycleError::UnresolvableImage(image_id.to_string()))?;

        let low_priority = self.config.use_low_priority_vms;
        let (dedicated, low) = if low_priority { (0, count) } else { (count, 0) };

        let request = PoolRequest {
            pool_id,
            vm_size: hardware_id,
            platform,
            image: &image,
            dedicated_nodes: dedicated,
            low_priority_nodes: low,
        };
        self.pools
            .create_pool(&pool_add_parameter(&self.config, &request))?;

        if !self.config.app_licenses.is_empty() {
            self.pools
                .create_job(pool_id, pool_id, dedicated + low, platform)?;
        }
        Ok(())
    }

    fn grow_pool(
        &self,
        pool_id: &str,
        mut dedicated: u32,
        mut low: u32,
        platform: Platform,
        count: u32,
    ) -> LifecycleResult<()> {
        if self.config.use_low_priority_vms {
            low += count;
        } else {
            dedicated += count;
        }

        self.pools.resize_pool(pool_id, dedicated, low)?;
        if !self.config.app_licenses.is_empty() {
            self.pools
                .create_job(pool_id, pool_id, dedicated + low, platform)?;
        }
        Ok(())
    }

    /// Group instance ids by pool, skipping malformed ones.
    fn nodes_by_pool<'a>(&self, instance_ids: &'a [InstanceId]) -> BTreeMap<&'a str, Vec<String>> {
        let mut grouped: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for id in instance_ids {
            match split_instance_id(id) {
                Some((pool_id, node_id)) => grouped
                    .entry(pool_id)
                    .or_default()
                    .push(node_id.to_string()),
                None => warn!(instance_id = %id, "ignoring malformed instance id"),
            }
        }
        grouped
    }
}

impl<S: BatchService> CloudProvider for AzureBatchCloudPlugin<S> {
    fn verify_access(&self) -> anyhow::Result<bool> {
        self.pools
            .list_pools()
            .context("failed to list pools")?;
        Ok(true)
    }

    fn available_hardware_types(&self) -> anyhow::Result<Vec<HardwareType>> {
        Ok(vm_sizes_to_hardware_types(&self.config.vm_sizes))
    }

    fn available_os_images(&self) -> anyhow::Result<Vec<OsImage>> {
        Ok(self.os_images())
    }

    fn clone_instance(
        &self,
        instance: &CloudInstance,
        count: u32,
    ) -> anyhow::Result<Vec<CloudInstance>> {
        let Some(image_id) = instance.image_id.as_deref() else {
            warn!(instance_id = %instance.id, "instance has no image id, cannot clone");
            return Ok(Vec::new());
        };
        match self.create_instances(&instance.hardware_id, image_id, count) {
            Ok(instances) => Ok(instances),
            Err(e) => {
                error!(instance_id = %instance.id, error = %e, "failed to clone instance");
                Ok(Vec::new())
            }
        }
    }

    fn create_instances(
        &self,
        hardware_id: &str,
        image_id: &str,
        count: u32,
    ) -> anyhow::Result<Vec<CloudInstance>> {
        info!(hardware_id, image_id, count, "creating instances");

        let low_priority = self.config.use_low_priority_vms;
        let pool_id = pool_name(
            &self.config.deadline_cloud_region,
            image_id,
            hardware_id,
            low_priority,
        );

        let Some(os_image) = self.os_images().into_iter().find(|i| i.id == image_id) else {
            warn!(image_id, "unknown image, no instances created");
            return Ok(Vec::new());
        };

        match self.pools.get_pool(&pool_id)? {
            None => {
                info!(pool_id = %pool_id, "no existing pool, creating one");
                self.create_pool(&pool_id, hardware_id, image_id, os_image.platform, count)
                    .with_context(|| format!("failed to create pool {pool_id}"))?;
            }
            Some(pool) => {
                if let Err(e) = self.grow_pool(
                    &pool_id,
                    pool.target_dedicated_nodes,
                    pool.target_low_priority_nodes,
                    os_image.platform,
                    count,
                ) {
                    error!(pool_id = %pool_id, error = %e, "failed to grow pool");
                }
            }
        }

        Ok(self.collect_instances())
    }

    fn active_instances(&self) -> anyhow::Result<Vec<CloudInstance>> {
        Ok(self.collect_instances())
    }

    fn terminate_instances(&self, instance_ids: &[InstanceId]) -> anyhow::Result<Vec<bool>> {
        info!(count = instance_ids.len(), "terminating instances");
        for (pool_id, node_ids) in self.nodes_by_pool(instance_ids) {
            self.pools
                .remove_compute_nodes(pool_id, &node_ids)
                .with_context(|| format!("failed to remove nodes from pool {pool_id}"))?;
        }
        Ok(Vec::new())
    }

    fn stop_instances(&self, instance_ids: &[InstanceId]) -> anyhow::Result<Vec<bool>> {
        debug!(count = instance_ids.len(), "stopping instances is not supported");
        Ok(Vec::new())
    }

    fn start_instances(&self, instance_ids: &[InstanceId]) -> anyhow::Result<Vec<bool>> {
        debug!(count = instance_ids.len(), "starting instances is not supported");
        Ok(Vec::new())
    }

    fn reboot_instances(&self, instance_ids: &[InstanceId]) -> anyhow::Result<Vec<bool>> {
        info!(count = instance_ids.len(), "rebooting instances");
        for id in instance_ids {
            let Some((pool_id, node_id)) = split_instance_id(id) else {
                warn!(instance_id = %id, "ignoring malformed instance id");
                continue;
            };
            self.pools
                .reboot_compute_node(pool_id, node_id)
                .with_context(|| format!("failed to reboot {id}"))?;
        }
        Ok(Vec::new())
    }

    fn hostname(&self, instance_id: &str) -> anyhow::Result<String> {
        debug!(instance_id, "looking up hostname");
        let Some((pool_id, node_id)) = split_instance_id(instance_id) else {
            return Ok(String::new());
        };
        match self.pools.compute_node_hostname(pool_id, node_id) {
            Ok(hostname) => Ok(hostname.unwrap_or_default()),
            Err(e) => {
                warn!(instance_id, error = %e, "failed to read hostname");
                Ok(String::new())
            }
        }
    }

    fn create_image(&self, source: &str) -> anyhow::Result<bool> {
        debug!(source, "image capture is not supported");
        Ok(false)
    }

    fn image_sources(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sample_store;
    use azfarm_batch::{BatchCall, ComputeNode, ComputeNodeState, InMemoryBatchService, Pool};

    fn plugin() -> AzureBatchCloudPlugin<InMemoryBatchService> {
        let config = BatchPluginConfig::from_store(&sample_store()).unwrap();
        AzureBatchCloudPlugin::new(config, InMemoryBatchService::new())
    }

    #[test]
    fn foreign_pools_are_ignored() {
        let plugin = plugin();
        plugin.pools().service().insert_pool(Pool {
            id: "otherregion-rendering-centos73-Standard_F8".to_string(),
            current_dedicated_nodes: 0,
            ..Default::default()
        });
        assert!(plugin.active_instances().unwrap().is_empty());
        assert_eq!(plugin.pools().service().pool_ids().len(), 1);
    }

    #[test]
    fn instances_are_stamped_with_region() {
        let store = sample_store().with("AzureRegion", "westus2");
        let config = BatchPluginConfig::from_store(&store).unwrap();
        let plugin = AzureBatchCloudPlugin::new(config, InMemoryBatchService::new());
        let svc = plugin.pools().service();
        svc.insert_pool(Pool {
            id: "azurewestus-x-Standard_F8".to_string(),
            current_dedicated_nodes: 1,
            target_dedicated_nodes: 1,
            ..Default::default()
        });
        svc.set_nodes(
            "azurewestus-x-Standard_F8",
            vec![ComputeNode {
                id: "n1".to_string(),
                state: ComputeNodeState::Running,
                ..Default::default()
            }],
        );

        let instances = plugin.active_instances().unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].region_name.as_deref(), Some("westus2"));
        assert_eq!(instances[0].zone.as_deref(), Some("westus2"));
    }

    #[test]
    fn unknown_image_creates_nothing() {
        let plugin = plugin();
        let created = plugin
            .create_instances("Standard_F8", "nobody:nothing:none:latest:agent", 2)
            .unwrap();
        assert!(created.is_empty());
        assert!(plugin.pools().service().added_pools().is_empty());
        assert!(
            !plugin
                .pools()
                .service()
                .calls()
                .contains(&BatchCall::ListPools)
        );
    }

    #[test]
    fn hostname_of_malformed_id_is_empty() {
        let plugin = plugin();
        assert_eq!(plugin.hostname("").unwrap(), "");
        assert_eq!(plugin.hostname("no-delimiter").unwrap(), "");
        assert_eq!(plugin.hostname("missing-pool:n1").unwrap(), "");
    }

    #[test]
    fn unsupported_operations() {
        let plugin = plugin();
        let ids = vec!["p:n".to_string()];
        assert!(plugin.stop_instances(&ids).unwrap().is_empty());
        assert!(plugin.start_instances(&ids).unwrap().is_empty());
        assert!(!plugin.create_image("p:n").unwrap());
        assert!(plugin.image_sources().unwrap().is_empty());
        assert!(plugin.pools().service().calls().is_empty());
    }

    #[test]
    fn hardware_follows_allow_list() {
        let plugin = plugin();
        let types = plugin.available_hardware_types().unwrap();
        let ids: Vec<_> = types.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["Standard_F8", "Standard_F16"]);
    }
}
