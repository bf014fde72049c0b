//! Translation between Batch pools/nodes and host instances.

use azfarm_batch::{ComputeNode, ComputeNodeState, Pool};
use azfarm_core::{CloudInstance, InstanceStatus};

use crate::images::image_display_name;

/// Provider name stamped on every instance.
pub const PROVIDER_NAME: &str = "AzureBatch";

/// Link-local placeholder address for nodes that do not exist yet.
pub const MOCK_NODE_IP: &str = "169.254.0.0";

pub fn compute_node_state_to_status(state: ComputeNodeState) -> InstanceStatus {
    match state {
        ComputeNodeState::Idle | ComputeNodeState::Running => InstanceStatus::Running,
        ComputeNodeState::Rebooting | ComputeNodeState::Reimaging => InstanceStatus::Rebooting,
        ComputeNodeState::Starting | ComputeNodeState::WaitingForStartTask => {
            InstanceStatus::Pending
        }
        ComputeNodeState::LeavingPool => InstanceStatus::Stopping,
        ComputeNodeState::Offline | ComputeNodeState::Preempted => InstanceStatus::Stopped,
        ComputeNodeState::Unusable
        | ComputeNodeState::StartTaskFailed
        | ComputeNodeState::Unknown => InstanceStatus::Unknown,
    }
}

/// A stand-in for a node the pool is still allocating.
pub fn mock_compute_node(id: &str) -> ComputeNode {
    ComputeNode {
        id: id.to_string(),
        ip_address: Some(MOCK_NODE_IP.to_string()),
        state: ComputeNodeState::Starting,
        endpoint_configuration: None,
    }
}

pub fn cloud_instance_id(pool_id: &str, node_id: &str) -> String {
    format!("{pool_id}:{node_id}")
}

/// Split an instance id into `(pool_id, node_id)` at the first `:`.
pub fn split_instance_id(instance_id: &str) -> Option<(&str, &str)> {
    instance_id.split_once(':')
}

/// Pool id for a (region moniker, image, VM size) triple. Low-priority
/// pools get a `-lp` suffix so the two tiers never share a pool.
pub fn pool_name(cloud_region: &str, image_id: &str, hardware_id: &str, low_priority: bool) -> String {
    let mut pool_id = format!("{cloud_region}-{}-{hardware_id}", image_display_name(image_id));
    if low_priority {
        pool_id.push_str("-lp");
    }
    pool_id
}

/// Image id a pool was created from, in the form `create_instances` takes.
fn pool_image_id(pool: &Pool) -> Option<String> {
    let vm = pool.virtual_machine_configuration.as_ref()?;
    let image = &vm.image_reference;
    if let Some(id) = &image.virtual_machine_image_id {
        return Some(id.clone());
    }
    Some(format!(
        "{}:{}:{}:{}:{}",
        image.publisher.as_deref().unwrap_or_default(),
        image.offer.as_deref().unwrap_or_default(),
        image.sku.as_deref().unwrap_or_default(),
        image.version.as_deref().unwrap_or_default(),
        vm.node_agent_sku_id
    ))
}

/// Host instance for a node of `pool`. Region and zone are left for the
/// caller to stamp.
pub fn compute_node_to_instance(pool: &Pool, node: &ComputeNode) -> CloudInstance {
    let mut public_ip = node.ip_address.clone();
    if let Some(endpoints) = &node.endpoint_configuration {
        for endpoint in &endpoints.inbound_endpoints {
            if endpoint.name.starts_with("RDP") || endpoint.name.starts_with("SSH") {
                public_ip = endpoint.public_ip_address.clone();
            }
        }
    }

    CloudInstance {
        id: cloud_instance_id(&pool.id, &node.id),
        name: node.id.clone(),
        hostname: node.id.clone(),
        hardware_id: pool.vm_size.clone(),
        image_id: pool_image_id(pool),
        provider: PROVIDER_NAME.to_string(),
        region_name: None,
        zone: None,
        public_ip,
        private_ip: node.ip_address.clone(),
        status: compute_node_state_to_status(node.state),
    }
}
