//! Batch REST resource and request shapes.
//!
//! Field names follow the Batch REST API (camelCase JSON). Only the fields
//! the plugins read or write are modelled; everything else in a response is
//! ignored on deserialization.

use serde::{Deserialize, Serialize};

// ── Pools ──────────────────────────────────────────────────────────

/// Whether a pool is currently changing its node count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationState {
    #[default]
    Steady,
    Resizing,
    Stopping,
    #[serde(other)]
    Unknown,
}

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    #[default]
    Active,
    Deleting,
    Upgrading,
    #[serde(other)]
    Unknown,
}

/// Marketplace image or custom image the pool's nodes boot from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// ARM resource id of a managed image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_machine_image_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineConfiguration {
    pub image_reference: ImageReference,
    #[serde(rename = "nodeAgentSKUId")]
    pub node_agent_sku_id: String,
}

/// A pool as returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pool {
    pub id: String,
    pub display_name: Option<String>,
    pub vm_size: String,
    pub state: PoolState,
    pub allocation_state: AllocationState,
    pub current_dedicated_nodes: u32,
    pub current_low_priority_nodes: u32,
    pub target_dedicated_nodes: u32,
    pub target_low_priority_nodes: u32,
    pub virtual_machine_configuration: Option<VirtualMachineConfiguration>,
}

impl Pool {
    pub fn current_nodes(&self) -> u32 {
        self.current_dedicated_nodes + self.current_low_priority_nodes
    }

    pub fn target_nodes(&self) -> u32 {
        self.target_dedicated_nodes + self.target_low_priority_nodes
    }
}

// ── Compute nodes ──────────────────────────────────────────────────

/// State of a compute node. Values the service adds later (and the
/// transient `creating` state) read as `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeNodeState {
    Idle,
    Rebooting,
    Reimaging,
    Running,
    Unusable,
    Starting,
    WaitingForStartTask,
    StartTaskFailed,
    LeavingPool,
    Offline,
    Preempted,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ComputeNodeState {
    /// Every state, in the service's documentation order.
    pub const ALL: [ComputeNodeState; 12] = [
        ComputeNodeState::Idle,
        ComputeNodeState::Rebooting,
        ComputeNodeState::Reimaging,
        ComputeNodeState::Running,
        ComputeNodeState::Unusable,
        ComputeNodeState::Starting,
        ComputeNodeState::WaitingForStartTask,
        ComputeNodeState::StartTaskFailed,
        ComputeNodeState::Unknown,
        ComputeNodeState::LeavingPool,
        ComputeNodeState::Offline,
        ComputeNodeState::Preempted,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundEndpoint {
    pub name: String,
    pub protocol: Option<String>,
    #[serde(rename = "publicIPAddress")]
    pub public_ip_address: Option<String>,
    #[serde(rename = "publicFQDN")]
    pub public_fqdn: Option<String>,
    pub frontend_port: Option<u16>,
    pub backend_port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputeNodeEndpointConfiguration {
    pub inbound_endpoints: Vec<InboundEndpoint>,
}

/// A compute node as returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputeNode {
    pub id: String,
    pub ip_address: Option<String>,
    pub state: ComputeNodeState,
    pub endpoint_configuration: Option<ComputeNodeEndpointConfiguration>,
}

// ── Pool requests ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoUserScope {
    Task,
    Pool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationLevel {
    NonAdmin,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoUserSpecification {
    pub scope: AutoUserScope,
    pub elevation_level: ElevationLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub auto_user: AutoUserSpecification,
}

impl UserIdentity {
    /// Pool-scoped administrator, the identity start tasks and licensing
    /// tasks run as.
    pub fn pool_admin() -> Self {
        Self {
            auto_user: AutoUserSpecification {
                scope: AutoUserScope::Pool,
                elevation_level: ElevationLevel::Admin,
            },
        }
    }
}

/// A file downloaded onto the node before a task runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFile {
    pub http_url: String,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSetting {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTask {
    pub command_line: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_files: Vec<ResourceFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment_settings: Vec<EnvironmentSetting>,
    pub user_identity: UserIdentity,
    pub max_task_retry_count: i32,
    pub wait_for_success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateReference {
    pub thumbprint: String,
    pub thumbprint_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPackageReference {
    pub application_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundEndpointProtocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkSecurityGroupRuleAccess {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSecurityGroupRule {
    pub priority: u32,
    pub access: NetworkSecurityGroupRuleAccess,
    pub source_address_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundNatPool {
    pub name: String,
    pub protocol: InboundEndpointProtocol,
    pub backend_port: u16,
    pub frontend_port_range_start: u16,
    pub frontend_port_range_end: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_security_group_rules: Vec<NetworkSecurityGroupRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEndpointConfiguration {
    #[serde(rename = "inboundNATPools")]
    pub inbound_nat_pools: Vec<InboundNatPool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_configuration: Option<PoolEndpointConfiguration>,
}

/// Body of a create-pool request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolAddParameter {
    pub id: String,
    pub display_name: String,
    pub vm_size: String,
    pub virtual_machine_configuration: VirtualMachineConfiguration,
    pub target_dedicated_nodes: u32,
    pub target_low_priority_nodes: u32,
    pub start_task: StartTask,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_references: Vec<CertificateReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub application_package_references: Vec<ApplicationPackageReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub application_licenses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_configuration: Option<NetworkConfiguration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolResizeParameter {
    pub target_dedicated_nodes: u32,
    pub target_low_priority_nodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeNodeDeallocationOption {
    Requeue,
    Terminate,
    TaskCompletion,
    RetainedData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRemoveParameter {
    pub node_list: Vec<String>,
    pub node_deallocation_option: ComputeNodeDeallocationOption,
}

// ── Jobs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInformation {
    pub pool_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAddParameter {
    pub id: String,
    pub pool_info: PoolInformation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConstraints {
    pub max_task_retry_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAddParameter {
    pub id: String,
    pub command_line: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_files: Vec<ResourceFile>,
    pub constraints: TaskConstraints,
    pub user_identity: UserIdentity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_pool() {
        let json = r#"{
            "id": "azurewestus-rendering-windows2016-Standard_F8",
            "url": "https://contoso.westus2.batch.azure.com/pools/x",
            "vmSize": "standard_f8",
            "state": "active",
            "allocationState": "resizing",
            "currentDedicatedNodes": 2,
            "currentLowPriorityNodes": 0,
            "targetDedicatedNodes": 4,
            "targetLowPriorityNodes": 0,
            "virtualMachineConfiguration": {
                "imageReference": {
                    "publisher": "batch",
                    "offer": "rendering-windows2016",
                    "sku": "rendering",
                    "version": "latest"
                },
                "nodeAgentSKUId": "batch.node.windows amd64"
            }
        }"#;
        let pool: Pool = serde_json::from_str(json).unwrap();
        assert_eq!(pool.allocation_state, AllocationState::Resizing);
        assert_eq!(pool.state, PoolState::Active);
        assert_eq!(pool.current_nodes(), 2);
        assert_eq!(pool.target_nodes(), 4);
        let vm = pool.virtual_machine_configuration.unwrap();
        assert_eq!(vm.node_agent_sku_id, "batch.node.windows amd64");
        assert_eq!(vm.image_reference.offer.as_deref(), Some("rendering-windows2016"));
    }

    #[test]
    fn deserialize_node_states() {
        let cases = [
            ("idle", ComputeNodeState::Idle),
            ("waitingforstarttask", ComputeNodeState::WaitingForStartTask),
            ("starttaskfailed", ComputeNodeState::StartTaskFailed),
            ("leavingpool", ComputeNodeState::LeavingPool),
            ("preempted", ComputeNodeState::Preempted),
            ("creating", ComputeNodeState::Unknown),
            ("somethingnew", ComputeNodeState::Unknown),
        ];
        for (wire, expected) in cases {
            let state: ComputeNodeState =
                serde_json::from_str(&format!("\"{wire}\"")).unwrap();
            assert_eq!(state, expected, "wire value {wire}");
        }
    }

    #[test]
    fn deserialize_node_with_endpoints() {
        let json = r#"{
            "id": "tvm-1_1-20180101t000000z",
            "ipAddress": "10.0.0.4",
            "state": "idle",
            "endpointConfiguration": {
                "inboundEndpoints": [
                    {"name": "SSHRule.0", "protocol": "tcp", "publicIPAddress": "52.1.2.3",
                     "publicFQDN": "x.westus2.cloudapp.azure.com", "frontendPort": 50000, "backendPort": 22}
                ]
            }
        }"#;
        let node: ComputeNode = serde_json::from_str(json).unwrap();
        let endpoints = node.endpoint_configuration.unwrap().inbound_endpoints;
        assert_eq!(endpoints[0].name, "SSHRule.0");
        assert_eq!(endpoints[0].public_ip_address.as_deref(), Some("52.1.2.3"));
    }

    #[test]
    fn serialize_remove_nodes() {
        let param = NodeRemoveParameter {
            node_list: vec!["n1".to_string()],
            node_deallocation_option: ComputeNodeDeallocationOption::Terminate,
        };
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["nodeDeallocationOption"], "terminate");
        assert_eq!(json["nodeList"][0], "n1");
    }

    #[test]
    fn serialize_nat_pools_key() {
        let config = PoolEndpointConfiguration {
            inbound_nat_pools: vec![],
        };
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("inboundNATPools").is_some());
    }
}
