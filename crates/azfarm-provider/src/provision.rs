//! Request bodies for new pools and their licensing jobs.

use azfarm_batch::{
    ApplicationPackageReference, CertificateReference, EnvironmentSetting, InboundEndpointProtocol,
    InboundNatPool, NetworkConfiguration, NetworkSecurityGroupRule,
    NetworkSecurityGroupRuleAccess, PoolAddParameter, PoolEndpointConfiguration, ResourceFile,
    StartTask, TaskAddParameter, TaskConstraints, UserIdentity,
};
use azfarm_core::Platform;

use crate::config::BatchPluginConfig;
use crate::images::BatchImageSpec;
use crate::starttask::StartTaskCommand;

/// Application package holding the Deadline client installer.
pub const DEADLINE_CLIENT_PACKAGE: &str = "DeadlineClient";

const MAX_TASK_RETRIES: i32 = 3;

const LICENSE_SCRIPTS_URL: &str =
    "https://raw.githubusercontent.com/Azure/azure-deadline/master/CloudProviderPlugin/Scripts";

/// What to create: everything that varies between pools.
#[derive(Debug, Clone)]
pub struct PoolRequest<'a> {
    pub pool_id: &'a str,
    pub vm_size: &'a str,
    pub platform: Platform,
    pub image: &'a BatchImageSpec,
    pub dedicated_nodes: u32,
    pub low_priority_nodes: u32,
}

/// NAT pools that block inbound RDP and SSH from anywhere.
fn remote_access_deny_pools() -> Vec<InboundNatPool> {
    let deny = |priority| NetworkSecurityGroupRule {
        priority,
        access: NetworkSecurityGroupRuleAccess::Deny,
        source_address_prefix: "*".to_string(),
    };

    vec![
        InboundNatPool {
            name: "DisableRDP".to_string(),
            protocol: InboundEndpointProtocol::Tcp,
            backend_port: 3389,
            frontend_port_range_start: 60000,
            frontend_port_range_end: 60099,
            network_security_group_rules: vec![deny(150)],
        },
        InboundNatPool {
            name: "DisableSSH".to_string(),
            protocol: InboundEndpointProtocol::Tcp,
            backend_port: 22,
            frontend_port_range_start: 61000,
            frontend_port_range_end: 61099,
            network_security_group_rules: vec![deny(151)],
        },
    ]
}

fn network_configuration(config: &BatchPluginConfig) -> Option<NetworkConfiguration> {
    if config.subnet_id.is_none() && !config.disable_remote_access {
        return None;
    }

    let endpoint_configuration = config
        .disable_remote_access
        .then(|| PoolEndpointConfiguration {
            inbound_nat_pools: remote_access_deny_pools(),
        });

    Some(NetworkConfiguration {
        subnet_id: config.subnet_id.clone(),
        endpoint_configuration,
    })
}

fn start_task(config: &BatchPluginConfig, platform: Platform) -> StartTask {
    let environment_settings = config
        .app_insights()
        .map(|(app_id, key)| {
            vec![
                EnvironmentSetting {
                    name: "APP_INSIGHTS_APP_ID".to_string(),
                    value: app_id.to_string(),
                },
                EnvironmentSetting {
                    name: "APP_INSIGHTS_INSTRUMENTATION_KEY".to_string(),
                    value: key.to_string(),
                },
            ]
        })
        .unwrap_or_default();

    StartTask {
        command_line: StartTaskCommand::new(config, platform).render(),
        resource_files: vec![ResourceFile {
            http_url: config.start_task_url(platform).to_string(),
            file_path: StartTaskCommand::script_name(platform).to_string(),
        }],
        environment_settings,
        user_identity: UserIdentity::pool_admin(),
        max_task_retry_count: MAX_TASK_RETRIES,
        wait_for_success: true,
    }
}

/// Create-pool body for `request` under `config`.
pub fn pool_add_parameter(config: &BatchPluginConfig, request: &PoolRequest<'_>) -> PoolAddParameter {
    PoolAddParameter {
        id: request.pool_id.to_string(),
        display_name: request.pool_id.to_string(),
        vm_size: request.vm_size.to_string(),
        virtual_machine_configuration: request.image.virtual_machine_configuration(),
        target_dedicated_nodes: request.dedicated_nodes,
        target_low_priority_nodes: request.low_priority_nodes,
        start_task: start_task(config, request.platform),
        certificate_references: vec![CertificateReference {
            thumbprint: config.kv_sp_cert_thumbprint.clone(),
            thumbprint_algorithm: "sha1".to_string(),
        }],
        application_package_references: vec![ApplicationPackageReference {
            application_id: DEADLINE_CLIENT_PACKAGE.to_string(),
        }],
        application_licenses: config.app_licenses.clone(),
        network_configuration: network_configuration(config),
    }
}

/// One licensing task; the job holds one per node. Each task registers its
/// node with the usage-based licensing server.
pub fn license_task(platform: Platform) -> TaskAddParameter {
    let (script, command_line) = match platform {
        Platform::Linux => ("azure-batch-ses.sh", "/bin/bash -c azure-batch-ses.sh"),
        Platform::Windows => ("azure-batch-ses.ps1", "powershell.exe -file azure-batch-ses.ps1"),
    };

    TaskAddParameter {
        id: uuid::Uuid::new_v4().to_string(),
        command_line: command_line.to_string(),
        resource_files: vec![ResourceFile {
            http_url: format!("{LICENSE_SCRIPTS_URL}/{script}"),
            file_path: script.to_string(),
        }],
        constraints: TaskConstraints {
            max_task_retry_count: MAX_TASK_RETRIES,
        },
        user_identity: UserIdentity::pool_admin(),
    }
}
