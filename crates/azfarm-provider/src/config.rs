//! Plugin configuration, read once from the host's configuration store.

use std::time::Duration;

use azfarm_core::{ConfigResult, ConfigStore, OsImage, Platform, split_list};

use crate::images::image_display_name;

/// Azure AD host the tenant id is appended to.
pub const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

pub const DEFAULT_VM_SIZES: &str = "Standard_F8;Standard_F16";

const DEFAULT_RESIZE_POLL_SECS: u64 = 15;
const DEFAULT_RESIZE_TIMEOUT_SECS: u64 = 3600;

/// A custom image the operator has made available to the farm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedImage {
    /// ARM resource id (`/subscriptions/...`).
    pub id: String,
    /// OS name as configured, e.g. `Windows` or `CentOS7`.
    pub os: Option<String>,
}

impl ManagedImage {
    pub fn platform(&self) -> Platform {
        if self.os.as_deref() == Some("Windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

/// Everything the cloud provider reads from the host configuration.
#[derive(Debug, Clone)]
pub struct BatchPluginConfig {
    // Batch account
    pub batch_url: String,
    pub batch_sp_tenant_id: String,
    pub batch_sp_app_id: String,
    pub batch_sp_app_key: String,
    /// `{AUTHORITY_HOST}/{batch_sp_tenant_id}`
    pub authority_uri: String,

    // Key Vault
    pub kv_name: String,
    pub kv_sp_tenant_id: String,
    pub kv_sp_app_id: String,
    pub kv_sp_cert_thumbprint: String,

    // Domain
    pub domain_name: Option<String>,
    pub domain_ou_path: Option<String>,

    // Networking
    pub subnet_id: Option<String>,
    pub smb_network_shares: Option<String>,
    pub nfs_network_shares: Option<String>,
    pub disable_remote_access: bool,

    // VMs
    pub vm_sizes: Vec<String>,
    pub use_low_priority_vms: bool,
    pub windows_start_task_url: String,
    pub linux_start_task_url: String,
    pub app_licenses: Vec<String>,
    /// Azure region of the Batch account, reported as the instance zone.
    pub azure_region: Option<String>,

    // Deadline
    pub deadline_repo_share_windows: String,
    pub deadline_repo_share_linux: String,
    /// Region the workers join.
    pub deadline_region: String,
    /// Moniker prefixed to every pool id this plugin owns.
    pub deadline_cloud_region: String,
    pub deadline_license_server: Option<String>,
    pub deadline_license_mode: String,
    pub deadline_windows_groups: Option<String>,
    pub deadline_linux_groups: Option<String>,
    pub deadline_windows_pools: Option<String>,
    pub deadline_linux_pools: Option<String>,

    pub managed_images: Vec<ManagedImage>,

    // Application Insights
    pub app_insights_app_id: Option<String>,
    pub app_insights_instrumentation_key: Option<String>,

    pub resize_poll_interval: Duration,
    pub resize_timeout: Duration,
}

impl BatchPluginConfig {
    /// Read and validate every entry. Fails on the first missing required
    /// entry or malformed value.
    pub fn from_store<C: ConfigStore + ?Sized>(store: &C) -> ConfigResult<Self> {
        let batch_sp_tenant_id = store.required("BatchSPTenantId")?;
        let authority_uri = format!("{AUTHORITY_HOST}/{batch_sp_tenant_id}");

        let deadline_groups = store.entry("DeadlineGroups");
        let deadline_pools = store.entry("DeadlinePools");

        let managed_images = [1, 2]
            .into_iter()
            .filter_map(|slot| {
                store
                    .entry(&format!("ManagedImageId{slot}"))
                    .map(|id| ManagedImage {
                        id,
                        os: store.entry(&format!("ManagedImageOs{slot}")),
                    })
            })
            .collect();

        Ok(Self {
            batch_url: store.required("BatchAccountUrl")?,
            batch_sp_tenant_id,
            batch_sp_app_id: store.required("BatchSPAppId")?,
            batch_sp_app_key: store.required("BatchSPAppKey")?,
            authority_uri,

            kv_name: store.required("KVName")?,
            kv_sp_tenant_id: store.required("KVSPTenantId")?,
            kv_sp_app_id: store.required("KVSPAppId")?,
            kv_sp_cert_thumbprint: store.required("KVSPCertThumbprint")?,

            domain_name: store.entry("DomainName"),
            domain_ou_path: store.entry("DomainOUPath"),

            subnet_id: store.entry("SubnetResourceId"),
            smb_network_shares: store.entry("SMBNetworkShares"),
            nfs_network_shares: store.entry("NFSNetworkShares"),
            disable_remote_access: store.bool_entry_or("DisableRemoteAccess", false)?,

            vm_sizes: split_list(&store.entry_or("VMSizes", DEFAULT_VM_SIZES)),
            use_low_priority_vms: store.bool_entry_or("UseLowPriorityVMs", false)?,
            windows_start_task_url: store.required("WindowsStartTaskUrl")?,
            linux_start_task_url: store.required("LinuxStartTaskUrl")?,
            app_licenses: store
                .entry("ApplicationLicenses")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            azure_region: store.entry("AzureRegion"),

            deadline_repo_share_windows: store.required("DeadlineRepositoryShareOrPathWindows")?,
            deadline_repo_share_linux: store.required("DeadlineRepositoryShareOrPathLinux")?,
            deadline_region: store.required("DeadlineRegion")?,
            deadline_cloud_region: store.required("DeadlineCloudRegion")?,
            deadline_license_server: store.entry("DeadlineLicenseServer"),
            deadline_license_mode: store.required("DeadlineLicenseMode")?,
            deadline_windows_groups: store
                .entry("DeadlineWindowsGroups")
                .or_else(|| deadline_groups.clone()),
            deadline_linux_groups: store.entry("DeadlineLinuxGroups").or(deadline_groups),
            deadline_windows_pools: store
                .entry("DeadlineWindowsPools")
                .or_else(|| deadline_pools.clone()),
            deadline_linux_pools: store.entry("DeadlineLinuxPools").or(deadline_pools),

            managed_images,

            app_insights_app_id: store.entry("ApplicationInsightsAppId"),
            app_insights_instrumentation_key: store.entry("ApplicationInsightsInstrumentationKey"),

            resize_poll_interval: Duration::from_secs(
                store.u64_entry_or("ResizePollIntervalSeconds", DEFAULT_RESIZE_POLL_SECS)?,
            ),
            resize_timeout: Duration::from_secs(
                store.u64_entry_or("ResizeTimeoutSeconds", DEFAULT_RESIZE_TIMEOUT_SECS)?,
            ),
        })
    }

    /// The configured managed images, as the host sees them.
    pub fn os_images(&self) -> Vec<OsImage> {
        self.managed_images
            .iter()
            .map(|image| OsImage {
                id: image.id.clone(),
                description: image_display_name(&image.id).to_string(),
                platform: image.platform(),
            })
            .collect()
    }

    pub fn managed_image(&self, image_id: &str) -> Option<&ManagedImage> {
        self.managed_images.iter().find(|image| image.id == image_id)
    }

    pub fn start_task_url(&self, platform: Platform) -> &str {
        match platform {
            Platform::Windows => &self.windows_start_task_url,
            Platform::Linux => &self.linux_start_task_url,
        }
    }

    pub fn deadline_groups(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Windows => self.deadline_windows_groups.as_deref(),
            Platform::Linux => self.deadline_linux_groups.as_deref(),
        }
    }

    pub fn deadline_pools(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Windows => self.deadline_windows_pools.as_deref(),
            Platform::Linux => self.deadline_linux_pools.as_deref(),
        }
    }

    pub fn repository_path(&self, platform: Platform) -> &str {
        match platform {
            Platform::Windows => &self.deadline_repo_share_windows,
            Platform::Linux => &self.deadline_repo_share_linux,
        }
    }

    /// Both Application Insights keys, when both are configured.
    pub fn app_insights(&self) -> Option<(&str, &str)> {
        match (
            self.app_insights_app_id.as_deref(),
            self.app_insights_instrumentation_key.as_deref(),
        ) {
            (Some(app_id), Some(key)) => Some((app_id, key)),
            _ => None,
        }
    }
}

/// A store holding every required entry, for tests across the crate.
#[cfg(test)]
pub(crate) fn sample_store() -> azfarm_core::MapConfigStore {
    azfarm_core::MapConfigStore::new()
        .with("BatchAccountUrl", "https://farm.westus2.batch.azure.com")
        .with("BatchSPTenantId", "tenant-1")
        .with("BatchSPAppId", "batch-app")
        .with("BatchSPAppKey", "batch-secret")
        .with("KVName", "farm-kv")
        .with("KVSPTenantId", "kv-tenant")
        .with("KVSPAppId", "kv-app")
        .with("KVSPCertThumbprint", "ABCDEF0123")
        .with("WindowsStartTaskUrl", "https://scripts/deadline-starttask.ps1")
        .with("LinuxStartTaskUrl", "https://scripts/deadline-starttask.sh")
        .with("DeadlineRepositoryShareOrPathWindows", r"\\fs\DeadlineRepository10")
        .with("DeadlineRepositoryShareOrPathLinux", "/mnt/repo")
        .with("DeadlineRegion", "westus2")
        .with("DeadlineCloudRegion", "azurewestus")
        .with("DeadlineLicenseMode", "LicenseFree")
}

#[cfg(test)]
mod tests {
    use super::*;
    use azfarm_core::ConfigError;

    #[test]
    fn defaults() {
        let config = BatchPluginConfig::from_store(&sample_store()).unwrap();
        assert_eq!(
            config.authority_uri,
            "https://login.microsoftonline.com/tenant-1"
        );
        assert_eq!(config.vm_sizes, vec!["Standard_F8", "Standard_F16"]);
        assert!(!config.use_low_priority_vms);
        assert!(!config.disable_remote_access);
        assert!(config.app_licenses.is_empty());
        assert!(config.managed_images.is_empty());
        assert_eq!(config.resize_poll_interval, Duration::from_secs(15));
        assert_eq!(config.resize_timeout, Duration::from_secs(3600));
        assert_eq!(config.domain_name, None);
    }

    #[test]
    fn missing_required_entry() {
        let mut store = sample_store();
        store.remove("KVName");
        let err = BatchPluginConfig::from_store(&store).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(name) if name == "KVName"));
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let store = sample_store().with("UseLowPriorityVMs", "sometimes");
        assert!(matches!(
            BatchPluginConfig::from_store(&store),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn lists_are_split() {
        let store = sample_store()
            .with("VMSizes", "Standard_D2_v3; Standard_NC6;")
            .with("ApplicationLicenses", "maya;arnold");
        let config = BatchPluginConfig::from_store(&store).unwrap();
        assert_eq!(config.vm_sizes, vec!["Standard_D2_v3", "Standard_NC6"]);
        assert_eq!(config.app_licenses, vec!["maya", "arnold"]);
    }

    #[test]
    fn per_os_groups_fall_back_to_shared() {
        let store = sample_store()
            .with("DeadlineGroups", "render")
            .with("DeadlineLinuxGroups", "linux-render")
            .with("DeadlineWindowsPools", "win-pool");
        let config = BatchPluginConfig::from_store(&store).unwrap();
        assert_eq!(config.deadline_groups(Platform::Windows), Some("render"));
        assert_eq!(config.deadline_groups(Platform::Linux), Some("linux-render"));
        assert_eq!(config.deadline_pools(Platform::Windows), Some("win-pool"));
        assert_eq!(config.deadline_pools(Platform::Linux), None);
    }

    #[test]
    fn managed_images_become_os_images() {
        let store = sample_store()
            .with(
                "ManagedImageId1",
                "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/images/win-render",
            )
            .with("ManagedImageOs1", "Windows")
            .with(
                "ManagedImageId2",
                "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/images/centos-render",
            )
            .with("ManagedImageOs2", "CentOS7");
        let config = BatchPluginConfig::from_store(&store).unwrap();
        let images = config.os_images();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].description, "win-render");
        assert_eq!(images[0].platform, Platform::Windows);
        assert_eq!(images[1].description, "centos-render");
        assert_eq!(images[1].platform, Platform::Linux);
    }

    #[test]
    fn app_insights_requires_both_keys() {
        let store = sample_store().with("ApplicationInsightsAppId", "app");
        let config = BatchPluginConfig::from_store(&store).unwrap();
        assert_eq!(config.app_insights(), None);

        let store = store.with("ApplicationInsightsInstrumentationKey", "ikey");
        let config = BatchPluginConfig::from_store(&store).unwrap();
        assert_eq!(config.app_insights(), Some(("app", "ikey")));
    }
}
