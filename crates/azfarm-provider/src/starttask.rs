//! Pool start task command line.
//!
//! The start task downloads `deadline-starttask.ps1` / `.sh` and runs it
//! with the settings a node needs to install the Deadline client and join
//! the farm. Arguments are collected as a list and rendered once per OS:
//! PowerShell parameters under `cmd.exe` on Windows, long options inside a
//! single-quoted `bash -c` string on Linux.

use azfarm_core::Platform;

use crate::config::BatchPluginConfig;

/// Installer location exported by Batch for the `DeadlineClient` package.
const WINDOWS_INSTALLER_PATH: &str = "%AZ_BATCH_APP_PACKAGE_DeadlineClient%";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Double,
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Arg {
    name: &'static str,
    value: String,
    quote: Quote,
}

/// The start task command for one OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTaskCommand {
    platform: Platform,
    args: Vec<Arg>,
}

impl StartTaskCommand {
    /// Script file the start task downloads and runs.
    pub fn script_name(platform: Platform) -> &'static str {
        match platform {
            Platform::Windows => "deadline-starttask.ps1",
            Platform::Linux => "deadline-starttask.sh",
        }
    }

    pub fn new(config: &BatchPluginConfig, platform: Platform) -> Self {
        let mut cmd = Self {
            platform,
            args: Vec::new(),
        };

        if platform.is_windows() {
            cmd.push("installerPath", WINDOWS_INSTALLER_PATH, Quote::Double);
        }
        cmd.push("tenantId", &config.kv_sp_tenant_id, Quote::Double);
        cmd.push("applicationId", &config.kv_sp_app_id, Quote::Double);
        cmd.push(
            "keyVaultCertificateThumbprint",
            &config.kv_sp_cert_thumbprint,
            Quote::Double,
        );
        cmd.push("keyVaultName", &config.kv_name, Quote::Double);
        cmd.push(
            "deadlineRepositoryPath",
            config.repository_path(platform),
            Quote::Double,
        );
        cmd.push("deadlineLicenseMode", &config.deadline_license_mode, Quote::Double);
        cmd.push("deadlineRegion", &config.deadline_region, Quote::Double);

        match platform {
            Platform::Windows => {
                cmd.push_opt("domainName", config.domain_name.as_deref(), Quote::Double);
                cmd.push_opt("domainOuPath", config.domain_ou_path.as_deref(), Quote::Single);
                cmd.push_opt(
                    "deadlineLicenseServer",
                    config.deadline_license_server.as_deref(),
                    Quote::Double,
                );
                cmd.push_opt("smbShares", config.smb_network_shares.as_deref(), Quote::Single);
                cmd.push_opt("nfsShares", config.nfs_network_shares.as_deref(), Quote::Single);
                cmd.push_opt("deadlineGroups", config.deadline_groups(platform), Quote::Single);
                cmd.push_opt("deadlinePools", config.deadline_pools(platform), Quote::Single);
            }
            Platform::Linux => {
                // bash -c unescapes once more inside double quotes.
                let smb = config.smb_network_shares.as_deref().map(double_backslashes);
                let nfs = config.nfs_network_shares.as_deref().map(double_backslashes);

                cmd.push_opt(
                    "deadlineLicenseServer",
                    config.deadline_license_server.as_deref(),
                    Quote::Double,
                );
                cmd.push_opt("smbShares", smb.as_deref(), Quote::Double);
                cmd.push_opt("nfsShares", nfs.as_deref(), Quote::Double);
                cmd.push_opt("domainName", config.domain_name.as_deref(), Quote::Double);
                cmd.push_opt("deadlineGroups", config.deadline_groups(platform), Quote::Double);
                cmd.push_opt("deadlinePools", config.deadline_pools(platform), Quote::Double);
            }
        }

        cmd
    }

    fn push(&mut self, name: &'static str, value: &str, quote: Quote) {
        self.args.push(Arg {
            name,
            value: value.to_string(),
            quote,
        });
    }

    fn push_opt(&mut self, name: &'static str, value: Option<&str>, quote: Quote) {
        if let Some(value) = value {
            self.push(name, value, quote);
        }
    }

    /// Whether an argument with this name is present.
    pub fn has_arg(&self, name: &str) -> bool {
        self.args.iter().any(|arg| arg.name == name)
    }

    /// The full command line for the start task.
    pub fn render(&self) -> String {
        let script = Self::script_name(self.platform);
        let (mut line, prefix) = match self.platform {
            Platform::Windows => (format!("cmd.exe /c powershell.exe .\\{script}"), "-"),
            Platform::Linux => (format!("/bin/bash -c '{script}"), "--"),
        };

        for arg in &self.args {
            let q = match arg.quote {
                Quote::Double => '"',
                Quote::Single => '\'',
            };
            line.push_str(&format!(" {prefix}{} {q}{}{q}", arg.name, arg.value));
        }

        if self.platform == Platform::Linux {
            line.push('\'');
        }
        line
    }
}

fn double_backslashes(value: &str) -> String {
    value.replace('\\', "\\\\")
}
