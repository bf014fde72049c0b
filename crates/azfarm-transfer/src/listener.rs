//! The asset sync event listener.
//!
//! On job submission the submitting machine uploads its configured source
//! folders to a blob container; when a worker starts the job it downloads
//! that container into a local folder. Both directions go through AzCopy.
//! Configuration is re-read on every event so edits in the host take effect
//! without a restart.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use azfarm_core::{ConfigStore, EventListener, JobInfo, Platform, split_list};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::azcopy::{AzCopyCommand, locate_azcopy};
use crate::error::{TransferError, TransferResult};
use crate::runner::{ProcessRunner, SystemRunner};

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Which transfers the listener performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    #[default]
    Both,
    UploadOnly,
    DownloadOnly,
}

impl SyncDirection {
    /// Parse the `SyncDirection` entry. Unset or unrecognised values sync
    /// both ways.
    pub fn from_entry(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("UploadOnly") => SyncDirection::UploadOnly,
            Some("DownloadOnly") => SyncDirection::DownloadOnly,
            _ => SyncDirection::Both,
        }
    }

    pub fn uploads(self) -> bool {
        self != SyncDirection::DownloadOnly
    }

    pub fn downloads(self) -> bool {
        self != SyncDirection::UploadOnly
    }
}

/// Snapshot of the listener's configuration entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferConfig {
    pub enabled_groups: Vec<String>,
    pub enabled_pools: Vec<String>,
    pub direction: SyncDirection,
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub source_folders: Vec<String>,
    pub destination_container: Option<String>,
    pub destination_folder_windows: Option<String>,
    pub destination_folder_linux: Option<String>,
}

impl TransferConfig {
    pub fn from_store<C: ConfigStore + ?Sized>(store: &C) -> Self {
        let list = |name| store.entry(name).map(|v| split_list(&v)).unwrap_or_default();
        Self {
            enabled_groups: list("EnabledGroups"),
            enabled_pools: list("EnabledPools"),
            direction: SyncDirection::from_entry(store.entry("SyncDirection").as_deref()),
            account_name: store.entry("BlobStorageAccountName"),
            account_key: store.entry("BlobStorageAccountKey"),
            source_folders: list("SourceFolders"),
            destination_container: store.entry("DestinationContainer"),
            destination_folder_windows: store.entry("DestinationFolderWindows"),
            destination_folder_linux: store.entry("DestinationFolderLinux"),
        }
    }

    /// Whether the job runs in an enabled group, or in an enabled pool as
    /// its primary or secondary pool.
    pub fn should_sync_assets(&self, job: &JobInfo) -> bool {
        self.enabled_groups.contains(&job.group)
            || self.enabled_pools.contains(&job.pool)
            || self.enabled_pools.contains(&job.secondary_pool)
    }

    pub fn destination_folder(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Windows => self.destination_folder_windows.as_deref(),
            Platform::Linux => self.destination_folder_linux.as_deref(),
        }
    }
}

/// A path is Windows-style if it is a UNC/rooted path or carries a drive
/// letter.
pub fn is_windows_path(path: &str) -> bool {
    path.starts_with('\\') || path.contains(':')
}

pub fn usable_path_for_os(path: &str, platform: Platform) -> bool {
    is_windows_path(path) == platform.is_windows()
}

/// Last non-empty component of a folder path, with either separator.
pub fn folder_basename(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or(path)
}

/// Expand `$VAR`, `${VAR}` and `%VAR%` references. References to unset
/// variables are left as written.
pub fn expand_env(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find(['$', '%']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match var_reference(tail) {
            Some((name, len)) => {
                match lookup(name) {
                    Some(resolved) => out.push_str(&resolved),
                    None => out.push_str(&tail[..len]),
                }
                rest = &tail[len..];
            }
            None => {
                out.push_str(&tail[..1]);
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Variable name and byte length of the reference at the start of `tail`.
fn var_reference(tail: &str) -> Option<(&str, usize)> {
    let is_name_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let body = &tail[1..];
    let (name, len) = if tail.starts_with('%') {
        let end = body.find('%')?;
        let name = &body[..end];
        if !name.chars().all(|c| is_name_char(c) || c == '(' || c == ')') {
            return None;
        }
        (name, end + 2)
    } else if let Some(braced) = body.strip_prefix('{') {
        let end = braced.find('}')?;
        (&braced[..end], end + 3)
    } else {
        let end = body.find(|c: char| !is_name_char(c)).unwrap_or(body.len());
        (&body[..end], end + 1)
    };
    (!name.is_empty()).then_some((name, len))
}

/// AzCopy journal folder for a transfer keyed by `key`.
pub fn journal_path(temp_dir: &Path, key: &str) -> PathBuf {
    temp_dir.join(hex::encode(Sha256::digest(key.as_bytes())))
}

fn blob_url(account: &str, container: &str) -> String {
    format!("https://{account}.blob.core.windows.net/{container}")
}

/// The configured value of a required entry, or a warning and `None`.
fn require<'a>(value: Option<&'a str>, entry: &str) -> Option<&'a str> {
    if value.is_none() {
        warn!(entry, "configuration entry not set, skipping transfer");
    }
    value
}

/// Event listener that mirrors job assets through Azure Blob Storage.
pub struct AzureDataTransfer<C, R = SystemRunner> {
    store: C,
    runner: R,
    platform: Platform,
    temp_dir: PathBuf,
    env: EnvLookup,
}

impl<C: ConfigStore, R: ProcessRunner> AzureDataTransfer<C, R> {
    /// Listener for the machine this process runs on.
    pub fn new(store: C, runner: R) -> TransferResult<Self> {
        let platform = Platform::current()
            .ok_or_else(|| TransferError::UnsupportedOs(std::env::consts::OS.to_string()))?;
        Ok(Self::with_platform(store, runner, platform))
    }

    pub fn with_platform(store: C, runner: R, platform: Platform) -> Self {
        Self {
            store,
            runner,
            platform,
            temp_dir: std::env::temp_dir(),
            env: Box::new(|name: &str| std::env::var(name).ok()),
        }
    }

    /// Directory used as AzCopy's working directory and journal root.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Environment used for executable lookup and folder expansion.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn config(&self) -> TransferConfig {
        TransferConfig::from_store(&self.store)
    }

    fn run(&self, command: &AzCopyCommand) -> TransferResult<i32> {
        let program = locate_azcopy(self.platform, |name| (self.env)(name));
        debug!(program = %program.display(), args = %command.masked(), "running AzCopy");
        self.runner.run(&program, &command.args(), &self.temp_dir)
    }

    fn upload_folder(&self, folder: &str, account: &str, key: &str, container: &str) -> TransferResult<()> {
        let destination = format!("{}/{}", blob_url(account, container), folder_basename(folder));
        let command = AzCopyCommand::upload(
            self.platform,
            folder,
            &destination,
            key,
            journal_path(&self.temp_dir, folder),
        );

        let start = Instant::now();
        let exit_code = self.run(&command)?;
        info!(
            folder,
            container,
            exit_code,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "uploaded folder"
        );
        Ok(())
    }
}

impl<C: ConfigStore, R: ProcessRunner> EventListener for AzureDataTransfer<C, R> {
    fn on_job_submitted(&self, job: &JobInfo) -> anyhow::Result<()> {
        let config = self.config();
        if !config.should_sync_assets(job) {
            info!(job_id = %job.id, "job does not use an enabled group or pool, skipping transfer");
            return Ok(());
        }
        if !config.direction.uploads() {
            info!(job_id = %job.id, "download-only sync, skipping upload");
            return Ok(());
        }

        let Some(account) = require(config.account_name.as_deref(), "BlobStorageAccountName") else {
            return Ok(());
        };
        let Some(key) = require(config.account_key.as_deref(), "BlobStorageAccountKey") else {
            return Ok(());
        };
        if config.source_folders.is_empty() {
            warn!(entry = "SourceFolders", "configuration entry not set, skipping transfer");
            return Ok(());
        }
        let Some(container) = require(config.destination_container.as_deref(), "DestinationContainer")
        else {
            return Ok(());
        };

        for folder in &config.source_folders {
            if !usable_path_for_os(folder, self.platform) {
                debug!(folder = %folder, platform = %self.platform, "folder not usable on this OS");
                continue;
            }
            self.upload_folder(folder, account, key, container)
                .with_context(|| format!("uploading {folder} for job {}", job.id))?;
        }
        Ok(())
    }

    fn on_slave_starting_job(&self, slave_name: &str, job: &JobInfo) -> anyhow::Result<()> {
        let config = self.config();
        if !config.should_sync_assets(job) {
            info!(job_id = %job.id, "job does not use an enabled group or pool, skipping transfer");
            return Ok(());
        }
        if !config.direction.downloads() {
            info!(job_id = %job.id, "upload-only sync, skipping download");
            return Ok(());
        }

        let Some(account) = require(config.account_name.as_deref(), "BlobStorageAccountName") else {
            return Ok(());
        };
        let Some(key) = require(config.account_key.as_deref(), "BlobStorageAccountKey") else {
            return Ok(());
        };
        let Some(container) = require(config.destination_container.as_deref(), "DestinationContainer")
        else {
            return Ok(());
        };
        let entry = match self.platform {
            Platform::Windows => "DestinationFolderWindows",
            Platform::Linux => "DestinationFolderLinux",
        };
        let Some(folder) = require(config.destination_folder(self.platform), entry) else {
            return Ok(());
        };
        let folder = expand_env(folder, |name| (self.env)(name));

        info!(job_id = %job.id, slave = slave_name, folder = %folder, "downloading job assets");
        let command = AzCopyCommand::download(
            self.platform,
            &blob_url(account, container),
            &folder,
            key,
            journal_path(&self.temp_dir, container),
        );

        let start = Instant::now();
        let exit_code = self
            .run(&command)
            .with_context(|| format!("downloading container {container} to {folder}"))?;
        info!(
            container,
            folder = %folder,
            exit_code,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "downloaded container"
        );
        Ok(())
    }
}
