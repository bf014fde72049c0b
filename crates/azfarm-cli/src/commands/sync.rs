use std::path::Path;

use anyhow::Context;
use azfarm_core::{EventListener, JobInfo, MapConfigStore};
use azfarm_transfer::{AzureDataTransfer, SystemRunner};
use serde_json::json;
use tracing::debug;

use super::print_json;

fn load(path: &Path) -> anyhow::Result<AzureDataTransfer<MapConfigStore>> {
    debug!(path = %path.display(), "loading transfer config");
    let store = MapConfigStore::from_toml_file(path)
        .with_context(|| format!("loading transfer config {}", path.display()))?;
    Ok(AzureDataTransfer::new(store, SystemRunner)?)
}

pub fn upload(path: &Path, job: JobInfo) -> anyhow::Result<()> {
    load(path)?.on_job_submitted(&job)?;
    print_json(&json!({ "event": "job_submitted", "job": job }))
}

pub fn download(path: &Path, slave: &str, job: JobInfo) -> anyhow::Result<()> {
    load(path)?.on_slave_starting_job(slave, &job)?;
    print_json(&json!({ "event": "slave_starting_job", "slave": slave, "job": job }))
}
