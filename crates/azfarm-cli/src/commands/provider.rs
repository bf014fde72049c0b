use std::path::Path;

use anyhow::Context;
use azfarm_core::{CloudProvider, MapConfigStore};
use azfarm_provider::AzureBatchCloudPlugin;
use serde_json::json;
use tracing::debug;

use super::print_json;

pub fn load(path: &Path) -> anyhow::Result<impl CloudProvider> {
    debug!(path = %path.display(), "loading provider config");
    let store = MapConfigStore::from_toml_file(path)
        .with_context(|| format!("loading provider config {}", path.display()))?;
    AzureBatchCloudPlugin::from_store(&store)
}

pub fn verify(provider: &impl CloudProvider) -> anyhow::Result<()> {
    let ok = provider.verify_access()?;
    print_json(&json!({ "access": ok }))
}

pub fn hardware(provider: &impl CloudProvider) -> anyhow::Result<()> {
    print_json(&provider.available_hardware_types()?)
}

pub fn images(provider: &impl CloudProvider) -> anyhow::Result<()> {
    print_json(&provider.available_os_images()?)
}

pub fn instances(provider: &impl CloudProvider) -> anyhow::Result<()> {
    print_json(&provider.active_instances()?)
}

pub fn create(
    provider: &impl CloudProvider,
    hardware: &str,
    image: &str,
    count: u32,
) -> anyhow::Result<()> {
    let instances = provider
        .create_instances(hardware, image, count)
        .with_context(|| format!("creating {count} x {hardware} on {image}"))?;
    print_json(&instances)
}

pub fn terminate(provider: &impl CloudProvider, ids: &[String]) -> anyhow::Result<()> {
    let results = provider.terminate_instances(ids)?;
    print_json(&paired(ids, &results))
}

pub fn reboot(provider: &impl CloudProvider, ids: &[String]) -> anyhow::Result<()> {
    let results = provider.reboot_instances(ids)?;
    print_json(&paired(ids, &results))
}

pub fn hostname(provider: &impl CloudProvider, id: &str) -> anyhow::Result<()> {
    let hostname = provider.hostname(id)?;
    print_json(&json!({ "id": id, "hostname": hostname }))
}

/// `{id: accepted}` for each requested id.
fn paired(ids: &[String], results: &[bool]) -> serde_json::Value {
    ids.iter()
        .zip(results)
        .map(|(id, ok)| (id.clone(), json!(ok)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}
