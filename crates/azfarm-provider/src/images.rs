//! OS image identifiers and their Batch image references.
//!
//! Two id forms are accepted:
//!
//! - managed images: an ARM resource path starting with `/subscriptions/`,
//!   which must match one of the configured managed image ids;
//! - marketplace images: `publisher:offer:sku:version:node-agent-sku`.

use azfarm_batch::{ImageReference, VirtualMachineConfiguration};
use azfarm_core::{OsImage, Platform};

use crate::config::BatchPluginConfig;

/// Node agent SKU for each OS name accepted in `ManagedImageOsN`.
const OS_NODE_AGENT_SKUS: &[(&str, &str)] = &[
    ("Windows", "batch.node.windows amd64"),
    ("Ubuntu14.04", "batch.node.ubuntu 14.04"),
    ("Ubuntu16.04", "batch.node.ubuntu 16.04"),
    ("CentOS7", "batch.node.centos 7"),
];

pub fn node_agent_sku_for_os(os: &str) -> Option<&'static str> {
    OS_NODE_AGENT_SKUS
        .iter()
        .find(|(name, _)| *name == os)
        .map(|(_, sku)| *sku)
}

/// Short name for an image: the last path segment of a managed image, the
/// offer of a marketplace image.
pub fn image_display_name(image_id: &str) -> &str {
    if image_id.starts_with("/subscriptions") {
        image_id.rsplit('/').next().unwrap_or(image_id)
    } else {
        image_id.split(':').nth(1).unwrap_or(image_id)
    }
}

/// The Azure Batch rendering images every farm can use.
pub fn abr_images() -> Vec<OsImage> {
    vec![
        OsImage {
            id: "batch:rendering-windows2016:rendering:latest:batch.node.windows amd64"
                .to_string(),
            description: "Azure Batch Windows 2016 Rendering Image".to_string(),
            platform: Platform::Windows,
        },
        OsImage {
            id: "batch:rendering-centos73:rendering:latest:batch.node.centos 7".to_string(),
            description: "Azure Batch CentOS 7.3 Rendering Image".to_string(),
            platform: Platform::Linux,
        },
    ]
}

/// Where a pool's nodes boot from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Managed(String),
    Marketplace {
        publisher: String,
        offer: String,
        sku: String,
        version: String,
    },
}

/// A resolved image: source plus the node agent that runs on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchImageSpec {
    pub node_agent_sku_id: String,
    pub source: ImageSource,
}

impl BatchImageSpec {
    pub fn virtual_machine_configuration(&self) -> VirtualMachineConfiguration {
        let image_reference = match &self.source {
            ImageSource::Managed(id) => ImageReference {
                virtual_machine_image_id: Some(id.clone()),
                ..Default::default()
            },
            ImageSource::Marketplace {
                publisher,
                offer,
                sku,
                version,
            } => ImageReference {
                publisher: Some(publisher.clone()),
                offer: Some(offer.clone()),
                sku: Some(sku.clone()),
                version: Some(version.clone()),
                virtual_machine_image_id: None,
            },
        };

        VirtualMachineConfiguration {
            image_reference,
            node_agent_sku_id: self.node_agent_sku_id.clone(),
        }
    }
}

/// Resolve an image id, or `None` if it is neither a configured managed
/// image with a known OS nor a complete marketplace tuple.
pub fn image_id_to_image_spec(config: &BatchPluginConfig, image_id: &str) -> Option<BatchImageSpec> {
    if image_id.starts_with("/subscriptions/") {
        let image = config.managed_image(image_id)?;
        let sku = node_agent_sku_for_os(image.os.as_deref()?)?;
        return Some(BatchImageSpec {
            node_agent_sku_id: sku.to_string(),
            source: ImageSource::Managed(image_id.to_string()),
        });
    }

    let tokens: Vec<&str> = image_id.split(':').collect();
    let [publisher, offer, sku, version, node_agent] = tokens.as_slice() else {
        return None;
    };
    Some(BatchImageSpec {
        node_agent_sku_id: node_agent.to_string(),
        source: ImageSource::Marketplace {
            publisher: publisher.to_string(),
            offer: offer.to_string(),
            sku: sku.to_string(),
            version: version.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sample_store;

    const MANAGED: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/images/win-render";

    #[test]
    fn display_names() {
        assert_eq!(image_display_name(MANAGED), "win-render");
        assert_eq!(
            image_display_name("batch:rendering-centos73:rendering:latest:batch.node.centos 7"),
            "rendering-centos73"
        );
        assert_eq!(image_display_name("MicrosoftWindowsServer:WindowsServer"), "WindowsServer");
    }

    #[test]
    fn marketplace_tuple_resolves() {
        let config = BatchPluginConfig::from_store(&sample_store()).unwrap();
        let spec = image_id_to_image_spec(
            &config,
            "batch:rendering-windows2016:rendering:latest:batch.node.windows amd64",
        )
        .unwrap();
        assert_eq!(spec.node_agent_sku_id, "batch.node.windows amd64");

        let vm = spec.virtual_machine_configuration();
        assert_eq!(vm.image_reference.publisher.as_deref(), Some("batch"));
        assert_eq!(vm.image_reference.version.as_deref(), Some("latest"));
        assert_eq!(vm.image_reference.virtual_machine_image_id, None);
    }

    #[test]
    fn four_part_tuple_is_unresolvable() {
        let config = BatchPluginConfig::from_store(&sample_store()).unwrap();
        assert_eq!(image_id_to_image_spec(&config, "batch:offer:sku:latest"), None);
    }

    #[test]
    fn managed_image_uses_configured_os() {
        let store = sample_store()
            .with("ManagedImageId1", MANAGED)
            .with("ManagedImageOs1", "Windows");
        let config = BatchPluginConfig::from_store(&store).unwrap();

        let spec = image_id_to_image_spec(&config, MANAGED).unwrap();
        assert_eq!(spec.node_agent_sku_id, "batch.node.windows amd64");
        let vm = spec.virtual_machine_configuration();
        assert_eq!(vm.image_reference.virtual_machine_image_id.as_deref(), Some(MANAGED));
        assert_eq!(vm.image_reference.publisher, None);

        let unknown = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/images/other";
        assert_eq!(image_id_to_image_spec(&config, unknown), None);
    }

    #[test]
    fn managed_image_with_unknown_os() {
        let store = sample_store()
            .with("ManagedImageId1", MANAGED)
            .with("ManagedImageOs1", "Solaris");
        let config = BatchPluginConfig::from_store(&store).unwrap();
        assert_eq!(image_id_to_image_spec(&config, MANAGED), None);
    }

    #[test]
    fn abr_images_cover_both_platforms() {
        let images = abr_images();
        assert_eq!(images[0].platform, Platform::Windows);
        assert_eq!(images[1].platform, Platform::Linux);
        assert_eq!(image_display_name(&images[1].id), "rendering-centos73");
    }
}
