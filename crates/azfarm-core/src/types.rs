//! Host-facing domain types.
//!
//! These mirror the render-farm host's cloud model: the instances it
//! schedules work onto, the hardware and OS images it can ask for, and the
//! job fields the asset listener filters on. All types serialize to JSON so
//! the CLI can print them.

use serde::{Deserialize, Serialize};

/// Identifier the host uses for a cloud instance (`{pool-id}:{node-id}`).
pub type InstanceId = String;

// ── Platform ───────────────────────────────────────────────────────

/// Operating system family of an image or of the machine running a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Linux,
}

impl Platform {
    /// Platform of the running process, or `None` on an OS the plugins
    /// have no command syntax for.
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else {
            None
        }
    }

    pub fn is_windows(self) -> bool {
        self == Platform::Windows
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Linux => write!(f, "linux"),
        }
    }
}

// ── Instances ──────────────────────────────────────────────────────

/// Lifecycle status of a cloud instance as the host understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Running,
    Rebooting,
    Stopping,
    Stopped,
    Unknown,
}

/// A machine the host can schedule work onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudInstance {
    pub id: InstanceId,
    pub name: String,
    pub hostname: String,
    /// Provider-specific hardware identifier (VM size).
    pub hardware_id: String,
    /// Provider-specific image identifier, if the provider knows it.
    pub image_id: Option<String>,
    /// Name of the provider plugin that owns the instance.
    pub provider: String,
    /// Host region the instance's worker joins.
    pub region_name: Option<String>,
    /// Provider region / zone the instance runs in.
    pub zone: Option<String>,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub status: InstanceStatus,
}

// ── Catalog ────────────────────────────────────────────────────────

/// A hardware type the host may request instances of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareType {
    pub id: String,
    pub name: String,
    pub ram_mb: u32,
    pub vcpus: u32,
}

/// An OS image the host may request instances of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsImage {
    pub id: String,
    pub description: String,
    pub platform: Platform,
}

// ── Jobs ───────────────────────────────────────────────────────────

/// The parts of a host job that plugins look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub group: String,
    pub pool: String,
    pub secondary_pool: String,
}

impl std::fmt::Display for JobInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} ({})", self.name, self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_serializes_snake_case() {
        let json = serde_json::to_string(&Platform::Windows).unwrap();
        assert_eq!(json, "\"windows\"");
    }

    #[test]
    fn job_display_prefers_name() {
        let mut job = JobInfo {
            id: "5f1c".to_string(),
            ..Default::default()
        };
        assert_eq!(job.to_string(), "5f1c");

        job.name = "shot_010".to_string();
        assert_eq!(job.to_string(), "shot_010 (5f1c)");
    }

    #[test]
    fn instance_roundtrips_through_json() {
        let instance = CloudInstance {
            id: "pool:node".to_string(),
            name: "node".to_string(),
            hostname: "node".to_string(),
            hardware_id: "Standard_F8".to_string(),
            image_id: None,
            provider: "AzureBatch".to_string(),
            region_name: Some("westus".to_string()),
            zone: None,
            public_ip: Some("10.0.0.4".to_string()),
            private_ip: Some("10.0.0.4".to_string()),
            status: InstanceStatus::Running,
        };
        let json = serde_json::to_string(&instance).unwrap();
        let back: CloudInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, instance);
    }
}
