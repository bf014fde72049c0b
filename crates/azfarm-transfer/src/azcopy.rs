//! AzCopy command lines.
//!
//! A transfer is described as an ordered list of [`AzCopyFlag`]s and
//! rendered for the target OS: the Windows AzCopy takes `/Flag:value`
//! arguments, the Linux one takes `--flag value` and short options.

use std::path::PathBuf;

use azfarm_core::Platform;
use tracing::debug;

/// Install location of AzCopy below a Program Files directory.
const WINDOWS_INSTALL_SUBPATH: [&str; 4] = ["Microsoft SDKs", "Azure", "AzCopy", "AzCopy.exe"];

const KEY_MASK: &str = "****";

/// One AzCopy option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AzCopyFlag {
    Source(String),
    Destination(String),
    SourceKey(String),
    DestKey(String),
    /// Journal folder used to resume interrupted transfers.
    Journal(PathBuf),
    Recursive,
    /// Set the destination's last-modified time to the source's.
    PreserveLastModified,
    /// Skip sources newer than the destination.
    ExcludeNewer,
    /// Skip sources older than the destination.
    ExcludeOlder,
    /// Answer yes to every prompt.
    SuppressPrompts,
}

impl AzCopyFlag {
    fn is_key(&self) -> bool {
        matches!(self, AzCopyFlag::SourceKey(_) | AzCopyFlag::DestKey(_))
    }

    /// Render for the given platform, with `key` standing in for the value
    /// of key flags.
    fn render(&self, platform: Platform, key: Option<&str>) -> Vec<String> {
        use AzCopyFlag::*;

        let value = |v: &String| key.map_or_else(|| v.clone(), str::to_string);
        match platform {
            Platform::Windows => vec![match self {
                Source(v) => format!("/Source:{v}"),
                Destination(v) => format!("/Dest:{v}"),
                SourceKey(v) => format!("/SourceKey:{}", value(v)),
                DestKey(v) => format!("/DestKey:{}", value(v)),
                Journal(p) => format!("/Z:{}", p.display()),
                Recursive => "/S".to_string(),
                PreserveLastModified => "/MT".to_string(),
                ExcludeNewer => "/XN".to_string(),
                ExcludeOlder => "/XO".to_string(),
                SuppressPrompts => "/Y".to_string(),
            }],
            Platform::Linux => match self {
                Source(v) => vec!["--source".to_string(), v.clone()],
                Destination(v) => vec!["--destination".to_string(), v.clone()],
                SourceKey(v) => vec!["--source-key".to_string(), value(v)],
                DestKey(v) => vec!["--dest-key".to_string(), value(v)],
                Journal(p) => vec!["-z".to_string(), p.display().to_string()],
                Recursive => vec!["-s".to_string()],
                PreserveLastModified => vec!["-mt".to_string()],
                ExcludeNewer => vec!["-xn".to_string()],
                ExcludeOlder => vec!["-xo".to_string()],
                SuppressPrompts => vec!["-y".to_string()],
            },
        }
    }
}

/// A complete AzCopy invocation for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzCopyCommand {
    platform: Platform,
    flags: Vec<AzCopyFlag>,
}

impl AzCopyCommand {
    pub fn new(platform: Platform, flags: Vec<AzCopyFlag>) -> Self {
        Self { platform, flags }
    }

    /// Upload a local folder to a blob URL, skipping blobs that are
    /// already newer.
    pub fn upload(
        platform: Platform,
        source_folder: &str,
        destination_url: &str,
        account_key: &str,
        journal: PathBuf,
    ) -> Self {
        use AzCopyFlag::*;

        let mut flags = vec![
            Source(source_folder.to_string()),
            Destination(destination_url.to_string()),
            DestKey(account_key.to_string()),
            Journal(journal),
            Recursive,
        ];
        if platform.is_windows() {
            flags.push(ExcludeOlder);
        }
        flags.push(SuppressPrompts);
        Self::new(platform, flags)
    }

    /// Download a container into a local folder, keeping local files that
    /// are newer.
    pub fn download(
        platform: Platform,
        source_url: &str,
        destination_folder: &str,
        account_key: &str,
        journal: PathBuf,
    ) -> Self {
        use AzCopyFlag::*;

        let head = vec![
            Source(source_url.to_string()),
            Destination(destination_folder.to_string()),
            SourceKey(account_key.to_string()),
            Journal(journal),
        ];
        let tail = match platform {
            Platform::Windows => [Recursive, PreserveLastModified, ExcludeNewer, SuppressPrompts],
            Platform::Linux => [PreserveLastModified, ExcludeNewer, Recursive, SuppressPrompts],
        };
        Self::new(platform, head.into_iter().chain(tail).collect())
    }

    /// Process arguments, one element per argv entry.
    pub fn args(&self) -> Vec<String> {
        self.flags
            .iter()
            .flat_map(|flag| flag.render(self.platform, None))
            .collect()
    }

    /// The argument list as a single line with account keys masked.
    pub fn masked(&self) -> String {
        self.flags
            .iter()
            .flat_map(|flag| {
                let mask = flag.is_key().then_some(KEY_MASK);
                flag.render(self.platform, mask)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The AzCopy executable to run.
///
/// On Windows the SDK install under `%ProgramFiles(x86)%` and then
/// `%ProgramFiles%` is preferred, falling back to `AzCopy` on `PATH`. On
/// Linux it is always `azcopy` on `PATH`.
pub fn locate_azcopy(platform: Platform, env: impl Fn(&str) -> Option<String>) -> PathBuf {
    match platform {
        Platform::Linux => PathBuf::from("azcopy"),
        Platform::Windows => {
            for var in ["ProgramFiles(x86)", "ProgramFiles"] {
                let Some(base) = env(var) else { continue };
                let candidate = WINDOWS_INSTALL_SUBPATH
                    .iter()
                    .fold(PathBuf::from(base), |path, part| path.join(part));
                debug!(path = %candidate.display(), "checking for AzCopy");
                if candidate.is_file() {
                    return candidate;
                }
            }
            PathBuf::from("AzCopy")
        }
    }
}
