//! The application settings document (`settings.json`).

use serde::{Deserialize, Serialize};

use super::now_unix;

/// Schema version written by this build.
pub const SCHEMA_MAJOR: u32 = 1;
pub const SCHEMA_MINOR: u32 = 1;

pub fn current_schema_version() -> String {
    format!("{}.{}", SCHEMA_MAJOR, SCHEMA_MINOR)
}

/// A downloaded Ubuntu cloud image registered for VM creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudImage {
    pub name: String,
    /// Ubuntu release, e.g. "24.04".
    pub release: String,
    pub arch: String,
    pub url: String,
    pub path: std::path::PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    pub added_at: i64,
}

/// A saved VM definition. `last_used_at` drives LRU eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    pub name: String,
    /// Name of the CloudImage to boot from.
    pub image: String,
    pub cpus: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    #[serde(default)]
    pub packages: Vec<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
}

impl VmConfig {
    /// Recency used for eviction: last use, or creation if never used.
    pub fn recency(&self) -> i64 {
        self.last_used_at.unwrap_or(self.created_at)
    }
}

/// A named list of packages installed through cloud-init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePreset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub packages: Vec<String>,
    /// Shipped with ucvm; never evicted.
    #[serde(default)]
    pub builtin: bool,
    pub created_at: i64,
}

/// Flat user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Where fetched images are stored; None = `<data home>/ucvm/images`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images_dir: Option<std::path::PathBuf>,
    pub default_cpus: u32,
    pub default_memory_mb: u64,
    pub default_disk_gb: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ssh_key: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            images_dir: None,
            default_cpus: 2,
            default_memory_mb: 2048,
            default_disk_gb: 20,
            default_ssh_key: None,
        }
    }
}

/// Root settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub version: String,
    pub cloud_images: Vec<CloudImage>,
    pub vm_configs: Vec<VmConfig>,
    pub package_presets: Vec<PackagePreset>,
    pub app: AppSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: current_schema_version(),
            cloud_images: Vec::new(),
            vm_configs: Vec::new(),
            package_presets: builtin_presets(now_unix()),
            app: AppSettings::default(),
        }
    }
}

impl Settings {
    pub fn image(&self, name: &str) -> Option<&CloudImage> {
        self.cloud_images.iter().find(|i| i.name == name)
    }

    /// Insert or replace the image with the same name.
    pub fn upsert_image(&mut self, image: CloudImage) {
        match self.cloud_images.iter_mut().find(|i| i.name == image.name) {
            Some(slot) => *slot = image,
            None => self.cloud_images.push(image),
        }
    }

    /// Mark a VM config as used now (moves it to the front of the LRU order).
    pub fn touch_vm_config(&mut self, name: &str) -> bool {
        match self.vm_configs.iter_mut().find(|c| c.name == name) {
            Some(cfg) => {
                cfg.last_used_at = Some(now_unix());
                true
            }
            None => false,
        }
    }
}

/// Presets shipped with ucvm.
pub fn builtin_presets(created_at: i64) -> Vec<PackagePreset> {
    let preset = |name: &str, description: &str, packages: &[&str]| PackagePreset {
        name: name.to_string(),
        description: description.to_string(),
        packages: packages.iter().map(|p| p.to_string()).collect(),
        builtin: true,
        created_at,
    };
    vec![
        preset("minimal", "Guest agent only", &["qemu-guest-agent"]),
        preset(
            "docker",
            "Container host",
            &["qemu-guest-agent", "docker.io", "docker-compose-v2"],
        ),
        preset(
            "devtools",
            "Build toolchain and editors",
            &["qemu-guest-agent", "build-essential", "git", "curl", "vim"],
        ),
    ]
}

/// On-disk shape: every field optional so old or hand-edited files still load.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SettingsFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub cloud_images: Option<Vec<CloudImage>>,
    #[serde(default)]
    pub vm_configs: Option<Vec<VmConfig>>,
    #[serde(default)]
    pub package_presets: Option<Vec<PackagePreset>>,
    #[serde(default)]
    pub app: Option<AppSettings>,
}

/// Parse "major.minor" (a bare "major" means minor 0). None if unparseable.
pub(crate) fn parse_version(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.trim().splitn(2, '.');
    let major = parts.next()?.trim().parse().ok()?;
    let minor = match parts.next() {
        Some(m) => m.trim().parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Bring a loaded document up to the current shape.
///
/// Missing or null collections become empty. A file from a newer schema is
/// accepted with a warning and keeps its version string; an older or
/// unversioned file is stamped with the current version.
pub(crate) fn migrate(file: SettingsFile) -> Settings {
    let current = (SCHEMA_MAJOR, SCHEMA_MINOR);
    let version = match file.version.as_deref().and_then(parse_version) {
        Some(found) if found > current => {
            tracing::warn!(
                "settings schema {}.{} is newer than supported {}.{}; unknown fields are ignored",
                found.0,
                found.1,
                current.0,
                current.1
            );
            file.version.clone().unwrap_or_else(current_schema_version)
        }
        Some(found) => {
            if found < current {
                tracing::info!(
                    "migrating settings schema {}.{} -> {}.{}",
                    found.0,
                    found.1,
                    current.0,
                    current.1
                );
            }
            current_schema_version()
        }
        None => {
            if let Some(raw) = file.version.as_deref() {
                tracing::warn!("unrecognized settings schema version {:?}", raw);
            }
            current_schema_version()
        }
    };

    Settings {
        version,
        cloud_images: file.cloud_images.unwrap_or_default(),
        vm_configs: file.vm_configs.unwrap_or_default(),
        package_presets: file.package_presets.unwrap_or_default(),
        app: file.app.unwrap_or_default(),
    }
}
