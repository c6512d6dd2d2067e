//! Working-copy configuration
//!
//! Loaded once at startup and passed explicitly into the engine.

use crate::error::{IoResultExt, Result, WcError};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WcConfig {
    /// Name of the administrative subdirectory inside every versioned directory
    pub admin_dir_name: String,
    pub merge: MergeConfig,
    pub locks: LockConfig,
}

/// Text merge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// External diff3 helper; the built-in merge is used when unset
    pub diff3_cmd: Option<PathBuf>,
    /// Extra arguments passed to the helper before the labels
    pub diff3_args: Vec<String>,
    /// Emit the base section (`|||||||`) inside conflict markers
    pub show_base: bool,
    pub labels: MergeLabels,
}

/// Label overrides for conflict markers; `None` picks the default
/// `.mine` / `.r<old>` / `.r<new>` labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeLabels {
    pub mine: Option<String>,
    pub older: Option<String>,
    pub theirs: Option<String>,
}

/// Lock handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Let recovery break locks whose holder process is gone
    pub break_stale: bool,
}

impl Default for WcConfig {
    fn default() -> Self {
        Self {
            admin_dir_name: ".wc".to_string(),
            merge: MergeConfig::default(),
            locks: LockConfig::default(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            diff3_cmd: None,
            diff3_args: Vec::new(),
            show_base: false,
            labels: MergeLabels::default(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { break_stale: true }
    }
}

impl WcConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).at(path)?;
        let config: WcConfig = toml::from_str(&content)
            .map_err(|e| WcError::Serialization(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| WcError::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }
        std::fs::write(path, content).at(path)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let name = Path::new(&self.admin_dir_name);
        let mut components = name.components();
        let single_normal = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none();
        if !single_normal {
            return Err(WcError::Serialization(format!(
                "admin_dir_name must be a single path component, got '{}'",
                self.admin_dir_name
            )));
        }

        if let Some(cmd) = &self.merge.diff3_cmd {
            if cmd.as_os_str().is_empty() {
                return Err(WcError::Serialization(
                    "merge.diff3_cmd must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Default location of the user configuration file
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wcup").join("config.toml"))
}

/// Annotated example configuration
pub fn example_config() -> &'static str {
    r#"# wcup configuration

# Administrative subdirectory created inside every versioned directory
admin_dir_name = ".wc"

[merge]
# External three-way merge helper (GNU diff3 compatible).
# Exit 0 = merged, 1 = conflicts, anything else = failure.
# diff3_cmd = "/usr/bin/diff3"
diff3_args = []
show_base = false

[merge.labels]
# mine = ".mine"
# older = ".r<old>"
# theirs = ".r<new>"

[locks]
# Allow cleanup to break locks held by processes that no longer exist
break_stale = true
"#
}
