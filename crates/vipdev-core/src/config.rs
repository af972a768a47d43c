//! Settings for vipdev
//!
//! Loaded from TOML (`vipdev.toml` or an explicit path). Every field has a
//! built-in default, so an absent file is equivalent to an empty one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "vipdev.toml";

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VipdevConfig {
    /// Directory holding the `dev-<slug>` instance directories
    pub root: PathBuf,
    /// Environment template; the built-in one is used when unset
    pub template: Option<PathBuf>,
    /// Component defaults handed to the resolver
    pub defaults: ComponentDefaults,
    /// External executables
    pub tools: ToolPaths,
}

impl VipdevConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With instance root directory
    #[inline]
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// With environment template path
    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// With component defaults
    #[inline]
    #[must_use]
    pub fn with_defaults(mut self, defaults: ComponentDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` if the text is not valid settings TOML
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load settings
    ///
    /// An explicit path must exist. Without one, `vipdev.toml` in the
    /// working directory is used when present, otherwise the defaults.
    ///
    /// # Errors
    /// `ConfigError::Read` / `ConfigError::Parse`
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !candidate.is_file() {
                    tracing::debug!("no {DEFAULT_CONFIG_FILE}, using built-in settings");
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        tracing::debug!("loaded settings from {}", path.display());
        Self::from_toml(&text, &path)
    }
}

impl Default for VipdevConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            template: None,
            defaults: ComponentDefaults::default(),
            tools: ToolPaths::default(),
        }
    }
}

/// A container image at a given tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDefault {
    /// Image name
    pub image: String,
    /// Default tag
    pub tag: String,
}

impl ImageDefault {
    /// Create image default
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
        }
    }
}

/// Image table, one entry per component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageTable {
    /// WordPress core
    pub wordpress: ImageDefault,
    /// VIP mu-plugins bundle
    pub muplugins: ImageDefault,
    /// Jetpack image name. Jetpack defaults to `inherit`, so there is no tag.
    pub jetpack: String,
    /// Skeleton client code
    pub skeleton: ImageDefault,
}

impl Default for ImageTable {
    fn default() -> Self {
        Self {
            wordpress: ImageDefault::new("wpvipdev/wordpress", "5.6"),
            muplugins: ImageDefault::new("wpvipdev/mu-plugins", "auto"),
            jetpack: "wpvipdev/jetpack".to_string(),
            skeleton: ImageDefault::new(
                "wpvipdev/skeleton",
                "181a17d9aedf7da73730d65ccef3d8dbf172a5c5",
            ),
        }
    }
}

/// Immutable defaults consulted by the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComponentDefaults {
    /// Site title for new instances
    pub title: String,
    /// PHP version for new instances
    pub php: String,
    /// Per-component images
    pub images: ImageTable,
    /// Substrings marking a client code selector as a remote repository
    pub git_host_markers: Vec<String>,
}

impl ComponentDefaults {
    /// True when `selector` names a remote repository
    #[must_use]
    pub fn is_remote_repo(&self, selector: &str) -> bool {
        self.git_host_markers
            .iter()
            .any(|marker| !marker.is_empty() && selector.contains(marker.as_str()))
    }
}

impl Default for ComponentDefaults {
    fn default() -> Self {
        Self {
            title: "VIP Dev".to_string(),
            php: "7.3".to_string(),
            images: ImageTable::default(),
            git_host_markers: vec!["github".to_string(), "git@".to_string()],
        }
    }
}

/// External executables invoked by vipdev
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    /// Version control client
    pub git: String,
    /// Orchestration tool
    pub lando: String,
    /// Site inventory client
    pub vipgo: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            lando: "lando".to_string(),
            vipgo: "vipgo".to_string(),
        }
    }
}
