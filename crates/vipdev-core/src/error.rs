//! Error types for vipdev
//!
//! Every failure a lifecycle command can hit converges on [`VipdevError`]:
//! - Instance storage (already exists, not found, corrupt descriptor)
//! - Remote inventory lookups
//! - Client code acquisition
//! - Environment rendering
//! - Orchestration tool invocation

use std::path::PathBuf;
use std::process::ExitStatus;

/// Main vipdev error type
#[derive(Debug, thiserror::Error)]
pub enum VipdevError {
    /// `create` on an instance whose directory is already present
    #[error("instance {slug} already exists at {}", path.display())]
    AlreadyExists { slug: String, path: PathBuf },

    /// `upgrade`/`load` on an instance with no descriptor
    #[error("instance {slug} not found (no descriptor at {})", path.display())]
    NotFound { slug: String, path: PathBuf },

    /// Descriptor bytes do not deserialize
    #[error("corrupt instance descriptor {}: {source}", path.display())]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Slug cannot be used as a directory name
    #[error("invalid instance name {0:?}: use letters, digits, '-' or '_'")]
    InvalidSlug(String),

    /// Remote inventory query failed
    #[error("site inventory unavailable: {0}")]
    Inventory(#[from] InventoryError),

    /// Client code checkout failed
    #[error("client code acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// Environment file could not be produced
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// Orchestration tool failed
    #[error("orchestration failed: {0}")]
    Orchestration(#[from] OrchestrationError),

    /// Settings could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Other storage failure
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl VipdevError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this error class
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Io { .. } => 1,
            Self::InvalidSlug(_) => 2,
            Self::AlreadyExists { .. } => 3,
            Self::NotFound { .. } => 4,
            Self::CorruptData { .. } => 5,
            Self::Inventory(_) => 6,
            Self::Acquisition(_) => 7,
            Self::Render(_) => 8,
            Self::Orchestration(_) => 9,
            Self::Config(_) => ConfigError::EXIT_CODE,
        }
    }
}

/// Result alias for vipdev operations
pub type Result<T, E = VipdevError> = std::result::Result<T, E>;

/// Errors from the site inventory service
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// The inventory client could not be launched
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The inventory client exited unsuccessfully
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// The response did not have the expected shape
    #[error("malformed response for {query}: {message}")]
    Malformed { query: String, message: String },
}

impl InventoryError {
    /// Create malformed-response error
    pub fn malformed(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            query: query.into(),
            message: message.into(),
        }
    }
}

/// Errors while materializing a client code checkout
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// A previous checkout exists and could not be removed
    #[error("could not clear previous checkout {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The version control client could not be launched
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The clone exited unsuccessfully
    #[error("clone of {repo} exited with {status}")]
    CloneFailed { repo: String, status: ExitStatus },
}

/// Errors while rendering the environment file
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Template file is missing or unreadable
    #[error("cannot read template {}: {source}", path.display())]
    TemplateMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Template text is not well formed
    #[error("template syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Template interpolates a field the descriptor does not carry
    #[error("template references missing field `{0}`")]
    MissingBinding(String),

    /// Descriptor could not be turned into a binding context
    #[error("descriptor is not renderable: {0}")]
    Context(#[source] serde_json::Error),

    /// Rendered file could not be written
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    /// Create syntax error at line
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Errors from the orchestration tool
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// The orchestration tool could not be launched
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The orchestration tool exited unsuccessfully
    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// Errors while loading settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for [`crate::config::VipdevConfig`]
    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Process exit status for settings failures
    pub const EXIT_CODE: u8 = 10;
}
