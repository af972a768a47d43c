//! Instance Descriptor Store
//!
//! One directory per instance (`<root>/dev-<slug>`), holding
//! `instanceData.json`. The file is the only durable state; nothing is
//! cached between invocations.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::descriptor::InstanceDescriptor;
use crate::error::{Result, VipdevError};

/// Prefix of every instance directory
pub const INSTANCE_DIR_PREFIX: &str = "dev-";

/// Descriptor file inside an instance directory
pub const DESCRIPTOR_FILE: &str = "instanceData.json";

/// Check that `slug` is usable as part of a directory name
///
/// # Errors
/// `VipdevError::InvalidSlug` for empty names or names with characters
/// other than ASCII alphanumerics, `-` and `_`
pub fn validate_slug(slug: &str) -> Result<()> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(VipdevError::InvalidSlug(slug.to_string()))
    }
}

/// A newly created, still empty instance directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    /// Instance name
    pub slug: String,
    /// Instance directory
    pub dir: PathBuf,
}

/// Filesystem-backed descriptor storage rooted at one directory
#[derive(Debug, Clone)]
pub struct InstanceStore {
    root: PathBuf,
}

impl InstanceStore {
    /// Create store rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of instance `slug`
    #[must_use]
    pub fn instance_dir(&self, slug: &str) -> PathBuf {
        self.root.join(format!("{INSTANCE_DIR_PREFIX}{slug}"))
    }

    /// Descriptor file of instance `slug`
    #[must_use]
    pub fn descriptor_path(&self, slug: &str) -> PathBuf {
        self.instance_dir(slug).join(DESCRIPTOR_FILE)
    }

    /// Create the directory for a new instance
    ///
    /// # Errors
    /// - `VipdevError::InvalidSlug` for unusable names
    /// - `VipdevError::AlreadyExists` if the directory is already there
    /// - `VipdevError::Io` if it cannot be created
    pub fn create(&self, slug: &str) -> Result<InstanceHandle> {
        validate_slug(slug)?;
        let dir = self.instance_dir(slug);
        if dir.exists() {
            return Err(VipdevError::AlreadyExists {
                slug: slug.to_string(),
                path: dir,
            });
        }

        std::fs::create_dir_all(&self.root).map_err(|e| VipdevError::io(&self.root, e))?;
        // create_dir (not _all) so a racing create still reports AlreadyExists
        std::fs::create_dir(&dir).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => VipdevError::AlreadyExists {
                slug: slug.to_string(),
                path: dir.clone(),
            },
            _ => VipdevError::io(&dir, e),
        })?;

        tracing::debug!("created instance directory {}", dir.display());
        Ok(InstanceHandle {
            slug: slug.to_string(),
            dir,
        })
    }

    /// Load the descriptor of instance `slug`
    ///
    /// # Errors
    /// - `VipdevError::NotFound` if there is no descriptor file
    /// - `VipdevError::CorruptData` if it does not deserialize
    /// - `VipdevError::Io` for other read failures
    pub fn load(&self, slug: &str) -> Result<InstanceDescriptor> {
        validate_slug(slug)?;
        let path = self.descriptor_path(slug);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VipdevError::NotFound {
                    slug: slug.to_string(),
                    path,
                });
            }
            Err(e) => return Err(VipdevError::io(path, e)),
        };

        serde_json::from_slice(&bytes).map_err(|source| VipdevError::CorruptData { path, source })
    }

    /// Overwrite the descriptor of instance `slug`
    ///
    /// Writes to a temporary file in the instance directory and renames it
    /// into place, so a crash leaves either the old or the new file.
    ///
    /// # Errors
    /// `VipdevError::Io` if the instance directory is missing or unwritable
    pub fn save(&self, slug: &str, descriptor: &InstanceDescriptor) -> Result<()> {
        validate_slug(slug)?;
        let dir = self.instance_dir(slug);
        let path = dir.join(DESCRIPTOR_FILE);
        let json = serde_json::to_vec(descriptor).map_err(|e| VipdevError::io(&path, e.into()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| VipdevError::io(&dir, e))?;
        tmp.write_all(&json).map_err(|e| VipdevError::io(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| VipdevError::io(&path, e.error))?;

        tracing::debug!("saved descriptor {}", path.display());
        Ok(())
    }
}
