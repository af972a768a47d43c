//! Source Acquisition
//!
//! Clones remote client code into `<instance>/clientcode` and records the
//! checkout on the descriptor. Runs only for `git` selectors that have not
//! been fetched yet, and always before the descriptor is saved.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::descriptor::InstanceDescriptor;
use crate::error::AcquisitionError;
use crate::selector::{GitSource, CLIENT_CODE_DIR};

/// Checkout directory name inside the instance directory
pub const CHECKOUT_DIR_NAME: &str = "clientcode";

/// What [`remove_if_exists`] found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Something was there and has been deleted
    Removed,
    /// Nothing was there
    AlreadyAbsent,
}

/// Delete `path` recursively, treating a missing path as success
///
/// # Errors
/// `AcquisitionError::Cleanup` for any failure other than absence
pub fn remove_if_exists(path: &Path) -> Result<Removal, AcquisitionError> {
    let cleanup = |source| AcquisitionError::Cleanup {
        path: path.to_path_buf(),
        source,
    };

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Removal::AlreadyAbsent),
        Err(e) => return Err(cleanup(e)),
    };

    let removed = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(Removal::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Removal::AlreadyAbsent),
        Err(e) => Err(cleanup(e)),
    }
}

/// Version control clone capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Cloner: Send + Sync {
    /// Clone `source.repo` with submodules into `dest`, checking out
    /// `source.branch` if given
    async fn clone_repo(&self, source: &GitSource, dest: &Path) -> Result<(), AcquisitionError>;
}

/// Cloner backed by the `git` CLI
#[derive(Debug, Clone)]
pub struct GitCloner {
    program: String,
}

impl GitCloner {
    /// Create cloner invoking `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Cloner for GitCloner {
    async fn clone_repo(&self, source: &GitSource, dest: &Path) -> Result<(), AcquisitionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["clone", "--recurse-submodules"]);
        if let Some(branch) = &source.branch {
            cmd.arg("--branch").arg(branch);
        }
        cmd.arg("--").arg(&source.repo).arg(dest);
        let command = format!("{cmd:?}");

        let status = cmd
            .status()
            .await
            .map_err(|err| AcquisitionError::Spawn {
                command,
                source: err,
            })?;
        if !status.success() {
            return Err(AcquisitionError::CloneFailed {
                repo: source.repo.clone(),
                status,
            });
        }
        Ok(())
    }
}

/// Fetch client code for `descriptor` if it is an unfetched `git` selector
///
/// Returns whether a clone ran. On success the selector is marked fetched
/// with `dir` set; on failure the descriptor is left untouched.
///
/// # Errors
/// `AcquisitionError` if the old checkout cannot be removed or the clone fails
pub async fn acquire(
    cloner: &dyn Cloner,
    descriptor: &mut InstanceDescriptor,
    instance_dir: &Path,
) -> Result<bool, AcquisitionError> {
    let Some(source) = descriptor.clientcode.as_mut().and_then(|c| c.pending_fetch()) else {
        return Ok(false);
    };

    let checkout = instance_dir.join(CHECKOUT_DIR_NAME);
    match remove_if_exists(&checkout)? {
        Removal::Removed => tracing::info!("removed previous checkout {}", checkout.display()),
        Removal::AlreadyAbsent => tracing::debug!("no previous checkout at {}", checkout.display()),
    }

    tracing::info!("cloning client code repo {}", source.repo);
    cloner.clone_repo(source, &checkout).await?;

    source.mark_fetched(CLIENT_CODE_DIR);
    tracing::info!("client code fetched into {}", checkout.display());
    Ok(true)
}
