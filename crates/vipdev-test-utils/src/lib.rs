//! Testing utilities for the vipdev workspace
//!
//! In-memory stand-ins for the external tools plus a fixture wiring them
//! into a [`Lifecycle`] over a temporary root.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use vipdev_core::acquisition::Cloner;
use vipdev_core::config::VipdevConfig;
use vipdev_core::inventory::{Allocation, InventoryClient, SiteRecord};
use vipdev_core::lifecycle::{Capabilities, Lifecycle};
use vipdev_core::orchestration::OrchestrationRunner;
use vipdev_core::selector::GitSource;
use vipdev_core::{AcquisitionError, InventoryError, OrchestrationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneCall {
    pub repo: String,
    pub branch: Option<String>,
    pub dest: PathBuf,
    /// Whether `dest` existed when the clone was requested
    pub dest_existed: bool,
}

/// Cloner that records calls and creates the destination directory
#[derive(Debug, Default)]
pub struct RecordingCloner {
    calls: Mutex<Vec<CloneCall>>,
    fail: bool,
}

impl RecordingCloner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cloner whose every clone fails
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<CloneCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Cloner for RecordingCloner {
    async fn clone_repo(&self, source: &GitSource, dest: &Path) -> Result<(), AcquisitionError> {
        self.calls.lock().push(CloneCall {
            repo: source.repo.clone(),
            branch: source.branch.clone(),
            dest: dest.to_path_buf(),
            dest_existed: dest.exists(),
        });
        if self.fail {
            return Err(AcquisitionError::Spawn {
                command: format!("git clone {}", source.repo),
                source: std::io::Error::other("clone refused by test double"),
            });
        }
        std::fs::create_dir_all(dest).map_err(|source| AcquisitionError::Spawn {
            command: "mkdir".to_string(),
            source,
        })
    }
}

/// Inventory answering from a fixed table
#[derive(Debug, Default)]
pub struct ScriptedInventory {
    sites: HashMap<String, (SiteRecord, Vec<Allocation>)>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_site(
        mut self,
        site_id: &str,
        record: SiteRecord,
        allocations: Vec<Allocation>,
    ) -> Self {
        self.sites
            .insert(site_id.to_string(), (record, allocations));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    fn lookup(&self, query: String, site_id: &str) -> Result<&(SiteRecord, Vec<Allocation>), InventoryError> {
        self.queries.lock().push(query.clone());
        self.sites
            .get(site_id)
            .ok_or_else(|| InventoryError::malformed(query, "unknown site"))
    }
}

#[async_trait]
impl InventoryClient for ScriptedInventory {
    async fn site(&self, site_id: &str) -> Result<SiteRecord, InventoryError> {
        let (record, _) = self.lookup(format!("/sites/{site_id}"), site_id)?;
        Ok(record.clone())
    }

    async fn allocations(&self, site_id: &str) -> Result<Vec<Allocation>, InventoryError> {
        let (_, allocations) = self.lookup(format!("/sites/{site_id}/allocations"), site_id)?;
        Ok(allocations.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerAction {
    Start,
    Rebuild,
}

/// Orchestration runner that only records what it was asked to do
#[derive(Debug, Default)]
pub struct RecordingRunner {
    actions: Mutex<Vec<(RunnerAction, PathBuf)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<(RunnerAction, PathBuf)> {
        self.actions.lock().clone()
    }
}

#[async_trait]
impl OrchestrationRunner for RecordingRunner {
    async fn start(&self, instance_dir: &Path) -> Result<(), OrchestrationError> {
        self.actions
            .lock()
            .push((RunnerAction::Start, instance_dir.to_path_buf()));
        Ok(())
    }

    async fn rebuild(&self, instance_dir: &Path) -> Result<(), OrchestrationError> {
        self.actions
            .lock()
            .push((RunnerAction::Rebuild, instance_dir.to_path_buf()));
        Ok(())
    }
}

/// Temporary instance root with recording tools
pub struct TestEnv {
    pub root: tempfile::TempDir,
    pub cloner: Arc<RecordingCloner>,
    pub inventory: Arc<ScriptedInventory>,
    pub runner: Arc<RecordingRunner>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_tools(RecordingCloner::new(), ScriptedInventory::new())
    }

    pub fn with_tools(cloner: RecordingCloner, inventory: ScriptedInventory) -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            cloner: Arc::new(cloner),
            inventory: Arc::new(inventory),
            runner: Arc::new(RecordingRunner::new()),
        }
    }

    pub fn config(&self) -> VipdevConfig {
        VipdevConfig::new().with_root(self.root.path())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle_with(&self.config())
    }

    pub fn lifecycle_with(&self, config: &VipdevConfig) -> Lifecycle {
        Lifecycle::new(
            config,
            Capabilities {
                cloner: self.cloner.clone(),
                inventory: self.inventory.clone(),
                runner: self.runner.clone(),
            },
        )
    }

    pub fn instance_dir(&self, slug: &str) -> PathBuf {
        self.root.path().join(format!("dev-{slug}"))
    }

    /// Raw JSON of a stored descriptor
    pub fn descriptor_json(&self, slug: &str) -> serde_json::Value {
        let bytes = std::fs::read(self.instance_dir(slug).join("instanceData.json")).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

pub fn site_record(name: &str, repo: &str, branch: &str, multisite: bool) -> SiteRecord {
    SiteRecord {
        name: name.to_string(),
        source_repo: Some(repo.to_string()),
        source_repo_branch: Some(branch.to_string()),
        is_multisite: multisite,
    }
}

pub fn web_allocation(wordpress: &str, php: &str) -> Allocation {
    Allocation {
        container_type_id: vipdev_core::inventory::WEB_CONTAINER_TYPE,
        software_stack_name: Some(format!("WordPress {wordpress}")),
        container_image_name: Some(format!("PHP {php}")),
    }
}
