//! Lifecycle commands
//!
//! `create` and `upgrade` are linear pipelines over the components:
//!
//! ```text
//! create:  Init → Scaffolded → Overridden → Resolved → Acquired → Persisted → Rendered → Started | Ready
//! upgrade: Init → Loaded → Resolved → Acquired → Persisted → Rendered → Rebuilt
//! ```
//!
//! The descriptor is written once, at `Persisted`, after resolution and
//! acquisition have both succeeded.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::acquisition::{self, Cloner, GitCloner};
use crate::config::VipdevConfig;
use crate::descriptor::InstanceDescriptor;
use crate::error::Result;
use crate::inventory::{self, InventoryClient, SiteOverrides, VipgoCli};
use crate::orchestration::{LandoRunner, OrchestrationRunner};
use crate::render::{self, TemplateSource};
use crate::resolver::{Resolver, SelectorArgs};
use crate::store::InstanceStore;

/// Pipeline stage, logged on entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Instance directory claimed or descriptor located
    Init,
    /// Fresh descriptor built
    Scaffolded,
    /// Inventory overrides applied
    Overridden,
    /// Existing descriptor read
    Loaded,
    /// All selectors concrete
    Resolved,
    /// Client code checked out if needed
    Acquired,
    /// Descriptor written
    Persisted,
    /// Environment file written
    Rendered,
    /// Environment started
    Started,
    /// Created without starting
    Ready,
    /// Environment rebuilt
    Rebuilt,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// External tools the pipelines drive
#[derive(Clone)]
pub struct Capabilities {
    /// Version control clone
    pub cloner: Arc<dyn Cloner>,
    /// Site inventory
    pub inventory: Arc<dyn InventoryClient>,
    /// Orchestration tool
    pub runner: Arc<dyn OrchestrationRunner>,
}

impl Capabilities {
    /// Subprocess-backed tools named in `config.tools`
    #[must_use]
    pub fn from_config(config: &VipdevConfig) -> Self {
        Self {
            cloner: Arc::new(GitCloner::new(&config.tools.git)),
            inventory: Arc::new(VipgoCli::new(&config.tools.vipgo)),
            runner: Arc::new(LandoRunner::new(&config.tools.lando)),
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

/// Arguments of `create`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    /// Instance name
    pub slug: String,
    /// Site title
    pub title: Option<String>,
    /// Force a multisite install
    pub multisite: bool,
    /// VIP Go site to copy settings from
    pub site: Option<String>,
    /// Explicit selectors; these win over inventory values
    pub selectors: SelectorArgs,
    /// Start the environment once created
    pub start: bool,
}

/// Arguments of `upgrade`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Instance name
    pub slug: String,
    /// Selectors to change; `None` keeps the current value
    pub selectors: SelectorArgs,
}

/// Result of a successful command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Descriptor as persisted
    pub descriptor: InstanceDescriptor,
    /// Instance directory
    pub instance_dir: PathBuf,
    /// Rendered environment file
    pub environment_file: PathBuf,
    /// Final stage reached
    pub stage: Stage,
}

/// Runs `create` and `upgrade` against one instance root
#[derive(Debug, Clone)]
pub struct Lifecycle {
    store: InstanceStore,
    resolver: Resolver,
    template: TemplateSource,
    default_title: String,
    capabilities: Capabilities,
}

impl Lifecycle {
    /// Create lifecycle from settings and tools
    #[must_use]
    pub fn new(config: &VipdevConfig, capabilities: Capabilities) -> Self {
        Self {
            store: InstanceStore::new(&config.root),
            resolver: Resolver::new(config.defaults.clone()),
            template: TemplateSource::from_config(config.template.as_deref()),
            default_title: config.defaults.title.clone(),
            capabilities,
        }
    }

    /// Descriptor store in use
    #[inline]
    #[must_use]
    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    /// Create a new instance
    ///
    /// # Errors
    /// - `AlreadyExists` before anything is written
    /// - `Inventory` before resolution
    /// - `Acquisition` before the descriptor is saved
    /// - `Render` after the descriptor is saved
    /// - `Orchestration` if the environment fails to start
    pub async fn create(&self, request: CreateRequest) -> Result<Outcome> {
        let slug = request.slug.as_str();
        enter(slug, Stage::Init);
        let handle = self.store.create(slug)?;

        enter(slug, Stage::Scaffolded);
        let title = request
            .title
            .clone()
            .unwrap_or_else(|| self.default_title.clone());
        let mut descriptor = InstanceDescriptor::new(slug, title, request.multisite);

        enter(slug, Stage::Overridden);
        let mut selectors = request.selectors.clone();
        if let Some(site_id) = request.site.as_deref() {
            let overrides =
                inventory::fetch_site_overrides(self.capabilities.inventory.as_ref(), site_id)
                    .await?;
            selectors = apply_overrides(&mut descriptor, &request, selectors, overrides);
        }

        let (descriptor, environment_file) = self
            .resolve_and_write(slug, descriptor, &selectors)
            .await?;

        let stage = if request.start {
            self.capabilities.runner.start(&handle.dir).await?;
            Stage::Started
        } else {
            Stage::Ready
        };
        enter(slug, stage);

        Ok(Outcome {
            descriptor,
            instance_dir: handle.dir,
            environment_file,
            stage,
        })
    }

    /// Change components of an existing instance and rebuild it
    ///
    /// # Errors
    /// - `NotFound` / `CorruptData` before anything is written
    /// - `Acquisition` before the descriptor is saved
    /// - `Render` after the descriptor is saved
    /// - `Orchestration` if the rebuild fails
    pub async fn upgrade(&self, request: UpgradeRequest) -> Result<Outcome> {
        let slug = request.slug.as_str();
        enter(slug, Stage::Init);
        let mut descriptor = self.store.load(slug)?;
        if descriptor.site_slug != slug {
            tracing::warn!(
                "descriptor in {} names instance {}; renaming it to {slug}",
                self.store.descriptor_path(slug).display(),
                descriptor.site_slug
            );
            descriptor.site_slug = slug.to_string();
        }
        enter(slug, Stage::Loaded);

        let instance_dir = self.store.instance_dir(slug);
        let (descriptor, environment_file) = self
            .resolve_and_write(slug, descriptor, &request.selectors)
            .await?;

        self.capabilities.runner.rebuild(&instance_dir).await?;
        enter(slug, Stage::Rebuilt);

        Ok(Outcome {
            descriptor,
            instance_dir,
            environment_file,
            stage: Stage::Rebuilt,
        })
    }

    /// Shared tail: Resolved → Acquired → Persisted → Rendered
    ///
    /// Every step targets the directory of `slug`, never the slug recorded
    /// inside the descriptor.
    async fn resolve_and_write(
        &self,
        slug: &str,
        mut descriptor: InstanceDescriptor,
        selectors: &SelectorArgs,
    ) -> Result<(InstanceDescriptor, PathBuf)> {
        let instance_dir = self.store.instance_dir(slug);

        self.resolver.apply(&mut descriptor, selectors);
        enter(slug, Stage::Resolved);

        acquisition::acquire(self.capabilities.cloner.as_ref(), &mut descriptor, &instance_dir)
            .await?;
        enter(slug, Stage::Acquired);

        self.store.save(slug, &descriptor)?;
        if let Ok(json) = serde_json::to_string_pretty(&descriptor) {
            tracing::info!("instance {slug} descriptor:\n{json}");
        }
        enter(slug, Stage::Persisted);

        let environment_file =
            render::write_environment(&descriptor, &self.template, &instance_dir)?;
        enter(slug, Stage::Rendered);

        Ok((descriptor, environment_file))
    }
}

/// Merge inventory values below the explicit request values
fn apply_overrides(
    descriptor: &mut InstanceDescriptor,
    request: &CreateRequest,
    selectors: SelectorArgs,
    overrides: SiteOverrides,
) -> SelectorArgs {
    if request.title.is_none() {
        if let Some(title) = overrides.title {
            descriptor.wp_title = title;
        }
    }
    if !request.multisite {
        descriptor.multisite = overrides.multisite.unwrap_or(false);
    }
    selectors.or(overrides.selectors)
}

fn enter(slug: &str, stage: Stage) {
    tracing::info!(instance = slug, %stage, "stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::MockCloner;
    use crate::inventory::{Allocation, MockInventoryClient, SiteRecord};
    use crate::orchestration::MockOrchestrationRunner;
    use crate::selector::{ClientCodeSelector, JetpackSelector, WordPressSelector};
    use crate::VipdevError;

    struct Mocks {
        cloner: MockCloner,
        inventory: MockInventoryClient,
        runner: MockOrchestrationRunner,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                cloner: MockCloner::new(),
                inventory: MockInventoryClient::new(),
                runner: MockOrchestrationRunner::new(),
            }
        }

        fn lifecycle(self, root: &std::path::Path) -> Lifecycle {
            Lifecycle::new(
                &VipdevConfig::new().with_root(root),
                Capabilities {
                    cloner: Arc::new(self.cloner),
                    inventory: Arc::new(self.inventory),
                    runner: Arc::new(self.runner),
                },
            )
        }
    }

    fn request(slug: &str) -> CreateRequest {
        CreateRequest {
            slug: slug.into(),
            start: true,
            ..CreateRequest::default()
        }
    }

    #[tokio::test]
    async fn create_starts_environment_once() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks.runner.expect_start().times(1).returning(|_| Ok(()));
        mocks.runner.expect_rebuild().never();
        mocks.inventory.expect_site().never();
        let lifecycle = mocks.lifecycle(root.path());

        let outcome = lifecycle.create(request("app1")).await.unwrap();
        assert_eq!(outcome.stage, Stage::Started);
        assert!(outcome.environment_file.is_file());
        assert_eq!(lifecycle.store().load("app1").unwrap(), outcome.descriptor);
    }

    #[tokio::test]
    async fn no_start_skips_runner() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks.runner.expect_start().never();
        let lifecycle = mocks.lifecycle(root.path());

        let outcome = lifecycle
            .create(CreateRequest {
                start: false,
                ..request("app1")
            })
            .await
            .unwrap();
        assert_eq!(outcome.stage, Stage::Ready);
    }

    #[tokio::test]
    async fn cli_selectors_win_over_inventory() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks.inventory.expect_site().returning(|_| {
            Ok(SiteRecord {
                name: "Shop".into(),
                source_repo: Some("wpcomvip/shop".into()),
                source_repo_branch: Some("master".into()),
                is_multisite: true,
            })
        });
        mocks.inventory.expect_allocations().returning(|_| {
            Ok(vec![Allocation {
                container_type_id: 1,
                software_stack_name: Some("WordPress 5.5".into()),
                container_image_name: Some("PHP 7.4".into()),
            }])
        });
        mocks.cloner.expect_clone_repo().never();
        let lifecycle = mocks.lifecycle(root.path());

        let outcome = lifecycle
            .create(CreateRequest {
                site: Some("42".into()),
                start: false,
                selectors: SelectorArgs {
                    wordpress: Some("6.0".into()),
                    clientcode: Some("/work/shop".into()),
                    ..SelectorArgs::default()
                },
                ..request("shop")
            })
            .await
            .unwrap();

        let d = outcome.descriptor;
        assert_eq!(d.wp_title, "Shop (42)");
        assert!(d.multisite);
        assert_eq!(d.php_version.as_deref(), Some("7.4"));
        assert!(matches!(d.wordpress, Some(WordPressSelector::Image { ref tag, .. }) if tag == "6.0"));
        assert_eq!(d.clientcode, Some(ClientCodeSelector::Local { dir: "/work/shop".into() }));
        assert_eq!(d.jetpack, Some(JetpackSelector::Inherit));
    }

    #[tokio::test]
    async fn inventory_failure_writes_no_descriptor() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks.inventory.expect_site().returning(|q| {
            Err(crate::InventoryError::malformed(q, "empty"))
        });
        let lifecycle = mocks.lifecycle(root.path());

        let err = lifecycle
            .create(CreateRequest {
                site: Some("1".into()),
                ..request("app1")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VipdevError::Inventory(_)));
        assert!(!lifecycle.store().descriptor_path("app1").exists());
    }

    #[tokio::test]
    async fn upgrade_missing_instance() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks.runner.expect_rebuild().never();
        let lifecycle = mocks.lifecycle(root.path());

        let err = lifecycle
            .upgrade(UpgradeRequest {
                slug: "missing-instance".into(),
                ..UpgradeRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VipdevError::NotFound { .. }));
        assert!(!lifecycle.store().instance_dir("missing-instance").exists());
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_new_descriptor() {
        let root = tempfile::tempdir().unwrap();
        let mut mocks = Mocks::new();
        mocks.runner.expect_start().returning(|_| Ok(()));
        mocks.runner.expect_rebuild().returning(|_| {
            Err(crate::OrchestrationError::Spawn {
                command: "lando rebuild -y".into(),
                source: std::io::Error::other("gone"),
            })
        });
        let lifecycle = mocks.lifecycle(root.path());
        lifecycle.create(request("app1")).await.unwrap();

        let err = lifecycle
            .upgrade(UpgradeRequest {
                slug: "app1".into(),
                selectors: SelectorArgs {
                    php: Some("8.1".into()),
                    ..SelectorArgs::default()
                },
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VipdevError::Orchestration(_)));
        let saved = lifecycle.store().load("app1").unwrap();
        assert_eq!(saved.php_version.as_deref(), Some("8.1"));
    }
}
