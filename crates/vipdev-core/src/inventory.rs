//! Remote Inventory Adapter
//!
//! Looks up a VIP Go site and turns its record into selector overrides.
//! The lookup itself is behind [`InventoryClient`]; [`VipgoCli`] shells out
//! to `vipgo api GET ...`.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::InventoryError;
use crate::resolver::SelectorArgs;

/// Container type of the primary web container
pub const WEB_CONTAINER_TYPE: i64 = 1;

/// Clone URL prefix for site source repositories
pub const SOURCE_REPO_PREFIX: &str = "git@github.com:";

/// Site record returned by `GET /sites/<id>`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteRecord {
    /// Site name
    pub name: String,
    /// `org/repo` of the client code
    #[serde(default)]
    pub source_repo: Option<String>,
    /// Deployed branch
    #[serde(default)]
    pub source_repo_branch: Option<String>,
    /// Multisite install
    #[serde(default)]
    pub is_multisite: bool,
}

/// One entry of `GET /sites/<id>/allocations`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Allocation {
    /// Container type identifier
    pub container_type_id: i64,
    /// e.g. `WordPress 5.5.3`
    #[serde(default)]
    pub software_stack_name: Option<String>,
    /// e.g. `PHP 7.4`
    #[serde(default)]
    pub container_image_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Vec<T>,
}

/// Read-only access to the site inventory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Fetch the site record for `site_id`
    async fn site(&self, site_id: &str) -> Result<SiteRecord, InventoryError>;

    /// Fetch resource allocations for `site_id`
    async fn allocations(&self, site_id: &str) -> Result<Vec<Allocation>, InventoryError>;
}

/// Values derived from a site record
///
/// Selector fields are explicit-tier strings; fields the site does not
/// determine are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteOverrides {
    /// `<name> (<id>)`
    pub title: Option<String>,
    /// Site multisite flag
    pub multisite: Option<bool>,
    /// Selector strings
    pub selectors: SelectorArgs,
}

/// Query the inventory for `site_id` and map the result
///
/// # Errors
/// Any `InventoryError` from either query
pub async fn fetch_site_overrides(
    client: &dyn InventoryClient,
    site_id: &str,
) -> Result<SiteOverrides, InventoryError> {
    tracing::info!("fetching site {site_id} from inventory");
    let site = client.site(site_id).await?;
    let allocations = client.allocations(site_id).await?;
    Ok(map_site(site_id, &site, &allocations))
}

/// Map a site record and its allocations to overrides
#[must_use]
pub fn map_site(site_id: &str, site: &SiteRecord, allocations: &[Allocation]) -> SiteOverrides {
    let clientcode = site
        .source_repo
        .as_deref()
        .filter(|repo| !repo.is_empty())
        .map(|repo| match site.source_repo_branch.as_deref() {
            Some(branch) if !branch.is_empty() => format!("{SOURCE_REPO_PREFIX}{repo}#{branch}"),
            _ => format!("{SOURCE_REPO_PREFIX}{repo}"),
        });

    let web = allocations
        .iter()
        .find(|a| a.container_type_id == WEB_CONTAINER_TYPE);
    if web.is_none() {
        tracing::warn!("site {site_id} has no web container allocation; keeping default versions");
    }

    SiteOverrides {
        title: Some(format!("{} ({site_id})", site.name)),
        multisite: Some(site.is_multisite),
        selectors: SelectorArgs {
            php: web.and_then(|a| last_word(a.container_image_name.as_deref())),
            wordpress: web.and_then(|a| last_word(a.software_stack_name.as_deref())),
            muplugins: None,
            jetpack: None,
            clientcode,
        },
    }
}

fn last_word(value: Option<&str>) -> Option<String> {
    value?.split_whitespace().last().map(str::to_string)
}

/// Inventory client backed by the `vipgo` CLI
#[derive(Debug, Clone)]
pub struct VipgoCli {
    program: String,
}

impl VipgoCli {
    /// Create client invoking `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, InventoryError> {
        let command = format!("{} api GET {path}", self.program);
        tracing::debug!("running `{command}`");

        let output = Command::new(&self.program)
            .args(["api", "GET", path])
            .output()
            .await
            .map_err(|source| InventoryError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(InventoryError::Failed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let envelope: Envelope<T> = serde_json::from_slice(&output.stdout)
            .map_err(|e| InventoryError::malformed(path, e.to_string()))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl InventoryClient for VipgoCli {
    async fn site(&self, site_id: &str) -> Result<SiteRecord, InventoryError> {
        let query = format!("/sites/{site_id}");
        self.get::<SiteRecord>(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| InventoryError::malformed(query, "no site record in response"))
    }

    async fn allocations(&self, site_id: &str) -> Result<Vec<Allocation>, InventoryError> {
        self.get(&format!("/sites/{site_id}/allocations")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn site() -> SiteRecord {
        SiteRecord {
            name: "Example".into(),
            source_repo: Some("wpcomvip/example".into()),
            source_repo_branch: Some("develop".into()),
            is_multisite: true,
        }
    }

    fn web(stack: &str, image: &str) -> Allocation {
        Allocation {
            container_type_id: WEB_CONTAINER_TYPE,
            software_stack_name: Some(stack.into()),
            container_image_name: Some(image.into()),
        }
    }

    #[test]
    fn maps_site_and_web_allocation() {
        let allocations = vec![
            Allocation {
                container_type_id: 4,
                software_stack_name: Some("Cron 1".into()),
                container_image_name: Some("cron 9".into()),
            },
            web("WordPress 5.5.3", "PHP 7.4"),
        ];
        let overrides = map_site("123", &site(), &allocations);
        assert_eq!(
            overrides,
            SiteOverrides {
                title: Some("Example (123)".into()),
                multisite: Some(true),
                selectors: SelectorArgs {
                    php: Some("7.4".into()),
                    wordpress: Some("5.5.3".into()),
                    muplugins: None,
                    jetpack: None,
                    clientcode: Some("git@github.com:wpcomvip/example#develop".into()),
                },
            }
        );
    }

    #[test]
    fn missing_web_allocation_omits_versions() {
        let overrides = map_site("123", &site(), &[]);
        assert_eq!(overrides.selectors.php, None);
        assert_eq!(overrides.selectors.wordpress, None);
        assert!(overrides.selectors.clientcode.is_some());
    }

    #[test]
    fn empty_branch_has_no_suffix() {
        let mut record = site();
        record.source_repo_branch = Some(String::new());
        let overrides = map_site("9", &record, &[]);
        assert_eq!(
            overrides.selectors.clientcode.as_deref(),
            Some("git@github.com:wpcomvip/example")
        );
    }

    #[test]
    fn record_deserializes_with_extra_fields() {
        let raw = r#"{"data":[{"name":"S","source_repo":"o/r","source_repo_branch":"master","is_multisite":false,"id":5}]}"#;
        let envelope: Envelope<SiteRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.data[0].source_repo.as_deref(), Some("o/r"));
    }

    #[tokio::test]
    async fn allocation_failure_is_propagated() {
        let mut client = MockInventoryClient::new();
        client.expect_site().returning(|_| Ok(site()));
        client
            .expect_allocations()
            .returning(|q| Err(InventoryError::malformed(q, "truncated")));

        let err = fetch_site_overrides(&client, "77").await.unwrap_err();
        assert!(matches!(err, InventoryError::Malformed { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let client = VipgoCli::new("vipgo-definitely-not-installed");
        let err = client.site("1").await.unwrap_err();
        assert!(matches!(err, InventoryError::Spawn { .. }));
    }
}
