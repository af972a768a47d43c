//! Component selectors
//!
//! Each swappable component of an instance has its own closed set of modes.
//! The JSON form is internally tagged on `mode`, e.g.
//! `{"mode":"image","image":"wpvipdev/wordpress","tag":"5.6"}`.
//!
//! An unresolved selector is `None` in memory and `{}` on disk.

use serde::{Deserialize, Deserializer, Serialize};

/// Checkout directory recorded for fetched client code, relative to the
/// instance directory
pub const CLIENT_CODE_DIR: &str = "./clientcode";

/// WordPress core selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase", deny_unknown_fields)]
pub enum WordPressSelector {
    /// Prebuilt image at a tag
    Image { image: String, tag: String },
    /// Local directory used verbatim
    Local { dir: String },
}

/// VIP mu-plugins selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase", deny_unknown_fields)]
pub enum MuPluginsSelector {
    /// Prebuilt image at a tag
    Image { image: String, tag: String },
    /// Local directory used verbatim
    Local { dir: String },
}

/// Jetpack selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase", deny_unknown_fields)]
pub enum JetpackSelector {
    /// Prebuilt image at a tag
    Image { image: String, tag: String },
    /// Local directory used verbatim
    Local { dir: String },
    /// The copy bundled in mu-plugins
    Inherit,
}

/// Client code selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase", deny_unknown_fields)]
pub enum ClientCodeSelector {
    /// Prebuilt image at a tag (the skeleton by default)
    Image { image: String, tag: String },
    /// Local directory used verbatim
    Local { dir: String },
    /// Remote repository cloned into the instance
    Git(GitSource),
}

impl ClientCodeSelector {
    /// Git source that still has to be cloned, if any
    #[must_use]
    pub fn pending_fetch(&mut self) -> Option<&mut GitSource> {
        match self {
            Self::Git(source) if !source.fetched => Some(source),
            _ => None,
        }
    }
}

/// Remote repository for client code
///
/// Older descriptors keep the branch inside `repo` (`repo#branch`) with no
/// `branch` key; those are split on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitSource {
    /// Clone URL
    pub repo: String,
    /// Branch to check out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Whether acquisition already ran
    pub fetched: bool,
    /// Checkout location, set once fetched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl GitSource {
    /// Parse `repo#branch`. Only the first `#` separates; an empty branch
    /// means the remote default.
    #[must_use]
    pub fn parse(selector: &str) -> Self {
        let (repo, branch) = match selector.split_once('#') {
            Some((repo, branch)) => (repo, Some(branch).filter(|b| !b.is_empty())),
            None => (selector, None),
        };
        Self {
            repo: repo.to_string(),
            branch: branch.map(str::to_string),
            fetched: false,
            dir: None,
        }
    }

    /// Record a successful clone
    pub fn mark_fetched(&mut self, dir: impl Into<String>) {
        self.fetched = true;
        self.dir = Some(dir.into());
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredGitSource {
    repo: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    fetched: bool,
    #[serde(default)]
    dir: Option<String>,
}

impl<'de> Deserialize<'de> for GitSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = StoredGitSource::deserialize(deserializer)?;
        let mut source = match stored.branch {
            Some(branch) => Self {
                repo: stored.repo,
                branch: Some(branch),
                fetched: false,
                dir: None,
            },
            None => Self::parse(&stored.repo),
        };
        source.fetched = stored.fetched;
        source.dir = stored.dir;
        Ok(source)
    }
}

/// Serde adapter storing `None` as an empty object
pub(crate) mod unresolved {
    use serde::de::DeserializeOwned;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub(crate) fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }

    pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            _ => serde_json::from_value(value)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
