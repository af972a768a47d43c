//! Instance descriptor
//!
//! The persisted record for one instance. Field names follow the on-disk
//! JSON (`siteSlug`, `wpTitle`, `phpVersion`, ...).

use serde::{Deserialize, Serialize};

use crate::selector::{
    unresolved, ClientCodeSelector, JetpackSelector, MuPluginsSelector, WordPressSelector,
};

/// Full configuration of one development instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDescriptor {
    /// Instance name, fixed at creation
    pub site_slug: String,
    /// WordPress site title
    pub wp_title: String,
    /// Multisite install
    #[serde(default)]
    pub multisite: bool,
    /// PHP runtime version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
    /// WordPress core
    #[serde(default, with = "unresolved")]
    pub wordpress: Option<WordPressSelector>,
    /// VIP mu-plugins
    #[serde(default, with = "unresolved")]
    pub muplugins: Option<MuPluginsSelector>,
    /// Jetpack
    #[serde(default, with = "unresolved")]
    pub jetpack: Option<JetpackSelector>,
    /// Client code
    #[serde(default, with = "unresolved")]
    pub clientcode: Option<ClientCodeSelector>,
}

impl InstanceDescriptor {
    /// Fresh skeleton with every selector unresolved
    pub fn new(site_slug: impl Into<String>, wp_title: impl Into<String>, multisite: bool) -> Self {
        Self {
            site_slug: site_slug.into(),
            wp_title: wp_title.into(),
            multisite,
            php_version: None,
            wordpress: None,
            muplugins: None,
            jetpack: None,
            clientcode: None,
        }
    }

    /// True once PHP and all four selectors carry a concrete value
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.php_version.is_some()
            && self.wordpress.is_some()
            && self.muplugins.is_some()
            && self.jetpack.is_some()
            && self.clientcode.is_some()
    }
}
