//! Component Selector Resolver
//!
//! One pure function per aspect. Each takes the selector currently held by
//! the descriptor (possibly unresolved) and an optional explicit selector
//! string, and returns a resolved value:
//!
//! 1. An explicit string always wins and is classified by shape.
//! 2. Otherwise a previously resolved selector is kept as is.
//! 3. Otherwise the aspect's default from [`ComponentDefaults`] applies.
//!
//! Explicit strings are never validated; they are stored verbatim.

use crate::config::{ComponentDefaults, ImageDefault};
use crate::descriptor::InstanceDescriptor;
use crate::selector::{
    ClientCodeSelector, GitSource, JetpackSelector, MuPluginsSelector, WordPressSelector,
};

/// Separator marking an explicit selector as a local directory
pub const PATH_SEPARATOR: char = '/';

/// Jetpack selector value meaning "use the copy in mu-plugins"
pub const JETPACK_INHERIT: &str = "mu";

/// Explicit selector strings for one resolution pass
///
/// `None` keeps whatever the descriptor already holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorArgs {
    /// PHP version
    pub php: Option<String>,
    /// WordPress version or local directory
    pub wordpress: Option<String>,
    /// mu-plugins changeset or local directory
    pub muplugins: Option<String>,
    /// Jetpack version, local directory or `mu`
    pub jetpack: Option<String>,
    /// Client code repository or local directory
    pub clientcode: Option<String>,
}

impl SelectorArgs {
    /// Layer these args over `fallback`; values set here take precedence
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            php: self.php.or(fallback.php),
            wordpress: self.wordpress.or(fallback.wordpress),
            muplugins: self.muplugins.or(fallback.muplugins),
            jetpack: self.jetpack.or(fallback.jetpack),
            clientcode: self.clientcode.or(fallback.clientcode),
        }
    }
}

/// Applies selector strings to descriptors using a fixed defaults table
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    defaults: ComponentDefaults,
}

impl Resolver {
    /// Create resolver over a defaults table
    #[inline]
    #[must_use]
    pub fn new(defaults: ComponentDefaults) -> Self {
        Self { defaults }
    }

    /// Defaults in use
    #[inline]
    #[must_use]
    pub fn defaults(&self) -> &ComponentDefaults {
        &self.defaults
    }

    /// Resolve every aspect of `descriptor` in place
    pub fn apply(&self, descriptor: &mut InstanceDescriptor, args: &SelectorArgs) {
        descriptor.php_version =
            Some(self.resolve_php(descriptor.php_version.take(), args.php.as_deref()));
        descriptor.wordpress =
            Some(self.resolve_wordpress(descriptor.wordpress.take(), args.wordpress.as_deref()));
        descriptor.muplugins =
            Some(self.resolve_muplugins(descriptor.muplugins.take(), args.muplugins.as_deref()));
        descriptor.jetpack =
            Some(self.resolve_jetpack(descriptor.jetpack.take(), args.jetpack.as_deref()));
        descriptor.clientcode = Some(
            self.resolve_clientcode(descriptor.clientcode.take(), args.clientcode.as_deref()),
        );
        tracing::debug!(
            slug = %descriptor.site_slug,
            php = ?descriptor.php_version,
            wordpress = ?descriptor.wordpress,
            muplugins = ?descriptor.muplugins,
            jetpack = ?descriptor.jetpack,
            clientcode = ?descriptor.clientcode,
            "resolved selectors"
        );
    }

    /// PHP version: explicit, else current, else default
    #[must_use]
    pub fn resolve_php(&self, current: Option<String>, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_string)
            .or(current)
            .unwrap_or_else(|| self.defaults.php.clone())
    }

    /// WordPress core: local path or image tag
    #[must_use]
    pub fn resolve_wordpress(
        &self,
        current: Option<WordPressSelector>,
        explicit: Option<&str>,
    ) -> WordPressSelector {
        let images = &self.defaults.images;
        match explicit {
            Some(value) if is_local_path(value) => WordPressSelector::Local { dir: value.into() },
            Some(tag) => image(&images.wordpress.image, tag, |image, tag| {
                WordPressSelector::Image { image, tag }
            }),
            None => current.unwrap_or_else(|| {
                default_image(&images.wordpress, |image, tag| WordPressSelector::Image {
                    image,
                    tag,
                })
            }),
        }
    }

    /// mu-plugins: local path or image tag
    #[must_use]
    pub fn resolve_muplugins(
        &self,
        current: Option<MuPluginsSelector>,
        explicit: Option<&str>,
    ) -> MuPluginsSelector {
        let images = &self.defaults.images;
        match explicit {
            Some(value) if is_local_path(value) => MuPluginsSelector::Local { dir: value.into() },
            Some(tag) => image(&images.muplugins.image, tag, |image, tag| {
                MuPluginsSelector::Image { image, tag }
            }),
            None => current.unwrap_or_else(|| {
                default_image(&images.muplugins, |image, tag| MuPluginsSelector::Image {
                    image,
                    tag,
                })
            }),
        }
    }

    /// Jetpack: local path, `mu` for inherit, or image tag. Defaults to inherit.
    #[must_use]
    pub fn resolve_jetpack(
        &self,
        current: Option<JetpackSelector>,
        explicit: Option<&str>,
    ) -> JetpackSelector {
        match explicit {
            Some(value) if is_local_path(value) => JetpackSelector::Local { dir: value.into() },
            Some(JETPACK_INHERIT) => JetpackSelector::Inherit,
            Some(tag) => image(&self.defaults.images.jetpack, tag, |image, tag| {
                JetpackSelector::Image { image, tag }
            }),
            None => current.unwrap_or(JetpackSelector::Inherit),
        }
    }

    /// Client code: remote repository, else local directory. Defaults to
    /// the skeleton image.
    ///
    /// The repository check runs before the path check: clone URLs such as
    /// `git@github.com:org/repo` contain a separator themselves.
    #[must_use]
    pub fn resolve_clientcode(
        &self,
        current: Option<ClientCodeSelector>,
        explicit: Option<&str>,
    ) -> ClientCodeSelector {
        match explicit {
            Some(value) if self.defaults.is_remote_repo(value) => {
                ClientCodeSelector::Git(GitSource::parse(value))
            }
            Some(value) => ClientCodeSelector::Local { dir: value.into() },
            None => current.unwrap_or_else(|| {
                default_image(&self.defaults.images.skeleton, |image, tag| {
                    ClientCodeSelector::Image { image, tag }
                })
            }),
        }
    }
}

fn is_local_path(value: &str) -> bool {
    value.contains(PATH_SEPARATOR)
}

fn image<T>(name: &str, tag: &str, build: impl FnOnce(String, String) -> T) -> T {
    build(name.to_string(), tag.to_string())
}

fn default_image<T>(default: &ImageDefault, build: impl FnOnce(String, String) -> T) -> T {
    build(default.image.clone(), default.tag.clone())
}
