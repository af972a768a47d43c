//! Environment Renderer
//!
//! Produces the orchestration tool's `.lando.yml` from a descriptor. The
//! descriptor's JSON form is the binding context, so templates use the same
//! field names as `instanceData.json`.

use std::path::{Path, PathBuf};

use crate::descriptor::InstanceDescriptor;
use crate::error::RenderError;
use crate::template::Template;

/// Environment file written at the instance root
pub const ENVIRONMENT_FILE: &str = ".lando.yml";

/// Template compiled into the binary
pub const BUILTIN_TEMPLATE: &str = include_str!("../templates/lando.yml.tmpl");

/// Where the template text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// [`BUILTIN_TEMPLATE`]
    Builtin,
    /// A file on disk
    File(PathBuf),
}

impl TemplateSource {
    /// File when configured, built-in otherwise
    #[must_use]
    pub fn from_config(path: Option<&Path>) -> Self {
        path.map_or(Self::Builtin, |p| Self::File(p.to_path_buf()))
    }

    fn load(&self) -> Result<String, RenderError> {
        match self {
            Self::Builtin => Ok(BUILTIN_TEMPLATE.to_string()),
            Self::File(path) => {
                std::fs::read_to_string(path).map_err(|source| RenderError::TemplateMissing {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

/// Render `descriptor` through the template from `source`
///
/// # Errors
/// `RenderError` if the template is missing, malformed, or references a
/// field the descriptor does not carry
pub fn render(descriptor: &InstanceDescriptor, source: &TemplateSource) -> Result<String, RenderError> {
    let text = source.load()?;
    let template = Template::parse(&text)?;
    let context = serde_json::to_value(descriptor).map_err(RenderError::Context)?;
    template.render(&context)
}

/// Render and write `<instance_dir>/.lando.yml`
///
/// # Errors
/// As [`render`], plus `RenderError::Write`
pub fn write_environment(
    descriptor: &InstanceDescriptor,
    source: &TemplateSource,
    instance_dir: &Path,
) -> Result<PathBuf, RenderError> {
    let rendered = render(descriptor, source)?;
    let path = instance_dir.join(ENVIRONMENT_FILE);
    std::fs::write(&path, rendered).map_err(|source| RenderError::Write {
        path: path.clone(),
        source,
    })?;
    tracing::info!("wrote {}", path.display());
    Ok(path)
}
