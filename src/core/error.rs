//! RG-007: Build-time error taxonomy.
//!
//! Every variant is a configuration defect. Nothing here is retried and no
//! partial graph is ever returned alongside an error; each variant carries the
//! identities needed to locate the offending declaration.

use super::types::{ProjectId, ResourceId};
use super::value::AttributeReference;
use std::fmt;
use std::path::PathBuf;

/// Result alias for graph construction and resolution.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Why a reference could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The target resource was never declared in the project.
    UndeclaredTarget,
    /// The target exists but neither declares nor computes the attribute.
    UnknownAttribute,
    /// The attribute is provider-computed and the target is not materialized yet.
    NotMaterialized,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndeclaredTarget => write!(f, "target resource is not declared"),
            Self::UnknownAttribute => write!(f, "target has no such attribute"),
            Self::NotMaterialized => write!(f, "target has not been materialized yet"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate resource {id} in project {project}")]
    DuplicateResource { project: ProjectId, id: ResourceId },

    #[error("environment '{name}' is already registered")]
    DuplicateEnvironment { name: String },

    #[error("project {project} lists unknown environment '{environment}'")]
    UnknownEnvironment {
        project: ProjectId,
        environment: String,
    },

    #[error("template '{template}' (instance '{instance}') requires context key '{key}'")]
    MissingTemplateContext {
        template: String,
        instance: String,
        key: String,
    },

    #[error("unresolved reference {reference}{}: {reason}", referrer_suffix(.referrer))]
    UnresolvedReference {
        referrer: Option<ResourceId>,
        reference: AttributeReference,
        reason: UnresolvedReason,
    },

    #[error("dependency cycle in project {project}: {}", format_path(.path))]
    CyclicDependency {
        project: ProjectId,
        path: Vec<ResourceId>,
    },

    #[error("lifecycle directive on {id} ignores undeclared attribute '{attribute}'")]
    UnknownLifecycleAttribute { id: ResourceId, attribute: String },

    #[error("resource {id} depends on undeclared resource {dependency}")]
    UnknownDependency {
        id: ResourceId,
        dependency: ResourceId,
    },

    #[error("resource {id} is not declared in project {project}")]
    UnknownResource { project: ProjectId, id: ResourceId },

    #[error("unknown template '{name}'")]
    UnknownTemplate { name: String },

    #[error("template '{template}' context key '{key}': {message}")]
    InvalidTemplateContext {
        template: String,
        key: String,
        message: String,
    },

    #[error("template '{template}' instance '{instance}' was already expanded with a different context")]
    TemplateInstanceConflict { template: String, instance: String },

    #[error("project {project} is already registered")]
    DuplicateProject { project: ProjectId },

    #[error("unknown project {project}")]
    UnknownProject { project: ProjectId },

    #[error("environment '{name}': {message}")]
    InvalidEnvironment { name: String, message: String },

    #[error("invalid {kind} '{value}'")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("invalid reference '{value}': {message}")]
    InvalidReference { value: String, message: String },

    #[error("environment variable {name} is not set")]
    MissingEnvironmentVariable { name: String },

    #[error("parse error in {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn referrer_suffix(referrer: &Option<ResourceId>) -> String {
    referrer
        .as_ref()
        .map(|r| format!(" from {}", r))
        .unwrap_or_default()
}

fn format_path(path: &[ResourceId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
