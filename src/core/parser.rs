//! RG-011: Declaration file loading and evaluation.
//!
//! Parses a declaration YAML file and evaluates it into a [`Registry`]:
//! - Version must be "1.0"
//! - `{{env.NAME}}` placeholders are read once from the process environment
//! - Environments register first, then projects, each project's declarations
//!   in file order

use super::error::{GraphError, Result};
use super::registry::Registry;
use super::resource::NodeDecl;
use super::template::{substitute_placeholders, Context, TemplateRegistry};
use super::types::*;
use super::value::Value;
use std::path::Path;

/// Parse a declaration file from disk.
pub fn parse_config_file(path: &Path) -> Result<DeclarationFile> {
    let content = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content).map_err(|e| match e {
        GraphError::Parse { message, .. } => GraphError::Parse {
            origin: path.display().to_string(),
            message,
        },
        other => other,
    })
}

/// Parse a declaration file from a string.
pub fn parse_config(yaml: &str) -> Result<DeclarationFile> {
    let file: DeclarationFile = serde_yaml_ng::from_str(yaml).map_err(|e| GraphError::Parse {
        origin: "declaration file".to_string(),
        message: e.to_string(),
    })?;
    if file.version != "1.0" {
        return Err(GraphError::Parse {
            origin: "declaration file".to_string(),
            message: format!("version must be \"1.0\", got \"{}\"", file.version),
        });
    }
    Ok(file)
}

/// Load a declaration file, its templates directory, and evaluate it against
/// the process environment.
pub fn load(path: &Path) -> Result<Registry> {
    load_with(path, TemplateRegistry::new())
}

/// Like [`load`], with templates registered by the caller (e.g. Rust-defined
/// templates) in addition to the file's templates directory.
pub fn load_with(path: &Path, mut templates: TemplateRegistry) -> Result<Registry> {
    let file = parse_config_file(path)?;
    if let Some(ref dir) = file.templates_dir {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let loaded = templates.load_dir(&base.join(dir))?;
        tracing::debug!(dir = %dir, templates = loaded, "loaded templates directory");
    }
    evaluate(&file, &templates, |name| std::env::var(name).ok())
}

/// Evaluate a parsed declaration file into a registry.
///
/// `env` supplies values for `{{env.NAME}}` placeholders; a missing variable
/// fails with `MissingEnvironmentVariable`.
pub fn evaluate(
    file: &DeclarationFile,
    templates: &TemplateRegistry,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Registry> {
    let mut registry = Registry::new();

    for decl in &file.environments {
        registry.register_environment(
            expand_env(&decl.name, &env)?,
            expand_env(&decl.region, &env)?,
            expand_env(&decl.account_id, &env)?,
        )?;
    }

    for decl in &file.projects {
        let id = ProjectId::new(expand_env(&decl.org, &env)?, expand_env(&decl.name, &env)?);
        let project = registry.register_project(
            id.org.clone(),
            id.name.clone(),
            decl.environments.clone(),
        )?;
        for (key, value) in &decl.tags {
            project.set_tag(key.clone(), expand_env(value, &env)?);
        }

        for declaration in &decl.declarations {
            match declaration {
                Declaration::Resource(resource) => {
                    let mut node = NodeDecl::from(resource.clone());
                    for value in node.attributes.values_mut() {
                        *value = expand_env_value(value, &env)?;
                    }
                    registry.project_mut(&id)?.declare(node)?;
                }
                Declaration::Template(call) => {
                    let context: Context = call
                        .context
                        .iter()
                        .map(|(k, v)| -> Result<(String, Value)> {
                            Ok((k.clone(), expand_env_value(v, &env)?))
                        })
                        .collect::<Result<_>>()?;
                    registry.expand_template(&id, templates, &call.name, &call.instance, &context)?;
                }
            }
        }
        tracing::debug!(project = %id, declarations = decl.declarations.len(), "evaluated project");
    }

    Ok(registry)
}

fn expand_env(s: &str, env: &impl Fn(&str) -> Option<String>) -> Result<String> {
    if !s.contains("{{") {
        return Ok(s.to_string());
    }
    substitute_placeholders(s, |key| match key.strip_prefix("env.") {
        Some(name) => env(name)
            .map(Some)
            .ok_or_else(|| GraphError::MissingEnvironmentVariable {
                name: name.to_string(),
            }),
        None => Ok(None),
    })
}

fn expand_env_value(value: &Value, env: &impl Fn(&str) -> Option<String>) -> Result<Value> {
    value.map_strings(&mut |s: &str| expand_env(s, env).map(Value::String))
}
