//! RG-008: Template loading, context validation, and expansion into nodes.
//!
//! Templates are reusable, parameterized resource sets. A template declares a
//! context schema and produces node declarations; the expander namespaces the
//! produced nodes under the instance key (`instance/resource-name`) and
//! registers them in the invoking project. References between siblings are
//! namespaced by the template itself, before context values are substituted,
//! so a reference passed in through context is never retargeted. Expansion is memoized per project by
//! `(template, instance, hash(context))`.

use super::error::{GraphError, Result};
use super::hasher;
use super::project::{Project, TemplateInstance};
use super::registry::NamingConvention;
use super::resource::{validate_name, NodeDecl, Origin};
use super::types::{ProjectId, ResourceDecl, ResourceId};
use super::value::{AttributeReference, Value};
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use std::path::Path;

/// Context values passed to a template.
pub type Context = IndexMap<String, Value>;

/// Expected shape of a context value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    String,
    Int,
    Bool,
    List,
    Map,
    #[default]
    Any,
}

/// A context schema entry. Entries without a default are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextField {
    #[serde(rename = "type", default)]
    pub field_type: ContextType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ContextField {
    pub fn required(field_type: ContextType) -> Self {
        Self {
            field_type,
            ..Self::default()
        }
    }

    pub fn optional(field_type: ContextType, default: impl Into<Value>) -> Self {
        Self {
            field_type,
            default: Some(default.into()),
            description: None,
        }
    }
}

pub type ContextSchema = IndexMap<String, ContextField>;

/// What a template sees about where it is being expanded.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionScope<'a> {
    pub project: &'a ProjectId,
    pub instance: &'a str,
    /// Naming-convention prefix, e.g. `coinbase-step-deployer-`
    pub prefix: &'a str,
}

impl ExpansionScope<'_> {
    /// ID of a node produced by this same expansion.
    pub fn sibling(&self, resource_type: &str, local_name: &str) -> ResourceId {
        ResourceId::new(resource_type, namespaced(self.instance, local_name))
    }
}

/// A named generator of resource declarations.
///
/// Implementations return un-namespaced local names; the expander applies the
/// instance namespace to them. References and `depends_on` entries that point
/// at a sibling must use [`ExpansionScope::sibling`].
pub trait Template: Send + Sync {
    fn name(&self) -> &str;
    fn context_schema(&self) -> &ContextSchema;
    fn expand(&self, scope: &ExpansionScope<'_>, context: &Context) -> Result<Vec<NodeDecl>>;
}

// ============================================================================
// Declarative (YAML) templates
// ============================================================================

/// A template file: context schema plus resources.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateFile {
    pub template: TemplateMetadata,
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: ContextSchema,
}

/// Template whose resources are written in YAML with `{{...}}` placeholders.
#[derive(Debug, Clone)]
pub struct DeclarativeTemplate {
    file: TemplateFile,
}

impl DeclarativeTemplate {
    pub fn parse(yaml: &str) -> Result<Self> {
        let file: TemplateFile = serde_yaml_ng::from_str(yaml).map_err(|e| GraphError::Parse {
            origin: "template".to_string(),
            message: e.to_string(),
        })?;
        check_placeholders(&file)?;
        Ok(Self { file })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|e| match e {
            GraphError::Parse { message, .. } => GraphError::Parse {
                origin: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn description(&self) -> Option<&str> {
        self.file.template.description.as_deref()
    }
}

impl Template for DeclarativeTemplate {
    fn name(&self) -> &str {
        &self.file.template.name
    }

    fn context_schema(&self) -> &ContextSchema {
        &self.file.template.context
    }

    fn expand(&self, scope: &ExpansionScope<'_>, context: &Context) -> Result<Vec<NodeDecl>> {
        let siblings: IndexSet<ResourceId> = self
            .file
            .resources
            .iter()
            .map(|r| ResourceId::new(r.resource_type.clone(), r.name.clone()))
            .collect();
        let local = |id: &ResourceId| -> ResourceId {
            if siblings.contains(id) {
                scope.sibling(&id.resource_type, &id.local_name)
            } else {
                id.clone()
            }
        };

        let mut decls = Vec::with_capacity(self.file.resources.len());
        for resource in &self.file.resources {
            let mut attributes = IndexMap::with_capacity(resource.attributes.len());
            for (key, value) in &resource.attributes {
                // Authored references first; context values arrive afterwards
                let mut authored = value.clone();
                authored.rewrite_references(&mut |r: &mut AttributeReference| r.target = local(&r.target));
                let rendered =
                    authored.map_strings(&mut |s: &str| render_value(self.name(), s, scope, context))?;
                attributes.insert(key.clone(), rendered);
            }
            decls.push(NodeDecl {
                id: ResourceId::new(resource.resource_type.clone(), resource.name.clone()),
                attributes,
                depends_on: resource.depends_on.iter().map(local).collect(),
                ignore_changes: resource.lifecycle.ignore_changes.clone(),
            });
        }
        Ok(decls)
    }
}

/// Resource names are literal, and every placeholder must name a declared
/// context key or a scope variable.
fn check_placeholders(file: &TemplateFile) -> Result<()> {
    let invalid = |message: String| GraphError::Parse {
        origin: format!("template '{}'", file.template.name),
        message,
    };
    for resource in &file.resources {
        if resource.name.contains("{{") {
            return Err(invalid(format!(
                "resource name '{}' must be literal",
                resource.name
            )));
        }
        for value in resource.attributes.values() {
            value.map_strings(&mut |s: &str| {
                substitute_placeholders(s, |key| {
                    let known = match key.strip_prefix("context.") {
                        Some(ctx_key) => file.template.context.contains_key(ctx_key),
                        None => SCOPE_VARIABLES.contains(&key),
                    };
                    if known {
                        Ok(None)
                    } else {
                        Err(invalid(format!(
                            "resource '{}' uses undeclared template variable '{}'",
                            resource.name, key
                        )))
                    }
                })
                .map(|_| Value::Null)
            })?;
        }
    }
    Ok(())
}

const SCOPE_VARIABLES: [&str; 4] = ["project.org", "project.name", "naming.prefix", "instance"];

/// Render a string value. A string consisting of exactly one
/// `{{context.KEY}}` placeholder becomes the context value itself, so lists,
/// maps and references pass through intact.
fn render_value(template: &str, s: &str, scope: &ExpansionScope<'_>, context: &Context) -> Result<Value> {
    let trimmed = s.trim();
    if let Some(key) = trimmed
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
        .and_then(|inner| inner.strip_prefix("context."))
    {
        if !key.contains("}}") && !key.contains("{{") {
            return context.get(key).cloned().ok_or_else(|| unknown_variable(template, key));
        }
    }
    render_string(template, s, scope, context).map(Value::String)
}

fn render_string(template: &str, s: &str, scope: &ExpansionScope<'_>, context: &Context) -> Result<String> {
    substitute_placeholders(s, |key| {
        let value = if let Some(ctx_key) = key.strip_prefix("context.") {
            let value = context
                .get(ctx_key)
                .ok_or_else(|| unknown_variable(template, ctx_key))?;
            scalar_to_string(value).ok_or_else(|| GraphError::InvalidTemplateContext {
                template: template.to_string(),
                key: ctx_key.to_string(),
                message: format!("a {} cannot be interpolated into a string", value.kind()),
            })?
        } else {
            match key {
                "project.org" => scope.project.org.clone(),
                "project.name" => scope.project.name.clone(),
                "naming.prefix" => scope.prefix.to_string(),
                "instance" => scope.instance.to_string(),
                other => return Err(unknown_variable(template, other)),
            }
        };
        Ok(Some(value))
    })
}

fn unknown_variable(template: &str, key: &str) -> GraphError {
    GraphError::InvalidTemplateContext {
        template: template.to_string(),
        key: key.to_string(),
        message: "unknown template variable".to_string(),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Replace `{{key}}` placeholders using `lookup`. A lookup returning `None`
/// leaves the placeholder untouched.
pub fn substitute_placeholders(
    template: &str,
    mut lookup: impl FnMut(&str) -> Result<Option<String>>,
) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| GraphError::Parse {
                origin: "template string".to_string(),
                message: format!("unclosed placeholder at position {} in '{}'", open, template),
            })?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim().to_string();

        match lookup(&key)? {
            Some(value) => {
                result.replace_range(open..close, &value);
                start = open + value.len();
            }
            None => start = close,
        }
    }

    Ok(result)
}

// ============================================================================
// Closure-backed templates
// ============================================================================

/// A template implemented in Rust.
pub struct FnTemplate<F> {
    name: String,
    schema: ContextSchema,
    expand: F,
}

impl<F> FnTemplate<F>
where
    F: Fn(&ExpansionScope<'_>, &Context) -> Result<Vec<NodeDecl>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, schema: ContextSchema, expand: F) -> Self {
        Self {
            name: name.into(),
            schema,
            expand,
        }
    }
}

impl<F> Template for FnTemplate<F>
where
    F: Fn(&ExpansionScope<'_>, &Context) -> Result<Vec<NodeDecl>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn context_schema(&self) -> &ContextSchema {
        &self.schema
    }

    fn expand(&self, scope: &ExpansionScope<'_>, context: &Context) -> Result<Vec<NodeDecl>> {
        (self.expand)(scope, context)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Maps template names to their implementations.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: IndexMap<String, Box<dyn Template>>,
}

impl std::fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.templates.keys()).finish()
    }
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any previous one with the same name.
    pub fn register(&mut self, template: impl Template + 'static) {
        self.templates
            .insert(template.name().to_string(), Box::new(template));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Template> {
        self.templates.get(name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Load every `*.yaml` / `*.yml` file in `dir` as a declarative template.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut paths = Vec::new();
        for ext in ["yaml", "yml"] {
            let pattern = dir.join(format!("*.{}", ext));
            let entries = glob::glob(&pattern.to_string_lossy()).map_err(|e| GraphError::Parse {
                origin: pattern.display().to_string(),
                message: e.to_string(),
            })?;
            paths.extend(entries.filter_map(|e| e.ok()));
        }
        paths.sort();
        for path in &paths {
            let template = DeclarativeTemplate::load(path)?;
            tracing::debug!(template = template.name(), path = %path.display(), "loaded template");
            self.register(template);
        }
        Ok(paths.len())
    }
}

// ============================================================================
// Expansion
// ============================================================================

/// Fill defaults, type-check, and report the first missing required key.
pub fn validate_context(
    template: &str,
    instance: &str,
    schema: &ContextSchema,
    provided: &Context,
) -> Result<Context> {
    let mut resolved = Context::with_capacity(schema.len().max(provided.len()));

    for (key, field) in schema {
        let value = match (provided.get(key), &field.default) {
            (Some(v), _) => v.clone(),
            (None, Some(default)) => default.clone(),
            (None, None) => {
                return Err(GraphError::MissingTemplateContext {
                    template: template.to_string(),
                    instance: instance.to_string(),
                    key: key.clone(),
                })
            }
        };
        check_type(template, key, field.field_type, &value)?;
        resolved.insert(key.clone(), value);
    }

    // Undeclared keys pass through untouched
    for (key, value) in provided {
        if !resolved.contains_key(key) {
            resolved.insert(key.clone(), value.clone());
        }
    }

    Ok(resolved)
}

fn check_type(template: &str, key: &str, expected: ContextType, value: &Value) -> Result<()> {
    let ok = match (expected, value) {
        (ContextType::Any, _) => true,
        // A reference stands in for a scalar produced at apply time
        (ContextType::String | ContextType::Int | ContextType::Bool, Value::Ref(_)) => true,
        (ContextType::String, Value::String(_)) => true,
        (ContextType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (ContextType::Bool, Value::Bool(_)) => true,
        (ContextType::List, Value::List(_)) => true,
        (ContextType::Map, Value::Map(_)) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(GraphError::InvalidTemplateContext {
            template: template.to_string(),
            key: key.to_string(),
            message: format!("expected {:?}, got {}", expected, value.kind()).to_lowercase(),
        })
    }
}

/// Hash of a validated context, used as the memoization key.
pub fn context_hash(context: &Context) -> String {
    let value = Value::Map(context.clone());
    hasher::hash_string(&value.canonical_json())
}

/// Namespaced local name for a template-produced node.
pub fn namespaced(instance: &str, local_name: &str) -> String {
    format!("{}/{}", instance, local_name)
}

/// Expands templates into a project using a template registry.
pub struct TemplateExpander<'a> {
    templates: &'a TemplateRegistry,
    naming: &'a dyn NamingConvention,
}

impl<'a> TemplateExpander<'a> {
    pub fn new(templates: &'a TemplateRegistry, naming: &'a dyn NamingConvention) -> Self {
        Self { templates, naming }
    }

    /// Expand `template` as `instance` into `project`, returning the node IDs
    /// it owns. Re-expansion with an identical context returns the existing
    /// node set; nothing is registered unless every node can be.
    pub fn expand(
        &self,
        project: &mut Project,
        template_name: &str,
        instance: &str,
        context: &Context,
    ) -> Result<Vec<ResourceId>> {
        let template = self
            .templates
            .get(template_name)
            .ok_or_else(|| GraphError::UnknownTemplate {
                name: template_name.to_string(),
            })?;
        validate_name("template instance key", instance)?;

        let context = validate_context(template_name, instance, template.context_schema(), context)?;
        let hash = context_hash(&context);

        if let Some(existing) = project.template_instance(template_name, instance) {
            if existing.context_hash == hash {
                tracing::debug!(template = template_name, instance, "template instance cached");
                return Ok(existing.nodes.clone());
            }
            return Err(GraphError::TemplateInstanceConflict {
                template: template_name.to_string(),
                instance: instance.to_string(),
            });
        }

        let prefix = self.naming.prefix(project.id());
        let scope = ExpansionScope {
            project: project.id(),
            instance,
            prefix: &prefix,
        };
        let decls: Vec<NodeDecl> = template
            .expand(&scope, &context)?
            .into_iter()
            .map(|mut decl| {
                decl.id = scope.sibling(&decl.id.resource_type, &decl.id.local_name);
                decl
            })
            .collect();

        // All-or-nothing: reject before registering anything
        let mut seen = IndexSet::with_capacity(decls.len());
        for decl in &decls {
            decl.validate()?;
            if project.contains(&decl.id) || !seen.insert(decl.id.clone()) {
                return Err(GraphError::DuplicateResource {
                    project: project.id().clone(),
                    id: decl.id.clone(),
                });
            }
        }

        let origin = Origin {
            template: template_name.to_string(),
            instance: instance.to_string(),
        };
        let mut nodes = Vec::with_capacity(decls.len());
        for decl in decls {
            nodes.push(project.declare_with_origin(decl, Some(origin.clone()))?);
        }
        tracing::debug!(
            project = %project.id(),
            template = template_name,
            instance,
            nodes = nodes.len(),
            "expanded template"
        );
        project.record_instance(TemplateInstance {
            template: template_name.to_string(),
            instance: instance.to_string(),
            context_hash: hash,
            nodes: nodes.clone(),
        });
        Ok(nodes)
    }
}
