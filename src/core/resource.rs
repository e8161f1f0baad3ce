//! RG-003: Resource nodes and their declarations.
//!
//! A `NodeDecl` is what a configuration (or a template) asks for; a
//! `ResourceNode` is what the owning project stores once the declaration is
//! accepted. Attribute values are kept exactly as given. References are not
//! resolved eagerly, so a node may reference one declared after it.

use super::error::{GraphError, Result};
use super::types::{ResourceDecl, ResourceId};
use super::value::{AttributeReference, Value};
use crate::resources;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::sync::LazyLock;

static TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_\-/]*$").expect("valid regex"));

/// Validate a resource type identifier (`aws_iam_role`).
pub fn validate_type(resource_type: &str) -> Result<()> {
    if TYPE_RE.is_match(resource_type) {
        Ok(())
    } else {
        Err(GraphError::InvalidIdentifier {
            kind: "resource type",
            value: resource_type.to_string(),
        })
    }
}

/// Validate a local name or template instance key.
pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(GraphError::InvalidIdentifier {
            kind,
            value: name.to_string(),
        })
    }
}

/// A request to declare a resource node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDecl {
    pub id: ResourceId,
    pub attributes: IndexMap<String, Value>,
    pub depends_on: Vec<ResourceId>,
    pub ignore_changes: Vec<String>,
}

impl NodeDecl {
    pub fn new(resource_type: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, local_name),
            attributes: IndexMap::new(),
            depends_on: Vec::new(),
            ignore_changes: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn depends_on(mut self, id: ResourceId) -> Self {
        self.depends_on.push(id);
        self
    }

    pub fn ignore_changes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_changes.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_type(&self.id.resource_type)?;
        validate_name("resource name", &self.id.local_name)
    }
}

impl From<ResourceDecl> for NodeDecl {
    fn from(decl: ResourceDecl) -> Self {
        Self {
            id: ResourceId::new(decl.resource_type, decl.name),
            attributes: decl.attributes,
            depends_on: decl.depends_on,
            ignore_changes: decl.lifecycle.ignore_changes,
        }
    }
}

/// Template instance that produced a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub template: String,
    pub instance: String,
}

/// A declared unit of desired configuration, owned by one project.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    id: ResourceId,
    attributes: IndexMap<String, Value>,
    depends_on: IndexSet<ResourceId>,
    origin: Option<Origin>,
}

impl ResourceNode {
    pub(crate) fn new(decl: NodeDecl, origin: Option<Origin>) -> Self {
        Self {
            id: decl.id,
            attributes: decl.attributes,
            depends_on: decl.depends_on.into_iter().collect(),
            origin,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn resource_type(&self) -> &str {
        &self.id.resource_type
    }

    pub fn local_name(&self) -> &str {
        &self.id.local_name
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Explicit `depends_on` edges, in declaration order.
    pub fn depends_on(&self) -> &IndexSet<ResourceId> {
        &self.depends_on
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// A reference to one of this node's attributes.
    pub fn to_reference(&self, attribute: impl Into<String>) -> AttributeReference {
        AttributeReference::new(self.id.clone(), attribute)
    }

    /// All references embedded in attribute values, in attribute order.
    pub fn references(&self) -> Vec<&AttributeReference> {
        self.attributes
            .values()
            .flat_map(|v| v.references())
            .collect()
    }

    pub fn declares(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Declared or provider-computed.
    pub fn exposes(&self, attribute: &str) -> bool {
        self.declares(attribute) || resources::is_computed(self.resource_type(), attribute)
    }

    /// Overlay inherited tags under this node's own `tags`.
    ///
    /// A node-level key wins over the inherited one. A `tags` attribute that is
    /// not a map (e.g. a reference) replaces inheritance entirely.
    pub(crate) fn inherit_tags(&mut self, inherited: &IndexMap<String, String>) {
        if inherited.is_empty() || !resources::supports_tags(self.resource_type()) {
            return;
        }
        let mut merged: IndexMap<String, Value> = inherited
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();
        match self.attributes.get("tags") {
            None => {}
            Some(Value::Map(own)) => {
                for (k, v) in own {
                    merged.insert(k.clone(), v.clone());
                }
            }
            Some(_) => return,
        }
        self.attributes.insert("tags".to_string(), Value::Map(merged));
    }
}
