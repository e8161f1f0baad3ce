//! RG-004: Projects — sole owners of their resource nodes.

use super::error::{GraphError, Result};
use super::lifecycle::LifecyclePolicyStore;
use super::resource::{NodeDecl, Origin, ResourceNode};
use super::types::{ProjectId, ResourceId};
use indexmap::IndexMap;

/// A recorded template expansion within a project.
#[derive(Debug, Clone)]
pub struct TemplateInstance {
    pub template: String,
    pub instance: String,
    /// BLAKE3 hash of the canonical (defaults-filled) context
    pub context_hash: String,
    /// Nodes produced, in expansion order
    pub nodes: Vec<ResourceId>,
}

#[derive(Debug, Clone)]
pub struct Project {
    id: ProjectId,
    environments: Vec<String>,
    tags: IndexMap<String, String>,
    nodes: IndexMap<ResourceId, ResourceNode>,
    instances: IndexMap<(String, String), TemplateInstance>,
    lifecycle: LifecyclePolicyStore,
}

impl Project {
    pub(crate) fn new(id: ProjectId, environments: Vec<String>) -> Self {
        Self {
            id,
            environments,
            tags: IndexMap::new(),
            nodes: IndexMap::new(),
            instances: IndexMap::new(),
            lifecycle: LifecyclePolicyStore::new(),
        }
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    pub fn environments(&self) -> &[String] {
        &self.environments
    }

    pub fn tags(&self) -> &IndexMap<String, String> {
        &self.tags
    }

    /// Set a project tag. Only nodes declared afterwards inherit it.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Register a resource node.
    pub fn declare(&mut self, decl: NodeDecl) -> Result<ResourceId> {
        self.declare_with_origin(decl, None)
    }

    pub(crate) fn declare_with_origin(
        &mut self,
        decl: NodeDecl,
        origin: Option<Origin>,
    ) -> Result<ResourceId> {
        decl.validate()?;
        if self.nodes.contains_key(&decl.id) {
            return Err(GraphError::DuplicateResource {
                project: self.id.clone(),
                id: decl.id,
            });
        }
        let id = decl.id.clone();
        self.lifecycle
            .set_ignored_attributes(&id, decl.ignore_changes.iter().cloned());
        let mut node = ResourceNode::new(decl, origin);
        node.inherit_tags(&self.tags);
        tracing::trace!(project = %self.id, resource = %id, "declared");
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &IndexMap<ResourceId, ResourceNode> {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn lifecycle(&self) -> &LifecyclePolicyStore {
        &self.lifecycle
    }

    pub fn set_ignored_attributes<I, S>(&mut self, id: &ResourceId, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lifecycle.set_ignored_attributes(id, names);
    }

    pub fn template_instance(&self, template: &str, instance: &str) -> Option<&TemplateInstance> {
        self.instances
            .get(&(template.to_string(), instance.to_string()))
    }

    pub fn template_instances(&self) -> impl Iterator<Item = &TemplateInstance> {
        self.instances.values()
    }

    pub(crate) fn record_instance(&mut self, instance: TemplateInstance) {
        self.instances.insert(
            (instance.template.clone(), instance.instance.clone()),
            instance,
        );
    }
}
