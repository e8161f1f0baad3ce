//! RG-006: Lifecycle policy store — per-resource `ignore_changes` directives.
//!
//! Directives are only recorded here; the execution layer consults them to
//! suppress diffs on provider-managed fields. Validation happens when the
//! graph is frozen.

use super::error::{GraphError, Result};
use super::resource::ResourceNode;
use super::types::{ProjectId, ResourceId};
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Default)]
pub struct LifecyclePolicyStore {
    ignored: IndexMap<ResourceId, IndexSet<String>>,
}

impl LifecyclePolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record attributes to ignore. Repeated calls accumulate: a name once
    /// ignored stays ignored.
    pub fn set_ignored_attributes<I, S>(&mut self, id: &ResourceId, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = names.into_iter().map(Into::into).peekable();
        if names.peek().is_none() {
            return;
        }
        self.ignored.entry(id.clone()).or_default().extend(names);
    }

    pub fn ignored_attributes(&self, id: &ResourceId) -> Vec<String> {
        self.ignored
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_ignored(&self, id: &ResourceId, attribute: &str) -> bool {
        self.ignored
            .get(id)
            .is_some_and(|set| set.contains(attribute))
    }

    pub fn len(&self) -> usize {
        self.ignored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ignored.is_empty()
    }

    /// Every directive must name a declared resource and a declared attribute.
    pub fn validate(
        &self,
        project: &ProjectId,
        nodes: &IndexMap<ResourceId, ResourceNode>,
    ) -> Result<()> {
        for (id, names) in &self.ignored {
            let node = nodes.get(id).ok_or_else(|| GraphError::UnknownResource {
                project: project.clone(),
                id: id.clone(),
            })?;
            if let Some(missing) = names.iter().find(|n| !node.declares(n)) {
                return Err(GraphError::UnknownLifecycleAttribute {
                    id: id.clone(),
                    attribute: missing.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::NodeDecl;

    fn nodes() -> IndexMap<ResourceId, ResourceNode> {
        let node = ResourceNode::new(
            NodeDecl::new("aws_lambda_function", "f")
                .attribute("filename", "lambda.zip")
                .attribute("source_code_hash", "abc"),
            None,
        );
        IndexMap::from([(node.id().clone(), node)])
    }

    fn project() -> ProjectId {
        ProjectId::new("coinbase", "step")
    }

    #[test]
    fn test_rg006_valid_directive() {
        let id = ResourceId::new("aws_lambda_function", "f");
        let mut store = LifecyclePolicyStore::new();
        store.set_ignored_attributes(&id, ["source_code_hash"]);
        assert!(store.validate(&project(), &nodes()).is_ok());
        assert!(store.is_ignored(&id, "source_code_hash"));
    }

    #[test]
    fn test_rg006_unknown_attribute() {
        let id = ResourceId::new("aws_lambda_function", "f");
        let mut store = LifecyclePolicyStore::new();
        store.set_ignored_attributes(&id, ["last_modified"]);
        let err = store.validate(&project(), &nodes()).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownLifecycleAttribute { ref attribute, .. } if attribute == "last_modified"
        ));
    }

    #[test]
    fn test_rg006_unknown_resource() {
        let mut store = LifecyclePolicyStore::new();
        store.set_ignored_attributes(&ResourceId::new("aws_s3_bucket", "ghost"), ["acl"]);
        let err = store.validate(&project(), &nodes()).unwrap_err();
        assert!(matches!(err, GraphError::UnknownResource { .. }));
    }

    #[test]
    fn test_rg006_overlapping_directives_accumulate() {
        let id = ResourceId::new("aws_lambda_function", "f");
        let mut store = LifecyclePolicyStore::new();
        store.set_ignored_attributes(&id, ["filename"]);
        store.set_ignored_attributes(&id, ["source_code_hash", "filename"]);
        assert_eq!(
            store.ignored_attributes(&id),
            vec!["filename".to_string(), "source_code_hash".to_string()]
        );
    }

    #[test]
    fn test_rg006_empty_directive_not_recorded() {
        let mut store = LifecyclePolicyStore::new();
        store.set_ignored_attributes(&ResourceId::new("aws_s3_bucket", "b"), Vec::<String>::new());
        assert!(store.is_empty());
    }
}
