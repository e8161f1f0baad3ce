//! RG-009: Dependency graph construction, cycle detection, and reference resolution.
//!
//! Edges are the union of explicit `depends_on` and every edge implied by an
//! embedded reference (a node referencing another's attribute depends on it).
//! The topological order uses Kahn's algorithm with declaration-order
//! tie-breaking, so identical input always yields an identical order.

use super::error::{GraphError, Result, UnresolvedReason};
use super::lifecycle::LifecyclePolicyStore;
use super::project::Project;
use super::resource::ResourceNode;
use super::types::{ProjectId, ResourceId};
use super::value::{AttributeReference, Value};
use crate::resources;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Attribute values reported by the execution layer after applying resources.
pub type MaterializedState = IndexMap<ResourceId, IndexMap<String, serde_json::Value>>;

/// A frozen, acyclic, fully validated project graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    project: ProjectId,
    nodes: IndexMap<ResourceId, ResourceNode>,
    lifecycle: LifecyclePolicyStore,
    /// Per node (declaration index): indices of the nodes it depends on
    edges: Vec<IndexSet<usize>>,
    order: Vec<usize>,
    levels: Vec<usize>,
    /// Per node: attributes with static references inlined
    inlined: Vec<IndexMap<String, Value>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Build and freeze a project's dependency graph.
pub fn build(project: &Project) -> Result<DependencyGraph> {
    let nodes = project.nodes();
    project.lifecycle().validate(project.id(), nodes)?;

    let index: FxHashMap<&ResourceId, usize> =
        nodes.keys().enumerate().map(|(i, id)| (id, i)).collect();
    let mut edges: Vec<IndexSet<usize>> = vec![IndexSet::new(); nodes.len()];

    for (i, node) in nodes.values().enumerate() {
        for dep in node.depends_on() {
            let j = *index.get(dep).ok_or_else(|| GraphError::UnknownDependency {
                id: node.id().clone(),
                dependency: dep.clone(),
            })?;
            edges[i].insert(j);
        }
        for reference in node.references() {
            let unresolved = |reason| GraphError::UnresolvedReference {
                referrer: Some(node.id().clone()),
                reference: reference.clone(),
                reason,
            };
            let j = *index
                .get(&reference.target)
                .ok_or_else(|| unresolved(UnresolvedReason::UndeclaredTarget))?;
            let target = &nodes[j];
            if !target.exposes(&reference.attribute) {
                return Err(unresolved(UnresolvedReason::UnknownAttribute));
            }
            edges[i].insert(j);
        }
    }

    if let Some(cycle) = find_cycle(&edges) {
        let path: Vec<ResourceId> = cycle.into_iter().map(|i| nodes[i].id().clone()).collect();
        tracing::debug!(project = %project.id(), cycle = ?path, "dependency cycle");
        return Err(GraphError::CyclicDependency {
            project: project.id().clone(),
            path,
        });
    }

    let order = topological_order(&edges);
    let mut levels = vec![0usize; nodes.len()];
    for &i in &order {
        levels[i] = edges[i]
            .iter()
            .map(|&d| levels[d] + 1)
            .max()
            .unwrap_or(0);
    }
    let inlined = inline_all(nodes, &order);

    tracing::debug!(
        project = %project.id(),
        nodes = nodes.len(),
        edges = edges.iter().map(IndexSet::len).sum::<usize>(),
        "graph built"
    );

    Ok(DependencyGraph {
        project: project.id().clone(),
        nodes: nodes.clone(),
        lifecycle: project.lifecycle().clone(),
        edges,
        order,
        levels,
        inlined,
    })
}

/// Depth-first search in declaration order. Returns the first cycle found as
/// a path whose first node is repeated at the end.
///
/// The walk keeps an explicit `(node, next edge)` stack.
fn find_cycle(edges: &[IndexSet<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; edges.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..edges.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (n, next) = *frame;
            let Some(&dep) = edges[n].get_index(next) else {
                marks[n] = Mark::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;
            match marks[dep] {
                Mark::InProgress => {
                    let start = stack.iter().rposition(|&(s, _)| s == dep).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[start..].iter().map(|&(s, _)| s).collect();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    marks[dep] = Mark::InProgress;
                    stack.push((dep, 0));
                }
                Mark::Done => {}
            }
        }
    }
    None
}

/// Each node's attributes with statically known references replaced by their
/// values, computed once in apply order so every target is already inlined.
fn inline_all(
    nodes: &IndexMap<ResourceId, ResourceNode>,
    order: &[usize],
) -> Vec<IndexMap<String, Value>> {
    let mut inlined: Vec<IndexMap<String, Value>> = vec![IndexMap::new(); nodes.len()];
    for &i in order {
        let attributes: IndexMap<String, Value> = nodes[i]
            .attributes()
            .iter()
            .map(|(k, v)| {
                let lookup = |r: &AttributeReference| static_in(nodes, &inlined, r);
                (k.clone(), substitute_static(v, &lookup))
            })
            .collect();
        inlined[i] = attributes;
    }
    inlined
}

fn static_in(
    nodes: &IndexMap<ResourceId, ResourceNode>,
    inlined: &[IndexMap<String, Value>],
    reference: &AttributeReference,
) -> Option<Value> {
    let i = nodes.get_index_of(&reference.target)?;
    inlined[i]
        .get(&reference.attribute)
        .filter(|v| v.is_static())
        .cloned()
}

fn substitute_static(value: &Value, lookup: &impl Fn(&AttributeReference) -> Option<Value>) -> Value {
    match value {
        Value::Ref(r) => lookup(r).unwrap_or_else(|| value.clone()),
        Value::List(items) => Value::List(items.iter().map(|v| substitute_static(v, lookup)).collect()),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_static(v, lookup)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Outcome of resolving one reference; the error half names the reference
/// that could not be resolved.
type Resolution = std::result::Result<serde_json::Value, (AttributeReference, UnresolvedReason)>;

fn substitute_resolved(value: &Value, lookup: &mut impl FnMut(&AttributeReference) -> Resolution) -> Resolution {
    Ok(match value {
        Value::Ref(r) => lookup(r)?,
        Value::List(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|v| substitute_resolved(v, lookup))
                .collect::<std::result::Result<_, _>>()?,
        ),
        Value::Map(map) => {
            let mut obj = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                obj.insert(k.clone(), substitute_resolved(v, lookup)?);
            }
            serde_json::Value::Object(obj)
        }
        other => serde_json::Value::from(other.clone()),
    })
}

fn unresolved((reference, reason): (AttributeReference, UnresolvedReason)) -> GraphError {
    GraphError::UnresolvedReference {
        referrer: None,
        reference,
        reason,
    }
}

/// Kahn's algorithm; among ready nodes the earliest-declared goes first.
/// Callers guarantee the graph is acyclic.
fn topological_order(edges: &[IndexSet<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = edges.iter().map(IndexSet::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); edges.len()];
    for (i, deps) in edges.iter().enumerate() {
        for &d in deps {
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..edges.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(edges.len());
    while let Some(current) = ready.pop_first() {
        order.push(current);
        for &dependent in &dependents[current] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    order
}

impl DependencyGraph {
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &IndexMap<ResourceId, ResourceNode> {
        &self.nodes
    }

    pub fn node(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Apply order: every dependency precedes its dependents.
    pub fn order(&self) -> Vec<&ResourceId> {
        self.order.iter().map(|&i| self.id_at(i)).collect()
    }

    /// Nodes grouped by topological depth. Nodes within a group have no path
    /// between them and may be applied concurrently.
    pub fn levels(&self) -> Vec<Vec<&ResourceId>> {
        let depth = self.levels.iter().copied().max().map_or(0, |m| m + 1);
        let mut groups = vec![Vec::new(); depth];
        for &i in &self.order {
            groups[self.levels[i]].push(self.id_at(i));
        }
        groups
    }

    pub fn level_of(&self, id: &ResourceId) -> Option<usize> {
        self.nodes.get_index_of(id).map(|i| self.levels[i])
    }

    /// Direct dependencies of a node (explicit and reference-implied).
    pub fn dependencies(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.nodes
            .get_index_of(id)
            .map(|i| self.edges[i].iter().map(|&d| self.id_at(d)).collect())
            .unwrap_or_default()
    }

    /// All edges as `(dependent, dependency)` in declaration order.
    pub fn edges(&self) -> impl Iterator<Item = (&ResourceId, &ResourceId)> {
        self.edges.iter().enumerate().flat_map(move |(i, deps)| {
            deps.iter().map(move |&d| (self.id_at(i), self.id_at(d)))
        })
    }

    pub fn lifecycle(&self) -> &LifecyclePolicyStore {
        &self.lifecycle
    }

    fn id_at(&self, i: usize) -> &ResourceId {
        self.nodes[i].id()
    }

    /// A node's attributes with every statically known reference inlined.
    pub fn inlined_attributes(&self, id: &ResourceId) -> Option<&IndexMap<String, Value>> {
        self.nodes.get_index_of(id).map(|i| &self.inlined[i])
    }

    /// The value of a referenced attribute when it is known without applying
    /// anything: a declared attribute whose own references are all static.
    pub fn static_attribute(&self, reference: &AttributeReference) -> Option<Value> {
        static_in(&self.nodes, &self.inlined, reference)
    }

    /// Replace every statically known reference with its value; the rest stay
    /// as references.
    pub fn inline_static(&self, value: &Value) -> Value {
        substitute_static(value, &|r: &AttributeReference| self.static_attribute(r))
    }

    /// Resolve a reference against materialized state.
    ///
    /// Materialized values win; otherwise a declared attribute is resolved
    /// through its own references. Computed attributes of an unmaterialized
    /// target fail with `NotMaterialized`.
    pub fn resolve(
        &self,
        reference: &AttributeReference,
        state: &MaterializedState,
    ) -> Result<serde_json::Value> {
        let upstream = self.resolve_upstream([&reference.target], state);
        self.lookup(reference, state, &upstream).map_err(unresolved)
    }

    /// Substitute every reference inside `value`.
    pub fn resolve_value(
        &self,
        value: &Value,
        state: &MaterializedState,
    ) -> Result<serde_json::Value> {
        let references = value.references();
        let upstream = self.resolve_upstream(references.iter().map(|r| &r.target), state);
        substitute_resolved(value, &mut |r: &AttributeReference| {
            self.lookup(r, state, &upstream)
        })
        .map_err(unresolved)
    }

    /// Resolve the declared attributes of `targets` and everything they
    /// depend on, in apply order, so each reference finds its target already
    /// resolved.
    fn resolve_upstream<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a ResourceId>,
        state: &MaterializedState,
    ) -> FxHashMap<usize, IndexMap<String, Resolution>> {
        let mut reachable = vec![false; self.nodes.len()];
        let mut pending: Vec<usize> = targets
            .into_iter()
            .filter_map(|id| self.nodes.get_index_of(id))
            .collect();
        while let Some(i) = pending.pop() {
            if !std::mem::replace(&mut reachable[i], true) {
                pending.extend(self.edges[i].iter().copied().filter(|&d| !reachable[d]));
            }
        }

        let mut resolved: FxHashMap<usize, IndexMap<String, Resolution>> = FxHashMap::default();
        for &i in self.order.iter().filter(|&&i| reachable[i]) {
            let attributes: IndexMap<String, Resolution> = self.nodes[i]
                .attributes()
                .iter()
                .map(|(k, v)| {
                    let value = substitute_resolved(v, &mut |r: &AttributeReference| {
                        self.lookup(r, state, &resolved)
                    });
                    (k.clone(), value)
                })
                .collect();
            resolved.insert(i, attributes);
        }
        resolved
    }

    fn lookup(
        &self,
        reference: &AttributeReference,
        state: &MaterializedState,
        resolved: &FxHashMap<usize, IndexMap<String, Resolution>>,
    ) -> Resolution {
        let fail = |reason| Err((reference.clone(), reason));
        let Some(i) = self.nodes.get_index_of(&reference.target) else {
            return fail(UnresolvedReason::UndeclaredTarget);
        };

        let materialized = state.get(&reference.target);
        if let Some(value) = materialized.and_then(|attrs| attrs.get(&reference.attribute)) {
            return Ok(value.clone());
        }
        if let Some(declared) = resolved.get(&i).and_then(|attrs| attrs.get(&reference.attribute)) {
            return declared.clone();
        }
        let node = &self.nodes[i];
        if materialized.is_none() && resources::is_computed(node.resource_type(), &reference.attribute) {
            return fail(UnresolvedReason::NotMaterialized);
        }
        fail(UnresolvedReason::UnknownAttribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::Registry;
    use crate::core::resource::NodeDecl;
    use crate::core::value::reference;
    use pretty_assertions::assert_eq;

    fn project() -> Project {
        Project::new(
            ProjectId::new("coinbase", "step-deployer"),
            vec!["step".to_string()],
        )
    }

    fn id(s: &str) -> ResourceId {
        s.parse().unwrap()
    }

    fn order_of(graph: &DependencyGraph) -> Vec<String> {
        graph.order().iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_rg009_state_machine_example() {
        let mut p = project();
        let r = p.declare(NodeDecl::new("aws_iam_role", "r")).unwrap();
        let role_arn = p.node(&r).unwrap().to_reference("arn");
        let m = p
            .declare(
                NodeDecl::new("aws_sfn_state_machine", "m")
                    .attribute("role_arn", role_arn)
                    .depends_on(r.clone()),
            )
            .unwrap();
        let graph = build(&p).unwrap();
        assert_eq!(graph.order(), vec![&r, &m]);
        assert_eq!(
            graph.node(&m).unwrap().attribute("role_arn"),
            Some(&Value::Ref(reference(r, "arn")))
        );
    }

    #[test]
    fn test_rg009_forward_reference() {
        // The lambda is declared before the role it references
        let mut p = project();
        p.declare(
            NodeDecl::new("aws_lambda_function", "f")
                .attribute("role", reference(id("aws_iam_role.r"), "arn")),
        )
        .unwrap();
        p.declare(NodeDecl::new("aws_iam_role", "r")).unwrap();
        let graph = build(&p).unwrap();
        assert_eq!(order_of(&graph), vec!["aws_iam_role.r", "aws_lambda_function.f"]);
    }

    #[test]
    fn test_rg009_declaration_order_tie_breaking() {
        let mut p = project();
        for name in ["zeta", "alpha", "mid"] {
            p.declare(NodeDecl::new("aws_s3_bucket", name)).unwrap();
        }
        let graph = build(&p).unwrap();
        assert_eq!(
            order_of(&graph),
            vec!["aws_s3_bucket.zeta", "aws_s3_bucket.alpha", "aws_s3_bucket.mid"]
        );
    }

    #[test]
    fn test_rg009_diamond_levels() {
        let mut p = project();
        p.declare(NodeDecl::new("aws_iam_role", "top")).unwrap();
        p.declare(NodeDecl::new("aws_iam_role_policy", "right").depends_on(id("aws_iam_role.top")))
            .unwrap();
        p.declare(
            NodeDecl::new("aws_iam_role_policy", "left")
                .attribute("role", reference(id("aws_iam_role.top"), "id")),
        )
        .unwrap();
        p.declare(
            NodeDecl::new("aws_lambda_function", "bottom")
                .depends_on(id("aws_iam_role_policy.left"))
                .depends_on(id("aws_iam_role_policy.right")),
        )
        .unwrap();
        let graph = build(&p).unwrap();
        assert_eq!(
            order_of(&graph),
            vec![
                "aws_iam_role.top",
                "aws_iam_role_policy.right",
                "aws_iam_role_policy.left",
                "aws_lambda_function.bottom"
            ]
        );
        let levels: Vec<usize> = graph.levels().iter().map(Vec::len).collect();
        assert_eq!(levels, vec![1, 2, 1]);
        assert_eq!(graph.level_of(&id("aws_lambda_function.bottom")), Some(2));
    }

    #[test]
    fn test_rg009_mutual_dependency_cycle() {
        let mut p = project();
        p.declare(NodeDecl::new("aws_iam_role", "a").depends_on(id("aws_iam_role.b")))
            .unwrap();
        p.declare(
            NodeDecl::new("aws_iam_role", "b").attribute("x", reference(id("aws_iam_role.a"), "arn")),
        )
        .unwrap();
        match build(&p).unwrap_err() {
            GraphError::CyclicDependency { path, .. } => {
                assert_eq!(
                    path,
                    vec![id("aws_iam_role.a"), id("aws_iam_role.b"), id("aws_iam_role.a")]
                );
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_rg009_self_reference_cycle() {
        let mut p = project();
        p.declare(
            NodeDecl::new("aws_iam_role", "a").attribute("me", reference(id("aws_iam_role.a"), "arn")),
        )
        .unwrap();
        match build(&p).unwrap_err() {
            GraphError::CyclicDependency { path, .. } => {
                assert_eq!(path, vec![id("aws_iam_role.a"), id("aws_iam_role.a")]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_rg009_cycle_path_excludes_tail() {
        // c depends on a, a <-> b: the reported cycle is a -> b -> a only
        let mut p = project();
        p.declare(NodeDecl::new("aws_iam_role", "c").depends_on(id("aws_iam_role.a")))
            .unwrap();
        p.declare(NodeDecl::new("aws_iam_role", "a").depends_on(id("aws_iam_role.b")))
            .unwrap();
        p.declare(NodeDecl::new("aws_iam_role", "b").depends_on(id("aws_iam_role.a")))
            .unwrap();
        match build(&p).unwrap_err() {
            GraphError::CyclicDependency { path, .. } => assert_eq!(
                path,
                vec![id("aws_iam_role.a"), id("aws_iam_role.b"), id("aws_iam_role.a")]
            ),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_rg009_unknown_attribute() {
        let mut p = project();
        p.declare(NodeDecl::new("aws_iam_role", "r").attribute("name", "step"))
            .unwrap();
        p.declare(
            NodeDecl::new("aws_lambda_function", "f")
                .attribute("role", reference(id("aws_iam_role.r"), "nmae")),
        )
        .unwrap();
        let err = build(&p).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnresolvedReference {
                reason: UnresolvedReason::UnknownAttribute,
                ..
            }
        ));
    }

    #[test]
    fn test_rg009_undeclared_target() {
        let mut p = project();
        p.declare(
            NodeDecl::new("aws_lambda_function", "f")
                .attribute("role", reference(id("aws_iam_role.ghost"), "arn")),
        )
        .unwrap();
        let err = build(&p).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnresolvedReference {
                reason: UnresolvedReason::UndeclaredTarget,
                ref referrer,
                ..
            } if *referrer == Some(id("aws_lambda_function.f"))
        ));
    }

    #[test]
    fn test_rg009_unknown_dependency() {
        let mut p = project();
        p.declare(NodeDecl::new("aws_s3_bucket", "b").depends_on(id("aws_iam_role.ghost")))
            .unwrap();
        assert!(matches!(
            build(&p).unwrap_err(),
            GraphError::UnknownDependency { .. }
        ));
    }

    #[test]
    fn test_rg009_lifecycle_validated_at_build() {
        let mut p = project();
        p.declare(NodeDecl::new("aws_s3_bucket", "b").ignore_changes(["acl"]))
            .unwrap();
        assert!(matches!(
            build(&p).unwrap_err(),
            GraphError::UnknownLifecycleAttribute { .. }
        ));
    }

    #[test]
    fn test_rg009_duplicate_edges_collapse() {
        let mut p = project();
        p.declare(NodeDecl::new("aws_iam_role", "r")).unwrap();
        p.declare(
            NodeDecl::new("aws_lambda_function", "f")
                .attribute("role", reference(id("aws_iam_role.r"), "arn"))
                .attribute("role_id", reference(id("aws_iam_role.r"), "id"))
                .depends_on(id("aws_iam_role.r")),
        )
        .unwrap();
        let graph = build(&p).unwrap();
        assert_eq!(graph.dependencies(&id("aws_lambda_function.f")).len(), 1);
        assert_eq!(graph.edges().count(), 1);
    }

    fn resolvable() -> DependencyGraph {
        let mut p = project();
        p.declare(NodeDecl::new("aws_iam_role", "r").attribute("name", "step-role"))
            .unwrap();
        p.declare(
            NodeDecl::new("aws_lambda_function", "f")
                .attribute("role", reference(id("aws_iam_role.r"), "arn"))
                .attribute("role_name", reference(id("aws_iam_role.r"), "name")),
        )
        .unwrap();
        build(&p).unwrap()
    }

    #[test]
    fn test_rg009_resolve_static_attribute_without_state() {
        let graph = resolvable();
        let value = graph
            .resolve(&reference(id("aws_iam_role.r"), "name"), &MaterializedState::new())
            .unwrap();
        assert_eq!(value, serde_json::json!("step-role"));
    }

    #[test]
    fn test_rg009_resolve_computed_requires_materialization() {
        let graph = resolvable();
        let arn = reference(id("aws_iam_role.r"), "arn");
        let err = graph.resolve(&arn, &MaterializedState::new()).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnresolvedReference {
                reason: UnresolvedReason::NotMaterialized,
                ..
            }
        ));

        let mut state = MaterializedState::new();
        state.insert(
            id("aws_iam_role.r"),
            IndexMap::from([(
                "arn".to_string(),
                serde_json::json!("arn:aws:iam::123:role/step-role"),
            )]),
        );
        assert_eq!(
            graph.resolve(&arn, &state).unwrap(),
            serde_json::json!("arn:aws:iam::123:role/step-role")
        );
    }

    #[test]
    fn test_rg009_resolve_absent_from_final_attributes() {
        let graph = resolvable();
        let mut state = MaterializedState::new();
        state.insert(id("aws_iam_role.r"), IndexMap::new());
        let err = graph
            .resolve(&reference(id("aws_iam_role.r"), "arn"), &state)
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnresolvedReference {
                reason: UnresolvedReason::UnknownAttribute,
                ..
            }
        ));
    }

    #[test]
    fn test_rg009_resolve_undeclared_target() {
        let graph = resolvable();
        let err = graph
            .resolve(&reference(id("aws_iam_role.ghost"), "arn"), &MaterializedState::new())
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnresolvedReference {
                reason: UnresolvedReason::UndeclaredTarget,
                ..
            }
        ));
    }

    #[test]
    fn test_rg009_resolve_value_recursive() {
        let graph = resolvable();
        let mut state = MaterializedState::new();
        state.insert(
            id("aws_iam_role.r"),
            IndexMap::from([("arn".to_string(), serde_json::json!("arn:r"))]),
        );
        let f = graph.node(&id("aws_lambda_function.f")).unwrap();
        let resolved: serde_json::Value = f
            .attributes()
            .values()
            .map(|v| graph.resolve_value(v, &state).unwrap())
            .collect();
        assert_eq!(resolved, serde_json::json!(["arn:r", "step-role"]));
    }

    #[test]
    fn test_rg009_inline_static() {
        let graph = resolvable();
        let f = graph.node(&id("aws_lambda_function.f")).unwrap();
        assert_eq!(
            graph.inline_static(f.attribute("role_name").unwrap()),
            Value::from("step-role")
        );
        assert!(matches!(
            graph.inline_static(f.attribute("role").unwrap()),
            Value::Ref(_)
        ));
    }

    fn bucket(i: usize) -> ResourceId {
        ResourceId::new("aws_s3_bucket", format!("b{}", i))
    }

    const DEEP: usize = 20_000;

    #[test]
    fn test_rg009_deep_forward_chain_on_worker_threads() {
        // Each bucket depends on the next one declared, so the walk from the
        // first bucket runs the full length of the chain
        let mut r = Registry::new();
        let p = r.register_project("coinbase", "deep", vec![]).unwrap();
        for i in 0..DEEP {
            let mut decl = NodeDecl::new("aws_s3_bucket", format!("b{}", i));
            if i + 1 < DEEP {
                decl = decl.depends_on(bucket(i + 1));
            }
            p.declare(decl).unwrap();
        }
        let graphs = r.build_all().unwrap();
        let order = graphs[0].order();
        assert_eq!(order.len(), DEEP);
        assert_eq!(order[0], &bucket(DEEP - 1));
        assert_eq!(order[DEEP - 1], &bucket(0));
        assert_eq!(graphs[0].level_of(&bucket(0)), Some(DEEP - 1));
    }

    #[test]
    fn test_rg009_deep_cycle_reported() {
        let mut p = project();
        for i in 0..DEEP {
            p.declare(NodeDecl::new("aws_s3_bucket", format!("b{}", i)).depends_on(bucket((i + 1) % DEEP)))
                .unwrap();
        }
        match build(&p).unwrap_err() {
            GraphError::CyclicDependency { path, .. } => {
                assert_eq!(path.len(), DEEP + 1);
                assert_eq!(path[0], bucket(0));
                assert_eq!(path[1], bucket(1));
                assert_eq!(path[DEEP], bucket(0));
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_rg009_deep_reference_chain_resolves() {
        let mut p = project();
        p.declare(NodeDecl::new("aws_s3_bucket", "b0").attribute("bucket", "logs"))
            .unwrap();
        for i in 1..DEEP {
            p.declare(
                NodeDecl::new("aws_s3_bucket", format!("b{}", i))
                    .attribute("bucket", reference(bucket(i - 1), "bucket")),
            )
            .unwrap();
        }
        let graph = build(&p).unwrap();
        let last = reference(bucket(DEEP - 1), "bucket");
        assert_eq!(
            graph.resolve(&last, &MaterializedState::new()).unwrap(),
            serde_json::json!("logs")
        );
        assert_eq!(graph.static_attribute(&last), Some(Value::from("logs")));
    }

    #[test]
    fn test_rg009_shared_references_inline_once() {
        // Every node references the previous node's attribute twice; the
        // root attribute is provider-computed so nothing becomes static
        let mut p = project();
        p.declare(NodeDecl::new("aws_iam_role", "r")).unwrap();
        p.declare(
            NodeDecl::new("aws_s3_bucket", "b0").attribute("a", reference(id("aws_iam_role.r"), "arn")),
        )
        .unwrap();
        for i in 1..40 {
            let prev = reference(bucket(i - 1), "a");
            p.declare(
                NodeDecl::new("aws_s3_bucket", format!("b{}", i))
                    .attribute("a", Value::List(vec![prev.clone().into(), prev.into()])),
            )
            .unwrap();
        }
        let started = std::time::Instant::now();
        let graph = build(&p).unwrap();
        let last = graph.inlined_attributes(&bucket(39)).unwrap();
        assert_eq!(
            last["a"],
            Value::List(vec![
                reference(bucket(38), "a").into(),
                reference(bucket(38), "a").into()
            ])
        );
        assert_eq!(graph.static_attribute(&reference(bucket(39), "a")), None);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
