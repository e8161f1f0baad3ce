//! RG-012: Plan generation — ordered, reference-annotated output of a frozen graph.

use super::hasher;
use super::resolver::DependencyGraph;
use super::resource::ResourceNode;
use super::types::*;
use super::value::{AttributeReference, Value};
use crate::resources;
use indexmap::IndexMap;

/// Emit the plan for a frozen graph.
///
/// Resources appear in apply order. Statically known references are inlined;
/// references that need a materialized target stay as `$ref` placeholders and
/// are listed as deferred bindings.
pub fn plan(graph: &DependencyGraph, environments: Vec<Environment>) -> Plan {
    let mut resources = Vec::with_capacity(graph.len());
    let mut references: IndexMap<AttributeReference, ReferenceBinding> = IndexMap::new();

    for id in graph.order() {
        let Some(node) = graph.node(id) else {
            continue;
        };

        for reference in node.references() {
            if !references.contains_key(reference) {
                references.insert(reference.clone(), bind(graph, reference));
            }
        }

        let attributes = graph.inlined_attributes(id).cloned().unwrap_or_default();
        let depends_on: Vec<ResourceId> = graph.dependencies(id).into_iter().cloned().collect();
        let hash = hash_desired_state(node, &attributes, &depends_on);

        resources.push(PlannedResource {
            id: id.clone(),
            resource_type: node.resource_type().to_string(),
            name: node.local_name().to_string(),
            attributes,
            depends_on,
            ignore_changes: graph.lifecycle().ignored_attributes(id),
            level: graph.level_of(id).unwrap_or(0),
            hash,
        });
    }

    let levels: Vec<Vec<ResourceId>> = graph
        .levels()
        .into_iter()
        .map(|wave| wave.into_iter().cloned().collect())
        .collect();

    tracing::debug!(
        project = %graph.project(),
        resources = resources.len(),
        references = references.len(),
        "plan generated"
    );

    Plan {
        project: graph.project().clone(),
        environments,
        resources,
        levels,
        references,
    }
}

fn bind(graph: &DependencyGraph, reference: &AttributeReference) -> ReferenceBinding {
    if let Some(value) = graph.static_attribute(reference) {
        return ReferenceBinding::Static {
            value: value.into(),
        };
    }
    let computed = graph.node(&reference.target).is_some_and(|target| {
        !target.declares(&reference.attribute)
            && resources::is_computed(target.resource_type(), &reference.attribute)
    });
    ReferenceBinding::Deferred {
        target: reference.target.clone(),
        attribute: reference.attribute.clone(),
        computed,
    }
}

/// Compute a hash of the desired state for change detection.
pub fn hash_desired_state(
    node: &ResourceNode,
    attributes: &IndexMap<String, Value>,
    depends_on: &[ResourceId],
) -> String {
    let attrs = Value::Map(attributes.clone()).canonical_json();
    let deps: Vec<String> = depends_on.iter().map(ToString::to_string).collect();
    let deps = deps.join(",");
    hasher::composite_hash(&[node.resource_type(), node.local_name(), attrs.as_str(), deps.as_str()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::Registry;
    use crate::core::resource::NodeDecl;
    use crate::core::value::reference;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> ResourceId {
        s.parse().unwrap()
    }

    fn step_deployer() -> Registry {
        let mut r = Registry::new();
        r.register_environment("step", "us-east-1", "123").unwrap();
        let p = r
            .register_project("coinbase", "step-deployer", vec!["step".to_string()])
            .unwrap();
        p.declare(NodeDecl::new("aws_iam_role", "r").attribute("name", "step-deployer-role"))
            .unwrap();
        p.declare(
            NodeDecl::new("aws_sfn_state_machine", "m")
                .attribute("role_arn", reference(id("aws_iam_role.r"), "arn"))
                .attribute("name", reference(id("aws_iam_role.r"), "name"))
                .depends_on(id("aws_iam_role.r"))
                .ignore_changes(["name"]),
        )
        .unwrap();
        r
    }

    fn plan_for(r: &Registry) -> Plan {
        r.plan(&ProjectId::new("coinbase", "step-deployer")).unwrap()
    }

    #[test]
    fn test_rg012_plan_order_and_levels() {
        let plan = plan_for(&step_deployer());
        assert_eq!(
            plan.execution_order(),
            vec![&id("aws_iam_role.r"), &id("aws_sfn_state_machine.m")]
        );
        assert_eq!(plan.levels.len(), 2);
        assert_eq!(plan.resources[1].level, 1);
        assert_eq!(plan.resources[1].depends_on, vec![id("aws_iam_role.r")]);
        assert_eq!(plan.environments[0].account_id, "123");
    }

    #[test]
    fn test_rg012_static_reference_inlined() {
        let plan = plan_for(&step_deployer());
        let machine = &plan.resources[1];
        assert_eq!(machine.attributes["name"], Value::from("step-deployer-role"));
        assert_eq!(
            machine.attributes["role_arn"],
            Value::Ref(reference(id("aws_iam_role.r"), "arn"))
        );
    }

    #[test]
    fn test_rg012_reference_bindings() {
        let plan = plan_for(&step_deployer());
        assert_eq!(plan.references.len(), 2);
        assert_eq!(plan.deferred_count(), 1);
        assert_eq!(
            plan.references[&reference(id("aws_iam_role.r"), "arn")],
            ReferenceBinding::Deferred {
                target: id("aws_iam_role.r"),
                attribute: "arn".to_string(),
                computed: true,
            }
        );
        assert_eq!(
            plan.references[&reference(id("aws_iam_role.r"), "name")],
            ReferenceBinding::Static {
                value: serde_json::json!("step-deployer-role")
            }
        );
    }

    #[test]
    fn test_rg012_ignore_changes_carried() {
        let plan = plan_for(&step_deployer());
        assert!(plan.resources[0].ignore_changes.is_empty());
        assert_eq!(plan.resources[1].ignore_changes, vec!["name".to_string()]);
    }

    #[test]
    fn test_rg012_hash_deterministic_and_sensitive() {
        let a = plan_for(&step_deployer());
        let b = plan_for(&step_deployer());
        assert_eq!(a.resources[0].hash, b.resources[0].hash);
        assert_ne!(a.resources[0].hash, a.resources[1].hash);
        assert!(a.resources[0].hash.starts_with("blake3:"));

        let mut r = Registry::new();
        r.register_environment("step", "us-east-1", "123").unwrap();
        r.register_project("coinbase", "step-deployer", vec![])
            .unwrap()
            .declare(NodeDecl::new("aws_iam_role", "r").attribute("name", "other"))
            .unwrap();
        let c = plan_for(&r);
        assert_ne!(a.resources[0].hash, c.resources[0].hash);
    }

    #[test]
    fn test_rg012_plan_serializes_refs_as_placeholders() {
        let plan = plan_for(&step_deployer());
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["project"], "coinbase/step-deployer");
        assert_eq!(
            json["resources"][1]["attributes"]["role_arn"],
            serde_json::json!({"$ref": "aws_iam_role.r.arn"})
        );
        assert_eq!(json["resources"][1]["type"], "aws_sfn_state_machine");
        assert_eq!(json["references"]["aws_iam_role.r.arn"]["status"], "deferred");
    }

    #[test]
    fn test_rg012_chained_static_references() {
        let mut r = Registry::new();
        let p = r.register_project("coinbase", "chain", vec![]).unwrap();
        p.declare(NodeDecl::new("aws_s3_bucket", "a").attribute("bucket", "logs"))
            .unwrap();
        p.declare(
            NodeDecl::new("aws_s3_bucket", "b")
                .attribute("bucket", reference(id("aws_s3_bucket.a"), "bucket")),
        )
        .unwrap();
        p.declare(
            NodeDecl::new("aws_s3_bucket", "c")
                .attribute("copy_of", reference(id("aws_s3_bucket.b"), "bucket")),
        )
        .unwrap();
        let plan = r.plan(&ProjectId::new("coinbase", "chain")).unwrap();
        assert_eq!(plan.resources[2].attributes["copy_of"], Value::from("logs"));
        assert_eq!(plan.deferred_count(), 0);
    }

    #[test]
    fn test_rg012_plan_with_repeated_deferred_references() {
        let mut r = Registry::new();
        let p = r.register_project("coinbase", "fanout", vec![]).unwrap();
        p.declare(NodeDecl::new("aws_iam_role", "r")).unwrap();
        let bucket = |i: usize| ResourceId::new("aws_s3_bucket", format!("b{}", i));
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
        let plan = r.plan(&ProjectId::new("coinbase", "fanout")).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(plan.resources.len(), 41);
        assert_eq!(plan.deferred_count(), 40);
        assert_eq!(
            plan.resources[40].attributes["a"],
            Value::List(vec![
                reference(bucket(38), "a").into(),
                reference(bucket(38), "a").into()
            ])
        );
    }
}
