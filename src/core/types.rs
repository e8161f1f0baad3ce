//! RG-001: Identities, the declaration file schema, and plan output types.
//!
//! Declaration types derive Deserialize for YAML loading; plan types derive
//! Serialize so the execution layer can consume them as JSON or YAML.

use super::value::{AttributeReference, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identities
// ============================================================================

/// Identity of a resource node within its project: `(type, local_name)`.
///
/// Serialized as `"type.local_name"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ResourceId {
    pub resource_type: String,
    pub local_name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            local_name: local_name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.local_name)
    }
}

impl FromStr for ResourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((ty, name)) if !ty.is_empty() && !name.is_empty() && !name.contains('.') => {
                Ok(Self::new(ty, name))
            }
            _ => Err(format!("expected 'type.name', got '{}'", s)),
        }
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ResourceId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Identity of a project: `(organization, name)`, displayed as `org/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ProjectId {
    pub org: String,
    pub name: String,
}

impl ProjectId {
    pub fn new(org: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.name)
    }
}

impl FromStr for ProjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((org, name)) if !org.is_empty() && !name.is_empty() => Ok(Self::new(org, name)),
            _ => Err(format!("expected 'org/name', got '{}'", s)),
        }
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ProjectId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ============================================================================
// Environments
// ============================================================================

/// A deployment target account/region. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub region: String,
    pub account_id: String,
}

// ============================================================================
// Declaration file
// ============================================================================

/// Root of a declaration file.
#[derive(Debug, Clone, Deserialize)]
pub struct DeclarationFile {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Directory of declarative templates, relative to the file
    #[serde(default)]
    pub templates_dir: Option<String>,

    #[serde(default)]
    pub environments: Vec<EnvironmentDecl>,

    #[serde(default)]
    pub projects: Vec<ProjectDecl>,
}

/// `environment(name) { region; account_id }`
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentDecl {
    pub name: String,
    pub region: String,
    pub account_id: String,
}

/// `project(org, name) { environments; tags; ... }`
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDecl {
    pub org: String,
    pub name: String,

    #[serde(default)]
    pub environments: Vec<String>,

    #[serde(default)]
    pub tags: IndexMap<String, String>,

    /// Resource and template declarations, evaluated in order
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

/// One entry of a project's declaration list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Declaration {
    Resource(ResourceDecl),
    Template(TemplateCall),
}

/// `resource(type, local_name) { ... }`
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub resource_type: String,

    pub name: String,

    #[serde(default)]
    pub attributes: IndexMap<String, Value>,

    /// Explicit dependencies as `type.name`
    #[serde(default)]
    pub depends_on: Vec<ResourceId>,

    #[serde(default)]
    pub lifecycle: LifecycleDecl,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifecycleDecl {
    #[serde(default)]
    pub ignore_changes: Vec<String>,
}

/// `from_template(template_name, instance_key, context)`
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateCall {
    pub name: String,
    pub instance: String,
    #[serde(default)]
    pub context: IndexMap<String, Value>,
}

// ============================================================================
// Plan
// ============================================================================

/// A resource in apply order, ready for the execution layer.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedResource {
    pub id: ResourceId,

    #[serde(rename = "type")]
    pub resource_type: String,

    pub name: String,

    /// Statically known references are inlined; the rest stay as `$ref` placeholders
    pub attributes: IndexMap<String, Value>,

    /// Explicit and reference-implied dependencies, in declaration order
    pub depends_on: Vec<ResourceId>,

    pub ignore_changes: Vec<String>,

    /// Topological depth; resources sharing a level may be applied concurrently
    pub level: usize,

    /// BLAKE3 hash of the desired state
    pub hash: String,
}

/// How the execution layer obtains a referenced value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReferenceBinding {
    /// Known before anything is applied
    Static { value: serde_json::Value },
    /// Available only after the target is materialized
    Deferred {
        target: ResourceId,
        attribute: String,
        computed: bool,
    },
}

/// The ordered, fully-referenced output handed to an execution collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub project: ProjectId,
    pub environments: Vec<Environment>,
    pub resources: Vec<PlannedResource>,
    pub levels: Vec<Vec<ResourceId>>,
    pub references: IndexMap<AttributeReference, ReferenceBinding>,
}

impl Plan {
    /// Resource IDs in apply order.
    pub fn execution_order(&self) -> Vec<&ResourceId> {
        self.resources.iter().map(|r| &r.id).collect()
    }

    pub fn deferred_count(&self) -> usize {
        self.references
            .values()
            .filter(|b| matches!(b, ReferenceBinding::Deferred { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rg001_resource_id_parse() {
        let id: ResourceId = "aws_iam_role.step-deployer/role".parse().unwrap();
        assert_eq!(id.resource_type, "aws_iam_role");
        assert_eq!(id.local_name, "step-deployer/role");
        assert_eq!(id.to_string(), "aws_iam_role.step-deployer/role");
    }

    #[test]
    fn test_rg001_resource_id_parse_rejects_malformed() {
        assert!("aws_iam_role".parse::<ResourceId>().is_err());
        assert!(".r".parse::<ResourceId>().is_err());
        assert!("a.b.c".parse::<ResourceId>().is_err());
    }

    #[test]
    fn test_rg001_project_id_parse() {
        let id: ProjectId = "coinbase/step-deployer".parse().unwrap();
        assert_eq!(id, ProjectId::new("coinbase", "step-deployer"));
        assert!("coinbase".parse::<ProjectId>().is_err());
    }

    #[test]
    fn test_rg001_declaration_file_parse() {
        let yaml = r#"
version: "1.0"
environments:
  - name: development
    region: us-east-1
    account_id: "123"
projects:
  - org: coinbase
    name: step-deployer
    environments: [development]
    tags:
      ProjectName: coinbase/step-deployer
    declarations:
      - resource:
          type: aws_iam_role
          name: r
          attributes:
            name: step-role
          lifecycle:
            ignore_changes: [name]
      - resource:
          type: aws_sfn_state_machine
          name: m
          attributes:
            role_arn: { $ref: aws_iam_role.r.arn }
          depends_on: [aws_iam_role.r]
      - template:
          name: step_assumed
          instance: assumed
          context:
            assumed_role_name: coinbase-step-deployer-assumed
"#;
        let file: DeclarationFile = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(file.version, "1.0");
        assert_eq!(file.environments[0].account_id, "123");
        let project = &file.projects[0];
        assert_eq!(project.declarations.len(), 3);
        match &project.declarations[1] {
            Declaration::Resource(r) => {
                assert_eq!(r.depends_on, vec![ResourceId::new("aws_iam_role", "r")]);
                assert!(matches!(r.attributes["role_arn"], Value::Ref(_)));
            }
            other => panic!("expected resource, got {:?}", other),
        }
        match &project.declarations[2] {
            Declaration::Template(t) => assert_eq!(t.instance, "assumed"),
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_rg001_reference_binding_serde() {
        let binding = ReferenceBinding::Deferred {
            target: ResourceId::new("aws_iam_role", "r"),
            attribute: "arn".to_string(),
            computed: true,
        };
        let json = serde_json::to_string(&binding).unwrap();
        assert!(json.contains("\"status\":\"deferred\""));
        assert!(json.contains("\"target\":\"aws_iam_role.r\""));
    }
}
