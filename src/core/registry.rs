//! RG-005: Project/environment registry and naming conventions.
//!
//! The registry is the only intentionally-scoped mutable context: every
//! declaration is applied against an explicit project handle obtained here,
//! never against an implicit "current" project.

use super::error::{GraphError, Result};
use super::planner;
use super::project::Project;
use super::resolver::{self, DependencyGraph};
use super::template::{Context, TemplateExpander, TemplateRegistry};
use super::types::{Environment, Plan, ProjectId, ResourceId};
use indexmap::IndexMap;

/// Supplies name prefixes consumed during template expansion.
pub trait NamingConvention: Send + Sync {
    fn prefix(&self, project: &ProjectId) -> String;
}

/// `"<org>-<project>-"`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNaming;

impl NamingConvention for DefaultNaming {
    fn prefix(&self, project: &ProjectId) -> String {
        format!("{}-{}-", project.org, project.name)
    }
}

pub struct Registry {
    environments: IndexMap<String, Environment>,
    projects: IndexMap<ProjectId, Project>,
    naming: Box<dyn NamingConvention>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("environments", &self.environments)
            .field("projects", &self.projects.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_naming(Box::new(DefaultNaming))
    }

    pub fn with_naming(naming: Box<dyn NamingConvention>) -> Self {
        Self {
            environments: IndexMap::new(),
            projects: IndexMap::new(),
            naming,
        }
    }

    pub fn register_environment(
        &mut self,
        name: impl Into<String>,
        region: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Result<&Environment> {
        let env = Environment {
            name: name.into(),
            region: region.into(),
            account_id: account_id.into(),
        };
        if env.region.trim().is_empty() {
            return Err(GraphError::InvalidEnvironment {
                name: env.name,
                message: "region must not be empty".to_string(),
            });
        }
        if env.account_id.trim().is_empty() {
            return Err(GraphError::InvalidEnvironment {
                name: env.name,
                message: "account_id must not be empty".to_string(),
            });
        }
        if self.environments.contains_key(&env.name) {
            return Err(GraphError::DuplicateEnvironment { name: env.name });
        }
        tracing::debug!(environment = %env.name, region = %env.region, "registered environment");
        let name = env.name.clone();
        Ok(self.environments.entry(name).or_insert(env))
    }

    /// Register a project; every listed environment must already exist.
    pub fn register_project(
        &mut self,
        org: impl Into<String>,
        name: impl Into<String>,
        environments: Vec<String>,
    ) -> Result<&mut Project> {
        let id = ProjectId::new(org, name);
        if let Some(unknown) = environments
            .iter()
            .find(|e| !self.environments.contains_key(*e))
        {
            return Err(GraphError::UnknownEnvironment {
                project: id,
                environment: unknown.clone(),
            });
        }
        if self.projects.contains_key(&id) {
            return Err(GraphError::DuplicateProject { project: id });
        }
        tracing::debug!(project = %id, ?environments, "registered project");
        Ok(self
            .projects
            .entry(id.clone())
            .or_insert_with(|| Project::new(id, environments)))
    }

    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.get(name)
    }

    pub fn environments(&self) -> impl Iterator<Item = &Environment> {
        self.environments.values()
    }

    pub fn project(&self, id: &ProjectId) -> Result<&Project> {
        self.projects
            .get(id)
            .ok_or_else(|| GraphError::UnknownProject { project: id.clone() })
    }

    pub fn project_mut(&mut self, id: &ProjectId) -> Result<&mut Project> {
        self.projects
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownProject { project: id.clone() })
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Tag mapping inherited by every node of the project.
    pub fn tags(&self, id: &ProjectId) -> Result<&IndexMap<String, String>> {
        self.project(id).map(Project::tags)
    }

    pub fn naming(&self) -> &dyn NamingConvention {
        self.naming.as_ref()
    }

    /// Expand a template into one of the registered projects using this
    /// registry's naming convention.
    pub fn expand_template(
        &mut self,
        project: &ProjectId,
        templates: &TemplateRegistry,
        template: &str,
        instance: &str,
        context: &Context,
    ) -> Result<Vec<ResourceId>> {
        let target = self
            .projects
            .get_mut(project)
            .ok_or_else(|| GraphError::UnknownProject {
                project: project.clone(),
            })?;
        TemplateExpander::new(templates, self.naming.as_ref()).expand(target, template, instance, context)
    }

    /// Environments a project deploys to, in declared order.
    pub fn project_environments(&self, id: &ProjectId) -> Result<Vec<Environment>> {
        let project = self.project(id)?;
        Ok(project
            .environments()
            .iter()
            .filter_map(|name| self.environments.get(name).cloned())
            .collect())
    }

    /// Build one project's graph and emit its plan.
    pub fn plan(&self, id: &ProjectId) -> Result<Plan> {
        let graph = resolver::build(self.project(id)?)?;
        Ok(planner::plan(&graph, self.project_environments(id)?))
    }

    /// Build every project's graph. Projects share no mutable state, so each
    /// is built on its own scoped thread; the first failure in registration
    /// order is returned.
    pub fn build_all(&self) -> Result<Vec<DependencyGraph>> {
        let results: Vec<Result<DependencyGraph>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .projects
                .values()
                .map(|project| scope.spawn(move || resolver::build(project)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });
        results.into_iter().collect()
    }
}
