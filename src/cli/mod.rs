//! RG-015: CLI subcommands — init, validate, plan, graph.

use crate::core::registry::Registry;
use crate::core::types::{Plan, ProjectId, ReferenceBinding};
use crate::core::value::Value;
use crate::core::{dot, parser, resolver};
use anyhow::{bail, Context};
use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new declaration file with an example template
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Load declarations and build every project's graph
    Validate {
        /// Path to resgraph.yaml
        #[arg(short, long, default_value = "resgraph.yaml")]
        file: PathBuf,
    },

    /// Show the ordered plan with reference bindings
    Plan {
        /// Path to resgraph.yaml
        #[arg(short, long, default_value = "resgraph.yaml")]
        file: PathBuf,

        /// Target a single project (org/name)
        #[arg(short, long)]
        project: Option<ProjectId>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print a project's dependency graph in Graphviz DOT format
    Graph {
        /// Path to resgraph.yaml
        #[arg(short, long, default_value = "resgraph.yaml")]
        file: PathBuf,

        /// Project to render (org/name)
        #[arg(short, long)]
        project: ProjectId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan {
            file,
            project,
            format,
        } => cmd_plan(&file, project.as_ref(), format),
        Commands::Graph { file, project } => cmd_graph(&file, &project),
    }
}

const INIT_CONFIG: &str = r#"version: "1.0"
templates_dir: templates

environments:
  - name: development
    region: us-east-1
    account_id: "000000000000"

projects:
  - org: example
    name: deployer
    environments: [development]
    tags:
      ProjectName: example/deployer
    declarations:
      - template:
          name: assumed_role
          instance: assumed
          context:
            role_name: example-deployer-assumed
      - resource:
          type: aws_sfn_state_machine
          name: deployer
          attributes:
            role_arn: { $ref: aws_iam_role.assumed/role.arn }
"#;

const INIT_TEMPLATE: &str = r#"template:
  name: assumed_role
  description: "IAM role with a project-prefixed description"
  context:
    role_name:
      type: string
    path:
      type: string
      default: /

resources:
  - type: aws_iam_role
    name: role
    attributes:
      name: "{{context.role_name}}"
      path: "{{context.path}}"
      description: "{{naming.prefix}}{{instance}}"
"#;

fn cmd_init(path: &Path) -> anyhow::Result<()> {
    let config_path = path.join("resgraph.yaml");
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }

    let templates_dir = path.join("templates");
    std::fs::create_dir_all(&templates_dir)
        .with_context(|| format!("cannot create {}", templates_dir.display()))?;
    let template_path = templates_dir.join("assumed_role.yaml");
    std::fs::write(&template_path, INIT_TEMPLATE)
        .with_context(|| format!("cannot write {}", template_path.display()))?;
    std::fs::write(&config_path, INIT_CONFIG)
        .with_context(|| format!("cannot write {}", config_path.display()))?;

    println!("Initialized resgraph project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}", template_path.display());
    Ok(())
}

fn load(file: &Path) -> anyhow::Result<Registry> {
    parser::load(file).with_context(|| format!("failed to load {}", file.display()))
}

fn cmd_validate(file: &Path) -> anyhow::Result<()> {
    let registry = load(file)?;
    let graphs = registry.build_all().context("graph validation failed")?;
    let resources: usize = graphs.iter().map(|g| g.len()).sum();
    println!(
        "OK: {} environments, {} projects, {} resources",
        registry.environments().count(),
        graphs.len(),
        resources
    );
    Ok(())
}

fn cmd_plan(file: &Path, project: Option<&ProjectId>, format: OutputFormat) -> anyhow::Result<()> {
    let registry = load(file)?;
    let plans: Vec<Plan> = match project {
        Some(id) => vec![registry.plan(id)?],
        None => registry
            .projects()
            .map(|p| registry.plan(p.id()))
            .collect::<crate::Result<_>>()?,
    };

    match format {
        OutputFormat::Text => {
            for plan in &plans {
                print!("{}", render_plan(plan));
            }
        }
        OutputFormat::Json => {
            let out = if project.is_some() {
                serde_json::to_string_pretty(&plans[0])?
            } else {
                serde_json::to_string_pretty(&plans)?
            };
            println!("{}", out);
        }
        OutputFormat::Yaml => {
            let out = if project.is_some() {
                serde_yaml_ng::to_string(&plans[0])?
            } else {
                serde_yaml_ng::to_string(&plans)?
            };
            print!("{}", out);
        }
    }
    Ok(())
}

fn cmd_graph(file: &Path, project: &ProjectId) -> anyhow::Result<()> {
    let registry = load(file)?;
    let graph = resolver::build(registry.project(project)?)?;
    print!("{}", dot::to_dot(&graph));
    Ok(())
}

/// Human-readable plan, grouped by level.
fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();
    let envs: Vec<&str> = plan.environments.iter().map(|e| e.name.as_str()).collect();
    out.push_str(&format!(
        "Planning: {} ({} resources; environments: {})\n\n",
        plan.project,
        plan.resources.len(),
        if envs.is_empty() { "-".to_string() } else { envs.join(", ") }
    ));

    for (level, wave) in plan.levels.iter().enumerate() {
        out.push_str(&format!("level {}:\n", level));
        for id in wave {
            let Some(resource) = plan.resources.iter().find(|r| &r.id == id) else {
                continue;
            };
            out.push_str(&format!("  + {}", resource.id));
            if !resource.depends_on.is_empty() {
                let deps: Vec<String> = resource.depends_on.iter().map(ToString::to_string).collect();
                out.push_str(&format!("  <- {}", deps.join(", ")));
            }
            out.push('\n');
            for (name, value) in &resource.attributes {
                if let Value::Ref(r) = value {
                    out.push_str(&format!("      {} = ${{{}}} (deferred)\n", name, r));
                }
            }
            if !resource.ignore_changes.is_empty() {
                out.push_str(&format!(
                    "      ignore_changes: {}\n",
                    resource.ignore_changes.join(", ")
                ));
            }
        }
    }

    let statics = plan
        .references
        .values()
        .filter(|b| matches!(b, ReferenceBinding::Static { .. }))
        .count();
    out.push_str(&format!(
        "\nPlan: {} resources in {} levels, {} deferred and {} static references.\n\n",
        plan.resources.len(),
        plan.levels.len(),
        plan.deferred_count(),
        statics
    ));
    out
}
