//! Resgraph CLI — declarative resource graphs with deferred references.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "resgraph",
    version,
    about = "Declarative cloud resource graphs: validate references, order dependencies, emit plans"
)]
struct Cli {
    #[command(subcommand)]
    command: resgraph::cli::Commands,
}

fn main() {
    // Logs go to stderr; stdout carries plan output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RESGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = resgraph::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {}", cause);
        }
        std::process::exit(1);
    }
}
