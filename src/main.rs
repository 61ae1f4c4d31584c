mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{SelectionArgs, UpgradeContext, WorkflowCommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pg-upgrader",
    version,
    about = "Backup, recriação e restauração de um serviço Postgres do docker compose"
)]
struct Cli {
    /// Arquivo de configuração (default: <project-dir>/pg-upgrader.toml)
    #[arg(long, env = "PG_UPGRADER_CONFIG")]
    config: Option<PathBuf>,

    /// Diretório do projeto compose
    #[arg(long, env = "PG_UPGRADER_PROJECT_DIR", default_value = ".")]
    project_dir: PathBuf,

    /// Mostra comandos executados e detalhes de verificação
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    selection: SelectionArgs,

    #[command(subcommand)]
    command: WorkflowCommand,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = UpgradeContext::load(&cli.project_dir, cli.config.as_deref(), cli.selection)?;
    cli::workflow::run(cli.command, &ctx)
}
