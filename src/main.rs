mod cli;
mod daemon;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{LogLevel, Verbosity};
use macros_rs::{crashln, str, string};
use std::path::PathBuf;

use botpanel::{config, helpers};

#[derive(Copy, Clone, Debug, Default)]
struct NoneLevel;
impl LogLevel for NoneLevel {
    fn default() -> Option<log::Level> { None }
}

#[derive(Parser)]
#[command(version = str!(cli::get_version(false)))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(flatten)]
    verbose: Verbosity<NoneLevel>,
    /// Config file (defaults to ~/.botpanel/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Relaunch saved programs, then serve the chat panel and health endpoint
    #[command(visible_alias = "start")]
    Serve,
    /// List tracked programs
    #[command(visible_alias = "ls")]
    List {
        /// Format output
        #[arg(long, default_value_t = string!("default"))]
        format: String,
    },
    /// Show the tail of a program's log
    #[command(visible_alias = "log")]
    Logs {
        /// Program name, as shown by `list`
        name: String,
        /// Number of lines to show
        #[arg(long, default_value_t = 50)]
        lines: usize,
        /// Show the error log instead of the output log
        #[arg(long)]
        errors: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let mut env = env_logger::Builder::new();
    let level = cli.verbose.log_level_filter();

    env.filter_level(level).init();

    let config = match config::read(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => crashln!("{} {err}", *helpers::FAIL),
    };

    match &cli.command {
        Commands::Serve => daemon::serve(config),
        Commands::List { format } => cli::list(&config, format),
        Commands::Logs { name, lines, errors } => cli::logs(&config, name, *lines, *errors),
    };
}
