//! CLI implementation for ciscope

mod commands;
mod config;
mod display;
mod signal;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use ciscope::DetectionLevel;

use commands::{cmd_analyze, cmd_classify, cmd_graph, cmd_packages, AnalyzeArgs};
use config::find_project_root;

/// Output format for `analyze`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// key=value lines
    Kv,
    /// The full report as JSON
    Json,
    /// Colored summary
    Text,
}

/// Output format for `packages`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum PackagesFormat {
    /// Packages grouped by kind as JSON
    Json,
    /// One `kind:path:id` line per package
    List,
    /// Colored listing with declared dependencies
    Text,
}

#[derive(Parser)]
#[command(name = "ciscope")]
#[command(about = "Change detection for CI: decide which jobs a change can skip")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root (default: enclosing git work tree)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Extra config file (TOML, or JSON by extension)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug info (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a change set and print the CI decision
    Analyze {
        /// Base revision (merge-base semantics)
        #[arg(long, default_value = "HEAD~1")]
        base: String,
        /// Head revision
        #[arg(long, default_value = "HEAD")]
        head: String,
        /// Read changed paths from a file instead of git ("-" for stdin)
        #[arg(long)]
        files: Option<PathBuf>,
        /// Detection level: quick, standard, comprehensive
        #[arg(short, long)]
        level: Option<DetectionLevel>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Kv)]
        format: OutputFormat,
        /// JSON report path, relative to the project root
        #[arg(long)]
        report: Option<PathBuf>,
        /// Don't write the JSON report
        #[arg(long)]
        no_report: bool,
        /// Append outputs to this file (GitHub Actions)
        #[arg(long, env = "GITHUB_OUTPUT")]
        github_output: Option<PathBuf>,
        /// Resolve monorepo packages
        #[arg(long)]
        monorepo: bool,
    },
    /// Classify paths (arguments, or one per line on stdin)
    Classify {
        paths: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List packages found in the project
    Packages {
        #[arg(long, value_enum, default_value_t = PackagesFormat::List)]
        format: PackagesFormat,
    },
    /// Build the import graph and print its shape
    Graph {
        /// Output the full graph as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Run CLI with pre-parsed arguments (main.rs inspects --verbose before tracing init)
pub fn run_with(cli: Cli) -> Result<()> {
    let root = match &cli.project {
        Some(p) => dunce::canonicalize(p).unwrap_or_else(|_| p.clone()),
        None => find_project_root(),
    };
    tracing::debug!(root = %root.display(), "Project root");
    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Commands::Analyze {
            base,
            head,
            files,
            level,
            format,
            report,
            no_report,
            github_output,
            monorepo,
        }) => cmd_analyze(
            &root,
            config_path,
            AnalyzeArgs {
                base,
                head,
                files,
                level,
                format,
                report,
                no_report,
                github_output,
                monorepo,
            },
        ),
        Some(Commands::Classify { paths, json }) => cmd_classify(&root, config_path, &paths, json),
        Some(Commands::Packages { format }) => cmd_packages(&root, config_path, format),
        Some(Commands::Graph { json }) => cmd_graph(&root, config_path, json),
        Some(Commands::Completions { shell }) => {
            cmd_completions(shell);
            Ok(())
        }
        None => {
            println!("Usage: ciscope <command>");
            println!("Run 'ciscope --help' for more information.");
            Ok(())
        }
    }
}

fn cmd_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    clap_complete::generate(shell, &mut Cli::command(), "ciscope", &mut std::io::stdout());
}
