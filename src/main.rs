/// Bakes the build environment into source files.
///
/// Functions deployed from a build often read `process.env` at runtime, where
/// the build's variables no longer exist. Before the build, every reference is
/// replaced by its literal value; after the build, the untouched originals are
/// put back so the working tree never keeps the secrets.
use anyhow::Result;
use bundle_env::core::config::ConfigProvider;
use bundle_env::utils::{self, Overrides};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bundle-env", version)]
#[command(about = "Substitute environment variables into sources for a build and restore them afterwards")]
struct Cli {
    /// Working directory targets are resolved against
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Configuration file (defaults to bundle-env.toml in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every decision
    #[arg(long, global = true)]
    debug: bool,

    /// Only print warnings and the summary
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Check the configuration for problems
    Validate,
    /// Substitute variables and back up the originals
    PreBuild {
        #[command(flatten)]
        overrides: Overrides,
        /// Print the status summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore the originals and remove the backups
    PostBuild {
        #[command(flatten)]
        overrides: Overrides,
        /// Print the status summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pre-build, run the build command, then post-build
    Run {
        #[command(flatten)]
        overrides: Overrides,
        /// The build command and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// List files waiting to be restored
    Status {
        #[command(flatten)]
        overrides: Overrides,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let manager = utils::config_manager(cli.cwd, cli.config)?;
    let working_dir = manager.get_working_dir().to_path_buf();

    match cli.command {
        Commands::Init => {
            utils::init_logger(cli.debug, cli.quiet);
            utils::initialize_config(&manager)
        }
        Commands::Validate => {
            utils::init_logger(cli.debug, cli.quiet);
            log::debug!("Validating {}", manager.get_config_path()?.display());
            utils::validate_config(&manager)
        }
        Commands::PreBuild { overrides, json } => {
            let config = utils::load_config(&manager, overrides, cli.debug, cli.quiet)?;
            utils::pre_build(&working_dir, config, json)
        }
        Commands::PostBuild { overrides, json } => {
            let config = utils::load_config(&manager, overrides, cli.debug, cli.quiet)?;
            utils::post_build(&working_dir, config, json)
        }
        Commands::Run { overrides, command } => {
            let config = utils::load_config(&manager, overrides, cli.debug, cli.quiet)?;
            let code = utils::run_build(&working_dir, config, &command)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Status { overrides } => {
            let config = utils::load_config(&manager, overrides, cli.debug, cli.quiet)?;
            utils::show_status(&working_dir, config)
        }
    }
}
