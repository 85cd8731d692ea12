//! Sandsync CLI - mirror and instrument a local sandbox directory.
//!
//! # Usage
//!
//! ```bash
//! # Index a project once, adding element identifiers in place
//! sandsync index ./my-app
//!
//! # Keep it instrumented while editing
//! sandsync watch ./my-app
//!
//! # Look up an element by identifier
//! sandsync node ./my-app k3x9q2a
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sandsync_cli::{commands, output, OutputFormat};
use sandsync_core::ConfigProfile;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "sandsync")]
#[command(about = "Sandsync - sandbox mirror with JSX element identifiers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SANDSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Configuration profile
    #[arg(long, global = true)]
    profile: Option<ProfileArg>,

    /// Output format (human, json)
    #[arg(long, global = true, default_value = "human")]
    format: OutputFormatArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Dev,
    Prod,
    Test,
}

impl From<ProfileArg> for ConfigProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Dev => ConfigProfile::Dev,
            ProfileArg::Prod => ConfigProfile::Prod,
            ProfileArg::Test => ConfigProfile::Test,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory and instrument its source files
    Index {
        /// Sandbox directory
        #[arg(default_value = ".")]
        root: PathBuf,
    },

    /// Index a directory and keep it in sync until interrupted
    Watch {
        /// Sandbox directory
        #[arg(default_value = ".")]
        root: PathBuf,
    },

    /// Show the element behind an identifier
    Node {
        /// Sandbox directory
        root: PathBuf,

        /// Element identifier
        oid: String,
    },

    /// List identified elements in a file
    Nodes {
        /// Sandbox directory
        root: PathBuf,

        /// File path relative to the sandbox root
        path: String,
    },

    /// List files without indexing
    Ls {
        /// Sandbox directory
        root: PathBuf,

        /// Directory relative to the sandbox root
        #[arg(default_value = "")]
        dir: String,

        /// Only list files with these extensions
        #[arg(short, long, value_delimiter = ',')]
        extensions: Vec<String>,
    },

    /// Write a default configuration file
    Init {
        /// Destination path
        #[arg(default_value = "sandsync.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("{:#}", e));
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let format = OutputFormat::from(cli.format);
    let profile = cli.profile.map(ConfigProfile::from);

    if let Commands::Init { path } = &cli.command {
        return commands::init_config(path, profile.unwrap_or_default()).await;
    }

    let config = commands::load_config(cli.config.as_deref(), profile).await?;

    match cli.command {
        Commands::Index { root } => commands::index(&root, config, format).await?,
        Commands::Watch { root } => commands::watch(&root, config, format).await?,
        Commands::Node { root, oid } => commands::node(&root, config, &oid, format).await?,
        Commands::Nodes { root, path } => commands::nodes(&root, config, &path, format).await?,
        Commands::Ls {
            root,
            dir,
            extensions,
        } => commands::ls(&root, config, &dir, &extensions, format).await?,
        Commands::Init { .. } => {}
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("sandsync=debug,sandsync_cli=debug,sandsync_vfs=debug,sandsync_mapper=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sandsync_cli=info,sandsync_vfs=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
