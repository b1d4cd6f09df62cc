mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use argus_core::{Config, Paths};

#[derive(Parser)]
#[command(name = "argus")]
#[command(about = "Visual-regression capture service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the capture gateway (long-running daemon)
    Serve {
        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Page configuration file
        #[arg(long)]
        pages: Option<String>,

        /// Cookie table file
        #[arg(long)]
        cookies: Option<String>,

        /// Directory holding one folder per capture round
        #[arg(long)]
        dir: Option<String>,

        /// Renderer engine (phantomjs, slimerjs)
        #[arg(long)]
        engine: Option<String>,

        /// Copy log lines to this file and serve its tail at /log
        #[arg(long)]
        log: Option<String>,

        /// Compare the first two environments right after startup
        #[arg(long)]
        start_compare: bool,
    },

    /// Run environment diagnostics
    Doctor,

    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = Paths::new();
    let config = Config::load_or_default(&paths).unwrap_or_default();

    // The file layer is only wired for the daemon; one-shot commands log to
    // stdout alone.
    let log_file = match &cli.command {
        Commands::Serve { log, .. } => log.clone().or_else(|| config.log_file.clone()),
        _ => None,
    };
    init_tracing(cli.verbose, log_file.as_deref())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            pages,
            cookies,
            dir,
            engine,
            log,
            start_compare,
        } => {
            let opts = commands::serve::ServeOpts {
                host,
                port,
                pages,
                cookies,
                dir,
                engine,
                log,
                start_compare,
            };
            commands::serve::run(opts).await?;
        }
        Commands::Doctor => {
            commands::doctor::run().await?;
        }
        Commands::Completions { shell } => {
            generate_completions(&shell)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let registry = tracing_subscriber::registry().with(fmt::layer());

    if let Some(path) = log_file {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        registry
            .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
            .with(filter)
            .init();
    } else {
        registry.with(filter).init();
    }

    Ok(())
}

fn generate_completions(shell: &str) -> anyhow::Result<()> {
    use clap_complete::{generate, Shell};

    let shell: Shell = shell
        .parse()
        .map_err(|_| anyhow::anyhow!("unsupported shell: {}", shell))?;
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
