//! dropbind-cli - Command-line interface for dropbind
//!
//! Moves files between the local disk and a remote store, and between remote
//! files, through the same bindings a job would use:
//! - Uploads stream through a chunked upload session committed on finish
//! - Downloads of missing files exit with code 2
//! - Path templates are filled from `--param name=value`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dropbind::{
    is_not_found, runtime, BindError, Binder, Config, FileAccess, FileBinding, StoreClientFactory,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod transfer;

/// dropbind - stream files to and from remote stores
#[derive(Parser)]
#[command(name = "dropbind")]
#[command(author, version, about = "Stream files to and from remote stores", long_about = None)]
struct Cli {
    /// Store URL, or the name of an environment variable holding one
    #[arg(long, global = true, env = "DROPBIND_CONNECTION")]
    connection: Option<String>,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Value for a `{name}` placeholder in remote paths
    #[arg(short = 'P', long = "param", global = true, value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show progress bar during transfers
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file
    Put {
        /// Local file to upload
        local: PathBuf,

        /// Remote destination path
        remote: String,

        /// Send every write as its own chunk
        #[arg(long)]
        unbuffered: bool,
    },

    /// Download a remote file
    Get {
        /// Remote file to download
        remote: String,

        /// Local output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write text to a remote file
    Write {
        /// Remote destination path
        remote: String,

        /// Text to write
        text: String,
    },

    /// Print a remote text file
    Read {
        /// Remote file to read
        remote: String,
    },

    /// Copy one remote file to another
    Copy {
        /// Remote source path
        src: String,

        /// Remote destination path
        dest: String,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long, conflicts_with = "path")]
        show: bool,

        /// Show configuration file path
        #[arg(long, conflicts_with = "show")]
        path: bool,
    },
}

/// A remote file the command needed does not exist
#[derive(Debug, thiserror::Error)]
#[error("Remote file not found: {0}")]
pub struct RemoteNotFound(pub String);

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    if name.is_empty() {
        return Err(format!("parameter name missing in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let result = run();

    match result {
        Ok(_) => process::exit(0),
        Err(e) => {
            error!("Error: {:#}", e);
            process::exit(map_error_to_exit_code(&e));
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => Config::load_or_default(),
    };

    if let Some(connection) = &cli.connection {
        config.connection.default = Some(connection.clone());
    }
    Ok(config)
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = load_config(&cli)?;
    let params: HashMap<String, String> = cli.params.iter().cloned().collect();
    let binder = Binder::new(config, Arc::new(StoreClientFactory::new()));

    match cli.command {
        Commands::Put {
            local,
            remote,
            unbuffered,
        } => {
            let binding = FileBinding::with_access(remote, FileAccess::Write);
            let bytes = transfer::put(&binder, &binding, &params, &local, unbuffered, cli.progress)?;
            info!("Uploaded {:?} ({} bytes)", local, bytes);
        }

        Commands::Get { remote, output } => {
            let binding = FileBinding::with_access(remote, FileAccess::Read);
            let bytes = transfer::get(&binder, &binding, &params, output.as_deref(), cli.progress)?;
            info!("Downloaded {} bytes", bytes);
        }

        Commands::Write { remote, text } => {
            let binding = FileBinding::new(remote);
            let bytes = runtime::block_on(binder.write_value(&binding, &params, Some(text.as_bytes())))??;
            info!("Wrote {} bytes", bytes.unwrap_or(0));
        }

        Commands::Read { remote } => {
            let binding = FileBinding::new(remote.clone());
            match runtime::block_on(binder.read_text(&binding, &params))?? {
                Some(text) => print!("{}", text),
                None => return Err(RemoteNotFound(remote).into()),
            }
        }

        Commands::Copy { src, dest } => {
            let source = FileBinding::with_access(src.clone(), FileAccess::Read);
            let destination = FileBinding::with_access(dest, FileAccess::Write);
            match runtime::block_on(binder.copy(&source, &destination, &params))?? {
                Some(bytes) => info!("Copied {} bytes", bytes),
                None => return Err(RemoteNotFound(src).into()),
            }
        }

        Commands::Config { show, path } => {
            if show {
                let toml_str = toml::to_string_pretty(binder.config())?;
                println!("{}", toml_str);
            } else if path {
                let config_path = match &cli.config {
                    Some(path) => path.clone(),
                    None => Config::config_path().context("Failed to get config path")?,
                };
                println!("{}", config_path.display());
            } else {
                anyhow::bail!("Nothing to do: pass --show or --path");
            }
        }
    }

    Ok(())
}

fn map_error_to_exit_code(err: &anyhow::Error) -> i32 {
    if err.is::<RemoteNotFound>() {
        return 2;
    }
    match err.downcast_ref::<BindError>() {
        Some(bind_err) if is_not_found(bind_err) => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("name=report").unwrap(),
            ("name".to_string(), "report".to_string())
        );
        assert_eq!(
            parse_param("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=value").is_err());
    }

    #[test]
    fn test_exit_codes() {
        let missing = anyhow::Error::new(RemoteNotFound("/x".to_string()));
        assert_eq!(map_error_to_exit_code(&missing), 2);

        let api = dropbind::ApiError::path_not_found("/x");
        let wrapped = anyhow::Error::new(BindError::from(api)).context("Failed to download");
        assert_eq!(map_error_to_exit_code(&wrapped), 2);

        let other = anyhow::anyhow!("something else");
        assert_eq!(map_error_to_exit_code(&other), 1);
    }
}
