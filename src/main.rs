pub mod types;
pub mod error;
pub mod config;
pub mod data;
pub mod metrics;
pub mod figure;
pub mod render;
pub mod cache;
pub mod spatial;
pub mod server;

#[cfg(test)]
mod testutil;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interactive dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Load and validate the dataset without serving it
    Check {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Write every pre-renderable figure as JSON
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_name = "DIR", default_value = "figures")]
        output: PathBuf,
    },
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value {
        Some("1" | "true" | "TRUE" | "yes" | "YES") => true,
        Some("0" | "false" | "FALSE" | "no" | "NO") => false,
        _ => default,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    parse_bool(env::var(name).ok().as_deref(), default)
}

fn init_tracing(dev_mode: bool) {
    let default_filter = if dev_mode {
        "electionviz=debug,tower_http=debug"
    } else {
        "electionviz=info,tower_http=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn apply_port_override(app_config: &mut config::AppConfig, port: Option<&str>) -> anyhow::Result<()> {
    if let Some(port) = port {
        app_config.server.port = port
            .trim()
            .parse()
            .with_context(|| format!("ELECTIONVIZ_PORT is not a port: {:?}", port))?;
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<config::AppConfig> {
    let mut app_config = config::AppConfig::load_from_file(path)?;
    apply_port_override(&mut app_config, env::var("ELECTIONVIZ_PORT").ok().as_deref())?;
    Ok(app_config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dev_mode = env_bool("ELECTIONVIZ_DEBUG", false);
    init_tracing(dev_mode);

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            info!(config = ?config, dev_mode, "Serving dashboard");
            let app_config = load_config(config)?;
            server::start_server(app_config).await?;
        }
        Commands::Check { config } => {
            let app_config = load_config(config)?;
            let dataset = data::Dataset::load(&app_config.input).context("Dataset failed validation")?;
            info!(
                constituencies = dataset.constituencies().count(),
                records = dataset.record_count(),
                years = ?dataset.years(),
                "Dataset is consistent"
            );
        }
        Commands::Render { config, output } => {
            let app_config = load_config(config)?;
            let dataset = data::Dataset::load(&app_config.input).context("Dataset failed validation")?;
            let cache = cache::FigureCache::prerender(&dataset, &app_config.figures);
            let written = cache.write_to_dir(output)?;
            info!(figures = written, output = ?output, "Render complete");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_spellings() {
        for value in ["1", "true", "TRUE", "yes", "YES"] {
            assert!(parse_bool(Some(value), false), "{value}");
        }
        for value in ["0", "false", "FALSE", "no", "NO"] {
            assert!(!parse_bool(Some(value), true), "{value}");
        }
    }

    #[test]
    fn unset_or_unknown_bool_uses_default() {
        assert!(!parse_bool(None, false));
        assert!(parse_bool(None, true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(Some(""), false));
    }

    #[test]
    fn port_override() {
        let mut app_config = config::AppConfig::default();
        apply_port_override(&mut app_config, None).unwrap();
        assert_eq!(app_config.server.port, 8050);

        apply_port_override(&mut app_config, Some(" 9100 ")).unwrap();
        assert_eq!(app_config.server.port, 9100);

        let err = apply_port_override(&mut app_config, Some("http")).unwrap_err();
        assert!(err.to_string().contains("ELECTIONVIZ_PORT"));
        assert!(apply_port_override(&mut app_config, Some("70000")).is_err());
        assert_eq!(app_config.server.port, 9100);
    }
}
