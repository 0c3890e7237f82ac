//! Gantry CLI

mod app;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use gantry_auth::DirectPermissions;
use gantry_config::{load_config, Config};
use gantry_runtime::{init_tracing, Server, SignalHandler};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Gantry HTTP server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo application
    Serve {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long, env = "GANTRY_CONFIG")]
        config: Option<PathBuf>,

        /// Override the listen address
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Override the log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "gantry.yaml")]
        config: PathBuf,
    },

    /// List the routes the demo application registers
    Routes {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            listen,
            log_level,
        } => {
            let mut config = read_config(config.as_deref())?;
            if let Some(listen) = listen {
                config.server.listen = listen.to_string();
            }
            if let Some(level) = log_level {
                config.logging.level = level;
            }
            init_tracing(&config.logging)?;

            tracing::info!("Starting Gantry");

            let server = build_server(config)?;

            let shutdown_signal = server.shutdown_signal();
            tokio::spawn(async move {
                let handler = SignalHandler::new(shutdown_signal);
                handler.run().await;
            });

            server.run().await?;

            tracing::info!("Server stopped");
            Ok(())
        }

        Commands::Validate { config: path } => match load_config(&path) {
            Ok(config) => {
                println!("✓ Configuration is valid: {}", path.display());
                println!("  Listen:       {}", config.server.listen);
                println!("  App name:     {}", config.server.app_name);
                println!("  Body limit:   {} bytes", config.server.body_limit);
                println!("  CORS:         {}", enabled(config.cors.is_some()));
                println!("  CSRF:         {}", enabled(config.csrf.is_some()));
                println!("  JWT:          {}", enabled(config.auth.jwt.is_some()));
                println!("  API keys:     {}", config.auth.api_keys.len());
                Ok(())
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {e}");
                std::process::exit(1);
            }
        },

        Commands::Routes { json } => {
            let mut routes = Vec::new();
            for registration in app::routes()? {
                routes.extend(registration.into_routes()?);
            }
            routes.sort_by(|a, b| {
                a.path
                    .cmp(&b.path)
                    .then_with(|| a.method.as_str().cmp(b.method.as_str()))
            });

            if json {
                let listing: Vec<_> = routes
                    .iter()
                    .map(|route| {
                        serde_json::json!({
                            "method": route.method.as_str(),
                            "path": route.path,
                            "name": route.name,
                            "protected": route.protected,
                            "permissions": route
                                .permissions
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(());
            }

            println!("{:<8} {:<24} {:<14} PROTECTION", "METHOD", "PATH", "NAME");
            for route in routes {
                let protection = if route.permissions.is_empty() {
                    if route.protected { "auth" } else { "-" }.to_string()
                } else {
                    route
                        .permissions
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                println!(
                    "{:<8} {:<24} {:<14} {}",
                    route.method.as_str(),
                    route.path,
                    route.name.as_deref().unwrap_or("-"),
                    protection
                );
            }
            Ok(())
        }

        Commands::Version => {
            println!("Gantry");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

fn read_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn build_server(config: Config) -> Result<Server> {
    let mut builder = Server::builder()
        .config(config)
        .authorizer(Arc::new(DirectPermissions));
    for registration in app::routes()? {
        builder = builder.register(registration);
    }
    builder
        .build()
        .context("building server (protected routes need auth.jwt or auth.api_keys)")
}

fn enabled(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}
