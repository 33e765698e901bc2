//! `pki-server` command line.
//!
//! ```text
//! pki-server [--config FILE] <command> [instance] [options]
//!
//!   start / stop / restart     signal the service, optionally wait
//!   status                     service and readiness state
//!   deploy / undeploy          manage web application descriptors
//!   webapps                    list deployed web applications
//!   connectors                 list server.xml connectors
//!   nickname                   show or set the TLS server certificate
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use pki_server::config::{load_or_default, ManagerConfig};
use pki_server::instance::InstanceManager;
use pki_server::lifecycle::WaitOptions;
use pki_server::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "pki-server")]
#[command(about = "Manage PKI server instances", long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, env = "PKI_SERVER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct InstanceArg {
    /// Instance name
    #[arg(default_value = "pki-tomcat")]
    instance: String,
}

#[derive(Args, Clone, Copy)]
struct WaitArgs {
    /// Wait until the transition is observed
    #[arg(long)]
    wait: bool,

    /// Wait budget in seconds (0 waits forever)
    #[arg(long)]
    max_wait: Option<u64>,

    /// Per-probe timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl WaitArgs {
    fn options(self, settings: &ManagerConfig) -> WaitOptions {
        let max_wait = match self.max_wait {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => settings.lifecycle.max_wait(),
        };
        let timeout = self
            .timeout
            .map(Duration::from_secs)
            .or_else(|| settings.lifecycle.probe_timeout());

        WaitOptions {
            wait: self.wait,
            max_wait,
            timeout,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start an instance
    Start {
        #[command(flatten)]
        instance: InstanceArg,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Stop an instance
    Stop {
        #[command(flatten)]
        instance: InstanceArg,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Stop, then start an instance
    Restart {
        #[command(flatten)]
        instance: InstanceArg,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Show service and readiness state
    Status {
        #[command(flatten)]
        instance: InstanceArg,
    },
    /// Deploy a web application from a context descriptor
    Deploy {
        /// Web application ID (ROOT for "/")
        app_id: String,
        /// Deployment descriptor (context.xml)
        descriptor: PathBuf,
        #[command(flatten)]
        instance: InstanceArg,
        /// Override the descriptor's docBase
        #[arg(long)]
        doc_base: Option<String>,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Undeploy a web application
    Undeploy {
        app_id: String,
        #[command(flatten)]
        instance: InstanceArg,
        /// Ignore a missing descriptor
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// List deployed web applications
    Webapps {
        #[command(flatten)]
        instance: InstanceArg,
    },
    /// List server.xml connectors
    Connectors {
        #[command(flatten)]
        instance: InstanceArg,
    },
    /// Show or set the TLS server certificate nickname
    Nickname {
        #[command(flatten)]
        instance: InstanceArg,
        /// New nickname
        #[arg(long)]
        set: Option<String>,
        /// Token holding the certificate
        #[arg(long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_or_default(cli.config.as_deref())?;

    logging::init_logging(&settings.observability)?;

    if settings.observability.metrics_enabled {
        if let Ok(addr) = settings.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Start { instance, wait } => {
            let mut manager = open(&instance, &settings)?;
            manager.lifecycle_mut().start(wait.options(&settings)).await?;
        }
        Commands::Stop { instance, wait } => {
            let mut manager = open(&instance, &settings)?;
            manager.lifecycle_mut().stop(wait.options(&settings)).await?;
        }
        Commands::Restart { instance, wait } => {
            let mut manager = open(&instance, &settings)?;
            manager.lifecycle_mut().restart(wait.options(&settings)).await?;
        }
        Commands::Status { instance } => {
            let manager = open(&instance, &settings)?;
            let lifecycle = manager.lifecycle();
            let active = lifecycle.is_active().await?;
            let running = lifecycle.is_running(settings.lifecycle.probe_timeout()).await?;
            print_json(&json!({
                "instance": manager.name(),
                "service": lifecycle.service_id(),
                "active": active,
                "running": running,
            }))?;
        }
        Commands::Deploy {
            app_id,
            descriptor,
            instance,
            doc_base,
            wait,
        } => {
            let mut manager = open(&instance, &settings)?;
            let content = std::fs::read(&descriptor)?;
            manager
                .lifecycle_mut()
                .deploy(&app_id, &content, doc_base.as_deref(), wait.options(&settings))
                .await?;
        }
        Commands::Undeploy {
            app_id,
            instance,
            force,
            wait,
        } => {
            let mut manager = open(&instance, &settings)?;
            manager
                .lifecycle_mut()
                .undeploy(&app_id, force, wait.options(&settings))
                .await?;
        }
        Commands::Webapps { instance } => {
            let manager = open(&instance, &settings)?;
            print_json(&manager.lifecycle().list_webapps()?)?;
        }
        Commands::Connectors { instance } => {
            let manager = open(&instance, &settings)?;
            let mut server_config = manager.server_config()?;
            print_json(&server_config.connector_summaries())?;
        }
        Commands::Nickname { instance, set, token } => {
            let manager = open(&instance, &settings)?;
            if let Some(nickname) = set {
                manager.set_sslserver_cert_nickname(&nickname, token.as_deref())?;
            }
            print_json(&json!({ "nickname": manager.get_sslserver_cert_nickname()? }))?;
        }
    }

    Ok(())
}

fn open(instance: &InstanceArg, settings: &ManagerConfig) -> Result<InstanceManager, Box<dyn std::error::Error>> {
    let mut manager = InstanceManager::open(&instance.instance, settings)?;
    manager.validate()?;
    manager.load()?;
    Ok(manager)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
