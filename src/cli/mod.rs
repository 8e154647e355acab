use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::OneTimeCredential;
use crate::config::AppConfig;
use crate::database::{CrmStore, DatabaseManager, MemoryStore, PgStore};
use crate::messaging;
use crate::routes::app;
use crate::state::AppState;
use crate::workflows::tenants::bootstrap_operator;

#[derive(Parser)]
#[command(name = "admissions-crm")]
#[command(about = "Multi-tenant admissions CRM server")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Print command output as JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Keep all data in process memory (development)")]
        memory: bool,
    },

    #[command(about = "Create the first platform operator and print its one-time secret")]
    BootstrapOperator {
        #[arg(long, help = "Operator email")]
        email: String,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { memory } => serve(memory).await,
        Commands::BootstrapOperator { email } => {
            let config = AppConfig::from_env()?;
            let store = open_store(&config).await?;
            let credential = bootstrap_operator(store.as_ref(), &email).await;
            store.close().await;
            print_credential(&credential?, cli.json);
            Ok(())
        }
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CrmStore>> {
    if config.database.in_memory {
        warn!("Using in-memory storage; all data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let pool = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to the database")?;
    Ok(Arc::new(PgStore::new(pool)))
}

async fn serve(memory: bool) -> anyhow::Result<()> {
    let config = if memory {
        AppConfig::from_env_in_memory()?
    } else {
        AppConfig::from_env()?
    };
    info!(
        "Starting admissions CRM in {:?} mode for *.{}",
        config.environment, config.tenancy.root_domain
    );

    let store = open_store(&config).await?;
    if config.database.in_memory {
        // A fresh in-memory store has nobody who could create a tenant.
        let credential = bootstrap_operator(store.as_ref(), "operator@admissions.localhost").await?;
        info!(
            "Development operator {} secret {}",
            credential.identity_id, credential.secret
        );
    }

    let messenger = messaging::from_config(&config.messaging)?;
    let port = config.server.port;
    let state = AppState::new(config, store.clone(), Arc::from(messenger))?;

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    store.close().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}

fn print_credential(credential: &OneTimeCredential, as_json: bool) {
    if as_json {
        println!("{}", json!(credential));
    } else {
        println!("Platform operator created");
        println!("  identity: {}", credential.identity_id);
        println!("  secret:   {}", credential.secret);
        println!("The secret is shown once. Exchange it at POST /auth/session.");
    }
}
