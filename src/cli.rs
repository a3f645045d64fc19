//! CLI Handler
//!
//! Provides command-line interface functionality for:
//! - Running the memberlist controller
//! - Inspecting the current memberlist
//! - Writing a default configuration

use clap::{Parser, Subcommand};
use kube::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use crate::config::Config;
use crate::error::MemberlistError;
use crate::manager::MemberlistManager;
use crate::store::{CrMemberlistStore, MemberlistStore};
use crate::watcher::KubernetesWatcher;

#[derive(Parser, Debug)]
#[command(name = "memberlist", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured namespace
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the controller until interrupted
    Run,
    /// Print the current memberlist
    Show,
    /// Write the default configuration to a file
    InitConfig {
        path: PathBuf,
    },
}

impl Cli {
    /// Effective configuration: file (or defaults) plus command-line overrides
    pub fn load_config(&self) -> Result<Config, MemberlistError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::load_default()?,
        };
        if let Some(namespace) = &self.namespace {
            config.kubernetes.namespace = namespace.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

pub struct CliHandler {
    config: Config,
}

impl CliHandler {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn execute(&self, command: &Commands) -> Result<(), MemberlistError> {
        match command {
            Commands::Run => self.run().await,
            Commands::Show => self.show().await,
            Commands::InitConfig { path } => Self::init_config(path),
        }
    }

    pub fn init_config(path: &Path) -> Result<(), MemberlistError> {
        Config::default().save(path)?;
        println!("Wrote default configuration to {}", path.display());
        Ok(())
    }

    pub async fn run(&self) -> Result<(), MemberlistError> {
        let client = Client::try_default().await?;
        let k8s = &self.config.kubernetes;
        let watcher = Arc::new(KubernetesWatcher::from_config(client.clone(), k8s));
        let store = Arc::new(CrMemberlistStore::from_config(client, k8s));
        let manager = MemberlistManager::new(watcher, store, &self.config);

        // Setup Ctrl+C handler
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        ctrlc::set_handler(move || {
            let _ = tx.blocking_send(());
        })?;

        info!(namespace = %k8s.namespace, memberlist = %k8s.memberlist_name, "Starting controller");
        manager.start().await?;

        rx.recv().await;
        info!("Interrupted, shutting down");
        manager.stop().await
    }

    pub async fn show(&self) -> Result<(), MemberlistError> {
        let client = Client::try_default().await?;
        let store = CrMemberlistStore::from_config(client, &self.config.kubernetes);
        let (memberlist, version) = store.get_memberlist().await?;

        println!("\nMemberlist {}/{} (version {}):",
            self.config.kubernetes.namespace, self.config.kubernetes.memberlist_name, version);
        if memberlist.is_empty() {
            println!("  (no members)");
        }
        for member in &memberlist {
            println!("  {}", member);
        }
        Ok(())
    }
}
