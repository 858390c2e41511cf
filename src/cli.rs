use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, ConfigHandle};
use crate::controller::Controller;
use crate::exporter::Exporter;
use crate::fetcher::Fetcher;
use crate::metrics::Registry;
use crate::output;
use crate::providers::GitLabClient;
use crate::scheduler::TaskScheduler;
use crate::server::{self, AppState};
use crate::store::{Local, Store};

#[derive(Parser)]
#[command(name = "cilens-exporter")]
#[command(author, version, about = "GitLab CI/CD pipelines and deployments exporter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file, probed in the working directory when omitted
    #[arg(short, long, global = true, env = "CILENS_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Default log filter, `RUST_LOG` takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start polling GitLab and serving metrics
    Run {
        #[arg(short, long, env = "GITLAB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        #[arg(short, long)]
        listen_address: Option<String>,
    },
    /// Load the configuration, check it and print what it tracks
    Validate,
}

impl Cli {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Loads the configuration with the command line overrides applied.
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Commands::Run {
            token,
            listen_address,
        } = &self.command
        {
            if let Some(token) = token {
                config.gitlab.token = Some(token.clone());
            }
            if let Some(listen_address) = listen_address {
                config.server.listen_address.clone_from(listen_address);
            }
        }

        Ok(config)
    }

    async fn execute_run(&self) -> Result<()> {
        let config = self.load_config()?;
        info!(
            "Exporting GitLab CI/CD metrics from {} for {} projects and {} wildcards",
            config.gitlab.url,
            config.projects.len(),
            config.wildcards.len()
        );

        let client = Arc::new(
            GitLabClient::new(&config.gitlab).context("Failed to create GitLab client")?,
        );
        let listen_address = config.server.listen_address.clone();
        let config = ConfigHandle::new(config);

        let store: Arc<dyn Store> = Arc::new(Local::new());
        let fetcher: Arc<dyn Fetcher> = client.clone();
        let registry = Arc::new(Registry::new());

        let exporter =
            Exporter::new(Arc::clone(&store), Arc::clone(&fetcher), registry.clone());
        let scheduler = TaskScheduler::new(Arc::new(exporter));
        let controller = Arc::new(Controller::new(config.clone(), store, fetcher, scheduler));

        controller.register_configured_projects().await;
        let _polling = controller.spawn_polling();
        self.spawn_reload_on_hangup(config.clone(), Arc::clone(&controller))?;

        let state = AppState {
            config,
            controller,
            registry,
            gitlab: client,
        };
        server::serve(&listen_address, state, shutdown_signal()).await
    }

    #[cfg(unix)]
    fn spawn_reload_on_hangup(
        &self,
        config: ConfigHandle,
        controller: Arc<Controller>,
    ) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
        let path = self.config.clone();
        let token = match &self.command {
            Commands::Run { token, .. } => token.clone(),
            Commands::Validate => None,
        };

        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                info!("SIGHUP received, reloading configuration");
                match Config::load(path.as_deref()) {
                    Ok(mut reloaded) => {
                        if token.is_some() {
                            reloaded.gitlab.token.clone_from(&token);
                        }
                        config.reload(reloaded);
                        controller.register_configured_projects().await;
                    }
                    Err(err) => error!("Keeping the current configuration: {err:#}"),
                }
            }
        });

        Ok(())
    }

    #[cfg(not(unix))]
    fn spawn_reload_on_hangup(
        &self,
        _config: ConfigHandle,
        _controller: Arc<Controller>,
    ) -> Result<()> {
        Ok(())
    }

    fn execute_validate(&self) -> Result<()> {
        let config = self.load_config()?;
        output::print_config_summary(&config);
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Run { .. } => self.execute_run().await,
            Commands::Validate => self.execute_validate(),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_overrides_token_and_listen_address() {
        let cli = Cli::parse_from([
            "cilens-exporter",
            "--config",
            "/nonexistent/cilens-exporter.toml",
            "run",
            "--token",
            "glpat-cli",
            "--listen-address",
            "127.0.0.1:9252",
        ]);
        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("/nonexistent/cilens-exporter.toml"))
        );
        assert!(matches!(
            &cli.command,
            Commands::Run { token: Some(token), .. } if token == "glpat-cli"
        ));
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cilens-exporter.toml");
        std::fs::write(&path, "[gitlab]\nurl = \"https://gitlab.example.com\"\n").unwrap();

        let cli = Cli::parse_from([
            "cilens-exporter",
            "--config",
            path.to_str().unwrap(),
            "run",
            "--token",
            "glpat-cli",
            "--listen-address",
            "127.0.0.1:9252",
        ]);
        let config = cli.load_config().unwrap();

        assert_eq!(config.gitlab.url, "https://gitlab.example.com");
        assert_eq!(config.gitlab.token.as_deref(), Some("glpat-cli"));
        assert_eq!(config.server.listen_address, "127.0.0.1:9252");
    }

    #[test]
    fn test_validate_reports_invalid_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cilens-exporter.yaml");
        std::fs::write(&path, "projects:\n  - name: \"\"\n").unwrap();

        let cli = Cli::parse_from([
            "cilens-exporter",
            "validate",
            "--config",
            path.to_str().unwrap(),
        ]);
        assert!(cli.execute_validate().is_err());
        assert_eq!(cli.log_level(), "info");
    }
}
