use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Configuration file structure for the exporter.
///
/// Describes how to reach GitLab, which projects to track explicitly, which
/// wildcards to use for discovering more of them and how often to poll.
/// Configuration files are loaded from the current directory or specified path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// GitLab API access
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Metrics and webhook HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Polling intervals
    #[serde(default)]
    pub pull: PullConfig,

    /// Pull configuration applied to projects that do not define their own
    #[serde(default)]
    pub project_defaults: ProjectDefaults,

    /// Explicitly tracked projects
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,

    /// Patterns used to discover projects automatically
    #[serde(default)]
    pub wildcards: Vec<Wildcard>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab instance base URL
    #[serde(default = "default_gitlab_url")]
    pub url: String,

    /// GitLab personal access token
    pub token: Option<String>,

    /// Timeout applied to every API request
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Retries on rate limiting, server errors and transport failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between two retries
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    /// Upper bound of in-flight API requests
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Address the metrics, health and webhook endpoints listen on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WebhookConfig {
    /// Accept pipeline and deployment hooks on `/webhook`
    #[serde(default)]
    pub enabled: bool,

    /// Expected value of the `X-Gitlab-Token` header
    pub secret_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PullConfig {
    pub projects_from_wildcards: PullSchedule,
    pub refs_from_projects: PullSchedule,
    pub environments_from_projects: PullSchedule,
    pub metrics: PullSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PullSchedule {
    /// Run once as soon as the exporter starts
    pub on_init: bool,

    /// Run periodically
    pub scheduled: bool,

    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectDefaults {
    #[serde(default)]
    pub pull: ProjectPull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    /// Project path (e.g., 'group/project')
    pub name: String,

    /// Overrides `project-defaults.pull` for this project
    pub pull: Option<ProjectPull>,
}

/// Which refs and environments of a project are tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProjectPull {
    pub refs: ProjectPullRefs,
    pub environments: ProjectPullEnvironments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProjectPullRefs {
    pub branches: RefPullRule,
    pub tags: RefPullRule,
    pub merge_requests: RefPullRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RefPullRule {
    pub enabled: bool,
    pub regexp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProjectPullEnvironments {
    pub enabled: bool,

    /// Environment names to track
    pub regexp: String,

    /// Tags considered when looking for the latest commit of a tag deployment
    pub tags_regexp: String,
}

/// A search pattern used to discover projects that are not listed explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Wildcard {
    /// Free text search on project names
    pub search: String,

    pub owner: WildcardOwner,

    /// Include archived projects
    pub archived: bool,

    pub pull: ProjectPull,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WildcardOwner {
    pub name: String,

    /// `user`, `group` or empty for a global search
    pub kind: String,

    pub include_subgroups: bool,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: default_gitlab_url(),
            token: None,
            request_timeout_seconds: default_request_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            projects_from_wildcards: PullSchedule::every(1800),
            refs_from_projects: PullSchedule::every(300),
            environments_from_projects: PullSchedule::every(300),
            metrics: PullSchedule::every(30),
        }
    }
}

impl PullSchedule {
    const fn every(interval_seconds: u64) -> Self {
        Self {
            on_init: true,
            scheduled: true,
            interval_seconds,
        }
    }
}

impl Default for PullSchedule {
    fn default() -> Self {
        Self::every(300)
    }
}

impl Default for ProjectPullRefs {
    fn default() -> Self {
        Self {
            branches: RefPullRule {
                enabled: true,
                regexp: "^(?:main|master)$".to_string(),
            },
            tags: RefPullRule {
                enabled: true,
                regexp: ".*".to_string(),
            },
            merge_requests: RefPullRule {
                enabled: false,
                regexp: ".*".to_string(),
            },
        }
    }
}

impl Default for RefPullRule {
    fn default() -> Self {
        Self {
            enabled: true,
            regexp: ".*".to_string(),
        }
    }
}

impl Default for ProjectPullEnvironments {
    fn default() -> Self {
        Self {
            enabled: false,
            regexp: ".*".to_string(),
            tags_regexp: ".*".to_string(),
        }
    }
}

fn default_gitlab_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_seconds() -> u64 {
    10
}

fn default_max_concurrent_requests() -> usize {
    50
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./cilens-exporter.toml
    /// 3. ./cilens-exporter.json
    /// 4. ./cilens-exporter.yaml
    /// 5. ./cilens-exporter.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "cilens-exporter.toml",
            "cilens-exporter.json",
            "cilens-exporter.yaml",
            "cilens-exporter.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let config: Self = match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Checks what serde cannot: regexps compile, names are set, owner kinds are known.
    pub fn validate(&self) -> Result<()> {
        if self.pull.metrics.scheduled && self.pull.metrics.interval_seconds == 0 {
            bail!("pull.metrics.interval-seconds must be greater than 0");
        }

        validate_pull(&self.project_defaults.pull).context("project-defaults")?;

        for project in &self.projects {
            if project.name.trim().is_empty() {
                bail!("projects: a project has an empty name");
            }
            if let Some(pull) = &project.pull {
                validate_pull(pull).with_context(|| format!("project {}", project.name))?;
            }
        }

        for (id, wildcard) in self.wildcards.iter().enumerate() {
            match wildcard.owner.kind.as_str() {
                "" | "user" | "group" => {}
                other => bail!("wildcard {id}: invalid owner kind '{other}'"),
            }
            validate_pull(&wildcard.pull).with_context(|| format!("wildcard {id}"))?;
        }

        Ok(())
    }

    /// Pull configuration of an explicitly listed project.
    pub fn project_pull(&self, project: &ProjectConfig) -> ProjectPull {
        project
            .pull
            .clone()
            .unwrap_or_else(|| self.project_defaults.pull.clone())
    }
}

fn validate_pull(pull: &ProjectPull) -> Result<()> {
    for regexp in [
        &pull.refs.branches.regexp,
        &pull.refs.tags.regexp,
        &pull.refs.merge_requests.regexp,
        &pull.environments.regexp,
        &pull.environments.tags_regexp,
    ] {
        Regex::new(regexp).with_context(|| format!("invalid regexp '{regexp}'"))?;
    }
    Ok(())
}

/// Shared access to the current configuration.
///
/// Readers take an immutable snapshot and keep it for the whole unit of work,
/// so a reload never becomes visible halfway through a pull.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<Config>>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        Arc::clone(&self.tx.borrow())
    }

    /// Publishes a new configuration. Snapshots taken before keep the old one.
    pub fn reload(&self, config: Config) {
        let _previous = self.tx.send_replace(Arc::new(config));
    }
}
