//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.kubereport.toml` in the working directory
//! 4. `~/.config/kubereport/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::env::Env;
use crate::manifests::AppManifests;
use crate::models::report::DiffPolicy;
use crate::models::{TidyMode, VcsKind};
use crate::report::{ReportLayout, DEFAULT_MAX_COMMENT_LENGTH};
use crate::retry::RetryPolicy;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vcs: VcsConfig,
    pub comments: CommentsConfig,
    pub diff: DiffConfig,
    pub run: RunConfig,
    /// Applications checked on every run, in addition to CLI ones.
    pub apps: Vec<AppManifests>,
}

/// VCS connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VcsConfig {
    pub provider: VcsKind,
    /// API root; defaults to the provider's public instance.
    pub base_url: Option<String>,
    pub token: Option<String>,
    /// Skip the `/user` lookup and own comments by this login.
    pub username: Option<String>,
    pub max_comment_length: usize,
}

impl std::fmt::Debug for VcsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcsConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("max_comment_length", &self.max_comment_length)
            .finish()
    }
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            provider: VcsKind::default(),
            base_url: None,
            token: None,
            username: None,
            max_comment_length: DEFAULT_MAX_COMMENT_LENGTH,
        }
    }
}

/// Report comment settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    pub tidy_mode: TidyMode,
    /// Shown under the report title, e.g. the cluster or environment.
    pub identity: Option<String>,
}

/// Diff policy and matching defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    #[serde(flatten)]
    pub policy: DiffPolicy,
    /// Namespace for namespaced targets that omit one, unless the
    /// application sets its own.
    pub default_namespace: String,
}

/// Run scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, working-directory config, then applies
    /// environment variable overrides.
    pub fn load(repo_root: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Layer 4: global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        // Layer 3: local config
        if let Some(root) = repo_root {
            let local_path = root.join(crate::constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        // Layer 2: environment variables
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Load a config from a specific file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::constants::CONFIG_DIR).join("config.toml"))
    }

    /// Fixed report parts derived from config.
    pub fn report_layout(&self) -> ReportLayout {
        ReportLayout {
            identity: self.comments.identity.clone(),
            pipeline_url: None,
            max_length: self.vcs.max_comment_length,
        }
    }

    /// Merge another config into this one (other takes precedence for
    /// non-default values).
    fn merge(&mut self, other: Config) {
        let default_vcs = VcsConfig::default();
        if other.vcs.provider != default_vcs.provider {
            self.vcs.provider = other.vcs.provider;
        }
        if other.vcs.base_url.is_some() {
            self.vcs.base_url = other.vcs.base_url;
        }
        if other.vcs.token.is_some() {
            self.vcs.token = other.vcs.token;
        }
        if other.vcs.username.is_some() {
            self.vcs.username = other.vcs.username;
        }
        if other.vcs.max_comment_length != default_vcs.max_comment_length {
            self.vcs.max_comment_length = other.vcs.max_comment_length;
        }

        if other.comments.tidy_mode != TidyMode::default() {
            self.comments.tidy_mode = other.comments.tidy_mode;
        }
        if other.comments.identity.is_some() {
            self.comments.identity = other.comments.identity;
        }

        // Policy rules accumulate; scalar switches override.
        let policy = other.diff.policy;
        self.diff.policy.ignore_differences.extend(policy.ignore_differences);
        self.diff.policy.resource_overrides.extend(policy.resource_overrides);
        if policy.tracking_method != Default::default() {
            self.diff.policy.tracking_method = policy.tracking_method;
        }
        if policy.no_cache {
            self.diff.policy.no_cache = true;
        }
        if !other.diff.default_namespace.is_empty() {
            self.diff.default_namespace = other.diff.default_namespace;
        }

        let default_run = RunConfig::default();
        if other.run.max_concurrent != default_run.max_concurrent {
            self.run.max_concurrent = other.run.max_concurrent;
        }
        if other.run.retry != default_run.retry {
            self.run.retry = other.run.retry;
        }

        // Apps are keyed by name; a later layer replaces an earlier
        // definition of the same app.
        for app in other.apps {
            self.apps.retain(|a| a.name != app.name);
            self.apps.push(app);
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        use crate::constants::{
            ENV_TIDY_MODE, ENV_VCS_BASE_URL, ENV_VCS_PROVIDER, ENV_VCS_TOKEN, ENV_VCS_USERNAME,
        };

        if let Ok(val) = env.var(ENV_VCS_PROVIDER) {
            match val.parse::<VcsKind>() {
                Ok(kind) => self.vcs.provider = kind,
                Err(_) => warn!("ignoring invalid {ENV_VCS_PROVIDER} value: {val}"),
            }
        }
        if let Some(val) = env.first_of(&[ENV_VCS_BASE_URL]) {
            self.vcs.base_url = Some(val);
        }
        if let Some(val) = env.first_of(&[ENV_VCS_USERNAME]) {
            self.vcs.username = Some(val);
        }

        // Provider-specific token resolution
        if let Some(token) = env.first_of(&[ENV_VCS_TOKEN, self.vcs.provider.token_env_var()]) {
            self.vcs.token = Some(token);
        }

        if let Ok(val) = env.var(ENV_TIDY_MODE) {
            match val.parse::<TidyMode>() {
                Ok(mode) => self.comments.tidy_mode = mode,
                Err(_) => warn!("ignoring invalid {ENV_TIDY_MODE} value: {val}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackingMethod;
    use std::time::Duration;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.vcs.provider, VcsKind::Github);
        assert_eq!(config.vcs.max_comment_length, 65_000);
        assert_eq!(config.comments.tidy_mode, TidyMode::Hide);
        assert_eq!(config.run.max_concurrent, 4);
        assert!(config.apps.is_empty());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[vcs]
provider = "gitlab"
base_url = "https://gitlab.example.com/api/v4"
max_comment_length = 1000

[comments]
tidy_mode = "delete"
identity = "prod-cluster"

[diff]
tracking_method = "annotation"
default_namespace = "apps"

[[diff.ignore_differences]]
kind = "Deployment"
json_pointers = ["/spec/replicas"]

[run]
max_concurrent = 8

[run.retry]
max_elapsed = 10000

[[apps]]
name = "billing"
live = "live/billing"
target = "rendered/billing"
namespace = "billing"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.vcs.provider, VcsKind::Gitlab);
        assert_eq!(config.vcs.max_comment_length, 1000);
        assert_eq!(config.comments.tidy_mode, TidyMode::Delete);
        assert_eq!(config.comments.identity.as_deref(), Some("prod-cluster"));
        assert_eq!(config.diff.policy.tracking_method, TrackingMethod::Annotation);
        assert_eq!(config.diff.policy.ignore_differences.len(), 1);
        assert_eq!(config.diff.default_namespace, "apps");
        assert_eq!(config.run.max_concurrent, 8);
        assert_eq!(config.run.retry.max_elapsed, Duration::from_secs(10));
        assert_eq!(config.apps.len(), 1);
        assert_eq!(config.apps[0].namespace, "billing");
    }

    #[test]
    fn merge_overrides_non_default_values() {
        let mut base = Config::default();
        base.apps.push(AppManifests {
            name: "a".into(),
            live: "old-live".into(),
            target: "old-target".into(),
            namespace: String::new(),
        });

        let mut other = Config::default();
        other.vcs.provider = VcsKind::Gitlab;
        other.vcs.token = Some("glpat-test".into());
        other.comments.tidy_mode = TidyMode::Delete;
        other.diff.default_namespace = "ns".into();
        other.run.max_concurrent = 2;
        other.apps.push(AppManifests {
            name: "a".into(),
            live: "new-live".into(),
            target: "new-target".into(),
            namespace: String::new(),
        });

        base.merge(other);

        assert_eq!(base.vcs.provider, VcsKind::Gitlab);
        assert_eq!(base.vcs.token.as_deref(), Some("glpat-test"));
        assert_eq!(base.comments.tidy_mode, TidyMode::Delete);
        assert_eq!(base.diff.default_namespace, "ns");
        assert_eq!(base.run.max_concurrent, 2);
        assert_eq!(base.apps.len(), 1);
        assert_eq!(base.apps[0].live, PathBuf::from("new-live"));
    }

    #[test]
    fn merge_keeps_base_when_other_is_default() {
        let mut base = Config::default();
        base.vcs.provider = VcsKind::Gitlab;
        base.comments.identity = Some("staging".into());

        base.merge(Config::default());

        assert_eq!(base.vcs.provider, VcsKind::Gitlab);
        assert_eq!(base.comments.identity.as_deref(), Some("staging"));
    }

    #[test]
    fn load_file_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{ toml").unwrap();

        let result = Config::load_file(&path);
        assert!(result.unwrap_err().to_string().contains("parse"));
    }

    #[test]
    fn load_file_not_found() {
        let result = Config::load_file(Path::new("/tmp/kubereport_not_exist_config.toml"));
        assert!(result.unwrap_err().to_string().contains("read"));
    }

    #[test]
    fn load_from_working_directory() {
        let env = Env::mock(Vec::<(&str, &str)>::new());
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".kubereport.toml"),
            "[vcs]\nprovider = \"gitlab\"\n",
        )
        .unwrap();

        let config = Config::load(Some(dir.path()), &env).unwrap();
        assert_eq!(config.vcs.provider, VcsKind::Gitlab);
    }

    #[test]
    fn env_token_prefers_tool_variable() {
        let env = Env::mock([
            ("KUBEREPORT_VCS_TOKEN", "tool-token"),
            ("GITHUB_TOKEN", "gh-token"),
        ]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.vcs.token.as_deref(), Some("tool-token"));
    }

    #[test]
    fn env_token_falls_back_to_provider_variable() {
        let env = Env::mock([
            ("KUBEREPORT_VCS_PROVIDER", "gitlab"),
            ("GITHUB_TOKEN", "gh-token"),
            ("GITLAB_TOKEN", "gl-token"),
        ]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.vcs.provider, VcsKind::Gitlab);
        assert_eq!(config.vcs.token.as_deref(), Some("gl-token"));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let env = Env::mock([
            ("KUBEREPORT_VCS_PROVIDER", "bitbucket"),
            ("KUBEREPORT_TIDY_MODE", "archive"),
        ]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.vcs.provider, VcsKind::Github);
        assert_eq!(config.comments.tidy_mode, TidyMode::Hide);
    }

    #[test]
    fn debug_redacts_token() {
        let config = VcsConfig {
            token: Some("ghp_secret".into()),
            ..VcsConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
