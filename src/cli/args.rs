//! Clap argument types and validation.

use clap::Parser;
use std::path::PathBuf;

use kubereport::manifests::AppManifests;
use kubereport::models::TidyMode;

/// Diff Kubernetes manifests and report the changes on a pull/merge request.
#[derive(Parser, Debug)]
#[command(
    name = "kubereport",
    version = kubereport::constants::VERSION,
)]
pub struct Cli {
    /// Log at debug level (overridden by KUBEREPORT_LOG).
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Diff every application and publish the report comment.
    Check(Box<CheckArgs>),

    /// Delete or hide report comments left by earlier runs.
    Tidy(TidyArgs),

    /// Print one application's diff without contacting the VCS.
    Render(RenderArgs),

    /// Print version and build information.
    Version,
}

/// Identifies the pull/merge request to comment on.
#[derive(clap::Args, Debug, Clone)]
pub struct ChangeRequestArgs {
    /// Repository (`owner/name`) or GitLab project path.
    #[arg(long, env = "KUBEREPORT_REPO")]
    pub repo: String,

    /// Pull request number or merge request IID.
    #[arg(long, env = "KUBEREPORT_PR")]
    pub pr: u64,
}

/// Arguments for the `check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub change_request: ChangeRequestArgs,

    /// Application name; pairs positionally with --live and --target.
    #[arg(long = "app", value_name = "NAME")]
    pub apps: Vec<String>,

    /// File or directory with the application's live objects.
    #[arg(long = "live", value_name = "PATH")]
    pub live: Vec<PathBuf>,

    /// File or directory with the application's rendered objects.
    #[arg(long = "target", value_name = "PATH")]
    pub target: Vec<PathBuf>,

    /// Namespace for namespaced targets that omit one (all CLI apps).
    #[arg(long)]
    pub namespace: Option<String>,

    /// How to treat reports from earlier runs (default from config).
    #[arg(long, value_enum)]
    pub tidy_mode: Option<TidyMode>,

    /// Max applications diffed at once (default from config).
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Keep comments in memory and print the final report to stdout.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl CheckArgs {
    /// Pair up the repeated --app/--live/--target flags.
    pub fn app_manifests(&self) -> Result<Vec<AppManifests>, String> {
        if self.apps.len() != self.live.len() || self.apps.len() != self.target.len() {
            return Err(format!(
                "--app, --live and --target must be given the same number of times (got {}, {}, {})",
                self.apps.len(),
                self.live.len(),
                self.target.len()
            ));
        }
        Ok(self
            .apps
            .iter()
            .zip(&self.live)
            .zip(&self.target)
            .map(|((name, live), target)| AppManifests {
                name: name.clone(),
                live: live.clone(),
                target: target.clone(),
                namespace: self.namespace.clone().unwrap_or_default(),
            })
            .collect())
    }
}

/// Arguments for the `tidy` subcommand.
#[derive(Parser, Debug)]
pub struct TidyArgs {
    #[command(flatten)]
    pub change_request: ChangeRequestArgs,

    #[arg(long, value_enum)]
    pub tidy_mode: Option<TidyMode>,
}

/// Arguments for the `render` subcommand.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    #[arg(long)]
    pub live: PathBuf,

    #[arg(long)]
    pub target: PathBuf,

    /// Name used in log output.
    #[arg(long, default_value = "app")]
    pub app: String,

    #[arg(long)]
    pub namespace: Option<String>,
}
