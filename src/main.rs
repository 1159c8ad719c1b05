//! kubereport — Kubernetes manifest diff reports for pull/merge requests.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use kubereport::comments::CommentLifecycle;
use kubereport::config::Config;
use kubereport::constants;
use kubereport::diff::{DiffEngine, OverlayDiffer};
use kubereport::env::Env;
use kubereport::manifests::{AppManifests, FileManifestSource};
use kubereport::models::ChangeRequestId;
use kubereport::pipeline::{CancellationSignal, Pipeline};
use kubereport::vcs;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::args::{ChangeRequestArgs, CheckArgs, Cli, Command, RenderArgs, TidyArgs};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

/// Logs go to stderr; stdout is reserved for rendered reports.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(constants::ENV_LOG)
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Check(args) => run_check(*args).await,
        Command::Tidy(args) => run_tidy(args).await,
        Command::Render(args) => run_render(args).await,
        Command::Version => run_version(),
    }
}

fn run_version() -> Result<()> {
    use colored::Colorize;

    println!(
        "{} {}",
        constants::APP_NAME.bold(),
        constants::VERSION.green().bold()
    );
    println!("{}     {}", "target:".dimmed(), constants::TARGET);
    Ok(())
}

fn load_config() -> Result<Config> {
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    Config::load(Some(&cwd), &Env::real()).context("failed to load configuration")
}

fn lifecycle(config: &Config, target: &ChangeRequestArgs, dry_run: bool) -> Result<CommentLifecycle> {
    let client = vcs::build_client(&config.vcs, dry_run).context("failed to set up VCS client")?;
    Ok(CommentLifecycle::new(
        client,
        ChangeRequestId::new(target.repo.clone(), target.pr),
        config.report_layout(),
        config.run.retry,
    ))
}

/// Run the diff for every application and publish the report.
async fn run_check(args: CheckArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(mode) = args.tidy_mode {
        config.comments.tidy_mode = mode;
    }
    if let Some(n) = args.max_concurrent {
        config.run.max_concurrent = n;
    }

    // CLI apps replace config apps of the same name.
    let mut apps: Vec<AppManifests> = config.apps.clone();
    for app in args.app_manifests().map_err(anyhow::Error::msg)? {
        apps.retain(|a| a.name != app.name);
        apps.push(app);
    }
    if apps.is_empty() {
        bail!("no applications to check: pass --app/--live/--target or add [[apps]] to the config");
    }
    for app in &mut apps {
        if app.namespace.is_empty() {
            app.namespace = config.diff.default_namespace.clone();
        }
    }
    let names: Vec<String> = apps.iter().map(|a| a.name.clone()).collect();

    let lifecycle = lifecycle(&config, &args.change_request, args.dry_run)?;
    let message = Arc::new(
        lifecycle
            .post_message(config.comments.tidy_mode)
            .await
            .context("failed to post report comment")?,
    );

    let pipeline = Pipeline::new(
        Arc::new(FileManifestSource::new(apps)),
        DiffEngine::new(Arc::new(OverlayDiffer), config.diff.policy.clone()),
        config.run.max_concurrent,
    );

    let (handle, signal) = CancellationSignal::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; finishing in-flight applications");
            handle.cancel();
        }
    });

    let summary = pipeline.run(Arc::clone(&message), names, signal).await;

    let totals = summary.totals();
    if let Err(err) = message
        .add_to_message(&format!("**Total:** {totals}"))
        .await
    {
        warn!(error = %err, "failed to add totals to report");
    }
    lifecycle
        .update_message(&message)
        .await
        .context("failed to publish final report")?;
    info!(comment_id = %message.comment_id().await, "report published");

    cli::print_run_summary(&summary);
    if args.dry_run {
        println!("{}", message.body().await);
    }

    let failed = summary.failed();
    if failed > 0 {
        bail!("{failed} application(s) could not be diffed");
    }
    Ok(())
}

/// Delete or hide reports from earlier runs.
async fn run_tidy(args: TidyArgs) -> Result<()> {
    let config = load_config()?;
    let mode = args.tidy_mode.unwrap_or(config.comments.tidy_mode);
    let lifecycle = lifecycle(&config, &args.change_request, false)?;

    let outcome = lifecycle
        .tidy_outdated_comments(mode)
        .await
        .context("failed to tidy comments")?;
    eprintln!(
        "{mode}: {} tidied, {} already hidden, {} failed ({} owned)",
        outcome.tidied, outcome.skipped, outcome.failed, outcome.owned
    );
    if outcome.failed > 0 {
        bail!("{} comment(s) could not be tidied", outcome.failed);
    }
    Ok(())
}

/// Print one application's diff to stdout.
async fn run_render(args: RenderArgs) -> Result<()> {
    let config = load_config()?;
    let namespace = args
        .namespace
        .unwrap_or_else(|| config.diff.default_namespace.clone());
    let source = FileManifestSource::new([AppManifests {
        name: args.app.clone(),
        live: args.live,
        target: args.target,
        namespace,
    }]);
    let pipeline = Pipeline::new(
        Arc::new(source),
        DiffEngine::new(Arc::new(OverlayDiffer), config.diff.policy),
        1,
    );

    let report = pipeline
        .diff_app(&args.app)
        .await
        .with_context(|| format!("failed to diff {}", args.app))?;
    println!("{}\n", report.summary);
    println!("{}", report.diff_text.trim_end());
    for child in &report.child_apps {
        eprintln!("discovered application: {}", child.name);
    }
    Ok(())
}
