//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and report markers so a rename only requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "kubereport";

/// Crate version baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compilation target triple (set by `build.rs`).
pub const TARGET: &str = env!("TARGET");

/// Local config filename (e.g. `.kubereport.toml` in the working directory).
pub const CONFIG_FILENAME: &str = ".kubereport.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "kubereport";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_VCS_PROVIDER: &str = "KUBEREPORT_VCS_PROVIDER";
pub const ENV_VCS_TOKEN: &str = "KUBEREPORT_VCS_TOKEN";
pub const ENV_VCS_BASE_URL: &str = "KUBEREPORT_VCS_BASE_URL";
pub const ENV_VCS_USERNAME: &str = "KUBEREPORT_VCS_USERNAME";
pub const ENV_TIDY_MODE: &str = "KUBEREPORT_TIDY_MODE";
pub const ENV_LOG: &str = "KUBEREPORT_LOG";

// ── Report markers ──────────────────────────────────────────────────

/// Summary text of the collapsible block that wraps a hidden comment.
pub const OUTDATED_MARKER: &str = "OUTDATED";

/// Emitted in place of a diff when an application has no changes.
pub const NO_CHANGES: &str = "No changes";

/// Section indicator for an application whose report is clean.
pub const PASS_INDICATOR: &str = ":white_check_mark:";

/// Section indicator for an application whose report carries a failure
/// or warning marker.
pub const FAIL_INDICATOR: &str = ":red_circle:";

/// Marker prepended to a failed step's message inside a section.
pub const ERROR_MARKER: &str = ":red_circle:";

/// Marker prepended to a non-fatal problem inside a section.
pub const WARNING_MARKER: &str = ":warning:";
