//! Node configuration: the distribution cookie and default node naming.
//!
//! The cookie is the shared secret of Erlang distribution; every node in
//! a cluster carries the same one, conventionally in `~/.erlang.cookie`.
//! The search order here matches what Erlang tooling uses:
//! `$HOME/.erlang.cookie`, then `$XDG_CONFIG_HOME/erlang/.erlang.cookie`,
//! then `~/.config/erlang/.erlang.cookie`.

use crate::core::InvalidNodeName;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors while assembling a node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// None of the cookie file locations exist.
    #[error("no Erlang cookie file found; create ~/.erlang.cookie or pass a cookie explicitly")]
    CookieNotFound,

    /// A cookie file exists but could not be read.
    #[error("cookie file unreadable: {0}")]
    Io(#[from] std::io::Error),

    /// The configured node name does not parse as `short@host`.
    #[error(transparent)]
    InvalidName(#[from] InvalidNodeName),
}

/// Reads the distribution cookie from the standard file locations.
pub fn cookie() -> Result<String, ConfigError> {
    let home = env::var_os("HOME").map(PathBuf::from);
    let xdg = env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
    for path in candidate_paths(home.as_deref(), xdg.as_deref()) {
        if path.is_file() {
            return read_cookie(&path);
        }
    }
    Err(ConfigError::CookieNotFound)
}

/// The cookie file locations, most specific first.
fn candidate_paths(home: Option<&Path>, xdg: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(3);
    if let Some(home) = home {
        paths.push(home.join(".erlang.cookie"));
    }
    if let Some(xdg) = xdg {
        paths.push(xdg.join("erlang").join(".erlang.cookie"));
    }
    if let Some(home) = home {
        paths.push(home.join(".config").join("erlang").join(".erlang.cookie"));
    }
    paths
}

fn read_cookie(path: &Path) -> Result<String, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw.trim().to_string())
}

/// A node name for clients that do not configure one:
/// `waxwing_<os pid>@<hostname>`.
pub fn default_node_name() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    format!("waxwing_{}@{}", std::process::id(), host)
}
