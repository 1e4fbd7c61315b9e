//! Build information module.
//!
//! This module provides access to compile-time build information such as:
//! - Package name and version
//! - Git commit hash
//! - Build timestamp
//! - Rust compiler version
//! - Target architecture
//!
//! [`version_command`] wraps it in a ready-made `version` subcommand.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

use crate::adapt::nullary;
use crate::command::Command;
use crate::env::Env;
use crate::flags::Flag;
use crate::CliError;

#[cfg(feature = "build-info")]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Get short version string (package version only).
#[cfg(feature = "build-info")]
pub fn version_short() -> &'static str {
    built_info::PKG_VERSION
}

#[cfg(feature = "build-info")]
pub fn package_name() -> &'static str {
    built_info::PKG_NAME
}

/// Get git commit hash (if available).
#[cfg(feature = "build-info")]
pub fn git_commit() -> Option<&'static str> {
    built_info::GIT_COMMIT_HASH
}

/// Whether the working tree had uncommitted changes at build time.
#[cfg(feature = "build-info")]
pub fn git_modified() -> bool {
    built_info::GIT_DIRTY.unwrap_or(false)
}

#[cfg(feature = "build-info")]
pub fn build_time() -> Option<&'static str> {
    Some(built_info::BUILT_TIME_UTC)
}

#[cfg(feature = "build-info")]
pub fn target() -> Option<&'static str> {
    Some(built_info::TARGET)
}

#[cfg(feature = "build-info")]
pub fn toolchain() -> Option<&'static str> {
    Some(built_info::RUSTC_VERSION)
}

// Fallback implementations when build-info feature is disabled
#[cfg(not(feature = "build-info"))]
pub fn version_short() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(not(feature = "build-info"))]
pub fn package_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(not(feature = "build-info"))]
pub fn git_commit() -> Option<&'static str> {
    None
}

#[cfg(not(feature = "build-info"))]
pub fn git_modified() -> bool {
    false
}

#[cfg(not(feature = "build-info"))]
pub fn build_time() -> Option<&'static str> {
    None
}

#[cfg(not(feature = "build-info"))]
pub fn target() -> Option<&'static str> {
    None
}

#[cfg(not(feature = "build-info"))]
pub fn toolchain() -> Option<&'static str> {
    None
}

/// Version details printed by [`version_command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Name of the running program.
    pub name: String,
    pub package: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl VersionInfo {
    /// Details for the running program.
    pub fn current() -> Self {
        let name = std::env::args()
            .next()
            .as_deref()
            .map(std::path::Path::new)
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| package_name().to_string());
        Self::for_program(name)
    }

    fn for_program(name: String) -> Self {
        Self {
            name,
            package: package_name().to_string(),
            version: version_short().to_string(),
            commit: git_commit().map(String::from),
            modified: git_modified(),
            toolchain: toolchain().map(String::from),
            target: target().map(String::from),
            time: build_time().map(String::from),
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} version {}", self.name, self.version)?;
        if let Some(commit) = &self.commit {
            write!(f, " commit {commit}")?;
            if self.modified {
                write!(f, " (modified)")?;
            }
        }
        if let Some(toolchain) = &self.toolchain {
            write!(f, " with {toolchain}")?;
        }
        if let Some(time) = &self.time {
            write!(f, " at {time}")?;
        }
        if let Some(target) = &self.target {
            write!(f, " for {target}")?;
        }
        Ok(())
    }
}

/// A `version` command printing [`VersionInfo`] to standard output, as one
/// line or, with `--json`, as a JSON object.
pub fn version_command<C: 'static>() -> Command<C> {
    let json = Flag::new(false);
    let bind = json.clone();
    Command::new("version")
        .help("Print build version information for this program and exit.")
        .set_flags(move |_, fs| fs.var(&bind, "json", false, "Write version information as JSON"))
        .run(nullary(move |_env: &Env<'_, C>| {
            let info = VersionInfo::current();
            let mut out = io::stdout().lock();
            if json.get() {
                serde_json::to_writer(&mut out, &info).map_err(CliError::other)?;
                writeln!(out)?;
            } else {
                writeln!(out, "{info}")?;
            }
            Ok(())
        }))
}
