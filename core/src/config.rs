//! Interpreter settings loaded from TOML and the environment.
//!
//! ```toml
//! num_threads = 4
//! profile = true
//! ```
//!
//! `GRAPHEXEC_THREADS` and `GRAPHEXEC_PROFILE` override the file values.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::exec::{ExecutionGraph, Interpreter, MemLocation, create_interpreter};
use crate::profile::NativeProfiler;

pub const THREADS_ENV: &str = "GRAPHEXEC_THREADS";
pub const PROFILE_ENV: &str = "GRAPHEXEC_PROFILE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterpreterConfig {
    /// Worker count; 0 or 1 selects the sequential interpreter.
    pub num_threads: usize,
    /// Attach and start the process-wide profiler.
    pub profile: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            profile: false,
        }
    }
}

impl InterpreterConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).context("invalid interpreter config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("in {}", path.display()))
    }

    /// Apply `GRAPHEXEC_THREADS` / `GRAPHEXEC_PROFILE` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(THREADS_ENV) {
            self.num_threads = raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a non-negative integer, got '{}'", THREADS_ENV, raw))?;
        }
        if let Some(raw) = lookup(PROFILE_ENV) {
            // Any value other than an explicit "off" spelling turns profiling on.
            let value = raw.trim().to_ascii_lowercase();
            self.profile = !matches!(value.as_str(), "" | "0" | "false" | "off" | "no");
        }
        Ok(self)
    }

    pub fn build(&self, graph: Arc<ExecutionGraph>, output_locs: Vec<MemLocation>) -> Result<Box<dyn Interpreter>> {
        let profiler = if self.profile {
            let profiler = NativeProfiler::global();
            profiler.start();
            Some(profiler)
        } else {
            None
        };
        create_interpreter(graph, output_locs, self.num_threads, profiler)
    }
}
