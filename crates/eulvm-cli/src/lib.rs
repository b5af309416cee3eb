//! Shared plumbing for the `eulc`/`eule` binaries.

use std::path::Path;

use anyhow::{Context, Result};
use eulvm_runtime::VmConfig;
use eulvm_storage::StorageConfig;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` formatter, honoring `RUST_LOG` when
/// set and otherwise deriving a default filter from `-v`/`-vv` repeat
/// counts (0 → warn, 1 → info, 2+ → debug).
pub fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// The subset of [`VmConfig`]/[`StorageConfig`] an `eulvm.toml` may
/// override, with both sections optional and defaulting to their
/// built-in constants when the file is absent or a section is omitted.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EulvmConfig {
    /// Interpreter parameters (`exec_limit`, `mem_cap`).
    #[serde(default)]
    pub vm: VmConfig,
    /// Storage/window parameters (`cache_capacity`, `window_size`).
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Load `eulvm.toml` from `dir` if present, else fall back to
/// [`EulvmConfig::default`]. Malformed TOML is an error; a missing file
/// is not.
pub fn load_config(dir: &Path) -> Result<EulvmConfig> {
    let path = dir.join("eulvm.toml");
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EulvmConfig::default()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}
