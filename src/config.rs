use crate::evaluator::{DEFAULT_MAX_EVAL_DEPTH, set_max_eval_depth};
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_HISTORY_FILE: &str = "muscheme_history.txt";

const MAX_EVAL_DEPTH_VAR: &str = "MUSCHEME_MAX_EVAL_DEPTH";
const HISTORY_VAR: &str = "MUSCHEME_HISTORY";
const EDIT_MODE_VAR: &str = "MUSCHEME_EDIT_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Emacs,
    Vi,
}

/// Runtime settings, read from `MUSCHEME_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub max_eval_depth: usize,
    pub history_file: PathBuf,
    pub edit_mode: EditMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_eval_depth: DEFAULT_MAX_EVAL_DEPTH,
            history_file: PathBuf::from(DEFAULT_HISTORY_FILE),
            edit_mode: EditMode::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`; unset or unusable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();

        if let Some(raw) = lookup(MAX_EVAL_DEPTH_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => config.max_eval_depth = depth,
                _ => warn!(value = %raw, "ignoring invalid {}", MAX_EVAL_DEPTH_VAR),
            }
        }

        if let Some(path) = lookup(HISTORY_VAR).filter(|path| !path.trim().is_empty()) {
            config.history_file = PathBuf::from(path);
        }

        if let Some(raw) = lookup(EDIT_MODE_VAR) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "vi" => config.edit_mode = EditMode::Vi,
                "emacs" => config.edit_mode = EditMode::Emacs,
                _ => warn!(value = %raw, "ignoring invalid {}", EDIT_MODE_VAR),
            }
        }

        config
    }

    /// Applies the evaluator settings to the current thread.
    pub fn install(&self) {
        debug!(config = ?self, "installing config");
        set_max_eval_depth(self.max_eval_depth);
    }
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
