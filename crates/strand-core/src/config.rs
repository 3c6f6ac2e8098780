use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrandError};

/// Top-level Strand configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrandConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Defaults applied when coercing plain functions into runnables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Route invocations through the attached tracer.
    #[serde(default = "default_true")]
    pub trace: bool,
    /// Resolve runnables returned by implementations.
    #[serde(default = "default_true")]
    pub recurse: bool,
    /// How isolated async work is scheduled.
    #[serde(default)]
    pub isolation: IsolationMode,
    /// Bound on blocking jobs running at once (0 = unbounded).
    #[serde(default = "default_max_blocking_threads")]
    pub max_blocking_threads: usize,
    /// Default fan-out concurrency cap (0 = unbounded).
    #[serde(default)]
    pub max_concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            trace: true,
            recurse: true,
            isolation: IsolationMode::default(),
            max_blocking_threads: default_max_blocking_threads(),
            max_concurrency: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Spawn each async invocation as its own task.
    #[default]
    Spawn,
    /// Run async invocations inline on the caller's task.
    Inline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_blocking_threads() -> usize {
    64
}

fn default_log_filter() -> String {
    "strand=info,warn".to_string()
}

impl StrandConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StrandError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| StrandError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }
}

/// Replace `${NAME}` with the value of environment variable `NAME`.
/// Unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match std::env::var(name) {
            Ok(val) => out.push_str(&val),
            Err(_) => out.push_str(&rest[start..start + 3 + end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_STRAND_FILTER", "strand=debug");
        let result = expand_env_vars("filter = \"${TEST_STRAND_FILTER}\"");
        assert_eq!(result, "filter = \"strand=debug\"");
        std::env::remove_var("TEST_STRAND_FILTER");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_STRAND_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_STRAND_VAR}\"");
    }

    #[test]
    fn test_expand_env_vars_unterminated() {
        let result = expand_env_vars("key = \"${OPEN");
        assert_eq!(result, "key = \"${OPEN");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: StrandConfig = toml::from_str("").unwrap();
        assert!(config.executor.trace);
        assert!(config.executor.recurse);
        assert_eq!(config.executor.isolation, IsolationMode::Spawn);
        assert_eq!(config.executor.max_blocking_threads, 64);
        assert_eq!(config.executor.max_concurrency, 0);
        assert_eq!(config.log.filter, "strand=info,warn");
    }

    #[test]
    fn test_partial_executor_section() {
        let toml_str = r#"
[executor]
trace = false
isolation = "inline"
"#;
        let config: StrandConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.executor.trace);
        assert!(config.executor.recurse);
        assert_eq!(config.executor.isolation, IsolationMode::Inline);
    }

    #[test]
    fn test_unknown_isolation_rejected() {
        let toml_str = r#"
[executor]
isolation = "threads"
"#;
        assert!(toml::from_str::<StrandConfig>(toml_str).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = StrandConfig::load(Path::new("/nonexistent/strand.toml")).unwrap_err();
        assert!(matches!(err, StrandError::ConfigNotFound(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = StrandConfig::load_or_default(Path::new("/nonexistent/strand.toml")).unwrap();
        assert!(config.executor.trace);
    }
}
