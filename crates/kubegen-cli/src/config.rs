//! Application configuration.
//!
//! [`AppConfig`] is loaded once at startup and passed down by value.  The
//! CLI layer owns config; the core crate never sees it.
//!
//! # Resolution order (highest priority first)
//!
//! 1. CLI flags (handled at the call-site, not here)
//! 2. `KUBEGEN_*` environment variables, `__` separating sections
//!    (`KUBEGEN_GENERATE__PROVIDER=amazon-eks`)
//! 3. Config file: `--config`, else `.kubegen.toml` in the current
//!    directory, else the platform config directory
//! 4. Built-in defaults (always present)

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Stack;

/// Name of the per-directory config file.
pub const LOCAL_CONFIG: &str = ".kubegen.toml";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Defaults for `kubegen generate`.
    pub generate: GenerateConfig,
    /// Output settings.
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateConfig {
    pub provider: String,
    #[serde(default)]
    pub stack: Stack,
    pub output_dir: PathBuf,
    pub timestamp: bool,
    pub strict: bool,
    pub cluster_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub no_color: bool,
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generate: GenerateConfig {
                provider: "k3d".into(),
                stack: Stack::Loki,
                output_dir: PathBuf::from("output"),
                timestamp: true,
                strict: false,
                cluster_name: None,
            },
            output: OutputConfig {
                no_color: false,
                format: "human".into(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then the config file, then environment.
    ///
    /// An explicit `config_file` must exist; the implicit locations are
    /// optional.
    pub fn load(config_file: Option<&PathBuf>) -> anyhow::Result<Self> {
        let (path, required) = match config_file {
            Some(path) => (path.clone(), true),
            None => (Self::config_path(), false),
        };
        debug!(path = %path.display(), required, "Loading configuration");

        let config = Config::builder()
            .add_source(Config::try_from(&Self::default()).context("Failed to encode defaults")?)
            .add_source(File::from(path.as_path()).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix("KUBEGEN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Configuration has an invalid shape")
    }

    /// Path to the configuration file in effect when `--config` is absent.
    ///
    /// `.kubegen.toml` in the current directory wins over the platform
    /// config directory from `directories::ProjectDirs`.
    pub fn config_path() -> PathBuf {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.exists() {
            return local;
        }
        Self::global_path().unwrap_or(local)
    }

    /// Platform config location, e.g. `~/.config/kubegen/config.toml`.
    pub fn global_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "kubegen", "kubegen")
            .map(|d| d.config_dir().join("config.toml"))
    }

    /// Value at dotted `key`, rendered for display.
    pub fn get(&self, key: &str) -> Option<String> {
        let tree = serde_json::to_value(self).ok()?;
        let node = key
            .split('.')
            .try_fold(&tree, |node, segment| node.get(segment))?;
        Some(match node {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// `true` if `path` names the implicit local config.
pub fn is_local(path: &Path) -> bool {
    path == Path::new(LOCAL_CONFIG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_provider_is_k3d() {
        assert_eq!(AppConfig::default().generate.provider, "k3d");
    }

    #[test]
    fn default_no_color_is_false() {
        assert!(!AppConfig::default().output.no_color);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[generate]\nprovider = \"amazon-eks\"\nstack = \"prometheus\"\ntimestamp = false"
        )
        .unwrap();

        let cfg = AppConfig::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.generate.provider, "amazon-eks");
        assert_eq!(cfg.generate.stack, Stack::Prometheus);
        assert!(!cfg.generate.timestamp);
        assert_eq!(cfg.output.format, "human");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let missing = PathBuf::from("/nonexistent/kubegen.toml");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn get_walks_dotted_keys() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.get("generate.provider").as_deref(), Some("k3d"));
        assert_eq!(cfg.get("generate.stack").as_deref(), Some("loki"));
        assert_eq!(cfg.get("output.no_color").as_deref(), Some("false"));
        assert_eq!(cfg.get("generate.output_dir").as_deref(), Some("output"));
        assert!(cfg.get("generate.nope").is_none());
    }

    #[test]
    fn toml_round_trips() {
        let cfg = AppConfig::default();
        let text = cfg.to_toml().unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }
}
