use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::layout::LayoutConfig;
use crate::model::money::{CurrencyCode, MoneyError};
use crate::storage::{DEFAULT_COOKIE, FileCartIdStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cart: CartConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Cookie jar location; relative paths are resolved against the project root.
    #[serde(default)]
    pub jar_path: Option<PathBuf>,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            jar_path: None,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn jar_path(&self, project_root: &Path) -> PathBuf {
        match &self.jar_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => project_root.join(path),
            None => project_root.join(".tote/cookies.json"),
        }
    }

    #[must_use]
    pub fn open_store(&self, project_root: &Path) -> FileCartIdStore {
        FileCartIdStore::new(self.jar_path(project_root))
            .with_cookie(self.cookie_name.clone())
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
        }
    }
}

impl CartConfig {
    /// # Errors
    ///
    /// Fails when the configured currency is not a three-letter code.
    pub fn currency_code(&self) -> Result<CurrencyCode, MoneyError> {
        CurrencyCode::new(&self.currency)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// # Errors
///
/// Fails when `.tote/config.toml` exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".tote/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .cart
        .currency_code()
        .with_context(|| format!("Invalid [cart] currency in {}", path.display()))?;
    Ok(config)
}

/// # Errors
///
/// Fails when the user config exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("tote/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge project and user config and resolve the output mode.
///
/// # Errors
///
/// Propagates load failures from either file.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// `--json` > `FORMAT` env > user config > TTY detection.
fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE.to_string()
}

const fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_currency() -> String {
    "USD".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with(config: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".tote")).expect("mkdir");
        std::fs::write(dir.path().join(".tote/config.toml"), config).expect("write config");
        dir
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("tempdir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.layout.breakpoint_px, 768);
        assert_eq!(cfg.layout.panel_max_width_px, 500);
        assert_eq!(cfg.storage.cookie_name, "cartId");
        assert_eq!(cfg.cart.currency, "USD");
        assert_eq!(
            cfg.storage.jar_path(root.path()),
            root.path().join(".tote/cookies.json")
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let root = project_with(
            r#"
[layout]
breakpoint_px = 1024

[storage]
cookie_name = "tote_cart"
jar_path = "state/jar.json"

[cart]
currency = "eur"
"#,
        );
        let cfg = load_project_config(root.path()).expect("load");
        assert_eq!(cfg.layout.breakpoint_px, 1024);
        assert_eq!(cfg.layout.panel_min_width_px, 300);
        assert_eq!(cfg.storage.cookie_name, "tote_cart");
        assert_eq!(cfg.storage.lock_timeout_ms, 2_000);
        assert_eq!(
            cfg.storage.jar_path(root.path()),
            root.path().join("state/jar.json")
        );
        assert_eq!(cfg.cart.currency_code().expect("code").as_str(), "EUR");
    }

    #[test]
    fn invalid_currency_is_rejected_at_load() {
        let root = project_with("[cart]\ncurrency = \"dollars\"\n");
        let err = load_project_config(root.path()).unwrap_err();
        assert!(format!("{err:#}").contains("currency"));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let root = project_with("[layout\nbreakpoint_px = ");
        let err = load_project_config(root.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        assert_eq!(resolve_output(true, Some("pretty"), Some("text")), "json");
    }

    #[test]
    fn env_beats_user_config() {
        assert_eq!(resolve_output(false, Some("json"), Some("table")), "text");
        assert_eq!(resolve_output(false, Some("human"), Some("bogus")), "pretty");
    }
}
