//! Explorer configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--depth`, `--no-watcher`, `--mode`)
//! 2. Explicit `--config` file
//! 3. `$WTREE_CONFIG` environment variable (path to config file)
//! 4. Project-local `.wtree.toml` in the current working directory
//! 5. Global `~/.config/wtree/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::bridge::{ApplyMode, DEFAULT_REFRESH_DELAY};
use crate::fs::local::LocalFsOptions;
use crate::fs::watcher::{
    WatchSettings, DEFAULT_DEBOUNCE_MS, DEFAULT_FLOOD_THRESHOLD, DEFAULT_IGNORE_PATTERNS,
    DEFAULT_POLL_INTERVAL_MS,
};
use crate::tree::DEFAULT_INITIAL_DEPTH;

// ── Section configs ──────────────────────────────────────────────────────────

/// General settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Starting directory (overridden by CLI positional arg).
    pub default_path: Option<String>,
    /// Enable mouse support.
    pub mouse: Option<bool>,
}

/// Tree listing settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeConfig {
    /// Levels below the root's children fetched on first load.
    pub initial_depth: Option<usize>,
    pub show_hidden: Option<bool>,
    /// Directories always listed first.
    pub dirs_first: Option<bool>,
    /// Use nerd font icons (false = ASCII markers).
    pub use_icons: Option<bool>,
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: Option<bool>,
    /// Debounce window of the notify backend, in milliseconds.
    pub debounce_ms: Option<u64>,
    /// "incremental" or "debounced".
    pub mode: Option<String>,
    /// Quiet period before a refresh in debounced mode.
    pub refresh_delay_ms: Option<u64>,
    /// Paths per window above which a full rescan is issued.
    pub flood_threshold: Option<usize>,
    /// Path components never reported by the watcher.
    pub ignore: Option<Vec<String>>,
    /// Use the polling backend even where a native one exists.
    pub poll: Option<bool>,
    pub poll_interval_ms: Option<u64>,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "workspace_tree=debug".
    pub level: Option<String>,
    pub file: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub tree: TreeConfig,
    pub watcher: WatcherConfig,
    pub log: LogConfig,
}

/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ── Config file locator ──────────────────────────────────────────────────────

/// Candidate config file paths in priority order, excluding `--config`.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("WTREE_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".wtree.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("wtree").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning printed to stderr).
///
/// Runs before logging is installed, hence `eprintln!`.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!(
                "Warning: failed to parse config file {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                default_path: other
                    .general
                    .default_path
                    .clone()
                    .or(self.general.default_path),
                mouse: other.general.mouse.or(self.general.mouse),
            },
            tree: TreeConfig {
                initial_depth: other.tree.initial_depth.or(self.tree.initial_depth),
                show_hidden: other.tree.show_hidden.or(self.tree.show_hidden),
                dirs_first: other.tree.dirs_first.or(self.tree.dirs_first),
                use_icons: other.tree.use_icons.or(self.tree.use_icons),
            },
            watcher: WatcherConfig {
                enabled: other.watcher.enabled.or(self.watcher.enabled),
                debounce_ms: other.watcher.debounce_ms.or(self.watcher.debounce_ms),
                mode: other.watcher.mode.clone().or(self.watcher.mode),
                refresh_delay_ms: other
                    .watcher
                    .refresh_delay_ms
                    .or(self.watcher.refresh_delay_ms),
                flood_threshold: other
                    .watcher
                    .flood_threshold
                    .or(self.watcher.flood_threshold),
                ignore: other.watcher.ignore.clone().or(self.watcher.ignore),
                poll: other.watcher.poll.or(self.watcher.poll),
                poll_interval_ms: other
                    .watcher
                    .poll_interval_ms
                    .or(self.watcher.poll_interval_ms),
            },
            log: LogConfig {
                level: other.log.level.clone().or(self.log.level),
                file: other.log.file.clone().or(self.log.file),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so higher ones overwrite.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn default_path(&self) -> Option<&str> {
        self.general.default_path.as_deref()
    }

    pub fn mouse_enabled(&self) -> bool {
        self.general.mouse.unwrap_or(false)
    }

    pub fn initial_depth(&self) -> usize {
        self.tree.initial_depth.unwrap_or(DEFAULT_INITIAL_DEPTH)
    }

    pub fn show_hidden(&self) -> bool {
        self.tree.show_hidden.unwrap_or(false)
    }

    pub fn dirs_first(&self) -> bool {
        self.tree.dirs_first.unwrap_or(true)
    }

    pub fn use_icons(&self) -> bool {
        self.tree.use_icons.unwrap_or(true)
    }

    pub fn watcher_enabled(&self) -> bool {
        self.watcher.enabled.unwrap_or(true)
    }

    pub fn debounce_ms(&self) -> u64 {
        self.watcher.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    pub fn flood_threshold(&self) -> usize {
        self.watcher
            .flood_threshold
            .unwrap_or(DEFAULT_FLOOD_THRESHOLD)
    }

    pub fn ignore_patterns(&self) -> Vec<String> {
        match &self.watcher.ignore {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// How watcher batches are applied. Unrecognized modes fall back to incremental.
    pub fn apply_mode(&self) -> ApplyMode {
        match self.watcher.mode.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("debounced") => ApplyMode::Debounced(
                self.watcher
                    .refresh_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_REFRESH_DELAY),
            ),
            _ => ApplyMode::Incremental,
        }
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Log file path: configured, else `<cache_dir>/wtree/wtree.log`.
    pub fn log_file(&self) -> Option<PathBuf> {
        match &self.log.file {
            Some(file) => Some(PathBuf::from(file)),
            None => dirs::cache_dir().map(|dir| dir.join("wtree").join("wtree.log")),
        }
    }

    /// Watcher tuning, or `None` when watching is disabled.
    pub fn watch_settings(&self) -> Option<WatchSettings> {
        if !self.watcher_enabled() {
            return None;
        }
        Some(WatchSettings {
            debounce: Duration::from_millis(self.debounce_ms()),
            ignore_patterns: self.ignore_patterns(),
            flood_threshold: self.flood_threshold(),
            poll: self.watcher.poll.unwrap_or(false),
            poll_interval: Duration::from_millis(
                self.watcher
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        })
    }

    pub fn local_fs_options(&self) -> LocalFsOptions {
        LocalFsOptions {
            show_hidden: self.show_hidden(),
            dirs_first: self.dirs_first(),
            watch: self.watch_settings(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.default_path(), None);
        assert!(!cfg.mouse_enabled());
        assert_eq!(cfg.initial_depth(), 2);
        assert!(!cfg.show_hidden());
        assert!(cfg.dirs_first());
        assert!(cfg.use_icons());
        assert!(cfg.watcher_enabled());
        assert_eq!(cfg.debounce_ms(), 300);
        assert_eq!(cfg.flood_threshold(), 100);
        assert!(cfg.ignore_patterns().contains(&".git".to_string()));
        assert_eq!(cfg.apply_mode(), ApplyMode::Incremental);
        assert_eq!(cfg.log_level(), "info");
    }

    #[test]
    fn test_toml_parsing_full() {
        let toml = r#"
[general]
default_path = "/srv/project"
mouse = true

[tree]
initial_depth = 4
show_hidden = true
dirs_first = false
use_icons = false

[watcher]
enabled = false
debounce_ms = 500
mode = "debounced"
refresh_delay_ms = 750
flood_threshold = 10
ignore = ["build"]

[log]
level = "debug"
file = "/tmp/wtree-test.log"
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.default_path(), Some("/srv/project"));
        assert!(cfg.mouse_enabled());
        assert_eq!(cfg.initial_depth(), 4);
        assert!(cfg.show_hidden());
        assert!(!cfg.dirs_first());
        assert!(!cfg.use_icons());
        assert!(!cfg.watcher_enabled());
        assert_eq!(cfg.debounce_ms(), 500);
        assert_eq!(
            cfg.apply_mode(),
            ApplyMode::Debounced(Duration::from_millis(750))
        );
        assert_eq!(cfg.flood_threshold(), 10);
        assert_eq!(cfg.ignore_patterns(), vec!["build".to_string()]);
        assert_eq!(cfg.log_level(), "debug");
        assert_eq!(cfg.log_file(), Some(PathBuf::from("/tmp/wtree-test.log")));
    }

    #[test]
    fn test_toml_parsing_partial() {
        let toml = r#"
[tree]
show_hidden = true
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert!(cfg.show_hidden());
        assert_eq!(cfg.initial_depth(), 2);
        assert_eq!(cfg.debounce_ms(), 300);
    }

    #[test]
    fn test_toml_parsing_empty() {
        let cfg: AppConfig = toml::from_str("").expect("parse failed");
        assert!(!cfg.show_hidden());
        assert!(cfg.watcher_enabled());
    }

    #[test]
    fn test_debounced_mode_uses_default_delay() {
        let cfg: AppConfig = toml::from_str("[watcher]\nmode = \"Debounced\"").expect("parse");
        assert_eq!(cfg.apply_mode(), ApplyMode::Debounced(DEFAULT_REFRESH_DELAY));
    }

    #[test]
    fn test_unknown_mode_falls_back_to_incremental() {
        let cfg: AppConfig = toml::from_str("[watcher]\nmode = \"eager\"").expect("parse");
        assert_eq!(cfg.apply_mode(), ApplyMode::Incremental);
    }

    #[test]
    fn test_merge_overrides() {
        let base = AppConfig {
            tree: TreeConfig {
                initial_depth: Some(3),
                show_hidden: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let over = AppConfig {
            tree: TreeConfig {
                initial_depth: Some(1),
                // show_hidden not set, base value kept
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert_eq!(merged.initial_depth(), 1);
        assert!(merged.show_hidden());
    }

    #[test]
    fn test_merge_none_does_not_clear_some() {
        let base = AppConfig {
            watcher: WatcherConfig {
                enabled: Some(false),
                debounce_ms: Some(500),
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = base.merge(&AppConfig::default());
        assert!(!merged.watcher_enabled());
        assert_eq!(merged.debounce_ms(), 500);
    }

    #[test]
    fn test_disabled_watcher_has_no_settings() {
        let cfg = AppConfig {
            watcher: WatcherConfig {
                enabled: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cfg.watch_settings().is_none());
        assert!(cfg.local_fs_options().watch.is_none());

        let settings = AppConfig::default().watch_settings().expect("enabled");
        assert_eq!(settings.debounce, Duration::from_millis(300));
        assert_eq!(settings.flood_threshold, 100);
        assert!(!settings.poll);
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_poll_settings_from_toml() {
        let cfg: AppConfig =
            toml::from_str("[watcher]\npoll = true\npoll_interval_ms = 500").expect("parse");
        let settings = cfg.watch_settings().expect("enabled");
        assert!(settings.poll);
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("test-config.toml");
        let mut f = std::fs::File::create(&cfg_path).expect("create");
        writeln!(
            f,
            r#"
[tree]
initial_depth = 5

[watcher]
mode = "debounced"
"#
        )
        .expect("write");

        let cfg = load_file(&cfg_path).expect("load");
        assert_eq!(cfg.initial_depth(), 5);
        assert!(matches!(cfg.apply_mode(), ApplyMode::Debounced(_)));
        assert!(cfg.dirs_first());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_file(Path::new("/nonexistent/config.toml")).is_none());
    }

    #[test]
    fn test_load_invalid_toml_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "this is { not valid toml").expect("write");
        assert!(load_file(&cfg_path).is_none());
    }

    #[test]
    fn test_load_with_cli_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
[tree]
initial_depth = 3
show_hidden = true
"#,
        )
        .expect("write");

        let cli_overrides = AppConfig {
            tree: TreeConfig {
                initial_depth: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };

        let cfg = AppConfig::load(Some(&cfg_path), Some(&cli_overrides));
        assert_eq!(cfg.initial_depth(), 1);
        assert!(cfg.show_hidden());
    }
}
