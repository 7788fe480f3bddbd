//! Configuration loading from shakecc.toml.

use serde::Deserialize;
use std::{fs, path::Path};

use crate::error::{IoResultExt, ShakeError, ShakeResult};

pub const CONFIG_FILE: &str = "shakecc.toml";

/// Main configuration structure for shakecc.toml.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ShakeConfig {
    /// Front-end flags, e.g. `-std=c++17`.
    #[serde(default)]
    pub flags: Vec<String>,
    /// Macros whose definitions and conditionals are never removed.
    #[serde(default)]
    pub keep_macros: Vec<String>,
    /// Declarations kept alive by name.
    #[serde(default)]
    pub keep_identifiers: Vec<String>,
    /// Output configuration.
    pub output: Option<OutputConfig>,
}

/// Output format configuration.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Statistics format: "plain" or "json".
    pub format: Option<String>,
}

impl ShakeConfig {
    /// Whether statistics should be printed as JSON.
    pub fn json_output(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|o| o.format.as_deref())
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }

    /// Append command-line values to the configured lists.
    pub fn extend(&mut self, flags: &[String], keep_macros: &[String], keep_identifiers: &[String]) {
        self.flags.extend_from_slice(flags);
        self.keep_macros.extend_from_slice(keep_macros);
        self.keep_identifiers.extend_from_slice(keep_identifiers);
    }
}

/// Loads `shakecc.toml` from `dir` if it exists.
pub fn load_config(dir: &Path) -> ShakeResult<Option<ShakeConfig>> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Loads an explicitly named configuration file.
pub fn load_config_file(path: &Path) -> ShakeResult<ShakeConfig> {
    let content = fs::read_to_string(path).with_path(path)?;
    toml::from_str(&content).map_err(|e| ShakeError::config(path, e.message()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_dir() -> std::path::PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "shakecc_config_test_{}_{}",
            std::process::id(),
            id
        ));
        fs::create_dir_all(&dir).expect("Failed to create test directory");
        dir
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = temp_dir();
        assert!(load_config(&dir).unwrap().is_none());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = temp_dir();
        fs::write(
            dir.join(CONFIG_FILE),
            "flags = [\"-std=c++17\"]\nkeep_macros = [\"LOCAL\"]\nkeep_identifiers = [\"debug\"]\n[output]\nformat = \"json\"\n",
        )
        .unwrap();

        let cfg = load_config(&dir).unwrap().unwrap();
        assert_eq!(cfg.flags, vec!["-std=c++17".to_string()]);
        assert_eq!(cfg.keep_macros, vec!["LOCAL".to_string()]);
        assert_eq!(cfg.keep_identifiers, vec!["debug".to_string()]);
        assert!(cfg.json_output());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_config_has_context() {
        let dir = temp_dir();
        fs::write(dir.join(CONFIG_FILE), "flags = 3\n").unwrap();
        let err = load_config(&dir).unwrap_err();
        assert!(matches!(err, ShakeError::Config { .. }));
        assert_eq!(err.path(), Some(&dir.join(CONFIG_FILE)));
        assert!(err.to_string().starts_with("Config error at"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unreadable_config_is_io_error() {
        let dir = temp_dir();
        let err = load_config_file(&dir.join("absent.toml")).unwrap_err();
        assert!(matches!(err, ShakeError::Io { .. }));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_extend_appends() {
        let mut cfg = ShakeConfig {
            keep_macros: vec!["LOCAL".into()],
            ..Default::default()
        };
        cfg.extend(&["-DX".into()], &["DEBUG".into()], &[]);
        assert_eq!(cfg.flags, vec!["-DX".to_string()]);
        assert_eq!(cfg.keep_macros, vec!["LOCAL".to_string(), "DEBUG".to_string()]);
        assert!(!cfg.json_output());
    }
}
