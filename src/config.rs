use crate::source::{DEFAULT_FETCH_TIMEOUT, DataSource, FileSource, HttpSource, SourceError};
use crate::t_args;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the selection is kept when nothing else is configured.
pub const DEFAULT_STATE_FILE: &str = ".exercise-harness/selection.json";

/// Settings from the optional YAML config file. Command line flags are
/// merged on top with [`HarnessConfig::merge`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct HarnessConfig {
    pub url: Option<String>,
    pub file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub invoke_timeout_secs: Option<u64>,
    pub functions_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
}

impl HarnessConfig {
    /// Reads a config file. Relative paths inside it are taken relative to
    /// the file's own directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| t_args!("config-failed-to-read", "file" => path.display()))?;
        let raw: HarnessConfig = serde_yaml::from_str(&content)
            .with_context(|| t_args!("config-yaml-error", "file" => path.display()))?;
        Ok(raw.relative_to(path))
    }

    fn relative_to(self, config_path: &Path) -> Self {
        let resolve = |p: Option<PathBuf>| p.map(|p| resolve_path_relative_to(&p, config_path));
        Self {
            file: resolve(self.file),
            functions_dir: resolve(self.functions_dir),
            state_file: resolve(self.state_file),
            ..self
        }
    }

    /// Fields set in `overrides` replace the ones here.
    pub fn merge(self, overrides: HarnessConfig) -> Self {
        Self {
            url: overrides.url.or(self.url),
            file: overrides.file.or(self.file),
            timeout_secs: overrides.timeout_secs.or(self.timeout_secs),
            invoke_timeout_secs: overrides.invoke_timeout_secs.or(self.invoke_timeout_secs),
            functions_dir: overrides.functions_dir.or(self.functions_dir),
            state_file: overrides.state_file.or(self.state_file),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn invoke_timeout(&self) -> Duration {
        self.invoke_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::registry::DEFAULT_TIMEOUT)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE))
    }

    /// A URL takes precedence over a local file.
    pub fn data_source(&self) -> Result<DataSource, SourceError> {
        if let Some(url) = &self.url {
            return Ok(DataSource::Http(HttpSource::new(url, self.fetch_timeout())?));
        }
        if let Some(path) = &self.file {
            return Ok(DataSource::File(FileSource { path: path.clone() }));
        }
        Err(SourceError::Config(
            "no test data source configured".to_string(),
        ))
    }
}

fn resolve_path_relative_to(path: &Path, config_path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_values_resolve_relative_to_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        fs::write(
            &path,
            "file: data.json\nfunctions-dir: /opt/functions\ntimeout-secs: 3\n",
        )
        .unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.file, Some(dir.path().join("data.json")));
        assert_eq!(config.functions_dir, Some(PathBuf::from("/opt/functions")));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(3));
        assert!(matches!(config.data_source(), Ok(DataSource::File(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        fs::write(&path, "colour: red\n").unwrap();
        assert!(HarnessConfig::load(&path).is_err());
    }

    #[test]
    fn overrides_win_and_url_beats_file() {
        let base = HarnessConfig {
            file: Some("data.json".into()),
            timeout_secs: Some(5),
            ..Default::default()
        };
        let merged = base.merge(HarnessConfig {
            url: Some("http://127.0.0.1:1/data.json".into()),
            timeout_secs: Some(1),
            ..Default::default()
        });
        assert_eq!(merged.timeout_secs, Some(1));
        assert_eq!(merged.file, Some(PathBuf::from("data.json")));
        assert!(matches!(merged.data_source(), Ok(DataSource::Http(_))));
    }

    #[test]
    fn defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.fetch_timeout(), DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.state_file(), PathBuf::from(DEFAULT_STATE_FILE));
        assert!(matches!(config.data_source(), Err(SourceError::Config(_))));
    }
}
