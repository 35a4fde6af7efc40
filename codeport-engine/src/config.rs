//! # Settings
//!
//! Resolved in layers, later ones winning:
//! 1. built-in defaults
//! 2. a JSON file (`codeport.json` in the cwd, or an explicit path)
//! 3. environment variables
//! 4. command-line flags (applied by the caller on the returned value)

use crate::artifact::{ArtifactWriter, DEFAULT_STEM};
use crate::error::{Error, ErrorKind, Result};
use crate::provider::{
    ModelChoice, ProviderConfig, ANTHROPIC_DEFAULT_MODEL, OPENAI_DEFAULT_MODEL,
};
use crate::toolchain::Compiler;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "codeport.json";

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_MODEL: &str = "CODEPORT_MODEL";
pub const ENV_WORKDIR: &str = "CODEPORT_WORKDIR";
pub const ENV_PYTHON: &str = "CODEPORT_PYTHON";
pub const ENV_COMPILER: &str = "CODEPORT_COMPILER";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Model used when none is picked explicitly
    pub model: ModelChoice,
    pub openai_model: String,
    pub anthropic_model: String,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub workdir: PathBuf,
    pub file_stem: String,
    /// Python interpreter used to run the original program
    pub python: String,
    /// Full compiler command line; skips detection when set
    pub compiler: Option<Vec<String>>,
    pub timeout_secs: u64,
    pub max_tokens: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: ModelChoice::Gpt,
            openai_model: OPENAI_DEFAULT_MODEL.into(),
            anthropic_model: ANTHROPIC_DEFAULT_MODEL.into(),
            openai_api_key: None,
            anthropic_api_key: None,
            openai_base_url: None,
            anthropic_base_url: None,
            workdir: PathBuf::from("."),
            file_stem: DEFAULT_STEM.into(),
            python: "python3".into(),
            compiler: None,
            timeout_secs: 120,
            max_tokens: 4096,
        }
    }
}

/// On-disk shape: every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    model: Option<ModelChoice>,
    openai_model: Option<String>,
    anthropic_model: Option<String>,
    openai_api_key: Option<String>,
    anthropic_api_key: Option<String>,
    openai_base_url: Option<String>,
    anthropic_base_url: Option<String>,
    workdir: Option<PathBuf>,
    file_stem: Option<String>,
    python: Option<String>,
    compiler: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    max_tokens: Option<usize>,
}

impl Settings {
    /// Defaults, then the config file, then the process environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = Settings::default();

        match path {
            Some(path) => settings.apply_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    settings.apply_file(default)?;
                }
            }
        }

        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("config::apply_file")
                .with_context("path", path.display().to_string())
        })?;
        self.apply_json(&content).map_err(|e| {
            e.with_operation("config::apply_file")
                .with_context("path", path.display().to_string())
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(())
    }

    pub fn apply_json(&mut self, content: &str) -> Result<()> {
        let file: FileSettings = serde_json::from_str(content).map_err(|e| {
            Error::new(ErrorKind::ConfigInvalid, format!("invalid config file: {}", e)).set_source(e)
        })?;

        if let Some(v) = file.model {
            self.model = v;
        }
        if let Some(v) = file.openai_model {
            self.openai_model = v;
        }
        if let Some(v) = file.anthropic_model {
            self.anthropic_model = v;
        }
        if file.openai_api_key.is_some() {
            self.openai_api_key = file.openai_api_key;
        }
        if file.anthropic_api_key.is_some() {
            self.anthropic_api_key = file.anthropic_api_key;
        }
        if file.openai_base_url.is_some() {
            self.openai_base_url = file.openai_base_url;
        }
        if file.anthropic_base_url.is_some() {
            self.anthropic_base_url = file.anthropic_base_url;
        }
        if let Some(v) = file.workdir {
            self.workdir = v;
        }
        if let Some(v) = file.file_stem {
            self.file_stem = v;
        }
        if let Some(v) = file.python {
            self.python = v;
        }
        if file.compiler.is_some() {
            self.compiler = file.compiler;
        }
        if let Some(v) = file.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = file.max_tokens {
            self.max_tokens = v;
        }
        Ok(())
    }

    /// Overlay environment variables read through `lookup`; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_OPENAI_API_KEY) {
            self.openai_api_key = Some(v);
        }
        if let Some(v) = get(ENV_ANTHROPIC_API_KEY) {
            self.anthropic_api_key = Some(v);
        }
        if let Some(v) = get(ENV_MODEL) {
            self.model = v
                .parse()
                .map_err(|e: Error| e.with_operation("config::apply_env").with_context("variable", ENV_MODEL))?;
        }
        if let Some(v) = get(ENV_WORKDIR) {
            self.workdir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_PYTHON) {
            self.python = v;
        }
        if let Some(v) = get(ENV_COMPILER) {
            self.compiler = Some(v.split_whitespace().map(str::to_string).collect());
        }
        Ok(())
    }

    pub fn model_name(&self, choice: ModelChoice) -> &str {
        match choice {
            ModelChoice::Gpt => &self.openai_model,
            ModelChoice::Claude => &self.anthropic_model,
        }
    }

    /// Provider settings for `choice`; fails when its API key is missing.
    pub fn provider_config(&self, choice: ModelChoice) -> Result<ProviderConfig> {
        let (key, var, base_url) = match choice {
            ModelChoice::Gpt => (&self.openai_api_key, ENV_OPENAI_API_KEY, &self.openai_base_url),
            ModelChoice::Claude => (
                &self.anthropic_api_key,
                ENV_ANTHROPIC_API_KEY,
                &self.anthropic_base_url,
            ),
        };
        let key = key
            .clone()
            .ok_or_else(|| Error::missing_env(var).with_operation("config::provider_config"))?;

        let mut config = match choice {
            ModelChoice::Gpt => ProviderConfig::openai(key),
            ModelChoice::Claude => ProviderConfig::anthropic(key),
        }
        .with_model(self.model_name(choice))
        .with_timeout(self.timeout_secs);

        if let Some(url) = base_url {
            config = config.with_base_url(url.clone());
        }
        Ok(config)
    }

    pub fn compiler_override(&self) -> Result<Option<Compiler>> {
        self.compiler
            .as_deref()
            .map(Compiler::from_command)
            .transpose()
    }

    pub fn artifacts(&self) -> ArtifactWriter {
        ArtifactWriter::new(&self.workdir, self.file_stem.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.model, ModelChoice::Gpt);
        assert_eq!(settings.file_stem, "optimized");
        assert_eq!(settings.python, "python3");
        assert!(settings.compiler.is_none());
    }

    #[test]
    fn test_file_then_env_layering() {
        let mut settings = Settings::default();
        settings
            .apply_json(r#"{"model": "claude", "python": "python3.11", "workdir": "build", "max_tokens": 2000}"#)
            .unwrap();
        assert_eq!(settings.model, ModelChoice::Claude);
        assert_eq!(settings.python, "python3.11");

        settings
            .apply_env(env(&[
                (ENV_MODEL, "gpt"),
                (ENV_WORKDIR, "out"),
                (ENV_COMPILER, "clang++ -O2  -std=c++20"),
                (ENV_PYTHON, "  "),
            ]))
            .unwrap();

        assert_eq!(settings.model, ModelChoice::Gpt);
        assert_eq!(settings.workdir, PathBuf::from("out"));
        assert_eq!(settings.python, "python3.11");
        assert_eq!(settings.max_tokens, 2000);
        assert_eq!(
            settings.compiler,
            Some(vec!["clang++".to_string(), "-O2".to_string(), "-std=c++20".to_string()])
        );
    }

    #[test]
    fn test_invalid_file_content() {
        let mut settings = Settings::default();
        let err = settings.apply_json(r#"{"modle": "gpt"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err = settings.apply_json("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_invalid_env_model() {
        let mut settings = Settings::default();
        let err = settings.apply_env(env(&[(ENV_MODEL, "llama")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.operation(), "config::apply_env");
    }

    #[test]
    fn test_missing_key_names_variable() {
        let settings = Settings::default();
        let err = settings.provider_config(ModelChoice::Claude).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert!(err.message().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_provider_config_uses_model_and_base_url() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[(ENV_OPENAI_API_KEY, "sk-test")]))
            .unwrap();
        settings.openai_model = "gpt-4o-mini".into();
        settings.openai_base_url = Some("http://localhost:8000/v1".into());

        let config = settings.provider_config(ModelChoice::Gpt).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8000/v1"));
        assert_eq!(config.timeout_secs, Some(120));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"{"file_stem": "fast", "compiler": ["g++", "-O2"]}"#).unwrap();

        let mut settings = Settings::default();
        settings.apply_file(&path).unwrap();
        assert_eq!(settings.file_stem, "fast");
        let compiler = settings.compiler_override().unwrap().unwrap();
        assert_eq!(compiler.program, "g++");

        let err = settings.apply_file(&dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }
}
