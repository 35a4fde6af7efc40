//! Translator implementation - orchestrates prompt -> model -> file -> compiler

use codeport_engine::{
    runner, ArtifactWriter, Comparison, Error, ErrorKind, FinishReason, LlmProvider, ModelChoice,
    Platform, PromptBuilder, Provider, Result, RunOutcome, Settings, StreamChunk, StreamSanitizer,
    Toolchain, Usage,
};
use serde::Serialize;
use std::path::PathBuf;

/// Outcome of one translation request.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub provider: String,
    pub model: String,
    /// Sanitized C++ exactly as written to disk
    pub cpp: String,
    pub path: PathBuf,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

impl Translation {
    /// The reply hit the token limit or the stream ended without a stop
    /// reason; the code is likely cut off.
    pub fn truncated(&self) -> bool {
        matches!(self.finish_reason, FinishReason::Length | FinishReason::Unknown)
    }
}

/// Linear orchestration of the translate / compile / run / compare steps.
pub struct Translator {
    settings: Settings,
    platform: Platform,
    prompt: PromptBuilder,
    artifacts: ArtifactWriter,
}

impl Translator {
    pub fn new(settings: Settings) -> Self {
        Self::for_platform(settings, Platform::current())
    }

    pub fn for_platform(settings: Settings, platform: Platform) -> Self {
        let artifacts = settings.artifacts().with_platform(platform);
        Self {
            prompt: PromptBuilder::for_platform(platform),
            platform,
            artifacts,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn artifacts(&self) -> &ArtifactWriter {
        &self.artifacts
    }

    pub fn prompt(&self) -> &PromptBuilder {
        &self.prompt
    }

    /// Build the client for `choice` from the configured keys.
    pub fn provider(&self, choice: ModelChoice) -> Result<Provider> {
        let config = self.settings.provider_config(choice)?;
        Provider::from_config(config)
    }

    /// Translate with the provider behind `choice`.
    ///
    /// `on_update` receives the sanitized C++ so far after every delta.
    pub async fn translate<F>(&self, python: &str, choice: ModelChoice, on_update: F) -> Result<Translation>
    where
        F: FnMut(&str),
    {
        let provider = self.provider(choice)?;
        self.translate_with(&provider, python, on_update).await
    }

    /// Translate with an already-built provider.
    pub async fn translate_with<P, F>(&self, provider: &P, python: &str, mut on_update: F) -> Result<Translation>
    where
        P: LlmProvider,
        F: FnMut(&str),
    {
        if python.trim().is_empty() {
            return Err(Error::invalid_argument("no Python source given")
                .with_operation("translator::translate"));
        }

        let model = provider.default_model().to_string();
        let request = self
            .prompt
            .request(python)
            .with_model(model.clone())
            .with_max_tokens(self.settings.max_tokens);

        tracing::info!(provider = provider.name(), model = %model, "requesting translation");

        let mut stream = provider.stream(request).await.map_err(|e| {
            e.into_error(provider.name(), "translator::translate")
                .with_context("model", model.clone())
        })?;

        let mut sanitizer = StreamSanitizer::new();
        let mut finish_reason = FinishReason::Unknown;
        let mut usage = None;

        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::Text(delta) => {
                    let so_far = sanitizer.push(&delta);
                    on_update(&so_far);
                }
                StreamChunk::Done {
                    finish_reason: reason,
                    usage: u,
                } => {
                    finish_reason = reason;
                    usage = u;
                    break;
                }
                StreamChunk::Error(message) => {
                    return Err(Error::inference_failed(message)
                        .with_operation("translator::translate")
                        .with_context("provider", provider.name().to_string())
                        .with_context("model", model));
                }
            }
        }

        let cpp = sanitizer.finish();
        if cpp.trim().is_empty() {
            return Err(Error::inference_failed("model returned no code")
                .with_operation("translator::translate")
                .with_context("provider", provider.name().to_string())
                .with_context("model", model));
        }
        match finish_reason {
            FinishReason::Length => {
                tracing::warn!(model = %model, "reply hit the token limit; the C++ is probably incomplete")
            }
            FinishReason::Unknown => {
                tracing::warn!(model = %model, "reply ended without a stop reason; the C++ may be incomplete")
            }
            _ => {}
        }

        let path = self
            .artifacts
            .write(&cpp)
            .map_err(|e| e.with_operation("translator::translate"))?;

        Ok(Translation {
            provider: provider.name().to_string(),
            model,
            cpp,
            path,
            finish_reason,
            usage,
        })
    }

    /// The configured compiler, or the first working one for this platform.
    pub async fn toolchain(&self) -> Result<Toolchain> {
        if let Some(compiler) = self.settings.compiler_override()? {
            return Ok(Toolchain::new(self.platform, compiler));
        }
        Toolchain::detect(self.platform, &self.artifacts.probe_dir())
            .await?
            .ok_or_else(|| {
                Error::toolchain_unavailable(self.platform.name())
                    .with_operation("translator::toolchain")
            })
    }

    /// Compile the current output file and run the binary.
    pub async fn compile_and_run(&self) -> Result<RunOutcome> {
        let source = self.artifacts.source_path();
        if !source.exists() {
            return Err(Error::new(
                ErrorKind::FileNotFound,
                format!("{} does not exist yet; translate something first", source.display()),
            )
            .with_operation("translator::compile_and_run"));
        }

        let toolchain = self.toolchain().await?;
        Ok(runner::compile_and_run(&toolchain, &source, &self.artifacts.binary_path()).await)
    }

    /// Run the Python original with the configured interpreter.
    pub async fn run_python(&self, python: &str) -> Result<RunOutcome> {
        let script = self
            .artifacts
            .write_python(python)
            .map_err(|e| e.with_operation("translator::run_python"))?;
        Ok(runner::run_python(&self.settings.python, &script).await)
    }

    /// Run both versions and compare what they print.
    pub async fn verify(&self, python: &str) -> Result<Comparison> {
        let py = self.run_python(python).await?;
        let cpp = self.compile_and_run().await?;
        let comparison = Comparison::new(py, cpp);
        tracing::info!(matches = comparison.outputs_match(), speedup = ?comparison.speedup(), "verification finished");
        Ok(comparison)
    }
}
