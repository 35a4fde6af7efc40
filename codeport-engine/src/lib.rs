//! # codeport engine
//!
//! The building blocks of a Python -> C++ rewrite:
//!
//! ## Core Concepts
//! - **Prompt**: fixed system message plus the Python source as the user message
//! - **Provider**: trait-based chat-completion clients (OpenAI, Anthropic) with streaming
//! - **Sanitize**: strips markdown code fences from the reply
//! - **Artifact**: the fixed-name `.cpp` file, overwritten on every run
//! - **Toolchain**: platform detection and compiler probing
//! - **Runner**: child processes for the compiler, the binary and Python
//! - **Compare**: output and timing comparison of both versions

pub mod artifact;
pub mod compare;
pub mod config;
pub mod error;
pub mod prompt;
pub mod provider;
pub mod runner;
pub mod samples;
pub mod sanitize;
pub mod toolchain;

pub use artifact::ArtifactWriter;
pub use compare::Comparison;
pub use config::Settings;
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use prompt::PromptBuilder;
pub use provider::{
    AnthropicProvider, ChatMessage, CompletionRequest, CompletionResponse, FinishReason,
    LlmProvider, ModelChoice, OpenAIProvider, Provider, ProviderConfig, ProviderError,
    ProviderType, Role, StreamChunk, StreamReceiver, Usage,
};
pub use runner::{ProcessOutput, RunOutcome, Stage, ERROR_MARKER};
pub use samples::Sample;
pub use sanitize::{strip_code_fences, StreamSanitizer};
pub use toolchain::{Compiler, Platform, Toolchain};
