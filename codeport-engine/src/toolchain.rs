//! # Toolchain detection
//!
//! Picks a native C++ compiler and flags for the machine we are on. Each
//! platform has an ordered list of candidates; the first one that can build
//! and run a hello-world program wins.

use crate::error::{Error, Result};
use crate::runner::{self, run_process};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

const SOURCE_PLACEHOLDER: &str = "{source}";
const BINARY_PLACEHOLDER: &str = "{binary}";

const PROBE_SOURCE: &str = r#"#include <iostream>

int main() {
    std::cout << "Hello";
    return 0;
}
"#;
const PROBE_EXPECTED: &str = "Hello";

/// Coarse platform classification, enough to choose compiler flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Platform {
    MacArm,
    MacIntel,
    Linux,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn from_parts(os: &str, arch: &str) -> Self {
        match (os, arch) {
            ("macos", "aarch64") => Platform::MacArm,
            ("macos", _) => Platform::MacIntel,
            ("linux", _) => Platform::Linux,
            ("windows", _) => Platform::Windows,
            _ => Platform::Other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::MacArm | Platform::MacIntel => "Macintosh",
            Platform::Linux => "Linux",
            Platform::Windows => "Windows",
            Platform::Other => "Unknown",
        }
    }

    /// How the target machine is named in the system prompt.
    pub fn description(&self) -> &'static str {
        match self {
            Platform::MacArm => "an M1 Mac",
            Platform::MacIntel => "an Intel Mac",
            Platform::Linux => "a Linux machine",
            Platform::Windows => "a Windows PC",
            Platform::Other => "a modern 64-bit machine",
        }
    }

    pub fn executable_suffix(&self) -> &'static str {
        match self {
            Platform::Windows => ".exe",
            _ => "",
        }
    }

    /// Compilers to try, most preferred first.
    pub fn candidates(&self) -> Vec<Compiler> {
        let gnu_flags = ["-O3", "-std=c++17", "-march=native", "-o", BINARY_PLACEHOLDER, SOURCE_PLACEHOLDER];
        match self {
            Platform::MacArm => vec![Compiler::new(
                "Clang++",
                "clang++",
                [
                    "-Ofast",
                    "-std=c++17",
                    "-march=armv8.5-a",
                    "-mtune=apple-m1",
                    "-mcpu=apple-m1",
                    "-o",
                    BINARY_PLACEHOLDER,
                    SOURCE_PLACEHOLDER,
                ],
            )],
            Platform::MacIntel => vec![Compiler::new("Clang++", "clang++", gnu_flags)],
            Platform::Linux => vec![
                Compiler::new("GCC (g++)", "g++", gnu_flags),
                Compiler::new("Clang++", "clang++", gnu_flags),
            ],
            Platform::Windows => vec![
                Compiler::new(
                    "Visual C++ (cl)",
                    "cl",
                    ["/O2", "/std:c++17", "/EHsc", "/Fe:{binary}", SOURCE_PLACEHOLDER],
                ),
                Compiler::new("GCC (g++)", "g++", ["-O3", "-std=c++17", "-o", BINARY_PLACEHOLDER, SOURCE_PLACEHOLDER]),
            ],
            Platform::Other => vec![
                Compiler::new("GCC (g++)", "g++", ["-O3", "-std=c++17", "-o", BINARY_PLACEHOLDER, SOURCE_PLACEHOLDER]),
                Compiler::new("Clang++", "clang++", ["-O3", "-std=c++17", "-o", BINARY_PLACEHOLDER, SOURCE_PLACEHOLDER]),
            ],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compiler invocation template.
///
/// `args` may contain `{source}` and `{binary}`, replaced at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Compiler {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

impl Compiler {
    pub fn new<I, S>(name: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a user-supplied command line such as `["clang++", "-O2"]`.
    ///
    /// `-o {binary}` is appended when the binary placeholder is missing and
    /// `{source}` when the source placeholder is.
    pub fn from_command(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::config_invalid("compiler override is empty"))?;

        let mut args = args.to_vec();
        if !args.iter().any(|a| a.contains(BINARY_PLACEHOLDER)) {
            args.extend(["-o".to_string(), BINARY_PLACEHOLDER.to_string()]);
        }
        if !args.iter().any(|a| a.contains(SOURCE_PLACEHOLDER)) {
            args.push(SOURCE_PLACEHOLDER.to_string());
        }
        Ok(Self {
            name: format!("custom ({})", program),
            program: program.clone(),
            args,
        })
    }

    pub fn command(&self, source: &Path, binary: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let binary = binary.to_string_lossy();

        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().map(|arg| {
            arg.replace(SOURCE_PLACEHOLDER, &source)
                .replace(BINARY_PLACEHOLDER, &binary)
        }));
        argv
    }
}

/// A platform plus the compiler chosen for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toolchain {
    pub platform: Platform,
    pub compiler: Compiler,
}

impl Toolchain {
    pub fn new(platform: Platform, compiler: Compiler) -> Self {
        Self { platform, compiler }
    }

    pub fn compile_command(&self, source: &Path, binary: &Path) -> Vec<String> {
        self.compiler.command(source, binary)
    }

    /// Try each candidate for `platform` in `scratch`; `None` when none works.
    pub async fn detect(platform: Platform, scratch: &Path) -> Result<Option<Self>> {
        std::fs::create_dir_all(scratch).map_err(|e| {
            Error::from(e)
                .with_operation("toolchain::detect")
                .with_context("scratch", scratch.display().to_string())
        })?;

        let source = scratch.join("probe.cpp");
        let binary = scratch.join(format!("probe{}", platform.executable_suffix()));
        std::fs::write(&source, PROBE_SOURCE)
            .map_err(|e| Error::from(e).with_operation("toolchain::detect"))?;

        for compiler in platform.candidates() {
            let toolchain = Toolchain::new(platform, compiler);
            if toolchain.probe(&source, &binary).await {
                tracing::info!(platform = %platform, compiler = %toolchain.compiler.name, "toolchain detected");
                return Ok(Some(toolchain));
            }
            tracing::debug!(compiler = %toolchain.compiler.name, "candidate rejected");
        }

        tracing::warn!(platform = %platform, "no working C++ compiler found");
        Ok(None)
    }

    async fn probe(&self, source: &Path, binary: &Path) -> bool {
        match runner::compile(self, source, binary).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                tracing::debug!(stderr = %output.stderr, "probe compile failed");
                return false;
            }
            Err(e) => {
                tracing::debug!(error = %e, "probe compiler missing");
                return false;
            }
        }
        let program = runnable_path(binary);
        match run_process(&program.to_string_lossy(), &[], None).await {
            Ok(output) => output.success() && output.stdout == PROBE_EXPECTED,
            Err(_) => false,
        }
    }
}

/// A bare file name would be looked up on PATH; anchor it to the cwd.
fn runnable_path(path: &Path) -> PathBuf {
    if path.is_absolute() || path.components().count() > 1 {
        path.to_path_buf()
    } else {
        Path::new(".").join(path)
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.platform, self.compiler.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_parts() {
        assert_eq!(Platform::from_parts("macos", "aarch64"), Platform::MacArm);
        assert_eq!(Platform::from_parts("macos", "x86_64"), Platform::MacIntel);
        assert_eq!(Platform::from_parts("linux", "x86_64"), Platform::Linux);
        assert_eq!(Platform::from_parts("windows", "x86_64"), Platform::Windows);
        assert_eq!(Platform::from_parts("freebsd", "x86_64"), Platform::Other);
    }

    #[test]
    fn test_mac_arm_flags() {
        let candidates = Platform::MacArm.candidates();
        assert_eq!(candidates.len(), 1);
        let argv = candidates[0].command(Path::new("optimized.cpp"), Path::new("optimized"));
        assert_eq!(
            argv,
            vec![
                "clang++", "-Ofast", "-std=c++17", "-march=armv8.5-a", "-mtune=apple-m1",
                "-mcpu=apple-m1", "-o", "optimized", "optimized.cpp",
            ]
        );
    }

    #[test]
    fn test_linux_prefers_gcc_then_clang() {
        let names: Vec<_> = Platform::Linux.candidates().into_iter().map(|c| c.program).collect();
        assert_eq!(names, vec!["g++", "clang++"]);
    }

    #[test]
    fn test_msvc_output_flag_substitution() {
        let msvc = &Platform::Windows.candidates()[0];
        let argv = msvc.command(Path::new("work\\optimized.cpp"), Path::new("work\\optimized.exe"));
        assert_eq!(argv[0], "cl");
        assert!(argv.contains(&"/Fe:work\\optimized.exe".to_string()));
        assert_eq!(argv.last().map(String::as_str), Some("work\\optimized.cpp"));
    }

    #[test]
    fn test_override_without_placeholders_appends_io() {
        let compiler = Compiler::from_command(&["clang++".into(), "-O2".into()]).unwrap();
        let argv = compiler.command(Path::new("a.cpp"), Path::new("a"));
        assert_eq!(argv, vec!["clang++", "-O2", "-o", "a", "a.cpp"]);
        assert_eq!(compiler.name, "custom (clang++)");
    }

    #[test]
    fn test_override_with_placeholders_kept() {
        let command: Vec<String> = ["g++", "{source}", "-o", "{binary}", "-O1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let compiler = Compiler::from_command(&command).unwrap();
        let argv = compiler.command(Path::new("x.cpp"), Path::new("x"));
        assert_eq!(argv, vec!["g++", "x.cpp", "-o", "x", "-O1"]);
    }

    #[test]
    fn test_override_with_only_source_gets_output_flag() {
        let command: Vec<String> = ["clang++", "-O3", "{source}"].iter().map(|s| s.to_string()).collect();
        let argv = Compiler::from_command(&command)
            .unwrap()
            .command(Path::new("x.cpp"), Path::new("x"));
        assert_eq!(argv, vec!["clang++", "-O3", "x.cpp", "-o", "x"]);

        let command: Vec<String> = ["g++", "-o", "{binary}"].iter().map(|s| s.to_string()).collect();
        let argv = Compiler::from_command(&command)
            .unwrap()
            .command(Path::new("x.cpp"), Path::new("x"));
        assert_eq!(argv, vec!["g++", "-o", "x", "x.cpp"]);
    }

    #[test]
    fn test_empty_override_rejected() {
        let err = Compiler::from_command(&[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigInvalid);
    }

    #[tokio::test]
    async fn test_probe_rejects_missing_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("probe.cpp");
        std::fs::write(&source, PROBE_SOURCE).unwrap();
        let toolchain = Toolchain::new(
            Platform::Linux,
            Compiler::new("missing", "codeport-missing-cxx", ["{source}"]),
        );
        assert!(!toolchain.probe(&source, &dir.path().join("probe")).await);
    }
}
