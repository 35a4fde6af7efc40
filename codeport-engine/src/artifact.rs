//! Fixed-name files in the work directory.
//!
//! Every translation overwrites `<workdir>/<stem>.cpp`; nothing else is kept.

use crate::error::{Error, ErrorKind, Result};
use crate::sanitize::strip_code_fences;
use crate::toolchain::Platform;
use std::path::{Path, PathBuf};

pub const DEFAULT_STEM: &str = "optimized";

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    workdir: PathBuf,
    stem: String,
    platform: Platform,
}

impl ArtifactWriter {
    pub fn new(workdir: impl AsRef<Path>, stem: impl Into<String>) -> Self {
        let workdir = workdir.as_ref();
        let workdir = if workdir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            workdir.to_path_buf()
        };
        Self {
            workdir,
            stem: stem.into(),
            platform: Platform::current(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn source_path(&self) -> PathBuf {
        self.workdir.join(format!("{}.cpp", self.stem))
    }

    pub fn binary_path(&self) -> PathBuf {
        self.workdir
            .join(format!("{}{}", self.stem, self.platform.executable_suffix()))
    }

    pub fn python_path(&self) -> PathBuf {
        self.workdir.join(format!("{}.py", self.stem))
    }

    /// Scratch directory used for compiler probing
    pub fn probe_dir(&self) -> PathBuf {
        self.workdir.join(".codeport-probe")
    }

    /// Overwrite the C++ file with `cpp`, minus any code fences.
    pub fn write(&self, cpp: &str) -> Result<PathBuf> {
        let path = self.source_path();
        self.write_file(&path, &strip_code_fences(cpp))?;
        tracing::info!(path = %path.display(), bytes = cpp.len(), "wrote C++ source");
        Ok(path)
    }

    /// Persist the Python input so it can run out-of-process.
    pub fn write_python(&self, python: &str) -> Result<PathBuf> {
        let path = self.python_path();
        self.write_file(&path, python)?;
        Ok(path)
    }

    /// The last written C++ source.
    pub fn read_source(&self) -> Result<String> {
        let path = self.source_path();
        std::fs::read_to_string(&path).map_err(|e| {
            let err = Error::from(e);
            let err = if err.kind() == ErrorKind::FileNotFound {
                Error::new(
                    ErrorKind::FileNotFound,
                    format!("{} does not exist yet; translate something first", path.display()),
                )
            } else {
                err
            };
            err.with_operation("artifact::read_source")
                .with_context("path", path.display().to_string())
        })
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::create_dir_all(&self.workdir).map_err(|e| {
            Error::from(e)
                .with_operation("artifact::write")
                .with_context("workdir", self.workdir.display().to_string())
        })?;
        std::fs::write(path, content).map_err(|e| {
            Error::from(e)
                .with_operation("artifact::write")
                .with_context("path", path.display().to_string())
        })
    }
}

impl Default for ArtifactWriter {
    fn default() -> Self {
        Self::new(".", DEFAULT_STEM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let writer = ArtifactWriter::new("out", "optimized").with_platform(Platform::Linux);
        assert_eq!(writer.source_path(), Path::new("out").join("optimized.cpp"));
        assert_eq!(writer.binary_path(), Path::new("out").join("optimized"));
        assert_eq!(writer.python_path(), Path::new("out").join("optimized.py"));

        let writer = writer.with_platform(Platform::Windows);
        assert_eq!(writer.binary_path(), Path::new("out").join("optimized.exe"));
    }

    #[test]
    fn test_empty_workdir_is_cwd() {
        let writer = ArtifactWriter::new("", "optimized");
        assert_eq!(writer.workdir(), Path::new("."));
    }

    #[test]
    fn test_write_sanitizes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("nested"), "optimized");

        let path = writer.write("```cpp\nint main() { return 1; }\n```").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "int main() { return 1; }\n");

        writer.write("int main() { return 0; }\n").unwrap();
        assert_eq!(writer.read_source().unwrap(), "int main() { return 0; }\n");
    }

    #[test]
    fn test_read_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path(), "optimized");
        let err = writer.read_source().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(err.message().contains("translate something first"));
    }

    #[test]
    fn test_write_python() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path(), "optimized");
        let path = writer.write_python("print('hi')\n").unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("py"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "print('hi')\n");
    }
}
