//! Makefile target detection.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::PipelineError;

/// Which steps the project's Makefile provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MakefileTargets {
    pub build: bool,
    pub test: bool,
}

impl MakefileTargets {
    /// Scans Makefile contents for lines starting with `build:` or `test:`.
    pub fn parse(contents: &str) -> Self {
        let mut targets = Self::default();

        for line in contents.lines() {
            if line.starts_with("build:") {
                targets.build = true;
            }
            if line.starts_with("test:") {
                targets.test = true;
            }
            if targets.build && targets.test {
                break;
            }
        }

        targets
    }

    /// Reads `<dir>/Makefile`. A missing file means no targets.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Workspace` for any read error other than
    /// the file not existing.
    pub async fn detect(dir: &Path) -> Result<Self, PipelineError> {
        let path = dir.join("Makefile");
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(PipelineError::Workspace {
                context: "can't read Makefile".to_string(),
                source,
            }),
        }
    }
}
