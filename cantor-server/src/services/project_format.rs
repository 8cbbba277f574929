//! Project serialization
//!
//! Projects persist as JSON text. Reading never binds singers or
//! phonemizers; callers run [`Project::after_load`] on the result.

use std::path::Path;

use crate::error::{Error, Result};
use crate::models::project::Project;

/// Converts projects to and from their persisted textual form
pub trait ProjectSerializer: Send + Sync {
    /// Parse project text held in memory
    fn parse(&self, content: &str) -> Result<Project>;

    fn serialize(&self, project: &Project) -> Result<String>;

    /// Read and parse a project file; the file path is recorded on the result
    fn read(&self, path: &Path) -> Result<Project> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                Error::PermissionDenied(path.display().to_string())
            }
            _ => Error::InvalidProject(format!("{}: {}", path.display(), e)),
        })?;
        let mut project = self.parse(&content)?;
        project.file_path = Some(path.to_path_buf());
        Ok(project)
    }

    fn write(&self, path: &Path, project: &Project) -> Result<()> {
        let content = self.serialize(project)?;
        std::fs::write(path, content)
            .map_err(|e| Error::ExportWriteFailed(format!("{}: {}", path.display(), e)))
    }
}

/// Pretty-printed JSON project format
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProjectFormat;

impl ProjectSerializer for JsonProjectFormat {
    fn parse(&self, content: &str) -> Result<Project> {
        if content.trim().is_empty() {
            return Err(Error::InvalidProject("project content is empty".to_string()));
        }
        serde_json::from_str(content).map_err(|e| Error::InvalidProject(e.to_string()))
    }

    fn serialize(&self, project: &Project) -> Result<String> {
        serde_json::to_string_pretty(project).map_err(|e| Error::InvalidProject(e.to_string()))
    }
}
