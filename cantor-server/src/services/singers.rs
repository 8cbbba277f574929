//! Installed singer catalog
//!
//! Each immediate sub-directory of the singers path is one installed singer,
//! named after the directory. Track bindings resolve against this catalog by
//! exact name; unknown names become "missing" placeholders.

use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

use crate::models::project::SingerBinding;

#[derive(Debug, Clone, Default)]
pub struct SingerCatalog {
    names: BTreeSet<String>,
}

impl SingerCatalog {
    /// Catalog with no installed singers
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Scan `dir` (depth 1) for singer directories
    ///
    /// A missing directory yields an empty catalog. Hidden directories are
    /// skipped.
    pub fn scan(dir: &Path) -> Self {
        if !dir.is_dir() {
            tracing::warn!(path = %dir.display(), "Singers directory not found, no singers installed");
            return Self::empty();
        }

        let mut names = BTreeSet::new();
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_dir() {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.starts_with('.') {
                        continue;
                    }
                    names.insert(name);
                }
                Err(e) => {
                    tracing::warn!("Error accessing singer entry: {}", e);
                }
            }
        }

        tracing::info!(path = %dir.display(), count = names.len(), "Singer catalog loaded");
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Binding for `name`; a placeholder flagged `missing` when not installed
    pub fn resolve(&self, name: &str) -> SingerBinding {
        let missing = !self.contains(name);
        if missing {
            tracing::debug!(singer = %name, "Singer not installed, binding placeholder");
        }
        SingerBinding {
            name: name.to_string(),
            missing,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
