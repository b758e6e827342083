//! Loading source documents from a data directory.
//!
//! The directory is walked recursively in sorted order, following symbolic
//! links. Supported files:
//!
//! | Extension     | Handling                                          |
//! |---------------|---------------------------------------------------|
//! | `.txt`, `.md` | read as UTF-8, one document per file              |
//! | `.pdf`        | text extracted per page (feature `pdf`), one document per page |
//!
//! Everything else is skipped. Document ids are derived from the path
//! relative to the root, so loading the same tree twice yields the same ids.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::{Document, META_FILE_TYPE, META_PAGE};
use crate::error::{RagError, Result};

/// Loads every supported file below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    /// Create a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory this loader scans.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load all supported documents.
    ///
    /// A missing root yields no documents.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::LoaderError`] if a supported file cannot be read
    /// or decoded, if part of the tree cannot be walked (unreadable
    /// directory, dangling link, link loop), or if the root exists but is not
    /// a directory.
    pub fn load(&self) -> Result<Vec<Document>> {
        if !self.root.exists() {
            warn!(dir = %self.root.display(), "data directory does not exist");
            return Ok(Vec::new());
        }
        if !self.root.is_dir() {
            return Err(RagError::LoaderError {
                path: self.root.clone(),
                message: "not a directory".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                warn!(path = %path.display(), error = %e, "cannot walk data directory");
                RagError::LoaderError { path, message: e.to_string() }
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();

        let mut documents = Vec::new();
        for path in files {
            let Some(kind) = FileKind::of(&path) else {
                debug!(path = %path.display(), "skipping unsupported file");
                continue;
            };
            let loaded = match kind {
                FileKind::Text(ext) => self.load_text(&path, ext)?,
                FileKind::Pdf => self.load_pdf(&path)?,
            };
            documents.extend(loaded);
        }

        info!(dir = %self.root.display(), documents = documents.len(), "loaded documents");
        Ok(documents)
    }

    fn document_id(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn load_text(&self, path: &Path, ext: &'static str) -> Result<Vec<Document>> {
        let text = std::fs::read_to_string(path).map_err(|e| loader_err(path, e))?;
        let document = Document::new(self.document_id(path), text)
            .with_source(path.display().to_string())
            .with_metadata(META_FILE_TYPE, ext);
        Ok(vec![document])
    }

    #[cfg(feature = "pdf")]
    fn load_pdf(&self, path: &Path) -> Result<Vec<Document>> {
        let bytes = std::fs::read(path).map_err(|e| loader_err(path, e))?;
        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| loader_err(path, e))?;
        let id = self.document_id(path);
        let source = path.display().to_string();

        Ok(split_pages(&text)
            .map(|(page, text)| {
                Document::new(format!("{id}#page{page}"), text)
                    .with_source(source.clone())
                    .with_metadata(META_FILE_TYPE, "pdf")
                    .with_metadata(META_PAGE, page.to_string())
            })
            .collect())
    }

    #[cfg(not(feature = "pdf"))]
    fn load_pdf(&self, path: &Path) -> Result<Vec<Document>> {
        warn!(path = %path.display(), "PDF support is disabled, skipping");
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Text(&'static str),
    Pdf,
}

impl FileKind {
    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::Text("txt")),
            "md" => Some(Self::Text("md")),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Split extracted PDF text on form feeds into 1-based, non-blank pages.
#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
fn split_pages(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split('\u{c}')
        .enumerate()
        .map(|(i, page)| (i + 1, page))
        .filter(|(_, page)| !page.trim().is_empty())
}

fn loader_err(path: &Path, error: impl std::fmt::Display) -> RagError {
    RagError::LoaderError { path: path.to_path_buf(), message: error.to_string() }
}
