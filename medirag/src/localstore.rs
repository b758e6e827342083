//! File-backed vector store using cosine similarity.
//!
//! [`LocalVectorStore`] keeps every collection in memory behind a
//! `tokio::sync::RwLock` and writes one JSON file per collection to its
//! persistence directory on [`persist`](VectorStore::persist). A new process
//! that opens the same directory can search without re-ingesting.
//!
//! File layout:
//!
//! ```text
//! <dir>/<sanitized-name>.json
//! {
//!   "format_version": 1,
//!   "name": "medibot",
//!   "space": { "model": "ollama/all-minilm", "dimensions": 384 },
//!   "entries": [ { "id": "...", "text": "...", "embedding": [...], ... } ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::{Chunk, SearchResult};
use crate::embedding::EmbeddingSpace;
use crate::error::{RagError, Result};
use crate::vectorstore::{CollectionInfo, VectorStore};

const BACKEND: &str = "Local";
const FORMAT_VERSION: u32 = 1;

/// Collection entries in insertion order, keyed by chunk id.
#[derive(Debug, Clone)]
struct Collection {
    space: EmbeddingSpace,
    entries: IndexMap<String, Chunk>,
}

impl Collection {
    fn new(space: EmbeddingSpace) -> Self {
        Self { space, entries: IndexMap::new() }
    }
}

#[derive(Serialize, Deserialize)]
struct CollectionFile {
    format_version: u32,
    name: String,
    space: EmbeddingSpace,
    entries: Vec<Chunk>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, Collection>,
    /// Collections changed since the last persist.
    dirty: HashSet<String>,
    /// Collections deleted since the last persist.
    removed: HashSet<String>,
}

/// A vector store persisted as JSON files in a local directory.
///
/// # Example
///
/// ```rust,ignore
/// use medirag::{LocalVectorStore, VectorStore};
///
/// let store = LocalVectorStore::open("./chroma").await?;
/// let results = store.search("medibot", &query_embedding, 4).await?;
/// ```
#[derive(Debug, Default)]
pub struct LocalVectorStore {
    dir: Option<PathBuf>,
    state: RwLock<State>,
}

impl LocalVectorStore {
    /// Create a store that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (creating if needed) the persistence directory at `dir` and load
    /// every collection file in it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if the directory cannot be
    /// created or read, or a collection file is corrupt or written by an
    /// unsupported format version.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_err(format!("cannot create '{}': {e}", dir.display())))?;

        let mut collections = HashMap::new();
        let mut listing = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| store_err(format!("cannot read '{}': {e}", dir.display())))?;
        while let Some(entry) = listing
            .next_entry()
            .await
            .map_err(|e| store_err(format!("cannot read '{}': {e}", dir.display())))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let (name, collection) = load_collection(&path).await?;
            if path.file_stem().and_then(|stem| stem.to_str()) != Some(file_stem(&name).as_str()) {
                return Err(store_err(format!(
                    "'{}' holds collection '{name}', which belongs in '{}'",
                    path.display(),
                    collection_path(&dir, &name).display()
                )));
            }
            debug!(collection = %name, entries = collection.entries.len(), "loaded collection");
            collections.insert(name, collection);
        }

        info!(dir = %dir.display(), collections = collections.len(), "opened vector store");
        Ok(Self {
            dir: Some(dir),
            state: RwLock::new(State { collections, ..State::default() }),
        })
    }

    /// The persistence directory, if the store is file-backed.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn store_err(message: String) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message }
}

/// Map a collection name onto a safe, unique file stem.
///
/// ASCII letters, digits and `-` are kept. Every other byte of the UTF-8
/// name, `_` included, becomes `_xx` in lower-case hex, so distinct names
/// never share a file.
fn file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{byte:02x}"));
        }
    }
    stem
}

fn collection_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", file_stem(name)))
}

/// Check that `space` may be written into a collection recorded with `recorded`.
fn check_space(collection: &str, recorded: &EmbeddingSpace, space: &EmbeddingSpace) -> Result<()> {
    if recorded.model != space.model {
        return Err(RagError::EmbeddingSpaceMismatch {
            collection: collection.to_string(),
            expected: recorded.model.clone(),
            actual: space.model.clone(),
        });
    }
    if recorded.dimensions != space.dimensions {
        return Err(RagError::DimensionMismatch {
            collection: collection.to_string(),
            expected: recorded.dimensions,
            actual: space.dimensions,
        });
    }
    Ok(())
}

/// Check that every chunk carries a vector of length `expected`.
fn check_dimensions(collection: &str, expected: usize, chunks: &[Chunk]) -> Result<()> {
    match chunks.iter().find(|c| c.embedding.len() != expected) {
        Some(bad) => Err(RagError::DimensionMismatch {
            collection: collection.to_string(),
            expected,
            actual: bad.embedding.len(),
        }),
        None => Ok(()),
    }
}

async fn load_collection(path: &Path) -> Result<(String, Collection)> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| store_err(format!("cannot read '{}': {e}", path.display())))?;
    let file: CollectionFile = serde_json::from_slice(&bytes)
        .map_err(|e| store_err(format!("corrupt collection file '{}': {e}", path.display())))?;
    if file.format_version != FORMAT_VERSION {
        return Err(store_err(format!(
            "'{}' has format version {}, expected {FORMAT_VERSION}",
            path.display(),
            file.format_version
        )));
    }
    let entries = file.entries.into_iter().map(|chunk| (chunk.id.clone(), chunk)).collect();
    Ok((file.name, Collection { space: file.space, entries }))
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| store_err(format!("cannot write '{}': {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| store_err(format!("cannot replace '{}': {e}", path.display())))
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn create_collection(&self, name: &str, space: &EmbeddingSpace) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.collections.get(name) {
            return check_space(name, &existing.space, space);
        }
        state.collections.insert(name.to_string(), Collection::new(space.clone()));
        state.dirty.insert(name.to_string());
        state.removed.remove(name);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.collections.remove(name).is_some() {
            state.dirty.remove(name);
            state.removed.insert(name.to_string());
            info!(collection = name, "deleted collection");
        }
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        space: &EmbeddingSpace,
        chunks: &[Chunk],
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let expected = match state.collections.get(collection) {
            Some(existing) => {
                check_space(collection, &existing.space, space)?;
                existing.space.dimensions
            }
            None => space.dimensions,
        };
        check_dimensions(collection, expected, chunks)?;

        let entries = &mut state
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(space.clone()))
            .entries;
        for chunk in chunks {
            entries.insert(chunk.id.clone(), chunk.clone());
        }
        state.dirty.insert(collection.to_string());
        state.removed.remove(collection);
        debug!(collection, count = chunks.len(), "upserted chunks");
        Ok(())
    }

    async fn replace_collection(
        &self,
        collection: &str,
        space: &EmbeddingSpace,
        chunks: &[Chunk],
    ) -> Result<()> {
        check_dimensions(collection, space.dimensions, chunks)?;

        let mut fresh = Collection::new(space.clone());
        for chunk in chunks {
            fresh.entries.insert(chunk.id.clone(), chunk.clone());
        }

        let mut state = self.state.write().await;
        let previous = state.collections.insert(collection.to_string(), fresh);
        state.dirty.insert(collection.to_string());
        state.removed.remove(collection);
        info!(
            collection,
            count = chunks.len(),
            replaced = previous.map_or(0, |c| c.entries.len()),
            "replaced collection"
        );
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut state = self.state.write().await;
        let store = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        for id in ids {
            store.entries.shift_remove(*id);
        }
        state.dirty.insert(collection.to_string());
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        let store = state
            .collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        if embedding.len() != store.space.dimensions {
            return Err(RagError::DimensionMismatch {
                collection: collection.to_string(),
                expected: store.space.dimensions,
                actual: embedding.len(),
            });
        }

        let mut scored: Vec<SearchResult> = store
            .entries
            .values()
            .map(|chunk| SearchResult {
                chunk: chunk.clone(),
                score: cosine_similarity(&chunk.embedding, embedding),
            })
            .collect();

        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let state = self.state.read().await;
        Ok(state.collections.get(name).map(|c| CollectionInfo {
            name: name.to_string(),
            space: c.space.clone(),
            entry_count: c.entries.len(),
        }))
    }

    async fn persist(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let mut state = self.state.write().await;
        let mut dirty: Vec<&String> = state.dirty.iter().collect();
        dirty.sort();
        for name in dirty {
            let Some(collection) = state.collections.get(name) else {
                continue;
            };
            let file = CollectionFile {
                format_version: FORMAT_VERSION,
                name: name.clone(),
                space: collection.space.clone(),
                entries: collection.entries.values().cloned().collect(),
            };
            let bytes = serde_json::to_vec(&file)
                .map_err(|e| store_err(format!("cannot serialize collection '{name}': {e}")))?;
            write_atomically(&collection_path(dir, name), &bytes).await?;
            debug!(collection = %name, entries = file.entries.len(), "persisted collection");
        }

        for name in &state.removed {
            let path = collection_path(dir, name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(collection = %name, error = %e, "failed to remove collection file");
                    return Err(store_err(format!("cannot remove '{}': {e}", path.display())));
                }
            }
        }

        state.dirty.clear();
        state.removed.clear();
        info!(dir = %dir.display(), "vector store persisted");
        Ok(())
    }
}
