use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{IndexStats, RepositoryRecord, SearchHit};

const INDEX_FILE: &str = "stars.json";
const LOG_FILE: &str = "stars.log";
const FORMAT_VERSION: u32 = 1;

/// Compacted snapshot: a metadata table and an embedding table in one
/// document, so both are replaced together by a single rename.
#[derive(Serialize)]
struct IndexDocumentRef<'a> {
    version: u32,
    dimension: usize,
    repositories: &'a [RepositoryRecord],
    vectors: Vec<VectorRowRef<'a>>,
}

#[derive(Serialize)]
struct VectorRowRef<'a> {
    id: u64,
    embedding: &'a [f32],
}

#[derive(Deserialize)]
struct IndexDocument {
    version: u32,
    dimension: usize,
    repositories: Vec<RepositoryRecord>,
    vectors: Vec<VectorRow>,
}

#[derive(Deserialize)]
struct VectorRow {
    id: u64,
    embedding: Vec<f32>,
}

/// One line of the write-ahead log. Every write since the last compaction
/// is a single appended line, so a record and its vector land together.
#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntryRef<'a> {
    Upsert {
        record: &'a RepositoryRecord,
        embedding: Option<&'a [f32]>,
    },
    Delete {
        id: u64,
    },
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Upsert {
        record: RepositoryRecord,
        embedding: Option<Vec<f32>>,
    },
    Delete {
        id: u64,
    },
}

/// Repository records plus their embeddings, persisted to disk, with
/// nearest-neighbour search by cosine distance.
///
/// Writes append one line to `stars.log`; the log is folded into the
/// `stars.json` snapshot on open and by [`compact`](Self::compact).
/// Records keep insertion order; replacing a record keeps its slot, which is
/// what search uses to break distance ties.
pub struct VectorIndex {
    entries: RwLock<Vec<RepositoryRecord>>,
    dimension: usize,
    persist_path: PathBuf,
    log_path: PathBuf,
}

impl VectorIndex {
    pub fn open_or_create(index_dir: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(index_dir).map_err(|e| Error::storage(index_dir, e))?;
        let persist_path = index_dir.join(INDEX_FILE);
        let log_path = index_dir.join(LOG_FILE);

        let mut entries = if persist_path.exists() {
            load_document(&persist_path, dimension)?
        } else {
            Vec::new()
        };
        let replayed = replay_log(&log_path, dimension, &mut entries)?;

        tracing::debug!(
            "Opened index at {} with {} records ({replayed} logged writes)",
            persist_path.display(),
            entries.len()
        );

        let index = Self {
            entries: RwLock::new(entries),
            dimension,
            persist_path,
            log_path,
        };
        if replayed > 0 {
            index.compact()?;
        }
        Ok(index)
    }

    /// Whether an index already exists in `index_dir`.
    pub fn exists_at(index_dir: &Path) -> bool {
        index_dir.join(INDEX_FILE).exists() || index_dir.join(LOG_FILE).exists()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn path(&self) -> &Path {
        &self.persist_path
    }

    /// Insert `record`, or replace every field of the record with the same id.
    /// Blocks on file I/O; async callers go through `spawn_blocking`.
    pub fn upsert(&self, record: RepositoryRecord) -> Result<()> {
        if let Some(embedding) = &record.embedding {
            if embedding.len() != self.dimension {
                return Err(Error::Input(format!(
                    "embedding for {} has {} dimensions, index expects {}",
                    record.full_name,
                    embedding.len(),
                    self.dimension
                )));
            }
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(Error::Input(format!(
                    "embedding for {} contains non-finite values",
                    record.full_name
                )));
            }
        }

        let mut entries = self.entries.write();
        self.append(&LogEntryRef::Upsert {
            record: &record,
            embedding: record.embedding.as_deref(),
        })?;
        apply_upsert(&mut entries, record);
        Ok(())
    }

    /// Remove a record and its vector. Returns whether anything was removed.
    pub fn delete(&self, id: u64) -> Result<bool> {
        let mut entries = self.entries.write();
        let Some(position) = entries.iter().position(|e| e.id == id) else {
            return Ok(false);
        };

        self.append(&LogEntryRef::Delete { id })?;
        entries.remove(position);
        Ok(true)
    }

    /// Fold the write log into the snapshot: temp file + rename, then drop
    /// the log.
    pub fn compact(&self) -> Result<()> {
        let entries = self.entries.write();
        self.write_snapshot(&entries)?;
        match std::fs::remove_file(&self.log_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::storage(&self.log_path, e)),
        }
        tracing::debug!("Compacted index to {} records", entries.len());
        Ok(())
    }

    pub fn exists(&self, id: u64) -> bool {
        self.entries.read().iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: u64) -> Option<RepositoryRecord> {
        self.entries.read().iter().find(|e| e.id == id).cloned()
    }

    pub fn all_ids(&self) -> BTreeSet<u64> {
        self.entries.read().iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// The `k` records closest to `query_embedding`, ascending by cosine
    /// distance. Records without an embedding never match.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query_embedding.len() != self.dimension {
            return Err(Error::Input(format!(
                "query embedding has {} dimensions, index expects {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        let entries = self.entries.read();

        let mut scored: Vec<(f32, &RepositoryRecord)> = entries
            .iter()
            .filter_map(|e| {
                e.embedding
                    .as_deref()
                    .map(|v| (cosine_distance(query_embedding, v), e))
            })
            .collect();

        // Stable sort: equal distances stay in insertion order
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, e)| SearchHit {
                record: e.clone(),
                distance,
            })
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        let entries = self.entries.read();
        IndexStats {
            total: entries.len(),
            with_embedding: entries.iter().filter(|e| e.embedding.is_some()).count(),
            with_readme: entries.iter().filter(|e| e.readme_text.is_some()).count(),
        }
    }


    /// Append one entry to the log. A failed write is cut back off so the
    /// next append starts on a clean line.
    fn append(&self, entry: &LogEntryRef<'_>) -> Result<()> {
        let mut line =
            serde_json::to_vec(entry).map_err(|e| Error::storage(&self.log_path, e))?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| Error::storage(&self.log_path, e))?;
        let start = file
            .metadata()
            .map_err(|e| Error::storage(&self.log_path, e))?
            .len();

        if let Err(e) = file.write_all(&line).and_then(|()| file.flush()) {
            let _ = file.set_len(start);
            return Err(Error::storage(&self.log_path, e));
        }
        Ok(())
    }

    /// Atomic write via temp file + rename.
    fn write_snapshot(&self, entries: &[RepositoryRecord]) -> Result<()> {
        let document = IndexDocumentRef {
            version: FORMAT_VERSION,
            dimension: self.dimension,
            repositories: entries,
            vectors: entries
                .iter()
                .filter_map(|e| {
                    e.embedding.as_deref().map(|embedding| VectorRowRef {
                        id: e.id,
                        embedding,
                    })
                })
                .collect(),
        };

        let data =
            serde_json::to_vec(&document).map_err(|e| Error::storage(&self.persist_path, e))?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data).map_err(|e| Error::storage(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &self.persist_path)
            .map_err(|e| Error::storage(&self.persist_path, e))?;
        Ok(())
    }
}

fn apply_upsert(entries: &mut Vec<RepositoryRecord>, record: RepositoryRecord) {
    match entries.iter().position(|e| e.id == record.id) {
        Some(i) => entries[i] = record,
        None => entries.push(record),
    }
}

/// Apply every logged write to `entries`. Returns how many were applied.
/// An unparsable last line is a write torn by a crash and is dropped.
fn replay_log(path: &Path, dimension: usize, entries: &mut Vec<RepositoryRecord>) -> Result<usize> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::storage(path, e)),
    };

    let lines: Vec<&str> = data.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut applied = 0;

    for (n, line) in lines.iter().enumerate() {
        let entry: LogEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(_) if n + 1 == lines.len() && !data.ends_with('\n') => {
                tracing::warn!("Dropping torn last write in {}", path.display());
                break;
            }
            Err(e) => {
                return Err(Error::storage(
                    path,
                    format!("corrupt log line {}: {e}", n + 1),
                ))
            }
        };

        match entry {
            LogEntry::Upsert { mut record, embedding } => {
                if let Some(v) = &embedding {
                    if v.len() != dimension {
                        return Err(Error::storage(
                            path,
                            format!("vector for repository {} has {} dimensions", record.id, v.len()),
                        ));
                    }
                }
                record.embedding = embedding;
                apply_upsert(entries, record);
            }
            LogEntry::Delete { id } => entries.retain(|e| e.id != id),
        }
        applied += 1;
    }

    Ok(applied)
}

fn load_document(path: &Path, dimension: usize) -> Result<Vec<RepositoryRecord>> {
    let data = std::fs::read(path).map_err(|e| Error::storage(path, e))?;
    let document: IndexDocument = serde_json::from_slice(&data)
        .map_err(|e| Error::storage(path, format!("corrupt index file: {e}")))?;

    if document.version != FORMAT_VERSION {
        return Err(Error::storage(
            path,
            format!("unsupported index format version {}", document.version),
        ));
    }
    if document.dimension != dimension {
        return Err(Error::storage(
            path,
            format!(
                "index was built with {}-dimensional embeddings but {dimension} are configured",
                document.dimension
            ),
        ));
    }

    let mut vectors: HashMap<u64, Vec<f32>> = HashMap::with_capacity(document.vectors.len());
    for row in document.vectors {
        if row.embedding.len() != dimension {
            return Err(Error::storage(
                path,
                format!(
                    "vector for repository {} has {} dimensions",
                    row.id,
                    row.embedding.len()
                ),
            ));
        }
        vectors.insert(row.id, row.embedding);
    }

    let mut entries = document.repositories;
    for entry in entries.iter_mut() {
        entry.embedding = vectors.remove(&entry.id);
    }

    if let Some(orphan) = vectors.keys().next() {
        return Err(Error::storage(
            path,
            format!("vector for repository {orphan} has no metadata row"),
        ));
    }

    Ok(entries)
}

/// `1 - cos(a, b)`. A zero-norm side has no direction, so it scores as
/// orthogonal (distance 1).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}
