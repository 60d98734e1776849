use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{info, warn};

use super::CacheState;
use crate::error::{EngineError, Result};
use crate::model::{Chunk, SectionContainer};
use crate::retrieval::{ChunkEmbeddings, LexicalIndex, Posting, RetrievalIndex};
use crate::semantic::{decode_embedding_blob, encode_embedding_blob};
use crate::util::{ensure_directory, now_utc_string, publish_file, temp_sibling};

pub const RETRIEVAL_SCHEMA_VERSION: &str = "1";

/// Everything needed to rebuild a [`RetrievalIndex`] without re-segmenting.
/// `embeddings` is `None` when the stored vectors came from another model.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalCacheContents {
    pub content_hash: String,
    pub generated_at: String,
    pub containers: Vec<SectionContainer>,
    pub chunks: Vec<Chunk>,
    pub lexical: LexicalIndex,
    pub embeddings: Option<ChunkEmbeddings>,
}

fn configure_connection(connection: &Connection) -> Result<()> {
    // One self-contained file, so the rename publishes everything at once.
    connection.pragma_update(None, "journal_mode", "DELETE")?;
    connection.pragma_update(None, "synchronous", "FULL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cache_metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
          ord INTEGER PRIMARY KEY,
          chunk_id TEXT NOT NULL UNIQUE,
          payload_json TEXT NOT NULL,
          token_count INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lexical_postings (
          term TEXT NOT NULL,
          ord INTEGER NOT NULL,
          tf INTEGER NOT NULL,
          PRIMARY KEY (term, ord),
          FOREIGN KEY (ord) REFERENCES chunks(ord)
        );

        CREATE TABLE IF NOT EXISTS chunk_embeddings (
          ord INTEGER PRIMARY KEY,
          dimensions INTEGER NOT NULL,
          embedding BLOB NOT NULL,
          FOREIGN KEY (ord) REFERENCES chunks(ord)
        );
        ",
    )?;
    Ok(())
}

pub fn write_retrieval_cache(
    path: &Path,
    content_hash: &str,
    containers: &[SectionContainer],
    index: &RetrievalIndex,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let temp = temp_sibling(path);
    if temp.exists() {
        fs::remove_file(&temp).map_err(|source| EngineError::CacheWrite {
            path: temp.clone(),
            source,
        })?;
    }

    if let Err(err) = write_database(&temp, content_hash, containers, index) {
        let _ = fs::remove_file(&temp);
        return Err(err);
    }
    publish_file(&temp, path)?;

    info!(
        path = %path.display(),
        chunks = index.chunks().len(),
        terms = index.lexical().term_count(),
        vectors = index.embeddings().map(|value| value.vectors.len()).unwrap_or(0),
        "published retrieval cache"
    );
    Ok(())
}

fn write_database(
    path: &Path,
    content_hash: &str,
    containers: &[SectionContainer],
    index: &RetrievalIndex,
) -> Result<()> {
    let mut connection = Connection::open(path)?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;

    let tx = connection.transaction()?;
    {
        let mut metadata =
            tx.prepare("INSERT OR REPLACE INTO cache_metadata(key, value) VALUES(?1, ?2)")?;
        metadata.execute(params!["schema_version", RETRIEVAL_SCHEMA_VERSION])?;
        metadata.execute(params!["content_hash", content_hash])?;
        metadata.execute(params!["generated_at", now_utc_string()])?;
        metadata.execute(params!["chunk_count", index.chunks().len().to_string()])?;
        metadata.execute(params!["containers_json", serde_json::to_string(containers)?])?;
        if let Some(embeddings) = index.embeddings() {
            metadata.execute(params!["embedding_model_id", embeddings.model_id])?;
            metadata.execute(params![
                "embedding_dimensions",
                embeddings.dimensions.to_string()
            ])?;
        }

        let lengths = index.lexical().doc_lengths();
        let mut chunk_insert = tx.prepare(
            "INSERT INTO chunks(ord, chunk_id, payload_json, token_count) VALUES(?1, ?2, ?3, ?4)",
        )?;
        for (ord, chunk) in index.chunks().iter().enumerate() {
            let token_count = lengths.get(ord).copied().unwrap_or(0);
            chunk_insert.execute(params![
                ord as i64,
                chunk.chunk_id,
                serde_json::to_string(chunk)?,
                i64::from(token_count),
            ])?;
        }

        let mut posting_insert =
            tx.prepare("INSERT INTO lexical_postings(term, ord, tf) VALUES(?1, ?2, ?3)")?;
        for (term, list) in index.lexical().postings() {
            for posting in list {
                posting_insert.execute(params![term, posting.ord as i64, i64::from(posting.tf)])?;
            }
        }

        if let Some(embeddings) = index.embeddings() {
            let mut vector_insert = tx.prepare(
                "INSERT INTO chunk_embeddings(ord, dimensions, embedding) VALUES(?1, ?2, ?3)",
            )?;
            for (ord, vector) in embeddings.vectors.iter().enumerate() {
                vector_insert.execute(params![
                    ord as i64,
                    vector.len() as i64,
                    encode_embedding_blob(vector),
                ])?;
            }
        }
    }
    tx.commit()?;

    connection
        .close()
        .map_err(|(_, err)| EngineError::Storage(err))
}

/// Reads the retrieval cache for `content_hash`.
///
/// Vectors from a different model id are dropped (the caller recomputes
/// them). Vectors from the same model id with a width other than
/// `dimensions` are an [`EngineError::EmbeddingDimensionMismatch`]; they are
/// never reshaped. Anything SQLite cannot read is `CacheCorrupt`.
pub fn load_retrieval_cache(
    path: &Path,
    content_hash: &str,
    model_id: &str,
    dimensions: usize,
) -> Result<CacheState<RetrievalCacheContents>> {
    if !path.exists() {
        return Ok(CacheState::Missing);
    }

    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| EngineError::corrupt(path, err.to_string()))?;

    read_contents(&connection, path, content_hash, model_id, dimensions).map_err(|err| match err {
        EngineError::Storage(inner) => EngineError::corrupt(path, inner.to_string()),
        EngineError::Serialization(inner) => EngineError::corrupt(path, inner.to_string()),
        other => other,
    })
}

fn read_contents(
    connection: &Connection,
    path: &Path,
    content_hash: &str,
    model_id: &str,
    dimensions: usize,
) -> Result<CacheState<RetrievalCacheContents>> {
    let schema_version = read_metadata(connection, "schema_version")?;
    if schema_version.as_deref() != Some(RETRIEVAL_SCHEMA_VERSION) {
        return Ok(CacheState::Stale(format!(
            "schema version {} (expected {RETRIEVAL_SCHEMA_VERSION})",
            schema_version.as_deref().unwrap_or("-")
        )));
    }

    let cached_hash = read_metadata(connection, "content_hash")?.unwrap_or_default();
    if cached_hash != content_hash {
        warn!(
            path = %path.display(),
            cached = %cached_hash,
            current = %content_hash,
            "retrieval cache is stale"
        );
        return Ok(CacheState::Stale("document content hash changed".to_string()));
    }

    let generated_at = read_metadata(connection, "generated_at")?.unwrap_or_default();
    let containers = match read_metadata(connection, "containers_json")? {
        Some(json) => serde_json::from_str::<Vec<SectionContainer>>(&json)?,
        None => return Err(EngineError::corrupt(path, "containers_json missing")),
    };

    let (chunks, doc_lengths) = read_chunks(connection, path)?;
    let expected_count = read_metadata(connection, "chunk_count")?
        .and_then(|value| value.parse::<usize>().ok());
    if expected_count != Some(chunks.len()) {
        return Err(EngineError::corrupt(
            path,
            format!(
                "chunk_count {:?} but {} chunks stored",
                expected_count,
                chunks.len()
            ),
        ));
    }

    let lexical = LexicalIndex::from_parts(read_postings(connection, path, chunks.len())?, doc_lengths);
    let embeddings = read_embeddings(connection, path, chunks.len(), model_id, dimensions)?;

    Ok(CacheState::Fresh(RetrievalCacheContents {
        content_hash: cached_hash,
        generated_at,
        containers,
        chunks,
        lexical,
        embeddings,
    }))
}

fn read_metadata(connection: &Connection, key: &str) -> Result<Option<String>> {
    Ok(connection
        .query_row(
            "SELECT value FROM cache_metadata WHERE key = ?1",
            [key],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

fn read_chunks(connection: &Connection, path: &Path) -> Result<(Vec<Chunk>, Vec<u32>)> {
    let mut statement =
        connection.prepare("SELECT ord, payload_json, token_count FROM chunks ORDER BY ord ASC")?;
    let mut rows = statement.query([])?;

    let mut chunks = Vec::<Chunk>::new();
    let mut lengths = Vec::<u32>::new();
    while let Some(row) = rows.next()? {
        let ord = row.get::<_, i64>(0)?;
        if ord != chunks.len() as i64 {
            return Err(EngineError::corrupt(
                path,
                format!("chunk ordinal {ord} out of sequence"),
            ));
        }
        let payload = row.get::<_, String>(1)?;
        chunks.push(serde_json::from_str::<Chunk>(&payload)?);

        let token_count = row.get::<_, i64>(2)?;
        let token_count = u32::try_from(token_count)
            .map_err(|_| EngineError::corrupt(path, format!("token_count {token_count}")))?;
        lengths.push(token_count);
    }
    Ok((chunks, lengths))
}

fn read_postings(
    connection: &Connection,
    path: &Path,
    chunk_count: usize,
) -> Result<BTreeMap<String, Vec<Posting>>> {
    let mut statement = connection.prepare("SELECT term, ord, tf FROM lexical_postings")?;
    let mut rows = statement.query([])?;

    let mut postings = BTreeMap::<String, Vec<Posting>>::new();
    while let Some(row) = rows.next()? {
        let term = row.get::<_, String>(0)?;
        let ord = row.get::<_, i64>(1)?;
        let tf = row.get::<_, i64>(2)?;
        let (Ok(ord), Ok(tf)) = (usize::try_from(ord), u32::try_from(tf)) else {
            return Err(EngineError::corrupt(path, format!("posting for {term} is negative")));
        };
        if ord >= chunk_count {
            return Err(EngineError::corrupt(
                path,
                format!("posting for {term} points at chunk {ord}"),
            ));
        }
        postings.entry(term).or_default().push(Posting { ord, tf });
    }
    Ok(postings)
}

fn read_embeddings(
    connection: &Connection,
    path: &Path,
    chunk_count: usize,
    model_id: &str,
    dimensions: usize,
) -> Result<Option<ChunkEmbeddings>> {
    let Some(cached_model) = read_metadata(connection, "embedding_model_id")? else {
        return Ok(None);
    };
    if cached_model != model_id {
        warn!(
            path = %path.display(),
            cached = %cached_model,
            configured = %model_id,
            "cached vectors belong to another embedding model"
        );
        return Ok(None);
    }

    let cached_dimensions = read_metadata(connection, "embedding_dimensions")?
        .and_then(|value| value.parse::<usize>().ok())
        .ok_or_else(|| EngineError::corrupt(path, "embedding_dimensions missing"))?;
    if cached_dimensions != dimensions {
        return Err(EngineError::EmbeddingDimensionMismatch {
            model_id: cached_model,
            expected: dimensions,
            actual: cached_dimensions,
        });
    }

    let mut statement = connection
        .prepare("SELECT ord, dimensions, embedding FROM chunk_embeddings ORDER BY ord ASC")?;
    let mut rows = statement.query([])?;

    let mut vectors = Vec::<Vec<f32>>::with_capacity(chunk_count);
    while let Some(row) = rows.next()? {
        let ord = row.get::<_, i64>(0)?;
        let row_dimensions = row.get::<_, i64>(1)?;
        let blob = row.get::<_, Vec<u8>>(2)?;
        if ord != vectors.len() as i64 || row_dimensions != cached_dimensions as i64 {
            return Err(EngineError::corrupt(
                path,
                format!("embedding row {ord} has width {row_dimensions}"),
            ));
        }
        let vector = decode_embedding_blob(&blob, cached_dimensions).ok_or_else(|| {
            EngineError::corrupt(path, format!("embedding blob for chunk {ord} is truncated"))
        })?;
        vectors.push(vector);
    }

    if vectors.len() != chunk_count {
        return Err(EngineError::corrupt(
            path,
            format!("{} vectors for {chunk_count} chunks", vectors.len()),
        ));
    }

    Ok(Some(ChunkEmbeddings {
        model_id: cached_model,
        dimensions: cached_dimensions,
        vectors,
    }))
}
