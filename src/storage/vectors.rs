//! Vector chunk storage and similarity search.
//!
//! Embeddings are stored as little-endian f32 BLOBs in
//! `embedding_chunks`; the active dimensionality lives in
//! `embeddings_meta` and the table is dropped and recreated whenever the
//! provider's dimensionality changes.

use crate::error::{Error, Result};
use crate::model::{Category, ContextItem, EmbeddingStatus, Priority};
use crate::storage::sqlite::{map_item_row, SqliteStorage, ITEM_COLUMNS};
use rusqlite::OptionalExtension;

/// Meta key holding the active vector dimensionality.
const META_DIMENSIONS: &str = "dimensions";
/// Meta key holding the active provider name.
const META_PROVIDER: &str = "provider";

/// One item-level match from a semantic search (best chunk wins).
#[derive(Debug, Clone, serde::Serialize)]
pub struct SemanticMatch {
    pub item_id: String,
    pub key: String,
    pub value: String,
    pub category: Category,
    pub priority: Priority,
    pub channel: String,
    pub session_id: String,
    /// Cosine similarity of the best-matching chunk (higher is better).
    pub similarity: f32,
    pub chunk_index: i32,
    pub chunk_text: String,
}

/// Embedding coverage counts.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct VectorStats {
    pub ok: usize,
    pub pending: usize,
    pub error: usize,
    pub none: usize,
    pub chunks: usize,
}

/// Encode an f32 vector as a little-endian byte blob.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian byte blob into an f32 vector.
fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1.0, 1.0]; 0.0 for mismatched or empty inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let magnitude = (norm_a * norm_b).sqrt();
    if magnitude == 0.0 {
        0.0
    } else {
        dot_product / magnitude
    }
}

impl SqliteStorage {
    // ======================
    // Vector Operations
    // ======================

    /// Reconcile the vector table with the active provider dimension.
    ///
    /// When the stored dimension differs (or none is recorded yet and
    /// chunks exist with another width), the chunk table is dropped,
    /// recreated, and every item's embedding status reset to `none` so
    /// the backfill re-embeds. Returns whether a recreate happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub fn ensure_vector_dim(&mut self, dimensions: usize, provider: &str) -> Result<bool> {
        let stored: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM embeddings_meta WHERE key = ?1",
                [META_DIMENSIONS],
                |row| row.get(0),
            )
            .optional()?;

        let stored_dim: Option<usize> = stored.and_then(|s| s.parse().ok());
        let now = crate::now_ms();

        let recreate = match stored_dim {
            Some(d) => d != dimensions,
            None => false,
        };

        self.mutate("ensure_vector_dim", "system", |tx, _ctx| {
            if recreate {
                tx.execute_batch(
                    "DROP TABLE IF EXISTS embedding_chunks;
                     CREATE TABLE embedding_chunks (
                         id TEXT PRIMARY KEY,
                         item_id TEXT NOT NULL,
                         chunk_index INTEGER NOT NULL DEFAULT 0,
                         chunk_text TEXT NOT NULL,
                         embedding BLOB NOT NULL,
                         dimensions INTEGER NOT NULL,
                         provider TEXT NOT NULL,
                         model TEXT NOT NULL,
                         created_at INTEGER NOT NULL,
                         FOREIGN KEY (item_id) REFERENCES context_items(id) ON DELETE CASCADE,
                         UNIQUE(item_id, chunk_index)
                     );
                     CREATE INDEX idx_embedding_chunks_item ON embedding_chunks(item_id);
                     CREATE INDEX idx_embedding_chunks_provider ON embedding_chunks(provider, model);",
                )?;

                tx.execute(
                    "UPDATE context_items SET
                         embedding_status = 'none',
                         embedding_provider = NULL,
                         embedding_model = NULL,
                         chunk_count = 0,
                         embedded_at = NULL",
                    [],
                )?;
            }

            for (key, value) in [
                (META_DIMENSIONS, dimensions.to_string()),
                (META_PROVIDER, provider.to_string()),
            ] {
                tx.execute(
                    "INSERT INTO embeddings_meta (key, value, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                       value = excluded.value,
                       updated_at = excluded.updated_at",
                    rusqlite::params![key, value, now],
                )?;
            }

            Ok(())
        })?;

        Ok(recreate)
    }

    /// The dimensionality currently recorded in `embeddings_meta`.
    pub fn stored_vector_dim(&self) -> Result<Option<usize>> {
        let stored: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM embeddings_meta WHERE key = ?1",
                [META_DIMENSIONS],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.and_then(|s| s.parse().ok()))
    }

    /// Mark an item's embedding lifecycle state.
    pub fn set_embedding_status(&mut self, item_id: &str, status: EmbeddingStatus) -> Result<()> {
        self.conn().execute(
            "UPDATE context_items SET embedding_status = ?1 WHERE id = ?2",
            rusqlite::params![status.as_str(), item_id],
        )?;
        Ok(())
    }

    /// Store one embedding chunk for an item (upsert on chunk index).
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn upsert_chunk(
        &mut self,
        item_id: &str,
        chunk_index: i32,
        chunk_text: &str,
        embedding: &[f32],
        provider: &str,
        model: &str,
    ) -> Result<()> {
        let now = crate::now_ms();
        let blob = encode_vector(embedding);

        self.conn().execute(
            "INSERT INTO embedding_chunks (id, item_id, chunk_index, chunk_text, embedding, dimensions, provider, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(item_id, chunk_index) DO UPDATE SET
               chunk_text = excluded.chunk_text,
               embedding = excluded.embedding,
               dimensions = excluded.dimensions,
               provider = excluded.provider,
               model = excluded.model,
               created_at = excluded.created_at",
            rusqlite::params![
                crate::new_id("vec"),
                item_id,
                chunk_index,
                chunk_text,
                blob,
                embedding.len() as i64,
                provider,
                model,
                now,
            ],
        )?;

        Ok(())
    }

    /// Mark an item fully embedded: status `ok` plus provider metadata.
    ///
    /// Stale chunks beyond `chunk_count` (from a previous longer value)
    /// are removed.
    pub fn mark_embedded(
        &mut self,
        item_id: &str,
        provider: &str,
        model: &str,
        chunk_count: i64,
    ) -> Result<()> {
        let now = crate::now_ms();
        self.conn().execute(
            "DELETE FROM embedding_chunks WHERE item_id = ?1 AND chunk_index >= ?2",
            rusqlite::params![item_id, chunk_count],
        )?;
        self.conn().execute(
            "UPDATE context_items SET
                 embedding_status = 'ok',
                 embedding_provider = ?1,
                 embedding_model = ?2,
                 chunk_count = ?3,
                 embedded_at = ?4
             WHERE id = ?5",
            rusqlite::params![provider, model, chunk_count, now, item_id],
        )?;
        Ok(())
    }

    /// Remove an item's vector chunks and reset its embedding metadata.
    pub fn delete_embeddings(&mut self, item_id: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM embedding_chunks WHERE item_id = ?1", [item_id])?;
        self.conn().execute(
            "UPDATE context_items SET
                 embedding_status = 'none',
                 embedding_provider = NULL,
                 embedding_model = NULL,
                 chunk_count = 0,
                 embedded_at = NULL
             WHERE id = ?1",
            [item_id],
        )?;
        Ok(())
    }

    /// Items awaiting embedding generation (status `none` or `error`).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_backfill_candidates(&self, limit: u32) -> Result<Vec<ContextItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM context_items
             WHERE embedding_status IN ('none', 'error')
             ORDER BY created_at DESC
             LIMIT ?1"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([limit], map_item_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Embedding coverage counts, optionally scoped to a session.
    pub fn vector_stats(&self, session_id: Option<&str>) -> Result<VectorStats> {
        let mut stats = VectorStats::default();

        let sql = if session_id.is_some() {
            "SELECT embedding_status, COUNT(*) FROM context_items
             WHERE session_id = ?1 GROUP BY embedding_status"
        } else {
            "SELECT embedding_status, COUNT(*) FROM context_items GROUP BY embedding_status"
        };

        let mut stmt = self.conn().prepare(sql)?;
        let rows: Vec<(String, i64)> = if let Some(sid) = session_id {
            stmt.query_map([sid], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?
        } else {
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?
        };

        for (status, count) in rows {
            let count = count as usize;
            match EmbeddingStatus::parse(&status) {
                EmbeddingStatus::Ok => stats.ok += count,
                EmbeddingStatus::Pending => stats.pending += count,
                EmbeddingStatus::Error => stats.error += count,
                EmbeddingStatus::None => stats.none += count,
            }
        }

        stats.chunks = self
            .conn()
            .query_row("SELECT COUNT(*) FROM embedding_chunks", [], |row| row.get(0))
            .map(|n: i64| n as usize)?;

        Ok(stats)
    }

    /// Reset items claiming `ok` without actual chunk rows back to
    /// `none`. Returns the number of items reset.
    pub fn resync_embedding_status(&mut self) -> Result<usize> {
        let count = self.conn().execute(
            "UPDATE context_items SET embedding_status = 'none'
             WHERE embedding_status = 'ok'
             AND id NOT IN (SELECT DISTINCT item_id FROM embedding_chunks)",
            [],
        )?;
        Ok(count)
    }

    /// Brute-force cosine similarity search over stored chunks.
    ///
    /// Chunks group by item, each item keeping its best-scoring chunk.
    /// Results are filtered by the similarity `threshold`, optional
    /// category/priority/channel filters, and capped at `limit`.
    ///
    /// Adequate below ~50K items; an approximate index would slot in
    /// behind this signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[allow(clippy::too_many_arguments)]
    pub fn semantic_search(
        &self,
        query_embedding: &[f32],
        session_id: Option<&str>,
        limit: usize,
        threshold: f32,
        category: Option<Category>,
        priority: Option<Priority>,
        channel: Option<&str>,
    ) -> Result<Vec<SemanticMatch>> {
        let mut sql = String::from(
            "SELECT ec.item_id, ec.chunk_index, ec.chunk_text, ec.embedding,
                    ci.key, ci.value, ci.category, ci.priority, ci.channel, ci.session_id
             FROM embedding_chunks ec
             INNER JOIN context_items ci ON ec.item_id = ci.id
             WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(sid) = session_id {
            sql.push_str(" AND ci.session_id = ?");
            params.push(Box::new(sid.to_string()));
        }
        if let Some(cat) = category {
            sql.push_str(" AND ci.category = ?");
            params.push(Box::new(cat.as_str().to_string()));
        }
        if let Some(pri) = priority {
            sql.push_str(" AND ci.priority = ?");
            params.push(Box::new(pri.as_str().to_string()));
        }
        if let Some(ch) = channel {
            sql.push_str(" AND ci.channel = ?");
            params.push(Box::new(ch.to_string()));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            let blob: Vec<u8> = row.get(3)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, String>(2)?,
                decode_vector(&blob),
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut results: Vec<SemanticMatch> = rows
            .filter_map(std::result::Result::ok)
            .map(
                |(item_id, chunk_index, chunk_text, embedding, key, value, category, priority, channel, session_id)| {
                    let similarity = cosine_similarity(query_embedding, &embedding);
                    SemanticMatch {
                        item_id,
                        key,
                        value,
                        category: Category::parse(&category).unwrap_or_default(),
                        priority: Priority::parse(&priority).unwrap_or_default(),
                        channel,
                        session_id,
                        similarity,
                        chunk_index,
                        chunk_text,
                    }
                },
            )
            .filter(|r| r.similarity >= threshold)
            .collect();

        // Best chunk per item, highest similarity first
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut seen_items = std::collections::HashSet::new();
        let deduped: Vec<SemanticMatch> = results
            .into_iter()
            .filter(|r| seen_items.insert(r.item_id.clone()))
            .take(limit)
            .collect();

        Ok(deduped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;

    fn setup_with_items(n: usize) -> (SqliteStorage, Session, Vec<ContextItem>) {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let session = Session::new("S".to_string(), Some("/p".to_string()), "general".to_string());
        storage.create_session(&session, "agent").unwrap();

        let mut items = Vec::new();
        for i in 0..n {
            let item = storage
                .save_context_item(
                    &session.id,
                    &format!("key-{i}"),
                    &format!("value {i}"),
                    Category::Note,
                    Priority::Normal,
                    "general",
                    &[],
                    "agent",
                )
                .unwrap();
            items.push(item);
        }
        (storage, session, items)
    }

    #[test]
    fn test_vector_round_trip() {
        let v = vec![0.25f32, -1.5, 3.75];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_chunk_upsert_and_mark_embedded() {
        let (mut storage, _session, items) = setup_with_items(1);
        let item = &items[0];

        storage
            .upsert_chunk(&item.id, 0, "value 0", &[0.1, 0.2, 0.3], "ollama", "nomic-embed-text")
            .unwrap();
        storage
            .upsert_chunk(&item.id, 1, "tail", &[0.3, 0.2, 0.1], "ollama", "nomic-embed-text")
            .unwrap();
        storage
            .mark_embedded(&item.id, "ollama", "nomic-embed-text", 2)
            .unwrap();

        let reloaded = storage.get_context_item(&item.id).unwrap().unwrap();
        assert_eq!(reloaded.embedding_status, EmbeddingStatus::Ok);
        assert_eq!(reloaded.chunk_count, 2);
        assert_eq!(reloaded.embedding_provider.as_deref(), Some("ollama"));

        let stats = storage.vector_stats(None).unwrap();
        assert_eq!(stats.ok, 1);
        assert_eq!(stats.chunks, 2);
    }

    #[test]
    fn test_mark_embedded_trims_stale_chunks() {
        let (mut storage, _session, items) = setup_with_items(1);
        let item = &items[0];

        for i in 0..3 {
            storage
                .upsert_chunk(&item.id, i, "t", &[0.1, 0.2], "ollama", "m")
                .unwrap();
        }
        // Re-embed with fewer chunks
        storage.upsert_chunk(&item.id, 0, "t", &[0.3, 0.4], "ollama", "m").unwrap();
        storage.mark_embedded(&item.id, "ollama", "m", 1).unwrap();

        let stats = storage.vector_stats(None).unwrap();
        assert_eq!(stats.chunks, 1);
    }

    #[test]
    fn test_ensure_vector_dim_recreates_on_change() {
        let (mut storage, _session, items) = setup_with_items(2);

        let recreated = storage.ensure_vector_dim(3, "ollama").unwrap();
        assert!(!recreated, "first call just records the dimension");

        for item in &items {
            storage
                .upsert_chunk(&item.id, 0, "t", &[0.1, 0.2, 0.3], "ollama", "m")
                .unwrap();
            storage.mark_embedded(&item.id, "ollama", "m", 1).unwrap();
        }
        assert_eq!(storage.vector_stats(None).unwrap().ok, 2);

        // Same dimension: nothing happens
        assert!(!storage.ensure_vector_dim(3, "ollama").unwrap());
        assert_eq!(storage.vector_stats(None).unwrap().ok, 2);

        // New dimension: table recreated, statuses reset
        let recreated = storage.ensure_vector_dim(768, "ollama").unwrap();
        assert!(recreated);
        let stats = storage.vector_stats(None).unwrap();
        assert_eq!(stats.ok, 0);
        assert_eq!(stats.none, 2);
        assert_eq!(stats.chunks, 0);
        assert_eq!(storage.stored_vector_dim().unwrap(), Some(768));
    }

    #[test]
    fn test_semantic_search_best_chunk_per_item() {
        let (mut storage, session, items) = setup_with_items(2);

        // Item 0: two chunks, second one closest to the query
        storage
            .upsert_chunk(&items[0].id, 0, "far", &[0.0, 1.0], "ollama", "m")
            .unwrap();
        storage
            .upsert_chunk(&items[0].id, 1, "near", &[1.0, 0.0], "ollama", "m")
            .unwrap();
        storage.mark_embedded(&items[0].id, "ollama", "m", 2).unwrap();

        // Item 1: orthogonal to the query
        storage
            .upsert_chunk(&items[1].id, 0, "off", &[0.0, 1.0], "ollama", "m")
            .unwrap();
        storage.mark_embedded(&items[1].id, "ollama", "m", 1).unwrap();

        let query = [1.0f32, 0.0];
        let matches = storage
            .semantic_search(&query, Some(session.id.as_str()), 10, 0.5, None, None, None)
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].item_id, items[0].id);
        assert_eq!(matches[0].chunk_index, 1);
        assert!(matches[0].similarity > 0.99);
    }

    #[test]
    fn test_semantic_search_filters() {
        let (mut storage, session, items) = setup_with_items(1);
        storage
            .upsert_chunk(&items[0].id, 0, "t", &[1.0, 0.0], "ollama", "m")
            .unwrap();
        storage.mark_embedded(&items[0].id, "ollama", "m", 1).unwrap();

        let query = [1.0f32, 0.0];
        let hits = storage
            .semantic_search(&query, Some(session.id.as_str()), 10, 0.5, Some(Category::Decision), None, None)
            .unwrap();
        assert!(hits.is_empty(), "category filter should exclude the note");

        let hits = storage
            .semantic_search(&query, Some(session.id.as_str()), 10, 0.5, Some(Category::Note), None, None)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_resync_embedding_status() {
        let (mut storage, _session, items) = setup_with_items(2);

        // Claim ok without data for item 0; real data for item 1
        storage
            .conn()
            .execute(
                "UPDATE context_items SET embedding_status = 'ok' WHERE id = ?1",
                [&items[0].id],
            )
            .unwrap();
        storage
            .upsert_chunk(&items[1].id, 0, "t", &[0.5, 0.5], "ollama", "m")
            .unwrap();
        storage.mark_embedded(&items[1].id, "ollama", "m", 1).unwrap();

        let reset = storage.resync_embedding_status().unwrap();
        assert_eq!(reset, 1);

        let reloaded = storage.get_context_item(&items[0].id).unwrap().unwrap();
        assert_eq!(reloaded.embedding_status, EmbeddingStatus::None);
    }

    #[test]
    fn test_invariant_ok_items_have_chunk_count_rows() {
        let (mut storage, _session, items) = setup_with_items(3);
        for (i, item) in items.iter().enumerate() {
            for c in 0..=i {
                storage
                    .upsert_chunk(&item.id, c as i32, "t", &[0.1, 0.2], "ollama", "m")
                    .unwrap();
            }
            storage
                .mark_embedded(&item.id, "ollama", "m", (i + 1) as i64)
                .unwrap();
        }

        // For every ok item: chunk rows == chunk_count
        let rows: Vec<(String, i64)> = storage
            .conn()
            .prepare(
                "SELECT id, chunk_count FROM context_items WHERE embedding_status = 'ok'",
            )
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 3);

        for (id, chunk_count) in rows {
            let actual: i64 = storage
                .conn()
                .query_row(
                    "SELECT COUNT(*) FROM embedding_chunks WHERE item_id = ?1",
                    [&id],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(actual, chunk_count);
        }
    }
}
