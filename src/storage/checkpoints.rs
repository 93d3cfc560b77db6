//! Checkpoint operations: selective capture, restore, membership
//! mutation, and split.
//!
//! Checkpoints have immutable identity but mutable membership;
//! `item_count` and `total_size` are recomputed inside every transaction
//! that changes membership.

use crate::error::{Error, Result};
use crate::model::{Category, Checkpoint, ContextItem};
use crate::storage::events::EventType;
use crate::storage::sqlite::{map_item_row, SqliteStorage, ITEM_COLUMNS};
use crate::validate::glob_match;
use rusqlite::{OptionalExtension, Row, Transaction};

/// Item selection filters for checkpoint capture.
#[derive(Debug, Clone, Default)]
pub struct CheckpointFilters {
    /// Keep items carrying at least one of these tags.
    pub include_tags: Vec<String>,
    /// Keep items whose key matches one of these glob patterns.
    pub include_keys: Vec<String>,
    /// Keep items in one of these categories.
    pub include_categories: Vec<Category>,
    /// Drop items carrying any of these tags (applied last).
    pub exclude_tags: Vec<String>,
}

impl CheckpointFilters {
    /// True when no filter dimension is set (capture everything).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include_tags.is_empty()
            && self.include_keys.is_empty()
            && self.include_categories.is_empty()
            && self.exclude_tags.is_empty()
    }

    /// Apply the filters to an item.
    #[must_use]
    pub fn matches(&self, item: &ContextItem) -> bool {
        if !self.include_tags.is_empty() && !item.has_any_tag(&self.include_tags) {
            return false;
        }
        if !self.include_keys.is_empty()
            && !self.include_keys.iter().any(|p| glob_match(p, &item.key))
        {
            return false;
        }
        if !self.include_categories.is_empty() && !self.include_categories.contains(&item.category)
        {
            return false;
        }
        if item.has_any_tag(&self.exclude_tags) {
            return false;
        }
        true
    }
}

/// One part of a checkpoint split request.
#[derive(Debug, Clone)]
pub struct SplitPart {
    pub name: String,
    pub description: Option<String>,
    pub include_tags: Vec<String>,
    pub include_categories: Vec<Category>,
}

/// Result of a split: new checkpoints plus per-part warnings.
#[derive(Debug, Clone)]
pub struct SplitResult {
    pub checkpoints: Vec<Checkpoint>,
    pub warnings: Vec<String>,
}

fn map_checkpoint_row(row: &Row<'_>) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        id: row.get(0)?,
        session_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        git_status: row.get(4)?,
        git_branch: row.get(5)?,
        item_count: row.get(6)?,
        total_size: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const CHECKPOINT_COLUMNS: &str =
    "id, session_id, name, description, git_status, git_branch, item_count, total_size, created_at";

/// Recompute `item_count` and `total_size` from the membership rows.
///
/// Called inside every transaction that changes membership, including
/// context-item deletion in `sqlite.rs`.
pub(crate) fn recompute_checkpoint_counts(tx: &Transaction, checkpoint_id: &str) -> Result<()> {
    tx.execute(
        "UPDATE checkpoints SET
             item_count = (SELECT COUNT(*) FROM checkpoint_items WHERE checkpoint_id = ?1),
             total_size = COALESCE((
                 SELECT SUM(ci.size) FROM checkpoint_items cpi
                 JOIN context_items ci ON ci.id = cpi.context_item_id
                 WHERE cpi.checkpoint_id = ?1
             ), 0)
         WHERE id = ?1",
        [checkpoint_id],
    )?;
    Ok(())
}

impl SqliteStorage {
    // ======================
    // Checkpoint Operations
    // ======================

    /// Create a checkpoint snapshotting the session's current items.
    ///
    /// Filters narrow the captured set; an empty filter set captures
    /// every item in the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is missing.
    pub fn create_checkpoint(
        &mut self,
        session_id: &str,
        name: &str,
        description: Option<&str>,
        git_status: Option<&str>,
        git_branch: Option<&str>,
        filters: &CheckpointFilters,
        actor: &str,
    ) -> Result<Checkpoint> {
        self.require_session(session_id)?;

        let items = self.list_context_items(session_id, None, None, None, Some(10_000))?;
        let selected: Vec<&ContextItem> = items.iter().filter(|i| filters.matches(i)).collect();

        let id = crate::new_id("ckpt");
        let now = crate::now_ms();

        self.mutate("create_checkpoint", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO checkpoints (id, session_id, name, description, git_status, git_branch, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, session_id, name, description, git_status, git_branch, now],
            )?;

            for item in &selected {
                tx.execute(
                    "INSERT OR IGNORE INTO checkpoint_items (id, checkpoint_id, context_item_id)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![crate::new_id("cpitem"), id, item.id],
                )?;
            }

            recompute_checkpoint_counts(tx, &id)?;
            ctx.record_event("checkpoint", &id, EventType::CheckpointCreated);
            Ok(())
        })?;

        self.get_checkpoint(&id)?
            .ok_or_else(|| Error::CheckpointNotFound { id })
    }

    /// Get a checkpoint by ID.
    pub fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        let sql = format!("SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE id = ?1");
        let checkpoint = self
            .conn()
            .prepare(&sql)?
            .query_row([id], map_checkpoint_row)
            .optional()?;
        Ok(checkpoint)
    }

    fn require_checkpoint(&self, id: &str) -> Result<Checkpoint> {
        self.get_checkpoint(id)?
            .ok_or_else(|| Error::CheckpointNotFound { id: id.to_string() })
    }

    fn require_checkpoint_verified(&self, id: &str, expected_name: &str) -> Result<Checkpoint> {
        let checkpoint = self.require_checkpoint(id)?;
        if checkpoint.name != expected_name {
            return Err(Error::VerificationFailed {
                entity: "checkpoint",
                expected: checkpoint.name,
                provided: expected_name.to_string(),
            });
        }
        Ok(checkpoint)
    }

    /// List checkpoints for a session (lightweight rows).
    ///
    /// Returns `(checkpoints, total_matches)`.
    pub fn list_checkpoints(
        &self,
        session_id: &str,
        limit: Option<u32>,
    ) -> Result<(Vec<Checkpoint>, usize)> {
        let limit = limit.unwrap_or(20);

        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM checkpoints WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints
             WHERE session_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![session_id, limit], map_checkpoint_row)?;
        let checkpoints = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((checkpoints, total as usize))
    }

    /// Context items in a checkpoint, highest priority first.
    pub fn get_checkpoint_items(&self, checkpoint_id: &str) -> Result<Vec<ContextItem>> {
        let sql = format!(
            "SELECT {} FROM context_items ci
             JOIN checkpoint_items cpi ON cpi.context_item_id = ci.id
             WHERE cpi.checkpoint_id = ?1
             ORDER BY CASE ci.priority WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END DESC,
                      ci.created_at DESC",
            ITEM_COLUMNS
                .split(", ")
                .map(|c| format!("ci.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([checkpoint_id], map_item_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Preview of up to `limit` highest-priority items in a checkpoint.
    pub fn get_checkpoint_preview(&self, checkpoint_id: &str, limit: usize) -> Result<Vec<ContextItem>> {
        let mut items = self.get_checkpoint_items(checkpoint_id)?;
        items.truncate(limit);
        Ok(items)
    }

    /// Restore a checkpoint into a target session.
    ///
    /// Items are copied in; a session item with the same key is
    /// overwritten (its `created_at` survives through the upsert).
    /// Optional filters narrow what is restored. The checkpoint name is
    /// verified against the caller's view.
    ///
    /// Returns the number of items restored.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on name mismatch.
    pub fn restore_checkpoint(
        &mut self,
        checkpoint_id: &str,
        checkpoint_name: &str,
        target_session_id: &str,
        restore_tags: Option<&[String]>,
        restore_categories: Option<&[Category]>,
        actor: &str,
    ) -> Result<usize> {
        self.require_checkpoint_verified(checkpoint_id, checkpoint_name)?;
        self.require_session(target_session_id)?;

        let mut items = self.get_checkpoint_items(checkpoint_id)?;

        if let Some(categories) = restore_categories {
            items.retain(|item| categories.contains(&item.category));
        }
        if let Some(tags) = restore_tags {
            items.retain(|item| item.has_any_tag(tags));
        }

        let now = crate::now_ms();

        self.mutate("restore_checkpoint", actor, |tx, ctx| {
            let mut restored = 0;
            for item in &items {
                tx.execute(
                    "INSERT INTO context_items
                         (id, session_id, key, value, category, priority, channel, tags, size,
                          created_at, updated_at, embedding_status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, 'none')
                     ON CONFLICT(session_id, key) DO UPDATE SET
                       value = excluded.value,
                       category = excluded.category,
                       priority = excluded.priority,
                       channel = excluded.channel,
                       tags = excluded.tags,
                       size = excluded.size,
                       updated_at = excluded.updated_at,
                       embedding_status = 'none'",
                    rusqlite::params![
                        crate::new_id("item"),
                        target_session_id,
                        item.key,
                        item.value,
                        item.category.as_str(),
                        item.priority.as_str(),
                        item.channel,
                        item.tags_json(),
                        item.size,
                        now,
                    ],
                )?;
                restored += 1;
            }

            ctx.record_event("checkpoint", checkpoint_id, EventType::CheckpointRestored);
            Ok(restored)
        })
    }

    /// Add session items to a checkpoint by key. Returns count added.
    pub fn add_checkpoint_items(
        &mut self,
        checkpoint_id: &str,
        keys: &[String],
        actor: &str,
    ) -> Result<usize> {
        let checkpoint = self.require_checkpoint(checkpoint_id)?;

        self.mutate("add_checkpoint_items", actor, |tx, _ctx| {
            let mut added = 0;
            for key in keys {
                let item_id: Option<String> = tx
                    .query_row(
                        "SELECT id FROM context_items WHERE session_id = ?1 AND key = ?2",
                        rusqlite::params![checkpoint.session_id, key],
                        |row| row.get(0),
                    )
                    .optional()?;

                if let Some(item_id) = item_id {
                    added += tx.execute(
                        "INSERT OR IGNORE INTO checkpoint_items (id, checkpoint_id, context_item_id)
                         VALUES (?1, ?2, ?3)",
                        rusqlite::params![crate::new_id("cpitem"), checkpoint_id, item_id],
                    )?;
                }
            }

            recompute_checkpoint_counts(tx, checkpoint_id)?;
            Ok(added)
        })
    }

    /// Remove items from a checkpoint by key. Returns count removed.
    pub fn remove_checkpoint_items(
        &mut self,
        checkpoint_id: &str,
        keys: &[String],
        actor: &str,
    ) -> Result<usize> {
        self.require_checkpoint(checkpoint_id)?;

        self.mutate("remove_checkpoint_items", actor, |tx, _ctx| {
            let mut removed = 0;
            for key in keys {
                removed += tx.execute(
                    "DELETE FROM checkpoint_items
                     WHERE checkpoint_id = ?1 AND context_item_id IN (
                         SELECT ci.id FROM context_items ci
                         JOIN checkpoint_items cpi ON cpi.context_item_id = ci.id
                         WHERE cpi.checkpoint_id = ?1 AND ci.key = ?2
                     )",
                    rusqlite::params![checkpoint_id, key],
                )?;
            }

            recompute_checkpoint_counts(tx, checkpoint_id)?;
            Ok(removed)
        })
    }

    /// Split a checkpoint into N new checkpoints by tag/category filters.
    ///
    /// Every part must name at least one of `include_tags` or
    /// `include_categories`. The source checkpoint is left untouched.
    /// Warnings are returned for parts that selected nothing or the full
    /// source set.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on name mismatch or a filterless part.
    pub fn split_checkpoint(
        &mut self,
        source_id: &str,
        source_name: &str,
        parts: &[SplitPart],
        actor: &str,
    ) -> Result<SplitResult> {
        let source = self.require_checkpoint_verified(source_id, source_name)?;

        for part in parts {
            if part.include_tags.is_empty() && part.include_categories.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "split part '{}' needs include_tags or include_categories",
                    part.name
                )));
            }
        }

        let source_items = self.get_checkpoint_items(source_id)?;
        let now = crate::now_ms();
        let ids: Vec<String> = parts.iter().map(|_| crate::new_id("ckpt")).collect();
        let mut warnings = Vec::new();

        self.mutate("split_checkpoint", actor, |tx, ctx| {
            for (part, id) in parts.iter().zip(&ids) {
                let selected: Vec<&ContextItem> = source_items
                    .iter()
                    .filter(|item| {
                        let tag_hit =
                            !part.include_tags.is_empty() && item.has_any_tag(&part.include_tags);
                        let cat_hit = !part.include_categories.is_empty()
                            && part.include_categories.contains(&item.category);
                        tag_hit || cat_hit
                    })
                    .collect();

                if selected.is_empty() {
                    warnings.push(format!("split '{}' selected no items", part.name));
                } else if selected.len() == source_items.len() && !source_items.is_empty() {
                    warnings.push(format!(
                        "split '{}' selected the entire source checkpoint",
                        part.name
                    ));
                }

                tx.execute(
                    "INSERT INTO checkpoints (id, session_id, name, description, git_status, git_branch, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        id,
                        source.session_id,
                        part.name,
                        part.description,
                        source.git_status,
                        source.git_branch,
                        now,
                    ],
                )?;

                for item in &selected {
                    tx.execute(
                        "INSERT OR IGNORE INTO checkpoint_items (id, checkpoint_id, context_item_id)
                         VALUES (?1, ?2, ?3)",
                        rusqlite::params![crate::new_id("cpitem"), id, item.id],
                    )?;
                }

                recompute_checkpoint_counts(tx, id)?;
                ctx.record_event("checkpoint", id, EventType::CheckpointCreated);
            }

            ctx.record_event("checkpoint", source_id, EventType::CheckpointSplit);
            Ok(())
        })?;

        let checkpoints = ids
            .iter()
            .map(|id| self.require_checkpoint(id))
            .collect::<Result<Vec<_>>>()?;

        Ok(SplitResult { checkpoints, warnings })
    }

    /// Delete a checkpoint after verifying its name.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on name mismatch.
    pub fn delete_checkpoint(&mut self, id: &str, expected_name: &str, actor: &str) -> Result<()> {
        self.require_checkpoint_verified(id, expected_name)?;

        self.mutate("delete_checkpoint", actor, |tx, ctx| {
            tx.execute("DELETE FROM checkpoints WHERE id = ?1", [id])?;
            ctx.record_event("checkpoint", id, EventType::CheckpointDeleted);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Session};

    fn setup() -> (SqliteStorage, Session) {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let session = Session::new("S".to_string(), Some("/p".to_string()), "general".to_string());
        storage.create_session(&session, "agent").unwrap();
        (storage, session)
    }

    fn save(
        storage: &mut SqliteStorage,
        session: &Session,
        key: &str,
        category: Category,
        tags: &[&str],
    ) {
        let tags: Vec<String> = tags.iter().map(ToString::to_string).collect();
        storage
            .save_context_item(
                &session.id,
                key,
                "value",
                category,
                Priority::Normal,
                "general",
                &tags,
                "agent",
            )
            .unwrap();
    }

    #[test]
    fn test_create_full_checkpoint() {
        let (mut storage, session) = setup();
        save(&mut storage, &session, "a", Category::Note, &[]);
        save(&mut storage, &session, "b", Category::Decision, &[]);

        let checkpoint = storage
            .create_checkpoint(
                &session.id,
                "v1",
                None,
                None,
                Some("main"),
                &CheckpointFilters::default(),
                "agent",
            )
            .unwrap();

        assert_eq!(checkpoint.item_count, 2);
        assert_eq!(checkpoint.total_size, 10); // 2 × "value"
    }

    #[test]
    fn test_create_with_filters() {
        let (mut storage, session) = setup();
        save(&mut storage, &session, "auth-token", Category::Note, &["auth"]);
        save(&mut storage, &session, "ui-theme", Category::Note, &["ui"]);
        save(&mut storage, &session, "decision-1", Category::Decision, &[]);

        let filters = CheckpointFilters {
            include_tags: vec!["auth".to_string()],
            ..CheckpointFilters::default()
        };
        let checkpoint = storage
            .create_checkpoint(&session.id, "auth-only", None, None, None, &filters, "agent")
            .unwrap();
        assert_eq!(checkpoint.item_count, 1);

        let filters = CheckpointFilters {
            include_keys: vec!["auth-*".to_string(), "decision-*".to_string()],
            ..CheckpointFilters::default()
        };
        let checkpoint = storage
            .create_checkpoint(&session.id, "globbed", None, None, None, &filters, "agent")
            .unwrap();
        assert_eq!(checkpoint.item_count, 2);

        let filters = CheckpointFilters {
            include_categories: vec![Category::Note],
            exclude_tags: vec!["ui".to_string()],
            ..CheckpointFilters::default()
        };
        let checkpoint = storage
            .create_checkpoint(&session.id, "notes-sans-ui", None, None, None, &filters, "agent")
            .unwrap();
        assert_eq!(checkpoint.item_count, 1);
    }

    #[test]
    fn test_restore_overwrites_same_key() {
        let (mut storage, session) = setup();
        save(&mut storage, &session, "shared", Category::Note, &[]);

        let checkpoint = storage
            .create_checkpoint(
                &session.id,
                "v1",
                None,
                None,
                None,
                &CheckpointFilters::default(),
                "agent",
            )
            .unwrap();

        // Target session with a conflicting key
        let target = Session::new("T".to_string(), Some("/p".to_string()), "general".to_string());
        storage.create_session(&target, "agent").unwrap();
        storage
            .save_context_item(
                &target.id,
                "shared",
                "target value",
                Category::Reminder,
                Priority::High,
                "general",
                &[],
                "agent",
            )
            .unwrap();
        let before = storage
            .get_context_item_by_key(&target.id, "shared")
            .unwrap()
            .unwrap();

        let restored = storage
            .restore_checkpoint(&checkpoint.id, "v1", &target.id, None, None, "agent")
            .unwrap();
        assert_eq!(restored, 1);

        let after = storage
            .get_context_item_by_key(&target.id, "shared")
            .unwrap()
            .unwrap();
        assert_eq!(after.value, "value");
        assert_eq!(after.category, Category::Note);
        // Upsert keeps the target row's identity
        assert_eq!(after.id, before.id);
        assert_eq!(after.created_at, before.created_at);
    }

    #[test]
    fn test_restore_requires_name_match() {
        let (mut storage, session) = setup();
        save(&mut storage, &session, "a", Category::Note, &[]);
        let checkpoint = storage
            .create_checkpoint(
                &session.id,
                "v1",
                None,
                None,
                None,
                &CheckpointFilters::default(),
                "agent",
            )
            .unwrap();

        let err = storage
            .restore_checkpoint(&checkpoint.id, "wrong", &session.id, None, None, "agent")
            .unwrap_err();
        assert!(matches!(err, Error::VerificationFailed { .. }));
    }

    #[test]
    fn test_membership_recompute() {
        let (mut storage, session) = setup();
        save(&mut storage, &session, "a", Category::Note, &[]);
        save(&mut storage, &session, "b", Category::Note, &[]);

        let filters = CheckpointFilters {
            include_keys: vec!["a".to_string()],
            ..CheckpointFilters::default()
        };
        let checkpoint = storage
            .create_checkpoint(&session.id, "v1", None, None, None, &filters, "agent")
            .unwrap();
        assert_eq!(checkpoint.item_count, 1);

        let added = storage
            .add_checkpoint_items(&checkpoint.id, &["b".to_string()], "agent")
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(storage.get_checkpoint(&checkpoint.id).unwrap().unwrap().item_count, 2);

        let removed = storage
            .remove_checkpoint_items(&checkpoint.id, &["a".to_string()], "agent")
            .unwrap();
        assert_eq!(removed, 1);
        let reloaded = storage.get_checkpoint(&checkpoint.id).unwrap().unwrap();
        assert_eq!(reloaded.item_count, 1);
        assert_eq!(reloaded.total_size, 5);
    }

    #[test]
    fn test_item_delete_updates_checkpoint_counts() {
        let (mut storage, session) = setup();
        save(&mut storage, &session, "a", Category::Note, &[]);
        save(&mut storage, &session, "b", Category::Note, &[]);

        let checkpoint = storage
            .create_checkpoint(
                &session.id,
                "v1",
                None,
                None,
                None,
                &CheckpointFilters::default(),
                "agent",
            )
            .unwrap();
        assert_eq!(checkpoint.item_count, 2);

        storage.delete_context_item(&session.id, "a", "agent").unwrap();

        let reloaded = storage.get_checkpoint(&checkpoint.id).unwrap().unwrap();
        assert_eq!(reloaded.item_count, 1);
    }

    #[test]
    fn test_split_by_tags() {
        let (mut storage, session) = setup();
        for i in 0..4 {
            save(&mut storage, &session, &format!("auth-{i}"), Category::Note, &["auth"]);
        }
        for i in 0..6 {
            save(&mut storage, &session, &format!("ui-{i}"), Category::Note, &["ui"]);
        }

        let source = storage
            .create_checkpoint(
                &session.id,
                "v1",
                None,
                None,
                None,
                &CheckpointFilters::default(),
                "agent",
            )
            .unwrap();
        assert_eq!(source.item_count, 10);

        let parts = vec![
            SplitPart {
                name: "auth".to_string(),
                description: None,
                include_tags: vec!["auth".to_string()],
                include_categories: vec![],
            },
            SplitPart {
                name: "ui".to_string(),
                description: None,
                include_tags: vec!["ui".to_string()],
                include_categories: vec![],
            },
        ];

        let result = storage.split_checkpoint(&source.id, "v1", &parts, "agent").unwrap();
        assert!(result.warnings.is_empty());
        assert_eq!(result.checkpoints.len(), 2);
        assert_eq!(result.checkpoints[0].item_count, 4);
        assert_eq!(result.checkpoints[1].item_count, 6);

        // Source untouched
        assert_eq!(storage.get_checkpoint(&source.id).unwrap().unwrap().item_count, 10);
    }

    #[test]
    fn test_split_without_filters_rejected() {
        let (mut storage, session) = setup();
        save(&mut storage, &session, "a", Category::Note, &[]);
        let source = storage
            .create_checkpoint(
                &session.id,
                "v1",
                None,
                None,
                None,
                &CheckpointFilters::default(),
                "agent",
            )
            .unwrap();

        let parts = vec![SplitPart {
            name: "everything".to_string(),
            description: None,
            include_tags: vec![],
            include_categories: vec![],
        }];

        let err = storage
            .split_checkpoint(&source.id, "v1", &parts, "agent")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_split_warnings() {
        let (mut storage, session) = setup();
        save(&mut storage, &session, "a", Category::Note, &["auth"]);
        let source = storage
            .create_checkpoint(
                &session.id,
                "v1",
                None,
                None,
                None,
                &CheckpointFilters::default(),
                "agent",
            )
            .unwrap();

        let parts = vec![
            SplitPart {
                name: "empty".to_string(),
                description: None,
                include_tags: vec!["missing-tag".to_string()],
                include_categories: vec![],
            },
            SplitPart {
                name: "full".to_string(),
                description: None,
                include_tags: vec!["auth".to_string()],
                include_categories: vec![],
            },
        ];

        let result = storage.split_checkpoint(&source.id, "v1", &parts, "agent").unwrap();
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].contains("no items"));
        assert!(result.warnings[1].contains("entire source"));
    }

    #[test]
    fn test_delete_verified() {
        let (mut storage, session) = setup();
        let checkpoint = storage
            .create_checkpoint(
                &session.id,
                "v1",
                None,
                None,
                None,
                &CheckpointFilters::default(),
                "agent",
            )
            .unwrap();

        let err = storage
            .delete_checkpoint(&checkpoint.id, "v2", "agent")
            .unwrap_err();
        assert!(matches!(err, Error::VerificationFailed { .. }));
        assert!(storage.get_checkpoint(&checkpoint.id).unwrap().is_some());

        storage.delete_checkpoint(&checkpoint.id, "v1", "agent").unwrap();
        assert!(storage.get_checkpoint(&checkpoint.id).unwrap().is_none());
    }

    #[test]
    fn test_list_is_lightweight_with_total() {
        let (mut storage, session) = setup();
        for i in 0..3 {
            storage
                .create_checkpoint(
                    &session.id,
                    &format!("cp-{i}"),
                    None,
                    None,
                    None,
                    &CheckpointFilters::default(),
                    "agent",
                )
                .unwrap();
        }

        let (listed, total) = storage.list_checkpoints(&session.id, Some(2)).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(total, 3);
    }
}
