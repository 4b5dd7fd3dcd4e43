use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::{FilterKeyword, HistoryEntry, cutoff_for, list};
use crate::correction::{CorrectionResult, RawCorrection, SourceType, normalize};

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    user_id: Uuid,
    content: String,
    result: Value,
    source_type: String,
    created_at: DateTime<Utc>,
}

impl HistoryRow {
    /// Rows written before the canonical shape existed hold the raw reply;
    /// those are normalized again against the stored essay.
    fn into_entry(self) -> HistoryEntry {
        let result = match serde_json::from_value::<CorrectionResult>(self.result.clone()) {
            Ok(result) => result,
            Err(err) => {
                warn!(?err, id = %self.id, "stored result is not canonical, normalizing");
                normalize(&RawCorrection::from_value(&self.result), &self.content)
            }
        };

        HistoryEntry {
            id: self.id,
            owner: self.user_id,
            content: self.content,
            result,
            source_type: SourceType::from_str(&self.source_type),
            created_at: self.created_at,
        }
    }
}

pub async fn insert_entry(
    pool: &PgPool,
    owner: Uuid,
    content: &str,
    result: &CorrectionResult,
    source_type: SourceType,
) -> Result<HistoryEntry> {
    let id = Uuid::new_v4();
    let payload = serde_json::to_value(result).context("failed to serialize correction result")?;

    let created_at: DateTime<Utc> = sqlx::query_scalar(
        "INSERT INTO essay_history (id, user_id, content, result, source_type)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING created_at",
    )
    .bind(id)
    .bind(owner)
    .bind(content)
    .bind(&payload)
    .bind(source_type.as_str())
    .fetch_one(pool)
    .await
    .context("failed to insert history entry")?;

    Ok(HistoryEntry {
        id,
        owner,
        content: content.to_string(),
        result: result.clone(),
        source_type,
        created_at,
    })
}

/// History of `owner` for `filter`. The window and ordering are applied again
/// locally so the result does not depend on what the query returned.
pub async fn load_history<Tz: TimeZone>(
    pool: &PgPool,
    owner: Uuid,
    filter: FilterKeyword,
    now: &DateTime<Tz>,
) -> Result<Vec<HistoryEntry>> {
    let cutoff = cutoff_for(filter, now).with_timezone(&Utc);

    let rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT id, user_id, content, result, source_type, created_at
         FROM essay_history
         WHERE user_id = $1 AND created_at >= $2
         ORDER BY created_at DESC",
    )
    .bind(owner)
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("failed to load history rows")?;

    let entries = rows.into_iter().map(HistoryRow::into_entry).collect();
    Ok(list(entries, owner, filter, now))
}

pub async fn fetch_entry(pool: &PgPool, owner: Uuid, id: Uuid) -> Result<Option<HistoryEntry>> {
    let row = sqlx::query_as::<_, HistoryRow>(
        "SELECT id, user_id, content, result, source_type, created_at
         FROM essay_history
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(owner)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to load history entry {id}"))?;

    Ok(row.map(HistoryRow::into_entry))
}

pub async fn delete_entry(pool: &PgPool, owner: Uuid, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM essay_history WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(owner)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete history entry {id}"))?;

    Ok(result.rows_affected() > 0)
}

pub async fn clear_entries(pool: &PgPool, owner: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM essay_history WHERE user_id = $1")
        .bind(owner)
        .execute(pool)
        .await
        .context("failed to clear history entries")?;

    Ok(result.rows_affected())
}
