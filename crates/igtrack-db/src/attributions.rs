//! Operator-assigned reasons for individual events.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `attributions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttributionRow {
    pub id: i64,
    pub event_id: i64,
    pub reason: String,
    pub campaign_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sets the single attribution for `event_id`, replacing any previous one.
///
/// When `campaign` is given the campaign is created by name if it does not
/// exist yet. Runs in one transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the event does not exist, or
/// [`DbError::Sqlx`] on any other failure.
pub async fn upsert_event_attribution(
    pool: &PgPool,
    event_id: i64,
    reason: &str,
    campaign: Option<&str>,
) -> Result<AttributionRow, DbError> {
    let mut tx = pool.begin().await?;

    let event_exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM interaction_events WHERE id = $1)")
            .bind(event_id)
            .fetch_one(&mut *tx)
            .await?;
    if !event_exists {
        return Err(DbError::NotFound);
    }

    let campaign_id: Option<i64> = match campaign {
        Some(name) => Some(
            sqlx::query_scalar(
                "INSERT INTO campaigns (name) VALUES ($1) \
                 ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
                 RETURNING id",
            )
            .bind(name)
            .fetch_one(&mut *tx)
            .await?,
        ),
        None => None,
    };

    let row = sqlx::query_as::<_, AttributionRow>(
        "INSERT INTO attributions (event_id, reason, campaign_id) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (event_id) DO UPDATE SET \
             reason      = EXCLUDED.reason, \
             campaign_id = EXCLUDED.campaign_id, \
             updated_at  = NOW() \
         RETURNING id, event_id, reason, campaign_id, created_at, updated_at",
    )
    .bind(event_id)
    .bind(reason)
    .bind(campaign_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}
