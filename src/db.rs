use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{ConnectOptions, Connection, PgConnection, Row};
use tracing::{error, info};

use crate::batch::ReviewSink;
use crate::config::DbConfig;

/// One harvested review. Field order matches the CSV column order; `app_id`
/// scopes the record but is not a CSV column.
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Hours")]
    pub hours_played: String,
    #[serde(rename = "Date")]
    pub posted_date: String,
    #[serde(rename = "Review")]
    pub body: String,
    #[serde(rename = "Helpful")]
    pub helpful_count: i32,
    #[serde(rename = "Funny")]
    pub funny_count: i32,
    #[serde(skip)]
    pub app_id: i32,
}

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS steam_reviews (
        id          SERIAL PRIMARY KEY,
        app_id      INTEGER,
        username    TEXT,
        hours       TEXT,
        review_date TEXT,
        review      TEXT,
        helpful     INTEGER,
        funny       INTEGER
    )";

const INSERT_INCREMENTAL_SQL: &str = "
    INSERT INTO steam_reviews (app_id, username, hours, review_date, review, helpful, funny)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT DO NOTHING";

const INSERT_STRICT_SQL: &str = "
    INSERT INTO steam_reviews (app_id, username, hours, review_date, review, helpful, funny)
    VALUES ($1, $2, $3, $4, $5, $6, $7)";

/// Open a fresh connection. Every store operation uses its own short-lived
/// connection rather than holding one across the whole run.
pub async fn connect(cfg: &DbConfig) -> Result<PgConnection> {
    let conn = cfg.connect_options().connect().await?;
    Ok(conn)
}

pub async fn ensure_table(cfg: &DbConfig) -> Result<()> {
    let mut conn = connect(cfg).await?;
    sqlx::query(CREATE_TABLE_SQL).execute(&mut conn).await?;
    Ok(())
}

/// All review bodies already stored for this app, used to seed the dedup set.
pub async fn fetch_existing_bodies(cfg: &DbConfig, app_id: i32) -> Result<HashSet<String>> {
    let mut conn = connect(cfg).await?;
    let rows = sqlx::query("SELECT review FROM steam_reviews WHERE app_id = $1")
        .bind(app_id)
        .fetch_all(&mut conn)
        .await?;

    let bodies = rows
        .into_iter()
        .filter_map(|row| row.try_get::<Option<String>, _>(0).ok().flatten())
        .collect();
    Ok(bodies)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Duplicates are silently dropped; the default for incremental runs.
    Incremental,
    /// Plain inserts that surface conflicts, for initial bulk loads.
    Strict,
}

impl InsertMode {
    fn sql(self) -> &'static str {
        match self {
            InsertMode::Incremental => INSERT_INCREMENTAL_SQL,
            InsertMode::Strict => INSERT_STRICT_SQL,
        }
    }
}

/// Relational sink: one transaction per batch, one insert per record.
pub struct DbSink {
    cfg: DbConfig,
    mode: InsertMode,
}

impl DbSink {
    pub fn new(cfg: DbConfig, mode: InsertMode) -> Self {
        Self { cfg, mode }
    }

    async fn insert_batch(&self, reviews: &[Review]) -> Result<()> {
        let mut conn = connect(&self.cfg).await?;
        let mut tx = conn.begin().await?;
        for r in reviews {
            sqlx::query(self.mode.sql())
                .bind(r.app_id)
                .bind(&r.username)
                .bind(&r.hours_played)
                .bind(&r.posted_date)
                .bind(&r.body)
                .bind(r.helpful_count)
                .bind(r.funny_count)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ReviewSink for DbSink {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn write_batch(&mut self, reviews: &[Review]) {
        match self.insert_batch(reviews).await {
            Ok(()) => info!(count = reviews.len(), "Inserted batch into steam_reviews"),
            Err(e) => error!(error = %e, "DB insert failed, batch not persisted to the store"),
        }
    }
}

pub struct StoreStats {
    pub total: i64,
    pub apps: Vec<(i32, i64)>,
}

pub async fn fetch_stats(cfg: &DbConfig) -> Result<StoreStats> {
    let mut conn = connect(cfg).await?;

    let total: i64 = sqlx::query("SELECT COUNT(*) FROM steam_reviews")
        .fetch_one(&mut conn)
        .await?
        .try_get(0)?;

    let rows = sqlx::query(
        "SELECT app_id, COUNT(*) FROM steam_reviews GROUP BY app_id ORDER BY app_id",
    )
    .fetch_all(&mut conn)
    .await?;

    let mut apps = Vec::with_capacity(rows.len());
    for row in &rows {
        let app_id = row.try_get::<Option<i32>, _>(0)?.unwrap_or(0);
        let count = row.try_get::<i64, _>(1)?;
        apps.push((app_id, count));
    }

    Ok(StoreStats { total, apps })
}
