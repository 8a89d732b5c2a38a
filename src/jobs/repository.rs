use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};

use super::models::*;
use crate::error::{AppError, AppResult, JobError};

/// Attempts made for a serializable transaction before giving up
const MAX_TX_ATTEMPTS: usize = 3;

/// SQLSTATE raised on serialization conflicts
const SERIALIZATION_FAILURE: &str = "40001";

/// Durable record of jobs keyed by content address.
///
/// Every operation is transactional on its own; callers may use one store
/// from many tasks at once.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &NewJob) -> AppResult<()>;

    /// Unsettled jobs in a stable order (insertion order).
    async fn list_unsettled(&self) -> AppResult<Vec<Job>>;

    /// Mark a job settled. A job that is already settled keeps its
    /// first timestamp.
    async fn settle_job(
        &self,
        content_address: &ContentAddress,
        activation: DateTime<Utc>,
    ) -> AppResult<()>;
}

/// Postgres-backed job store
pub struct PgJobStore {
    pub pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_serializable(&self) -> AppResult<Transaction<'_, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn insert_job(&self, job: &NewJob) -> AppResult<()> {
        let expires_at = job.cache_expiry(Utc::now())?;
        let mut tx = self.begin_serializable().await?;

        let ns_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM namespaces WHERE name = $1
            "#,
        )
        .bind(&job.publisher.namespace)
        .fetch_optional(&mut *tx)
        .await?;

        let ns_id = match ns_id {
            Some(id) => id,
            None => {
                tx.rollback().await?;
                return Err(JobError::NamespaceNotFound(job.publisher.namespace.clone()).into());
            }
        };

        sqlx::query(
            r#"
            INSERT INTO jobs (ns_id, cid, relation, timestamp, cache_path, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(ns_id)
        .bind(job.content_address.as_bytes())
        .bind(&job.publisher.relation)
        .bind(job.source_timestamp)
        .bind(job.cache_path())
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn is_serialization_failure(err: &AppError) -> bool {
    match err {
        AppError::Database(sqlx::Error::Database(db)) => {
            db.code().as_deref() == Some(SERIALIZATION_FAILURE)
        }
        _ => false,
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: &NewJob) -> AppResult<()> {
        let mut attempt = 1;
        loop {
            match self.insert_job(job).await {
                Ok(()) => break,
                Err(e) if attempt < MAX_TX_ATTEMPTS && is_serialization_failure(&e) => {
                    warn!(
                        "Serialization conflict creating job {} (attempt {}), retrying",
                        job.content_address, attempt
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!("Created job {} for {}", job.content_address, job.publisher);
        Ok(())
    }

    async fn list_unsettled(&self) -> AppResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT namespaces.name AS namespace, jobs.relation, jobs.cid,
                   jobs.timestamp, jobs.expires_at, jobs.activated
            FROM jobs
            JOIN namespaces ON namespaces.id = jobs.ns_id
            WHERE jobs.activated IS NULL
            ORDER BY jobs.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn settle_job(
        &self,
        content_address: &ContentAddress,
        activation: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET activated = $1
            WHERE cid = $2 AND activated IS NULL
            "#,
        )
        .bind(activation)
        .bind(content_address.as_bytes())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Job {} was already settled or does not exist", content_address);
        }

        Ok(())
    }
}
