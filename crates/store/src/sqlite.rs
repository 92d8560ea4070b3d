//! Embedded SQLite [`JobStore`].
//!
//! The full job record lives in a JSON `record` column; `project_id`,
//! `status`, and `attempt` are mirrored into real columns so listing and
//! the claim compare-and-set stay plain SQL. Every mutation rewrites both.
//!
//! The pool is capped at one connection: SQLite serializes writers anyway,
//! and a single connection keeps `sqlite::memory:` ledgers coherent in
//! tests.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use reelforge_core::job::{validate_transition, Job, JobStatus};
use reelforge_core::state::PipelineState;
use reelforge_core::types::{AssetRef, JobId};

use crate::error::StoreError;
use crate::job_store::{ClaimOutcome, JobStore};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS jobs ( \
        id TEXT PRIMARY KEY, \
        project_id TEXT NOT NULL, \
        job_type TEXT NOT NULL, \
        status TEXT NOT NULL, \
        attempt INTEGER NOT NULL, \
        record TEXT NOT NULL, \
        created_at TEXT NOT NULL, \
        updated_at TEXT NOT NULL \
    )",
    "CREATE INDEX IF NOT EXISTS idx_jobs_project_status \
        ON jobs(project_id, status)",
    "CREATE TABLE IF NOT EXISTS pipeline_states ( \
        project_id TEXT NOT NULL, \
        revision INTEGER NOT NULL, \
        state TEXT NOT NULL, \
        created_at TEXT NOT NULL, \
        PRIMARY KEY (project_id, revision) \
    )",
];

/// Durable job ledger backed by a SQLite database.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Connect and apply the schema. Accepts any sqlx SQLite URL,
    /// e.g. `sqlite://reelforge.db?mode=rwc` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    fn encode(job: &Job) -> Result<String, StoreError> {
        serde_json::to_string(job)
            .map_err(|e| StoreError::Corruption(format!("job {} does not serialize: {e}", job.id)))
    }

    fn decode(record: &str) -> Result<Job, StoreError> {
        serde_json::from_str(record)
            .map_err(|e| StoreError::Corruption(format!("job record does not parse: {e}")))
    }

    async fn fetch(&self, id: JobId) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT record FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("job", id))?;
        Self::decode(row.get::<String, _>(0).as_str())
    }

    /// Rewrite a job row guarded by its expected current status.
    /// Returns whether the guarded update actually applied.
    async fn update_guarded(
        &self,
        job: &Job,
        expected: JobStatus,
    ) -> Result<bool, StoreError> {
        let record = Self::encode(job)?;
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?, attempt = ?, record = ?, updated_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(job.status.as_str())
        .bind(job.attempt as i64)
        .bind(record)
        .bind(job.updated_at.to_rfc3339())
        .bind(job.id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a validated transition with a status-guarded update.
    async fn transition(
        &self,
        id: JobId,
        to: JobStatus,
        apply: impl FnOnce(&mut Job),
    ) -> Result<(), StoreError> {
        let mut job = self.fetch(id).await?;
        let from = job.status;
        job.transition(to)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        apply(&mut job);
        if !self.update_guarded(&job, from).await? {
            return Err(StoreError::Conflict(format!(
                "job {id} changed status concurrently"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: Job) -> Result<JobId, StoreError> {
        let record = Self::encode(&job)?;
        sqlx::query(
            "INSERT INTO jobs \
                 (id, project_id, job_type, status, attempt, record, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(&job.project_id)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.attempt as i64)
        .bind(record)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(job.id)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.fetch(id).await
    }

    async fn list(
        &self,
        project_id: &str,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT record FROM jobs \
                     WHERE project_id = ? AND status = ? \
                     ORDER BY rowid ASC",
                )
                .bind(project_id)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT record FROM jobs WHERE project_id = ? ORDER BY rowid ASC",
                )
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter()
            .map(|row| Self::decode(row.get::<String, _>(0).as_str()))
            .collect()
    }

    async fn claim(&self, id: JobId) -> Result<ClaimOutcome, StoreError> {
        let mut job = self.fetch(id).await?;
        if job.status != JobStatus::Pending {
            return Ok(ClaimOutcome::Lost);
        }
        job.transition(JobStatus::InProgress)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        // The status guard makes this the compare-and-set: whoever ran
        // first wins, everyone else sees zero rows affected.
        if self.update_guarded(&job, JobStatus::Pending).await? {
            Ok(ClaimOutcome::Claimed(job))
        } else {
            Ok(ClaimOutcome::Lost)
        }
    }

    async fn complete(&self, id: JobId, output: AssetRef) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Completed, |job| {
            job.output = Some(output);
            job.error = None;
        })
        .await
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), StoreError> {
        let error = error.to_string();
        self.transition(id, JobStatus::Failed, move |job| {
            job.error = Some(error);
        })
        .await
    }

    async fn reset_for_retry(&self, id: JobId) -> Result<(), StoreError> {
        let mut job = self.fetch(id).await?;
        let from = job.status;
        job.reset_for_retry()
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        if !self.update_guarded(&job, from).await? {
            return Err(StoreError::Conflict(format!(
                "job {id} changed status concurrently"
            )));
        }
        Ok(())
    }

    async fn mark_skipped(&self, id: JobId) -> Result<(), StoreError> {
        self.transition(id, JobStatus::Skipped, |_| {}).await
    }

    async fn save_state(
        &self,
        state: &PipelineState,
        touched: &[Job],
    ) -> Result<(), StoreError> {
        let state_json = serde_json::to_string(state).map_err(|e| {
            StoreError::Corruption(format!("snapshot does not serialize: {e}"))
        })?;

        let mut tx = self.pool.begin().await?;
        for job in touched {
            let record = Self::encode(job)?;
            sqlx::query(
                "INSERT INTO jobs \
                     (id, project_id, job_type, status, attempt, record, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET \
                     status = excluded.status, \
                     attempt = excluded.attempt, \
                     record = excluded.record, \
                     updated_at = excluded.updated_at",
            )
            .bind(job.id.to_string())
            .bind(&job.project_id)
            .bind(job.job_type.as_str())
            .bind(job.status.as_str())
            .bind(job.attempt as i64)
            .bind(record)
            .bind(job.created_at.to_rfc3339())
            .bind(job.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        // Idempotent on resume: re-saving the same revision replaces it.
        sqlx::query(
            "INSERT OR REPLACE INTO pipeline_states \
                 (project_id, revision, state, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&state.project_id)
        .bind(state.revision as i64)
        .bind(state_json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_state(
        &self,
        project_id: &str,
    ) -> Result<Option<PipelineState>, StoreError> {
        let row = sqlx::query(
            "SELECT state FROM pipeline_states \
             WHERE project_id = ? \
             ORDER BY revision DESC LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            serde_json::from_str(row.get::<String, _>(0).as_str()).map_err(|e| {
                StoreError::Corruption(format!("snapshot does not parse: {e}"))
            })
        })
        .transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use reelforge_core::job::JobPayload;
    use reelforge_core::state::Stage;

    async fn store() -> SqliteJobStore {
        SqliteJobStore::connect("sqlite::memory:").await.unwrap()
    }

    fn job(project: &str) -> Job {
        Job::new(
            project,
            JobPayload::Audio {
                scene_id: "s01".to_string(),
                dialogue: "we ride at dawn".to_string(),
                voice: None,
            },
            vec![],
        )
    }

    #[tokio::test]
    async fn create_get_round_trip() {
        let store = store().await;
        let original = job("p1");
        let id = store.create(original.clone()).await.unwrap();
        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.payload, original.payload);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = store().await;
        assert_matches!(
            store.get(uuid::Uuid::new_v4()).await,
            Err(StoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn claim_is_a_compare_and_set() {
        let store = store().await;
        let id = store.create(job("p1")).await.unwrap();
        assert_matches!(store.claim(id).await.unwrap(), ClaimOutcome::Claimed(_));
        assert_matches!(store.claim(id).await.unwrap(), ClaimOutcome::Lost);
    }

    #[tokio::test]
    async fn full_lifecycle_to_completed() {
        let store = store().await;
        let id = store.create(job("p1")).await.unwrap();
        store.claim(id).await.unwrap();
        store
            .complete(id, AssetRef::from_path("narration.wav"))
            .await
            .unwrap();
        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert_eq!(fetched.output.unwrap().path, "narration.wav");
        // Completed is immutable.
        assert_matches!(
            store.fail(id, "too late").await,
            Err(StoreError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn retry_reset_bumps_attempt() {
        let store = store().await;
        let id = store.create(job("p1")).await.unwrap();
        store.claim(id).await.unwrap();
        store.fail(id, "backend hiccup").await.unwrap();
        store.reset_for_retry(id).await.unwrap();
        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.attempt, 1);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = store().await;
        let a = store.create(job("p1")).await.unwrap();
        store.create(job("p1")).await.unwrap();
        store.claim(a).await.unwrap();

        let pending = store.list("p1", Some(JobStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        let in_progress = store
            .list("p1", Some(JobStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, a);
    }

    #[tokio::test]
    async fn snapshot_save_load_round_trip() {
        let store = store().await;
        let j = job("p1");
        let jid = j.id;
        store.create(j.clone()).await.unwrap();

        let s0 = PipelineState::new("p1", vec![jid], serde_json::json!({"v": 1}));
        let s1 = s0.with_stage_complete(Stage::Plan);
        store.save_state(&s0, &[]).await.unwrap();
        store.save_state(&s1, &[j]).await.unwrap();

        let loaded = store.load_state("p1").await.unwrap().unwrap();
        assert_eq!(loaded, s1);
    }

    #[tokio::test]
    async fn load_state_for_unknown_project_is_none() {
        let store = store().await;
        assert!(store.load_state("missing").await.unwrap().is_none());
    }
}
