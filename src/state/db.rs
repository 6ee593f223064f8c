//! Checkpoint store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, ToSql};

use super::error::StateError;
use super::schema;
use super::types::{
    DownloadTask, DownloadUpdate, PipelineFlag, PipelineFlags, PipelineTask, PipelineUpdate,
    TransferStrategy, TransferTask, TransferUpdate,
};
use crate::types::ChatId;

/// Durable record store for the three task kinds.
///
/// Every operation is atomic for a single record. `create_*` fails with
/// [`StateError::AlreadyExists`] when the key is taken, so callers check with
/// `get_*` first. `update_*` on a missing key returns
/// [`StateError::NotFound`], which callers log and treat as non-fatal.
/// `delete_*` on a missing key succeeds.
///
/// The trait is object-safe and is shared as `Arc<dyn CheckpointStore>`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_transfer(&self, source_id: ChatId) -> Result<Option<TransferTask>, StateError>;
    async fn create_transfer(&self, task: &TransferTask) -> Result<TransferTask, StateError>;
    async fn update_transfer(
        &self,
        source_id: ChatId,
        update: TransferUpdate,
    ) -> Result<(), StateError>;
    async fn delete_transfer(&self, source_id: ChatId) -> Result<(), StateError>;
    async fn list_transfers(&self) -> Result<Vec<TransferTask>, StateError>;

    async fn get_download(&self, source_id: ChatId) -> Result<Option<DownloadTask>, StateError>;
    async fn create_download(&self, task: &DownloadTask) -> Result<DownloadTask, StateError>;
    async fn update_download(
        &self,
        source_id: ChatId,
        update: DownloadUpdate,
    ) -> Result<(), StateError>;
    async fn delete_download(&self, source_id: ChatId) -> Result<(), StateError>;
    async fn list_downloads(&self) -> Result<Vec<DownloadTask>, StateError>;

    async fn get_pipeline(&self, project: &Path) -> Result<Option<PipelineTask>, StateError>;
    async fn create_pipeline(&self, task: &PipelineTask) -> Result<PipelineTask, StateError>;
    async fn update_pipeline(
        &self,
        project: &Path,
        update: PipelineUpdate,
    ) -> Result<(), StateError>;
    async fn delete_pipeline(&self, project: &Path) -> Result<(), StateError>;
    async fn list_pipelines(&self) -> Result<Vec<PipelineTask>, StateError>;
}

const TRANSFER_COLUMNS: &str =
    "source_id, source_title, destination_id, strategy, last_position, created_at, updated_at";
const DOWNLOAD_COLUMNS: &str = "source_id, source_title, last_position, total_items, completed_items, created_at, updated_at";
const PIPELINE_COLUMNS: &str = "project_path, project_name, destination_id, current_step, last_artifact, \
     is_archived, is_reported, is_transform_authorized, is_transformed, is_finalized, is_annotated, \
     is_publish_authorized, is_published, created_at, updated_at";

/// SQLite implementation of the checkpoint store.
pub struct SqliteCheckpointStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    /// Path to the database file (for error messages).
    path: PathBuf,
}

impl std::fmt::Debug for SqliteCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteCheckpointStore {
    /// Open or create a database at the given path, creating parent directories.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| StateError::Query(e.to_string()))?;
            }
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }

    /// Insert a row, mapping a primary-key collision to `AlreadyExists`.
    fn insert(
        &self,
        kind: &'static str,
        key: String,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<(), StateError> {
        let conn = self.lock()?;
        match conn.execute(sql, params) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StateError::AlreadyExists { kind, key })
            }
            Err(e) => Err(StateError::query(e)),
        }
    }

    /// Set one column on one row and bump `updated_at`.
    /// Set `columns` and `updated_at` of one row in a single statement.
    fn update_columns(
        &self,
        kind: &'static str,
        table: &str,
        key_column: &str,
        key: &dyn ToSql,
        key_display: String,
        columns: &[(&'static str, Value)],
    ) -> Result<(), StateError> {
        let conn = self.lock()?;
        let mut assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect();
        let n = columns.len();
        assignments.push(format!("updated_at = ?{}", n + 1));
        let sql = format!(
            "UPDATE {table} SET {} WHERE {key_column} = ?{}",
            assignments.join(", "),
            n + 2
        );
        let now = Utc::now().timestamp();
        let mut params: Vec<&dyn ToSql> = columns.iter().map(|(_, v)| v as &dyn ToSql).collect();
        params.push(&now);
        params.push(key);
        let changed = conn
            .execute(&sql, params.as_slice())
            .map_err(StateError::query)?;
        if changed == 0 {
            let columns: Vec<&str> = columns.iter().map(|(c, _)| *c).collect();
            tracing::debug!(kind, key = %key_display, ?columns, "Update on missing record");
            return Err(StateError::NotFound {
                kind,
                key: key_display,
            });
        }
        Ok(())
    }

    fn delete_row(&self, table: &str, key_column: &str, key: &dyn ToSql) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM {table} WHERE {key_column} = ?1"), [key])
            .map_err(StateError::query)?;
        Ok(())
    }

    fn query_all<T>(
        &self,
        sql: &str,
        map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(StateError::query)?;
        let rows = stmt
            .query_map([], map)
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;
        Ok(rows)
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get_transfer(&self, source_id: ChatId) -> Result<Option<TransferTask>, StateError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {TRANSFER_COLUMNS} FROM transfer_tasks WHERE source_id = ?1"),
            [source_id],
            row_to_transfer,
        )
        .optional()
        .map_err(StateError::query)
    }

    async fn create_transfer(&self, task: &TransferTask) -> Result<TransferTask, StateError> {
        self.insert(
            "transfer",
            task.source_id.to_string(),
            &format!("INSERT INTO transfer_tasks ({TRANSFER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            rusqlite::params![
                task.source_id,
                task.source_title,
                task.destination_id,
                task.strategy.as_str(),
                task.last_position,
                task.created_at.timestamp(),
                task.updated_at.timestamp(),
            ],
        )?;
        Ok(task.clone())
    }

    async fn update_transfer(
        &self,
        source_id: ChatId,
        update: TransferUpdate,
    ) -> Result<(), StateError> {
        self.update_columns(
            "transfer",
            "transfer_tasks",
            "source_id",
            &source_id,
            source_id.to_string(),
            &[update.column_value()],
        )
    }

    async fn delete_transfer(&self, source_id: ChatId) -> Result<(), StateError> {
        self.delete_row("transfer_tasks", "source_id", &source_id)
    }

    async fn list_transfers(&self) -> Result<Vec<TransferTask>, StateError> {
        self.query_all(
            &format!("SELECT {TRANSFER_COLUMNS} FROM transfer_tasks ORDER BY created_at"),
            row_to_transfer,
        )
    }

    async fn get_download(&self, source_id: ChatId) -> Result<Option<DownloadTask>, StateError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {DOWNLOAD_COLUMNS} FROM download_tasks WHERE source_id = ?1"),
            [source_id],
            row_to_download,
        )
        .optional()
        .map_err(StateError::query)
    }

    async fn create_download(&self, task: &DownloadTask) -> Result<DownloadTask, StateError> {
        self.insert(
            "download",
            task.source_id.to_string(),
            &format!("INSERT INTO download_tasks ({DOWNLOAD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            rusqlite::params![
                task.source_id,
                task.source_title,
                task.last_position,
                task.total_items as i64,
                task.completed_items as i64,
                task.created_at.timestamp(),
                task.updated_at.timestamp(),
            ],
        )?;
        Ok(task.clone())
    }

    async fn update_download(
        &self,
        source_id: ChatId,
        update: DownloadUpdate,
    ) -> Result<(), StateError> {
        self.update_columns(
            "download",
            "download_tasks",
            "source_id",
            &source_id,
            source_id.to_string(),
            &update.column_values(),
        )
    }

    async fn delete_download(&self, source_id: ChatId) -> Result<(), StateError> {
        self.delete_row("download_tasks", "source_id", &source_id)
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadTask>, StateError> {
        self.query_all(
            &format!("SELECT {DOWNLOAD_COLUMNS} FROM download_tasks ORDER BY created_at"),
            row_to_download,
        )
    }

    async fn get_pipeline(&self, project: &Path) -> Result<Option<PipelineTask>, StateError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {PIPELINE_COLUMNS} FROM pipeline_tasks WHERE project_path = ?1"),
            [project.to_string_lossy()],
            row_to_pipeline,
        )
        .optional()
        .map_err(StateError::query)
    }

    async fn create_pipeline(&self, task: &PipelineTask) -> Result<PipelineTask, StateError> {
        let flag = |f: PipelineFlag| task.flags.get(f);
        self.insert(
            "pipeline",
            task.project_path.display().to_string(),
            &format!(
                "INSERT INTO pipeline_tasks ({PIPELINE_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            rusqlite::params![
                task.project_path.to_string_lossy(),
                task.project_name,
                task.destination_id,
                task.current_step,
                task.last_artifact.as_ref().map(|p| p.to_string_lossy().into_owned()),
                flag(PipelineFlag::Archived),
                flag(PipelineFlag::Reported),
                flag(PipelineFlag::TransformAuthorized),
                flag(PipelineFlag::Transformed),
                flag(PipelineFlag::Finalized),
                flag(PipelineFlag::Annotated),
                flag(PipelineFlag::PublishAuthorized),
                flag(PipelineFlag::Published),
                task.created_at.timestamp(),
                task.updated_at.timestamp(),
            ],
        )?;
        Ok(task.clone())
    }

    async fn update_pipeline(
        &self,
        project: &Path,
        update: PipelineUpdate,
    ) -> Result<(), StateError> {
        self.update_columns(
            "pipeline",
            "pipeline_tasks",
            "project_path",
            &project.to_string_lossy(),
            project.display().to_string(),
            &[update.column_value()],
        )
    }

    async fn delete_pipeline(&self, project: &Path) -> Result<(), StateError> {
        self.delete_row("pipeline_tasks", "project_path", &project.to_string_lossy())
    }

    async fn list_pipelines(&self) -> Result<Vec<PipelineTask>, StateError> {
        self.query_all(
            &format!("SELECT {PIPELINE_COLUMNS} FROM pipeline_tasks ORDER BY created_at"),
            row_to_pipeline,
        )
    }
}

fn timestamp(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn row_to_transfer(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransferTask> {
    let strategy: String = row.get(3)?;
    Ok(TransferTask {
        source_id: row.get(0)?,
        source_title: row.get(1)?,
        destination_id: row.get(2)?,
        strategy: TransferStrategy::from_str(&strategy).unwrap_or(TransferStrategy::Unknown),
        last_position: row.get(4)?,
        created_at: timestamp(row.get(5)?),
        updated_at: timestamp(row.get(6)?),
    })
}

fn row_to_download(row: &rusqlite::Row<'_>) -> rusqlite::Result<DownloadTask> {
    let total: i64 = row.get(3)?;
    let completed: i64 = row.get(4)?;
    Ok(DownloadTask {
        source_id: row.get(0)?,
        source_title: row.get(1)?,
        last_position: row.get(2)?,
        total_items: total.max(0) as u64,
        completed_items: completed.max(0) as u64,
        created_at: timestamp(row.get(5)?),
        updated_at: timestamp(row.get(6)?),
    })
}

fn row_to_pipeline(row: &rusqlite::Row<'_>) -> rusqlite::Result<PipelineTask> {
    let project_path: String = row.get(0)?;
    let last_artifact: Option<String> = row.get(4)?;
    let mut flags = PipelineFlags::default();
    for (i, flag) in PipelineFlag::ALL.into_iter().enumerate() {
        flags.set(flag, row.get(5 + i)?);
    }
    Ok(PipelineTask {
        project_path: PathBuf::from(project_path),
        project_name: row.get(1)?,
        destination_id: row.get(2)?,
        current_step: row.get(3)?,
        last_artifact: last_artifact.map(PathBuf::from),
        flags,
        created_at: timestamp(row.get(13)?),
        updated_at: timestamp(row.get(14)?),
    })
}
