//! Postgres Record Store
//!
//! Handles all database operations for projects, tasks and runs.

use async_trait::async_trait;
use kiln_core::domain::platform::{TargetArch, TargetOs};
use kiln_core::domain::project::Project;
use kiln_core::domain::run::{Run, RunStatus};
use kiln_core::domain::task::Task;
use kiln_core::dto::project::ProjectFilter;
use kiln_core::dto::run::RunFilter;
use kiln_core::dto::task::TaskFilter;
use kiln_runner::repository::{RepositoryError, RunRepository};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{RecordStore, Result, StoreError};

const PROJECT_COLUMNS: &str = "id, name, url, token, local_path, main_branch, module_mode, \
     workspace, env, before_build, after_build, created_at";

const TASK_COLUMNS: &str = "id, project_id, branch, main_file, dest_file, target_os, \
     target_arch, toolchain, env, auto_build, created_at";

const RUN_COLUMNS: &str = "r.id, r.task_id, r.description, r.status, r.stdout_path, \
     r.stderr_path, r.artifact_url, r.created_at, r.started_at, r.finished_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (
                id, name, url, token, local_path, main_branch, module_mode,
                workspace, env, before_build, after_build, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(&project.url)
        .bind(&project.token)
        .bind(path_text(&project.local_path))
        .bind(&project.main_branch)
        .bind(project.module_mode)
        .bind(path_text(&project.workspace))
        .bind(&project.env)
        .bind(&project.before_build)
        .bind(&project.after_build)
        .bind(project.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("project {} already exists", project.name)))?;

        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects WHERE id = $1",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects WHERE name = $1",
            PROJECT_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            r#"
            SELECT {}
            FROM projects
            WHERE ($1::TEXT IS NULL OR strpos(lower(name), lower($1)) > 0)
            ORDER BY name ASC
            "#,
            PROJECT_COLUMNS
        ))
        .bind(filter.name.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("project {} still has tasks", id)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, project_id, branch, main_file, dest_file, target_os,
                target_arch, toolchain, env, auto_build, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(task.id)
        .bind(task.project_id)
        .bind(&task.branch)
        .bind(&task.main_file)
        .bind(&task.dest_file)
        .bind(task.target_os.as_str())
        .bind(task.target_arch.as_str())
        .bind(&task.toolchain)
        .bind(&task.env)
        .bind(task.auto_build)
        .bind(task.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("project {} does not exist", task.project_id)))?;

        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            SELECT {}
            FROM tasks
            WHERE ($1::UUID IS NULL OR project_id = $1)
              AND ($2::TEXT IS NULL OR toolchain = $2)
            ORDER BY created_at DESC
            "#,
            TASK_COLUMNS
        ))
        .bind(filter.project_id)
        .bind(filter.toolchain.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn set_auto_build(&self, id: Uuid, auto_build: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE tasks SET auto_build = $1 WHERE id = $2")
            .bind(auto_build)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_task_with_runs(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM runs WHERE task_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_run(&self, run: &Run) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runs (
                id, task_id, description, status, stdout_path, stderr_path,
                artifact_url, created_at, started_at, finished_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(run.id)
        .bind(run.task_id)
        .bind(&run.description)
        .bind(run.status.as_str())
        .bind(run.stdout_path.as_deref().map(path_text))
        .bind(run.stderr_path.as_deref().map(path_text))
        .bind(&run.artifact_url)
        .bind(run.created_at)
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("task {} does not exist", run.task_id)))?;

        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {} FROM runs r WHERE r.id = $1",
            RUN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Run::try_from).transpose()
    }

    async fn update_run(&self, run: &Run) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET description = $1, status = $2, stdout_path = $3, stderr_path = $4,
                artifact_url = $5, started_at = $6, finished_at = $7
            WHERE id = $8
            "#,
        )
        .bind(&run.description)
        .bind(run.status.as_str())
        .bind(run.stdout_path.as_deref().map(path_text))
        .bind(run.stderr_path.as_deref().map(path_text))
        .bind(&run.artifact_url)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            r#"
            SELECT {}
            FROM runs r
            JOIN tasks t ON t.id = r.task_id
            WHERE ($1::UUID IS NULL OR t.project_id = $1)
              AND ($2::UUID IS NULL OR r.task_id = $2)
            ORDER BY r.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            RUN_COLUMNS
        ))
        .bind(filter.project_id)
        .bind(filter.task_id)
        .bind(i64::from(filter.limit()))
        .bind(i64::from(filter.offset()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Run::try_from).collect()
    }
}

#[async_trait]
impl RunRepository for PgStore {
    async fn update_run(&self, run: &Run) -> std::result::Result<(), RepositoryError> {
        match RecordStore::update_run(self, run).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RepositoryError(format!("run {} no longer exists", run.id))),
            Err(e) => Err(RepositoryError(e.to_string())),
        }
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Maps constraint violations to `Conflict`, anything else to `Database`
fn conflict_or(err: sqlx::Error, message: String) -> StoreError {
    let violated = match &err {
        sqlx::Error::Database(db) => db.is_unique_violation() || db.is_foreign_key_violation(),
        _ => false,
    };
    if violated {
        StoreError::Conflict(message)
    } else {
        StoreError::Database(err)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    url: String,
    token: Option<String>,
    local_path: String,
    main_branch: String,
    module_mode: bool,
    workspace: String,
    env: String,
    before_build: Option<String>,
    after_build: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            url: row.url,
            token: row.token,
            local_path: PathBuf::from(row.local_path),
            main_branch: row.main_branch,
            module_mode: row.module_mode,
            workspace: PathBuf::from(row.workspace),
            env: row.env,
            before_build: row.before_build,
            after_build: row.after_build,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    project_id: Uuid,
    branch: String,
    main_file: String,
    dest_file: String,
    target_os: String,
    target_arch: String,
    toolchain: String,
    env: String,
    auto_build: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let target_os = row
            .target_os
            .parse::<TargetOs>()
            .map_err(|e| StoreError::Corrupt(format!("task {}: {}", row.id, e)))?;
        let target_arch = row
            .target_arch
            .parse::<TargetArch>()
            .map_err(|e| StoreError::Corrupt(format!("task {}: {}", row.id, e)))?;

        Ok(Task {
            id: row.id,
            project_id: row.project_id,
            branch: row.branch,
            main_file: row.main_file,
            dest_file: row.dest_file,
            target_os,
            target_arch,
            toolchain: row.toolchain,
            env: row.env,
            auto_build: row.auto_build,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    task_id: Uuid,
    description: String,
    status: String,
    stdout_path: Option<String>,
    stderr_path: Option<String>,
    artifact_url: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<RunRow> for Run {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self> {
        let status = row
            .status
            .parse::<RunStatus>()
            .map_err(|e| StoreError::Corrupt(format!("run {}: {}", row.id, e)))?;

        Ok(Run {
            id: row.id,
            task_id: row.task_id,
            description: row.description,
            status,
            stdout_path: row.stdout_path.map(PathBuf::from),
            stderr_path: row.stderr_path.map(PathBuf::from),
            artifact_url: row.artifact_url,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}
