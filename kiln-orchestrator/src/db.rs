use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id UUID PRIMARY KEY,
            name VARCHAR(30) NOT NULL UNIQUE,
            url TEXT NOT NULL,
            token TEXT,
            local_path TEXT NOT NULL UNIQUE,
            main_branch VARCHAR(255) NOT NULL,
            module_mode BOOLEAN NOT NULL,
            workspace TEXT NOT NULL,
            env TEXT NOT NULL DEFAULT '',
            before_build TEXT,
            after_build TEXT,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tasks block project deletion; runs go with their task
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id),
            branch VARCHAR(255) NOT NULL,
            main_file TEXT NOT NULL,
            dest_file TEXT NOT NULL,
            target_os VARCHAR(16) NOT NULL,
            target_arch VARCHAR(16) NOT NULL,
            toolchain VARCHAR(64) NOT NULL,
            env TEXT NOT NULL DEFAULT '',
            auto_build BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id UUID PRIMARY KEY,
            task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            description TEXT NOT NULL DEFAULT '',
            status VARCHAR(20) NOT NULL,
            stdout_path TEXT,
            stderr_path TEXT,
            artifact_url TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            finished_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_project_id ON tasks(project_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_runs_task_created ON runs(task_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_created_at ON runs(created_at DESC)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
