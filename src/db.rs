use std::path::Path;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement,
    TransactionTrait,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::Config,
    error::{AppError, AppResult},
};

/// Opens a connection for one unit of work. Pair every call with [`close`].
pub async fn connect(database_url: &str) -> AppResult<DatabaseConnection> {
    let mut opts = ConnectOptions::new(database_url.to_string());
    opts.max_connections(1).min_connections(1);
    let db = Database::connect(opts).await?;
    debug!(backend = ?db.get_database_backend(), "database connection opened");
    Ok(db)
}

pub async fn close(db: DatabaseConnection) {
    match db.close().await {
        Ok(()) => debug!("database connection closed"),
        Err(err) => warn!(error = %err, "failed to close database connection"),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseTarget {
    Postgres { name: String, admin_url: String },
    Sqlite,
}

impl DatabaseTarget {
    pub fn parse(database_url: &str, admin_database: &str) -> AppResult<Self> {
        if database_url.starts_with("sqlite:") {
            return Ok(Self::Sqlite);
        }

        let mut url = Url::parse(database_url)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(AppError::Config(format!(
                "unsupported database scheme {:?}",
                url.scheme()
            )));
        }

        let name = url.path().trim_start_matches('/').to_string();
        if name.is_empty() {
            return Err(AppError::Config("DATABASE_URL has no database name".to_string()));
        }
        url.set_path(&format!("/{admin_database}"));

        Ok(Self::Postgres { name, admin_url: url.to_string() })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapReport {
    pub database: String,
    pub created: bool,
    pub statements: usize,
}

/// Creates the database if it is missing, then applies the DDL script.
pub async fn bootstrap(config: &Config) -> AppResult<BootstrapReport> {
    let target = DatabaseTarget::parse(&config.database_url, &config.admin_database)?;
    let (database, created) = match &target {
        DatabaseTarget::Postgres { name, admin_url } => {
            (name.clone(), ensure_postgres_database(admin_url, name).await?)
        },
        DatabaseTarget::Sqlite => {
            debug!("sqlite database file is created on connect");
            (config.database_url.clone(), false)
        },
    };

    let sql = read_schema(&config.schema_file)?;

    info!(database = %database, "connecting to database");
    let db = connect(&config.database_url).await?;
    info!(file = %config.schema_file.display(), "executing schema");
    let result = apply_schema(&db, &sql).await;
    close(db).await;
    let statements = result?;

    info!(statements = statements, "all tables created");
    Ok(BootstrapReport { database, created, statements })
}

async fn ensure_postgres_database(admin_url: &str, name: &str) -> AppResult<bool> {
    let db = connect(admin_url).await?;
    let result = create_if_absent(&db, name).await;
    close(db).await;
    result
}

async fn create_if_absent(db: &DatabaseConnection, name: &str) -> AppResult<bool> {
    let exists = db
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT 1 FROM pg_database WHERE datname = $1",
            [name.into()],
        ))
        .await?
        .is_some();

    if exists {
        info!(database = %name, "database already exists");
        return Ok(false);
    }

    info!(database = %name, "database does not exist, creating it");
    db.execute_unprepared(&format!("CREATE DATABASE {}", quote_ident(name))).await?;
    info!(database = %name, "database created");
    Ok(true)
}

fn read_schema(path: &Path) -> AppResult<String> {
    std::fs::read_to_string(path).map_err(|err| AppError::io(path, err))
}

/// Runs every statement of `sql` in one transaction and returns how many ran.
pub async fn apply_schema(db: &DatabaseConnection, sql: &str) -> AppResult<usize> {
    let statements = split_statements(sql);
    let txn = db.begin().await?;
    for stmt in &statements {
        txn.execute_unprepared(stmt).await?;
    }
    txn.commit().await?;
    Ok(statements.len())
}

fn split_statements(sql: &str) -> Vec<String> {
    let without_comments = sql
        .lines()
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_postgres_target() {
        let target =
            DatabaseTarget::parse("postgres://loader@localhost:5432/movie_db", "postgres").unwrap();
        assert_eq!(
            target,
            DatabaseTarget::Postgres {
                name: "movie_db".into(),
                admin_url: "postgres://loader@localhost:5432/postgres".into(),
            }
        );
        assert_eq!(
            DatabaseTarget::parse("sqlite://movies.db?mode=rwc", "postgres").unwrap(),
            DatabaseTarget::Sqlite
        );
    }

    #[test]
    fn rejects_unusable_urls() {
        assert!(DatabaseTarget::parse("postgres://localhost:5432", "postgres").is_err());
        assert!(DatabaseTarget::parse("mysql://localhost/movie_db", "postgres").is_err());
        assert!(DatabaseTarget::parse("not a url", "postgres").is_err());
    }

    #[test]
    fn splits_statements_and_strips_comments() {
        let sql = "-- movies\nCREATE TABLE a (id INTEGER); -- trailing\n\n;CREATE TABLE b (id INTEGER)\n";
        assert_eq!(
            split_statements(sql),
            vec!["CREATE TABLE a (id INTEGER)".to_string(), "CREATE TABLE b (id INTEGER)".to_string()]
        );
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("movie_db"), "\"movie_db\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent_on_sqlite() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::for_database(format!(
            "sqlite://{}?mode=rwc",
            tmp.path().join("movies.db").display()
        ));
        config.schema_file = Path::new(env!("CARGO_MANIFEST_DIR")).join("schema.sql");

        let first = bootstrap(&config).await.unwrap();
        let second = bootstrap(&config).await.unwrap();
        assert!(!first.created);
        assert_eq!(first.statements, second.statements);
        assert!(first.statements >= 5);

        let db = connect(&config.database_url).await.unwrap();
        let rows = db
            .query_all(Statement::from_string(
                DatabaseBackend::Sqlite,
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name".to_string(),
            ))
            .await
            .unwrap();
        let tables: Vec<String> =
            rows.iter().map(|row| row.try_get::<String>("", "name").unwrap()).collect();
        close(db).await;
        for table in ["cast", "crew", "movies", "ratings", "users"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[tokio::test]
    async fn bootstrap_reports_missing_schema_file() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::for_database(format!(
            "sqlite://{}?mode=rwc",
            tmp.path().join("movies.db").display()
        ));
        config.schema_file = tmp.path().join("missing.sql");
        let err = bootstrap(&config).await.unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
    }
}
