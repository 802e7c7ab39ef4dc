use std::path::PathBuf;

use anyhow::Context;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/movie_db";
const DEFAULT_ADMIN_DATABASE: &str = "postgres";
const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub admin_database: String,
    pub schema_file: PathBuf,
    pub credits_file: PathBuf,
    pub ratings_file: PathBuf,
    pub metadata_file: PathBuf,
    pub batch_size: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let defaults = Self::for_database(database_url);

        let admin_database =
            std::env::var("ADMIN_DATABASE").unwrap_or(defaults.admin_database);

        let batch_size: usize = match std::env::var("MOVIELOAD_BATCH_SIZE") {
            Ok(s) => s.parse().context("MOVIELOAD_BATCH_SIZE")?,
            Err(_) => defaults.batch_size,
        };

        Ok(Self {
            database_url: defaults.database_url,
            admin_database,
            schema_file: path_var("SCHEMA_FILE").unwrap_or(defaults.schema_file),
            credits_file: path_var("CREDITS_FILE").unwrap_or(defaults.credits_file),
            ratings_file: path_var("RATINGS_FILE").unwrap_or(defaults.ratings_file),
            metadata_file: path_var("METADATA_FILE").unwrap_or(defaults.metadata_file),
            batch_size: batch_size.max(1),
        })
    }

    /// Config pointing at `database_url` with every other setting at its default.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            admin_database: DEFAULT_ADMIN_DATABASE.to_string(),
            schema_file: PathBuf::from("schema.sql"),
            credits_file: PathBuf::from("data/credits.csv"),
            ratings_file: PathBuf::from("data/ratings.csv"),
            metadata_file: PathBuf::from("data/movies_metadata.csv"),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn path_var(key: &str) -> Option<PathBuf> {
    std::env::var_os(key).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_database_uses_defaults() {
        let config = Config::for_database("sqlite://movies.db?mode=rwc");
        assert_eq!(config.database_url, "sqlite://movies.db?mode=rwc");
        assert_eq!(config.admin_database, "postgres");
        assert_eq!(config.schema_file, PathBuf::from("schema.sql"));
        assert_eq!(config.metadata_file, PathBuf::from("data/movies_metadata.csv"));
        assert_eq!(config.batch_size, 500);
    }
}
