//! CSV loaders. Each one opens a single connection, runs its unit of work and closes the
//! connection before returning.

use std::{fs::File, path::Path};

use sea_orm::{
    ConnectionTrait, EntityTrait, Set,
    sea_query::{InsertStatement, OnConflict},
};

use crate::{
    entities::movie,
    error::{AppError, AppResult},
    models::placeholder_title,
};

pub mod credits;
pub mod ratings;
pub mod titles;

pub use credits::{Credits, CreditsSummary, RowOutcome, RowReport, load_credits};
pub use ratings::{RatingsSummary, load_ratings};
pub use titles::{TitleUpdateSummary, update_titles};

fn open_csv(path: &Path, flexible: bool) -> AppResult<csv::Reader<File>> {
    let file = File::open(path).map_err(|err| AppError::io(path, err))?;
    Ok(csv::ReaderBuilder::new().flexible(flexible).from_reader(file))
}

/// Parses an id the way a lenient numeric reader would: integers, or floats truncated
/// toward zero. Blank, non-finite and out-of-range values are rejected.
pub(crate) fn parse_id(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i32>() {
        return Some(id);
    }
    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let value = value.trunc();
    if value < i32::MIN as f64 || value > i32::MAX as f64 {
        return None;
    }
    Some(value as i32)
}

/// Inserts `Title for movie {id}` rows, skipping ids that already exist. Returns the number
/// of rows actually inserted.
pub(crate) async fn insert_placeholder_movies<C: ConnectionTrait>(
    db: &C,
    ids: &[i32],
    batch_size: usize,
) -> AppResult<u64> {
    let mut inserted = 0;
    for chunk in ids.chunks(batch_size.max(1)) {
        let models = chunk.iter().map(|&id| movie::ActiveModel {
            id: Set(id),
            title: Set(placeholder_title(id)),
        });
        inserted += movie::Entity::insert_many(models)
            .on_conflict(OnConflict::column(movie::Column::Id).do_nothing().to_owned())
            .exec_without_returning(db)
            .await?;
    }
    Ok(inserted)
}

pub(crate) async fn execute_insert<C: ConnectionTrait>(
    db: &C,
    insert: &InsertStatement,
) -> AppResult<u64> {
    let stmt = db.get_database_backend().build(insert);
    Ok(db.execute(stmt).await?.rows_affected())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use sea_orm::DatabaseConnection;
    use tempfile::TempDir;

    use crate::{config::Config, db};

    /// A bootstrapped SQLite database in a temporary directory.
    pub async fn setup_test_db() -> (Config, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::for_database(format!(
            "sqlite://{}?mode=rwc",
            tmp.path().join("movies.db").display()
        ));
        config.schema_file = Path::new(env!("CARGO_MANIFEST_DIR")).join("schema.sql");
        config.batch_size = 2;
        db::bootstrap(&config).await.unwrap();
        (config, tmp)
    }

    pub fn write_file(tmp: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = tmp.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub async fn count(config: &Config, sql: &str) -> i64 {
        use sea_orm::{ConnectionTrait, Statement};

        let conn: DatabaseConnection = db::connect(&config.database_url).await.unwrap();
        let row = conn
            .query_one(Statement::from_string(conn.get_database_backend(), sql.to_string()))
            .await
            .unwrap()
            .unwrap();
        let value: i64 = row.try_get_by_index(0).unwrap();
        db::close(conn).await;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_leniently() {
        assert_eq!(parse_id("862"), Some(862));
        assert_eq!(parse_id(" 862 "), Some(862));
        assert_eq!(parse_id("862.0"), Some(862));
        assert_eq!(parse_id("1.9"), Some(1));
        assert_eq!(parse_id("1e3"), Some(1000));
        assert_eq!(parse_id(""), None);
        assert_eq!(parse_id("1997-08-20"), None);
        assert_eq!(parse_id("nan"), None);
        assert_eq!(parse_id("inf"), None);
        assert_eq!(parse_id("99999999999"), None);
    }
}
