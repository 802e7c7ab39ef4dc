use std::{collections::HashSet, path::Path};

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DeriveIden, TransactionTrait,
    sea_query::Query,
};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    db,
    error::{AppError, AppResult},
};

use super::{execute_insert, open_csv, parse_id};

#[derive(DeriveIden)]
enum TempTitles {
    Table,
    Id,
    Title,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TitleUpdateSummary {
    pub records: usize,
    pub titles: usize,
    pub updated: u64,
}

/// Overwrites movie titles with the ones from the metadata CSV.
///
/// The cleaned `(id, title)` pairs are staged in a temporary table and applied with one
/// `UPDATE ... FROM` join. Ids that are not in the movies table are ignored.
pub async fn update_titles(config: &Config, path: &Path) -> AppResult<TitleUpdateSummary> {
    info!(file = %path.display(), "reading movie metadata");
    let (records, titles) = read_titles(path)?;
    info!(records = records, titles = titles.len(), "found valid, unique movie titles");

    let db = db::connect(&config.database_url).await?;
    let result = apply_titles(&db, &titles, config.batch_size).await;
    db::close(db).await;

    let updated = result?;
    info!(updated = updated, "movie titles updated");
    Ok(TitleUpdateSummary { records, titles: titles.len(), updated })
}

/// Returns the number of records read and the usable `(id, title)` pairs, first occurrence
/// winning for duplicate ids.
fn read_titles(path: &Path) -> AppResult<(usize, Vec<(i32, String)>)> {
    let mut reader = open_csv(path, true)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| AppError::Config(format!("{} has no {name:?} column", path.display())))
    };
    let id_col = column("id")?;
    let title_col = column("title")?;

    let mut records = 0;
    let mut seen = HashSet::new();
    let mut titles = Vec::new();
    for result in reader.records() {
        records += 1;
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "skipping unreadable metadata record");
                continue;
            },
        };
        let Some(id) = record.get(id_col).and_then(parse_id) else {
            debug!(id = ?record.get(id_col), "dropping record with invalid id");
            continue;
        };
        let Some(title) = record.get(title_col).filter(|t| !t.is_empty()) else {
            continue;
        };
        if seen.insert(id) {
            titles.push((id, title.to_string()));
        }
    }
    Ok((records, titles))
}

async fn apply_titles(
    db: &DatabaseConnection,
    titles: &[(i32, String)],
    batch_size: usize,
) -> AppResult<u64> {
    let txn = db.begin().await?;
    match stage_and_update(&txn, titles, batch_size).await {
        Ok(updated) => {
            txn.commit().await?;
            Ok(updated)
        },
        Err(err) => {
            warn!(error = %err, "title update failed, rolling back");
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        },
    }
}

async fn stage_and_update(
    txn: &DatabaseTransaction,
    titles: &[(i32, String)],
    batch_size: usize,
) -> AppResult<u64> {
    txn.execute_unprepared(
        "CREATE TEMP TABLE temp_titles (id INTEGER PRIMARY KEY, title TEXT NOT NULL)",
    )
    .await?;
    debug!("temporary table temp_titles created");

    let mut staged = 0;
    for chunk in titles.chunks(batch_size.max(1)) {
        let mut insert = Query::insert();
        insert.into_table(TempTitles::Table).columns([TempTitles::Id, TempTitles::Title]);
        for (id, title) in chunk {
            insert.values_panic([(*id).into(), title.clone().into()]);
        }
        staged += execute_insert(txn, &insert).await?;
    }
    debug!(staged = staged, "staged titles");

    let updated = txn
        .execute_unprepared(
            "UPDATE movies SET title = temp_titles.title FROM temp_titles \
             WHERE movies.id = temp_titles.id",
        )
        .await?
        .rows_affected();

    txn.execute_unprepared("DROP TABLE temp_titles").await?;
    Ok(updated)
}
