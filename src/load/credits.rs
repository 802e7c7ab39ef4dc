use std::path::Path;

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, Set, TransactionTrait,
    sea_query::{Expr, OnConflict, Query},
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    db,
    entities::{Cast, Crew, movie},
    error::AppResult,
    literal::{self, Literal},
    models::{CastMember, CrewMember, placeholder_title},
};

use super::{execute_insert, open_csv, parse_id};

#[derive(Clone, Debug, Deserialize)]
struct CreditsRecord {
    id: String,
    cast: String,
    crew: String,
}

/// What happened to the cast or crew column of a loaded row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credits {
    Inserted(usize),
    Unparsed(String),
}

impl Credits {
    fn inserted(&self) -> usize {
        match self {
            Credits::Inserted(n) => *n,
            Credits::Unparsed(_) => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowOutcome {
    Loaded { movie_id: i32, cast: Credits, crew: Credits },
    Skipped { reason: String },
    Failed { movie_id: i32, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowReport {
    pub row: usize,
    pub outcome: RowOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreditsSummary {
    pub rows: usize,
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cast_rows: usize,
    pub crew_rows: usize,
    pub parse_failures: usize,
    /// Every row that was not loaded cleanly.
    pub issues: Vec<RowReport>,
}

impl CreditsSummary {
    fn record(&mut self, row: usize, outcome: RowOutcome) {
        self.rows += 1;
        let clean = match &outcome {
            RowOutcome::Loaded { cast, crew, .. } => {
                self.loaded += 1;
                self.cast_rows += cast.inserted();
                self.crew_rows += crew.inserted();
                let unparsed = [cast, crew]
                    .into_iter()
                    .filter(|c| matches!(c, Credits::Unparsed(_)))
                    .count();
                self.parse_failures += unparsed;
                unparsed == 0
            },
            RowOutcome::Skipped { .. } => {
                self.skipped += 1;
                false
            },
            RowOutcome::Failed { .. } => {
                self.failed += 1;
                false
            },
        };
        if !clean {
            self.issues.push(RowReport { row, outcome });
        }
    }
}

/// Loads movies, cast and crew from the credits CSV.
///
/// All rows share one transaction that is committed at the end. Each row runs in its own
/// savepoint, so a database error discards only that row. Reloading a file replaces the
/// cast and crew of every movie it contains.
pub async fn load_credits(config: &Config, path: &Path) -> AppResult<CreditsSummary> {
    info!(file = %path.display(), "reading credits");
    let records = read_records(path)?;
    info!(rows = records.len(), "found movies to process");

    let db = db::connect(&config.database_url).await?;
    let result = load_records(&db, records, config.batch_size).await;
    db::close(db).await;

    let summary = result?;
    info!(
        loaded = summary.loaded,
        skipped = summary.skipped,
        failed = summary.failed,
        cast_rows = summary.cast_rows,
        crew_rows = summary.crew_rows,
        "credits load complete"
    );
    Ok(summary)
}

fn read_records(path: &Path) -> AppResult<Vec<Result<CreditsRecord, String>>> {
    let mut reader = open_csv(path, false)?;
    reader.headers()?;
    Ok(reader.deserialize().map(|r| r.map_err(|err| err.to_string())).collect())
}

async fn load_records(
    db: &DatabaseConnection,
    records: Vec<Result<CreditsRecord, String>>,
    batch_size: usize,
) -> AppResult<CreditsSummary> {
    let txn = db.begin().await?;
    let mut summary = CreditsSummary::default();

    for (row, record) in records.into_iter().enumerate() {
        let outcome = match record {
            Ok(record) => load_row(&txn, row, &record, batch_size).await,
            Err(reason) => {
                warn!(row = row, error = %reason, "skipping malformed record");
                RowOutcome::Skipped { reason }
            },
        };
        summary.record(row, outcome);
    }

    txn.commit().await?;
    Ok(summary)
}

async fn load_row(
    txn: &DatabaseTransaction,
    row: usize,
    record: &CreditsRecord,
    batch_size: usize,
) -> RowOutcome {
    let Some(movie_id) = parse_id(&record.id) else {
        warn!(row = row, id = %record.id, "skipping row with invalid movie id");
        return RowOutcome::Skipped { reason: format!("invalid movie id {:?}", record.id) };
    };
    debug!(movie_id = movie_id, "processing movie");

    let cast = parse_members(&record.cast, CastMember::from_literal);
    if let Err(err) = &cast {
        warn!(movie_id = movie_id, error = %err, "could not parse cast data");
    }
    let crew = parse_members(&record.crew, CrewMember::from_literal);
    if let Err(err) = &crew {
        warn!(movie_id = movie_id, error = %err, "could not parse crew data");
    }

    let savepoint = match txn.begin().await {
        Ok(savepoint) => savepoint,
        Err(err) => {
            warn!(movie_id = movie_id, error = %err, "failed to open savepoint");
            return RowOutcome::Failed { movie_id, reason: err.to_string() };
        },
    };

    let written = write_row(
        &savepoint,
        movie_id,
        cast.as_deref().ok(),
        crew.as_deref().ok(),
        batch_size,
    )
    .await;

    let result = match written {
        Ok(counts) => savepoint.commit().await.map(|_| counts).map_err(Into::into),
        Err(err) => {
            if let Err(rollback_err) = savepoint.rollback().await {
                warn!(movie_id = movie_id, error = %rollback_err, "failed to roll back row");
            }
            Err(err)
        },
    };

    match result {
        Ok((cast_rows, crew_rows)) => RowOutcome::Loaded {
            movie_id,
            cast: credits_outcome(cast.map(|_| cast_rows)),
            crew: credits_outcome(crew.map(|_| crew_rows)),
        },
        Err(err) => {
            warn!(movie_id = movie_id, error = %err, "failed to load credits, row rolled back");
            RowOutcome::Failed { movie_id, reason: err.to_string() }
        },
    }
}

fn credits_outcome(result: Result<usize, literal::ParseError>) -> Credits {
    match result {
        Ok(n) => Credits::Inserted(n),
        Err(err) => Credits::Unparsed(err.to_string()),
    }
}

/// Parses a cast or crew column. List entries that are not dicts are dropped.
fn parse_members<T>(
    raw: &str,
    convert: fn(&Literal) -> Option<T>,
) -> Result<Vec<T>, literal::ParseError> {
    let value = literal::parse(raw)?;
    let Some(items) = value.as_list() else {
        return Err(literal::ParseError { message: "expected a list".to_string(), offset: 0 });
    };
    let members: Vec<T> = items.iter().filter_map(convert).collect();
    if members.len() < items.len() {
        debug!(dropped = items.len() - members.len(), "ignoring non-dict credit entries");
    }
    Ok(members)
}

async fn write_row(
    txn: &DatabaseTransaction,
    movie_id: i32,
    cast: Option<&[CastMember]>,
    crew: Option<&[CrewMember]>,
    batch_size: usize,
) -> AppResult<(usize, usize)> {
    movie::Entity::insert(movie::ActiveModel {
        id: Set(movie_id),
        title: Set(placeholder_title(movie_id)),
    })
    .on_conflict(OnConflict::column(movie::Column::Id).do_nothing().to_owned())
    .exec_without_returning(txn)
    .await?;

    let cast_rows = match cast {
        Some(members) => replace_cast(txn, movie_id, members, batch_size).await?,
        None => 0,
    };
    let crew_rows = match crew {
        Some(members) => replace_crew(txn, movie_id, members, batch_size).await?,
        None => 0,
    };
    Ok((cast_rows, crew_rows))
}

async fn replace_cast<C: ConnectionTrait>(
    db: &C,
    movie_id: i32,
    members: &[CastMember],
    batch_size: usize,
) -> AppResult<usize> {
    let delete = Query::delete()
        .from_table(Cast::Table)
        .and_where(Expr::col(Cast::MovieId).eq(movie_id))
        .to_owned();
    db.execute(db.get_database_backend().build(&delete)).await?;

    for chunk in members.chunks(batch_size.max(1)) {
        let mut insert = Query::insert();
        insert.into_table(Cast::Table).columns([
            Cast::MovieId,
            Cast::CastId,
            Cast::CharacterName,
            Cast::CreditId,
            Cast::Gender,
            Cast::Name,
            Cast::CastOrder,
            Cast::ProfilePath,
        ]);
        for m in chunk {
            insert.values_panic([
                movie_id.into(),
                m.cast_id.into(),
                m.character_name.clone().into(),
                m.credit_id.clone().into(),
                m.gender.into(),
                m.name.clone().into(),
                m.cast_order.into(),
                m.profile_path.clone().into(),
            ]);
        }
        execute_insert(db, &insert).await?;
    }
    Ok(members.len())
}

async fn replace_crew<C: ConnectionTrait>(
    db: &C,
    movie_id: i32,
    members: &[CrewMember],
    batch_size: usize,
) -> AppResult<usize> {
    let delete = Query::delete()
        .from_table(Crew::Table)
        .and_where(Expr::col(Crew::MovieId).eq(movie_id))
        .to_owned();
    db.execute(db.get_database_backend().build(&delete)).await?;

    for chunk in members.chunks(batch_size.max(1)) {
        let mut insert = Query::insert();
        insert.into_table(Crew::Table).columns([
            Crew::MovieId,
            Crew::CreditId,
            Crew::Department,
            Crew::Gender,
            Crew::Job,
            Crew::Name,
            Crew::ProfilePath,
        ]);
        for m in chunk {
            insert.values_panic([
                movie_id.into(),
                m.credit_id.clone().into(),
                m.department.clone().into(),
                m.gender.into(),
                m.job.clone().into(),
                m.name.clone().into(),
                m.profile_path.clone().into(),
            ]);
        }
        execute_insert(db, &insert).await?;
    }
    Ok(members.len())
}
