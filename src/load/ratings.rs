use std::{
    collections::{BTreeSet, HashSet},
    path::Path,
};

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QuerySelect, Set,
    Statement, TransactionTrait,
    sea_query::{OnConflict, Query},
};
use tracing::{info, warn};

use crate::{
    config::Config,
    db,
    entities::{Ratings, movie, user},
    error::AppResult,
    identity::Identity,
    models::RatingRow,
};

use super::{execute_insert, insert_placeholder_movies, open_csv};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RatingsSummary {
    pub ratings: usize,
    pub unique_movies: usize,
    pub existing_movies: usize,
    pub placeholder_movies: u64,
    pub unique_users: usize,
    pub users_inserted: u64,
    pub ratings_inserted: u64,
}

/// Loads users and ratings, first adding placeholder movies for every movie id the ratings
/// reference that the movies table lacks. Runs as one transaction.
pub async fn load_ratings(config: &Config, path: &Path) -> AppResult<RatingsSummary> {
    info!(file = %path.display(), "reading ratings");
    let rows = read_ratings(path)?;
    info!(ratings = rows.len(), "found rating entries to process");

    let users = synthesize_users(&rows);

    let db = db::connect(&config.database_url).await?;
    let result = load_rows(&db, &rows, &users, config.batch_size).await;
    db::close(db).await;
    result
}

fn read_ratings(path: &Path) -> AppResult<Vec<RatingRow>> {
    let mut reader = open_csv(path, false)?;
    let rows = reader.deserialize().collect::<Result<Vec<RatingRow>, _>>()?;
    Ok(rows)
}

/// One identity per distinct user id, in order of first appearance.
fn synthesize_users(rows: &[RatingRow]) -> Vec<Identity> {
    let mut rng = rand::thread_rng();
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|r| seen.insert(r.user_id))
        .map(|r| Identity::generate(&mut rng, r.user_id))
        .collect()
}

async fn load_rows(
    db: &DatabaseConnection,
    rows: &[RatingRow],
    users: &[Identity],
    batch_size: usize,
) -> AppResult<RatingsSummary> {
    let txn = db.begin().await?;
    match write_all(&txn, rows, users, batch_size).await {
        Ok(summary) => {
            txn.commit().await?;
            info!(
                placeholder_movies = summary.placeholder_movies,
                users_inserted = summary.users_inserted,
                ratings_inserted = summary.ratings_inserted,
                "ratings load complete"
            );
            Ok(summary)
        },
        Err(err) => {
            warn!(error = %err, "ratings load failed, rolling back");
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        },
    }
}

async fn write_all(
    txn: &DatabaseTransaction,
    rows: &[RatingRow],
    users: &[Identity],
    batch_size: usize,
) -> AppResult<RatingsSummary> {
    let mut summary = RatingsSummary {
        ratings: rows.len(),
        unique_users: users.len(),
        ..Default::default()
    };

    info!("synchronizing movies with ratings data");
    let existing: HashSet<i32> = movie::Entity::find()
        .select_only()
        .column(movie::Column::Id)
        .into_tuple::<i32>()
        .all(txn)
        .await?
        .into_iter()
        .collect();
    summary.existing_movies = existing.len();

    let referenced: BTreeSet<i32> = rows.iter().map(|r| r.movie_id).collect();
    summary.unique_movies = referenced.len();
    info!(
        existing = existing.len(),
        referenced = referenced.len(),
        "compared movie ids"
    );

    let missing: Vec<i32> = referenced.into_iter().filter(|id| !existing.contains(id)).collect();
    if missing.is_empty() {
        info!("all movies from the ratings file are already present");
    } else {
        info!(missing = missing.len(), "inserting placeholder movies");
        summary.placeholder_movies = insert_placeholder_movies(txn, &missing, batch_size).await?;
    }

    info!(users = users.len(), "inserting users");
    summary.users_inserted = insert_users(txn, users, batch_size).await?;

    let before = existing_ratings(txn).await?;
    if before > 0 {
        warn!(existing = before, "ratings table is not empty, ratings will be appended");
    }

    info!(ratings = rows.len(), "inserting ratings");
    summary.ratings_inserted = insert_ratings(txn, rows, batch_size).await?;

    Ok(summary)
}

async fn insert_users<C: ConnectionTrait>(
    db: &C,
    users: &[Identity],
    batch_size: usize,
) -> AppResult<u64> {
    let mut inserted = 0;
    for chunk in users.chunks(batch_size.max(1)) {
        let models = chunk.iter().map(|u| user::ActiveModel {
            id: Set(u.id),
            name: Set(u.name.clone()),
            email: Set(u.email.clone()),
        });
        inserted += user::Entity::insert_many(models)
            .on_conflict(OnConflict::column(user::Column::Id).do_nothing().to_owned())
            .exec_without_returning(db)
            .await?;
    }
    Ok(inserted)
}

async fn insert_ratings<C: ConnectionTrait>(
    db: &C,
    rows: &[RatingRow],
    batch_size: usize,
) -> AppResult<u64> {
    let mut inserted = 0;
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut insert = Query::insert();
        insert.into_table(Ratings::Table).columns([
            Ratings::UserId,
            Ratings::MovieId,
            Ratings::Rating,
            Ratings::Timestamp,
        ]);
        for r in chunk {
            insert.values_panic([
                r.user_id.into(),
                r.movie_id.into(),
                r.rating.into(),
                r.timestamp.into(),
            ]);
        }
        inserted += execute_insert(db, &insert).await?;
    }
    Ok(inserted)
}

async fn existing_ratings<C: ConnectionTrait>(db: &C) -> AppResult<i64> {
    let stmt = Statement::from_string(
        db.get_database_backend(),
        "SELECT COUNT(*) AS count FROM ratings".to_string(),
    );
    let count = match db.query_one(stmt).await? {
        Some(row) => row.try_get::<i64>("", "count")?,
        None => 0,
    };
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity::email_for,
        load::testing::{count, setup_test_db, write_file},
    };

    const RATINGS: &str = "userId,movieId,rating,timestamp
1,110,1.0,1425941529
1,147,4.5,1425942435
2,110,5.0,1425941600
3,862,3.5,1425941700
";

    #[tokio::test]
    async fn backfills_movies_and_users() {
        let (config, tmp) = setup_test_db().await;
        let conn = db::connect(&config.database_url).await.unwrap();
        conn.execute_unprepared("INSERT INTO movies (id, title) VALUES (862, 'Toy Story')")
            .await
            .unwrap();
        db::close(conn).await;

        let path = write_file(&tmp, "ratings.csv", RATINGS);
        let summary = load_ratings(&config, &path).await.unwrap();

        assert_eq!(
            summary,
            RatingsSummary {
                ratings: 4,
                unique_movies: 3,
                existing_movies: 1,
                placeholder_movies: 2,
                unique_users: 3,
                users_inserted: 3,
                ratings_inserted: 4,
            }
        );
        assert_eq!(
            count(&config, "SELECT COUNT(*) FROM movies WHERE title = 'Title for movie 110'")
                .await,
            1
        );
        assert_eq!(
            count(&config, "SELECT COUNT(*) FROM movies WHERE title = 'Toy Story'").await,
            1
        );
        assert_eq!(count(&config, "SELECT COUNT(*) FROM users").await, 3);
        assert_eq!(count(&config, "SELECT COUNT(*) FROM ratings").await, 4);
    }

    #[tokio::test]
    async fn rerun_keeps_identities_and_appends_ratings() {
        let (config, tmp) = setup_test_db().await;
        let path = write_file(&tmp, "ratings.csv", RATINGS);
        load_ratings(&config, &path).await.unwrap();

        let conn = db::connect(&config.database_url).await.unwrap();
        let first: Vec<user::Model> = user::Entity::find().all(&conn).await.unwrap();
        db::close(conn).await;
        for u in &first {
            assert_eq!(u.email, email_for(&u.name, u.id));
        }

        let summary = load_ratings(&config, &path).await.unwrap();
        assert_eq!(summary.users_inserted, 0);
        assert_eq!(summary.placeholder_movies, 0);

        let conn = db::connect(&config.database_url).await.unwrap();
        let second: Vec<user::Model> = user::Entity::find().all(&conn).await.unwrap();
        db::close(conn).await;
        assert_eq!(first, second);
        assert_eq!(count(&config, "SELECT COUNT(*) FROM ratings").await, 8);
    }

    #[tokio::test]
    async fn bad_record_fails_the_whole_load() {
        let (config, tmp) = setup_test_db().await;
        let path = write_file(&tmp, "ratings.csv", "userId,movieId,rating,timestamp\n1,110,x,5\n");
        assert!(load_ratings(&config, &path).await.is_err());
        assert_eq!(count(&config, "SELECT COUNT(*) FROM movies").await, 0);
    }

    #[test]
    fn users_are_synthesized_once_in_file_order() {
        let rows = [
            RatingRow { user_id: 5, movie_id: 1, rating: 3.0, timestamp: 1 },
            RatingRow { user_id: 2, movie_id: 1, rating: 3.0, timestamp: 1 },
            RatingRow { user_id: 5, movie_id: 2, rating: 4.0, timestamp: 2 },
        ];
        let ids: Vec<i32> = synthesize_users(&rows).iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![5, 2]);
    }
}
