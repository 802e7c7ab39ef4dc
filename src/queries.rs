//! Parameterized read and write helpers over the loaded data.
//!
//! Every helper opens its own connection and closes it before returning. Failures are
//! logged and turned into `None`: reads return no rows, writes commit nothing.

use sea_orm::{
    ConnectionTrait, DatabaseConnection, FromQueryResult, Statement, TransactionTrait, Value,
};
use tracing::{error, info};

use crate::{
    config::Config,
    db,
    error::AppResult,
    models::{
        ActiveUser, ActorRole, CastCredit, DirectedMovie, DirectorCredit, RatingRecord,
        TopRatedMovie, UserRecord,
    },
};

pub const DEFAULT_MIN_RATINGS: i64 = 1000;

async fn run_query<T: FromQueryResult>(
    config: &Config,
    sql: &str,
    values: Vec<Value>,
) -> Option<Vec<T>> {
    match fetch_all(config, sql, values).await {
        Ok(rows) => Some(rows),
        Err(err) => {
            error!(error = %err, "query failed");
            None
        },
    }
}

async fn fetch_all<T: FromQueryResult>(
    config: &Config,
    sql: &str,
    values: Vec<Value>,
) -> AppResult<Vec<T>> {
    let db = db::connect(&config.database_url).await?;
    let stmt = Statement::from_sql_and_values(db.get_database_backend(), sql, values);
    let result = T::find_by_statement(stmt).all(&db).await;
    db::close(db).await;
    Ok(result?)
}

async fn run_commit_query(config: &Config, sql: &str, values: Vec<Value>) -> Option<u64> {
    match execute_and_commit(config, sql, values).await {
        Ok(rows) => {
            info!(rows_affected = rows, "commit successful");
            Some(rows)
        },
        Err(err) => {
            error!(error = %err, "commit query failed");
            None
        },
    }
}

async fn execute_and_commit(config: &Config, sql: &str, values: Vec<Value>) -> AppResult<u64> {
    let db = db::connect(&config.database_url).await?;
    let result = execute_in_transaction(&db, sql, values).await;
    db::close(db).await;
    result
}

async fn execute_in_transaction(
    db: &DatabaseConnection,
    sql: &str,
    values: Vec<Value>,
) -> AppResult<u64> {
    let txn = db.begin().await?;
    let stmt = Statement::from_sql_and_values(db.get_database_backend(), sql, values);
    let rows = txn.execute(stmt).await?.rows_affected();
    txn.commit().await?;
    Ok(rows)
}

/// Ten highest average ratings among titles with more than `min_ratings` ratings.
pub async fn get_top_rated_movies(config: &Config, min_ratings: i64) -> Option<Vec<TopRatedMovie>> {
    info!(min_ratings = min_ratings, "finding top 10 highest-rated movies");
    run_query(
        config,
        "SELECT m.title, COUNT(r.rating) AS num_ratings, AVG(r.rating) AS avg_rating \
         FROM movies m JOIN ratings r ON m.id = r.movie_id \
         GROUP BY m.title HAVING COUNT(r.rating) > $1 \
         ORDER BY avg_rating DESC LIMIT 10",
        vec![min_ratings.into()],
    )
    .await
}

pub async fn get_most_active_users(config: &Config) -> Option<Vec<ActiveUser>> {
    info!("finding top 10 most active users");
    run_query(
        config,
        "SELECT u.name, u.email, COUNT(r.user_id) AS ratings_count \
         FROM users u JOIN ratings r ON u.id = r.user_id \
         GROUP BY u.id, u.name, u.email ORDER BY ratings_count DESC LIMIT 10",
        vec![],
    )
    .await
}

/// First fifteen billed cast members. The title match ignores case.
pub async fn get_cast_of_movie(config: &Config, movie_title: &str) -> Option<Vec<CastCredit>> {
    info!(title = %movie_title, "finding cast");
    run_query(
        config,
        "SELECT c.name, c.character_name, c.cast_order \
         FROM \"cast\" c JOIN movies m ON c.movie_id = m.id \
         WHERE LOWER(m.title) = LOWER($1) ORDER BY c.cast_order LIMIT 15",
        vec![movie_title.into()],
    )
    .await
}

pub async fn get_director_of_movie(
    config: &Config,
    movie_title: &str,
) -> Option<Vec<DirectorCredit>> {
    info!(title = %movie_title, "finding directors");
    run_query(
        config,
        "SELECT cr.name, cr.job FROM crew cr JOIN movies m ON cr.movie_id = m.id \
         WHERE LOWER(m.title) = LOWER($1) AND cr.job = 'Director'",
        vec![movie_title.into()],
    )
    .await
}

pub async fn search_movies_by_actor(config: &Config, actor_name: &str) -> Option<Vec<ActorRole>> {
    info!(actor = %actor_name, "finding movies starring actor");
    run_query(
        config,
        "SELECT m.title, c.character_name FROM movies m JOIN \"cast\" c ON m.id = c.movie_id \
         WHERE c.name = $1 ORDER BY m.title",
        vec![actor_name.into()],
    )
    .await
}

pub async fn find_movies_directed_by_actor(
    config: &Config,
    actor_name: &str,
) -> Option<Vec<DirectedMovie>> {
    info!(actor = %actor_name, "finding movies directed by actor");
    run_query(
        config,
        "SELECT m.title FROM movies m JOIN crew cr ON m.id = cr.movie_id \
         WHERE cr.job = 'Director' AND cr.name = $1",
        vec![actor_name.into()],
    )
    .await
}

pub async fn get_user_by_id(config: &Config, user_id: i32) -> Option<Vec<UserRecord>> {
    run_query(
        config,
        "SELECT id, name, email FROM users WHERE id = $1",
        vec![user_id.into()],
    )
    .await
}

pub async fn get_specific_rating(
    config: &Config,
    user_id: i32,
    movie_id: i32,
) -> Option<Vec<RatingRecord>> {
    run_query(
        config,
        "SELECT user_id, movie_id, rating, timestamp FROM ratings \
         WHERE user_id = $1 AND movie_id = $2",
        vec![user_id.into(), movie_id.into()],
    )
    .await
}

pub async fn update_user_email(config: &Config, user_id: i32, new_email: &str) -> Option<u64> {
    info!(user_id = user_id, "updating email");
    run_commit_query(
        config,
        "UPDATE users SET email = $1 WHERE id = $2",
        vec![new_email.into(), user_id.into()],
    )
    .await
}

pub async fn delete_rating(config: &Config, user_id: i32, movie_id: i32) -> Option<u64> {
    info!(user_id = user_id, movie_id = movie_id, "deleting rating");
    run_commit_query(
        config,
        "DELETE FROM ratings WHERE user_id = $1 AND movie_id = $2",
        vec![user_id.into(), movie_id.into()],
    )
    .await
}

pub async fn insert_specific_rating(
    config: &Config,
    user_id: i32,
    movie_id: i32,
    rating: f64,
    timestamp: i64,
) -> Option<u64> {
    info!(user_id = user_id, movie_id = movie_id, "inserting rating");
    run_commit_query(
        config,
        "INSERT INTO ratings (user_id, movie_id, rating, timestamp) VALUES ($1, $2, $3, $4)",
        vec![user_id.into(), movie_id.into(), rating.into(), timestamp.into()],
    )
    .await
}
