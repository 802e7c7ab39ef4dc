use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use movieload::{
    config::Config,
    db,
    load::{self, RowOutcome},
    queries,
};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "movieload")]
#[command(version, about = "Load the movie ratings dataset into a database and query it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database if it does not exist and apply the schema
    InitSchema {
        /// DDL script, defaults to SCHEMA_FILE
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Load movies, cast and crew from the credits CSV
    LoadCredits {
        /// Credits CSV, defaults to CREDITS_FILE
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Load users and ratings, adding placeholder movies where needed
    LoadRatings {
        /// Ratings CSV, defaults to RATINGS_FILE
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Replace placeholder titles with titles from the metadata CSV
    UpdateTitles {
        /// Metadata CSV, defaults to METADATA_FILE
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Run one of the query helpers
    Query {
        /// Print rows as JSON instead of CSV
        #[arg(long, global = true)]
        json: bool,

        #[command(subcommand)]
        query: QueryCommand,
    },
}

#[derive(Subcommand)]
enum QueryCommand {
    /// Ten highest-rated movies
    TopRated {
        /// Only movies with more ratings than this
        #[arg(long, default_value_t = queries::DEFAULT_MIN_RATINGS)]
        min_ratings: i64,
    },
    /// Ten users with the most ratings
    ActiveUsers,
    /// Cast of a movie, by title
    Cast { title: String },
    /// Directors of a movie, by title
    Director { title: String },
    /// Movies an actor appears in
    ActorMovies { name: String },
    /// Movies a person directed
    DirectedBy { name: String },
    /// Look up a user
    User { id: i32 },
    /// Look up one user's rating of a movie
    Rating { user_id: i32, movie_id: i32 },
    /// Change a user's e-mail address
    UpdateEmail { user_id: i32, email: String },
    /// Delete a user's rating of a movie
    DeleteRating { user_id: i32, movie_id: i32 },
    /// Add a rating
    InsertRating { user_id: i32, movie_id: i32, rating: f64, timestamp: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,movieload=debug,sqlx=warn".to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::InitSchema { file } => {
            if let Some(file) = file {
                config.schema_file = file;
            }
            let report = db::bootstrap(&config).await.context("schema creation failed")?;
            info!(
                database = %report.database,
                created = report.created,
                statements = report.statements,
                "schema ready"
            );
        },
        Commands::LoadCredits { file } => {
            let path = file.unwrap_or_else(|| config.credits_file.clone());
            let summary = load::load_credits(&config, &path)
                .await
                .with_context(|| format!("loading credits from {}", path.display()))?;
            for issue in &summary.issues {
                match &issue.outcome {
                    RowOutcome::Failed { movie_id, reason } => {
                        warn!(row = issue.row, movie_id = movie_id, reason = %reason, "row failed")
                    },
                    RowOutcome::Skipped { reason } => {
                        warn!(row = issue.row, reason = %reason, "row skipped")
                    },
                    RowOutcome::Loaded { .. } => {},
                }
            }
            println!(
                "rows: {}, loaded: {}, skipped: {}, failed: {}, cast: {}, crew: {}, unparsed credit fields: {}",
                summary.rows,
                summary.loaded,
                summary.skipped,
                summary.failed,
                summary.cast_rows,
                summary.crew_rows,
                summary.parse_failures
            );
        },
        Commands::LoadRatings { file } => {
            let path = file.unwrap_or_else(|| config.ratings_file.clone());
            let summary = load::load_ratings(&config, &path)
                .await
                .with_context(|| format!("loading ratings from {}", path.display()))?;
            println!(
                "ratings: {}, placeholder movies: {}, users inserted: {}, ratings inserted: {}",
                summary.ratings,
                summary.placeholder_movies,
                summary.users_inserted,
                summary.ratings_inserted
            );
        },
        Commands::UpdateTitles { file } => {
            let path = file.unwrap_or_else(|| config.metadata_file.clone());
            let summary = load::update_titles(&config, &path)
                .await
                .with_context(|| format!("updating titles from {}", path.display()))?;
            println!("successfully updated {} movie titles", summary.updated);
        },
        Commands::Query { json, query } => run_query(&config, query, json).await?,
    }

    Ok(())
}

async fn run_query(config: &Config, query: QueryCommand, json: bool) -> anyhow::Result<()> {
    match query {
        QueryCommand::TopRated { min_ratings } => {
            print_rows(queries::get_top_rated_movies(config, min_ratings).await, json)
        },
        QueryCommand::ActiveUsers => print_rows(queries::get_most_active_users(config).await, json),
        QueryCommand::Cast { title } => {
            print_rows(queries::get_cast_of_movie(config, &title).await, json)
        },
        QueryCommand::Director { title } => {
            print_rows(queries::get_director_of_movie(config, &title).await, json)
        },
        QueryCommand::ActorMovies { name } => {
            print_rows(queries::search_movies_by_actor(config, &name).await, json)
        },
        QueryCommand::DirectedBy { name } => {
            print_rows(queries::find_movies_directed_by_actor(config, &name).await, json)
        },
        QueryCommand::User { id } => print_rows(queries::get_user_by_id(config, id).await, json),
        QueryCommand::Rating { user_id, movie_id } => {
            print_rows(queries::get_specific_rating(config, user_id, movie_id).await, json)
        },
        QueryCommand::UpdateEmail { user_id, email } => {
            print_affected(queries::update_user_email(config, user_id, &email).await)
        },
        QueryCommand::DeleteRating { user_id, movie_id } => {
            print_affected(queries::delete_rating(config, user_id, movie_id).await)
        },
        QueryCommand::InsertRating { user_id, movie_id, rating, timestamp } => print_affected(
            queries::insert_specific_rating(config, user_id, movie_id, rating, timestamp).await,
        ),
    }
}

fn print_rows<T: Serialize>(rows: Option<Vec<T>>, json: bool) -> anyhow::Result<()> {
    let rows = rows.context("query failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_affected(rows: Option<u64>) -> anyhow::Result<()> {
    let rows = rows.context("statement failed, nothing was committed")?;
    println!("{rows} row(s) affected");
    Ok(())
}
