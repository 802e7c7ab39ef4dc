//! Loads the movie ratings dataset (movies, cast, crew, users, ratings) from CSV files into
//! PostgreSQL or SQLite, and provides parameterized query helpers over it.

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod identity;
pub mod literal;
pub mod load;
pub mod models;
pub mod queries;
