//! Table definitions.
//!
//! `movies` and `users` have primary keys and are sea-orm entities. `cast`, `crew` and
//! `ratings` have no key, so they are written through `sea_query` with the identifiers below.

use sea_orm::DeriveIden;

pub mod movie;
pub mod user;

#[derive(Clone, Copy, Debug, DeriveIden)]
pub enum Cast {
    Table,
    MovieId,
    CastId,
    CharacterName,
    CreditId,
    Gender,
    Name,
    CastOrder,
    ProfilePath,
}

#[derive(Clone, Copy, Debug, DeriveIden)]
pub enum Crew {
    Table,
    MovieId,
    CreditId,
    Department,
    Gender,
    Job,
    Name,
    ProfilePath,
}

#[derive(Clone, Copy, Debug, DeriveIden)]
pub enum Ratings {
    Table,
    UserId,
    MovieId,
    Rating,
    Timestamp,
}
