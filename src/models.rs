use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

use crate::literal::Literal;

pub fn placeholder_title(movie_id: i32) -> String {
    format!("Title for movie {movie_id}")
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CastMember {
    pub cast_id: Option<i32>,
    pub character_name: Option<String>,
    pub credit_id: Option<String>,
    pub gender: Option<i32>,
    pub name: Option<String>,
    pub cast_order: Option<i32>,
    pub profile_path: Option<String>,
}

impl CastMember {
    /// Missing keys and values of the wrong type become `None`. Entries that are not dicts
    /// yield no member.
    pub fn from_literal(entry: &Literal) -> Option<Self> {
        if !entry.is_dict() {
            return None;
        }
        Some(Self {
            cast_id: int_field(entry, "cast_id"),
            character_name: str_field(entry, "character"),
            credit_id: str_field(entry, "credit_id"),
            gender: int_field(entry, "gender"),
            name: str_field(entry, "name"),
            cast_order: int_field(entry, "order"),
            profile_path: str_field(entry, "profile_path"),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrewMember {
    pub credit_id: Option<String>,
    pub department: Option<String>,
    pub gender: Option<i32>,
    pub job: Option<String>,
    pub name: Option<String>,
    pub profile_path: Option<String>,
}

impl CrewMember {
    pub fn from_literal(entry: &Literal) -> Option<Self> {
        if !entry.is_dict() {
            return None;
        }
        Some(Self {
            credit_id: str_field(entry, "credit_id"),
            department: str_field(entry, "department"),
            gender: int_field(entry, "gender"),
            job: str_field(entry, "job"),
            name: str_field(entry, "name"),
            profile_path: str_field(entry, "profile_path"),
        })
    }
}

fn int_field(entry: &Literal, key: &str) -> Option<i32> {
    entry.get(key).and_then(Literal::as_i32)
}

fn str_field(entry: &Literal, key: &str) -> Option<String> {
    entry.get(key).and_then(Literal::as_str).map(str::to_string)
}

/// One line of the ratings CSV.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct RatingRow {
    #[serde(rename = "userId")]
    pub user_id: i32,
    #[serde(rename = "movieId")]
    pub movie_id: i32,
    pub rating: f64,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, FromQueryResult, Serialize)]
pub struct TopRatedMovie {
    pub title: String,
    pub num_ratings: i64,
    pub avg_rating: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct ActiveUser {
    pub name: String,
    pub email: String,
    pub ratings_count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct CastCredit {
    pub name: Option<String>,
    pub character_name: Option<String>,
    pub cast_order: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct DirectorCredit {
    pub name: Option<String>,
    pub job: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct ActorRole {
    pub title: String,
    pub character_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct DirectedMovie {
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct UserRecord {
    pub id: i32,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, FromQueryResult, Serialize)]
pub struct RatingRecord {
    pub user_id: i32,
    pub movie_id: i32,
    pub rating: f64,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal;

    #[test]
    fn cast_member_tolerates_missing_and_mistyped_fields() {
        let entry = literal::parse(
            "{'cast_id': 14, 'character': 'Woody (voice)', 'gender': None, 'name': 'Tom Hanks', 'order': '0'}",
        )
        .unwrap();
        let member = CastMember::from_literal(&entry).unwrap();
        assert_eq!(
            member,
            CastMember {
                cast_id: Some(14),
                character_name: Some("Woody (voice)".into()),
                credit_id: None,
                gender: None,
                name: Some("Tom Hanks".into()),
                cast_order: None,
                profile_path: None,
            }
        );
    }

    #[test]
    fn crew_member_reads_all_fields() {
        let entry = literal::parse(
            "{'credit_id': '52fe4284c3a36847f8024f49', 'department': 'Directing', 'gender': 2, 'id': 7879, 'job': 'Director', 'name': 'John Lasseter', 'profile_path': '/7EdqiNbr4FRjIhKHyPPdFfEEEFG.jpg'}",
        )
        .unwrap();
        let member = CrewMember::from_literal(&entry).unwrap();
        assert_eq!(member.job.as_deref(), Some("Director"));
        assert_eq!(member.department.as_deref(), Some("Directing"));
        assert_eq!(member.gender, Some(2));
        assert_eq!(member.profile_path.as_deref(), Some("/7EdqiNbr4FRjIhKHyPPdFfEEEFG.jpg"));
    }

    #[test]
    fn non_dict_entries_are_not_members() {
        assert_eq!(CastMember::from_literal(&Literal::Int(3)), None);
        assert_eq!(CrewMember::from_literal(&Literal::List(vec![])), None);
        assert_eq!(
            CastMember::from_literal(&Literal::Dict(vec![])),
            Some(CastMember::default())
        );
    }

    #[test]
    fn placeholder_title_format() {
        assert_eq!(placeholder_title(862), "Title for movie 862");
    }
}
