//! Synthetic user identities. The ratings file only carries numeric user ids, so every
//! user gets a random display name and an address derived from it.

use rand::Rng;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas",
    "Sarah", "Charles", "Karen", "Daniel", "Lisa", "Matthew", "Nancy", "Anthony", "Sandra",
    "Mark", "Ashley", "Steven", "Emily", "Andrew", "Michelle", "Joshua", "Amanda", "Kevin",
    "Melissa", "Brian", "Stephanie", "Omar", "Priya", "Kenji", "Ana", "Lucas", "Fatima",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis",
    "Rodriguez", "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas",
    "Taylor", "Moore", "Jackson", "Martin", "Lee", "Perez", "Thompson", "White", "Harris",
    "Sanchez", "Clark", "Ramirez", "Lewis", "Robinson", "Walker", "Young", "Allen", "King",
    "Wright", "Scott", "Nguyen", "Hill", "Flores", "Green", "Van Dyke", "Okafor", "Tanaka",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: i32,
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, id: i32) -> Self {
        let name = random_name(rng);
        let email = email_for(&name, id);
        Self { id, name, email }
    }
}

pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
    let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
    format!("{first} {last}")
}

/// `Jane Van Dyke` with id 7 becomes `jane.van.dyke7@example.com`.
pub fn email_for(name: &str, id: i32) -> String {
    format!("{}{}@example.com", name.to_lowercase().replace(' ', "."), id)
}
