//! Directory records: cafes and the user accounts that author them.

use serde::Serialize;

/// A directory entry. Serialises to every column of the `cafes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cafe {
    pub id: i64,
    pub name: String,
    pub map_url: String,
    pub img_url: String,
    pub location: String,
    pub seats: String,
    pub has_toilet: bool,
    pub has_wifi: bool,
    pub has_sockets: bool,
    pub can_take_calls: bool,
    pub coffee_price: Option<String>,
    pub author_id: Option<i64>,
}

/// Field values for a cafe that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCafe {
    pub name: String,
    pub map_url: String,
    pub img_url: String,
    pub location: String,
    pub seats: String,
    pub has_toilet: bool,
    pub has_wifi: bool,
    pub has_sockets: bool,
    pub can_take_calls: bool,
    pub coffee_price: Option<String>,
    pub author_id: Option<i64>,
}

/// A registered account. The password is kept verbatim and never serialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// The part of a user that pages are allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
        }
    }
}
