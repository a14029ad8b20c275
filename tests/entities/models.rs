//! Entity types declared with `#[derive(Mapped)]`.

use dynamap::Mapped;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Mapped)]
#[mapped(table = "users", prefix = "usr")]
pub struct User {
    #[mapped(id)]
    pub id: String,
    #[mapped(hash, name = "mail")]
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl User {
    pub fn new(id: &str, email: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            nickname: None,
        }
    }
}

/// Posts are listed by author and creation date, and grouped by board lanes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Mapped)]
#[mapped(table = "posts")]
pub struct Post {
    pub id: u32,
    #[mapped(hash)]
    pub author: String,
    #[mapped(range)]
    pub created: String,
    #[mapped(pair_hash = "byBoard")]
    pub board: String,
    #[mapped(pair_range = "byBoard")]
    pub lanes: Vec<String>,
    pub title: String,
    #[mapped(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
}

impl Post {
    pub fn new(id: u32, author: &str, created: &str, board: &str, lanes: &[&str]) -> Self {
        Self {
            id,
            author: author.to_string(),
            created: created.to_string(),
            board: board.to_string(),
            lanes: lanes.iter().map(|l| l.to_string()).collect(),
            title: format!("post {}", id),
            draft: None,
        }
    }
}

/// Unversioned counters with strongly consistent reads by default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Mapped)]
#[mapped(versioning = false, consistent = true)]
pub struct PageCounter {
    pub id: String,
    pub hits: u64,
}
