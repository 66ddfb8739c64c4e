//! Blog user model.

use serde::{Deserialize, Serialize};

/// User identifier (`ID` in the users table).
pub type UserId = i64;

/// A user who can author posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: String,
}
