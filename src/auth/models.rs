//! Authentication Models
//! Mission: Bearer token payload identifying the calling account

use crate::models::AccountRole;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String, // subject (account id)
    pub username: String,
    pub role: AccountRole,
    pub exp: usize, // expiration timestamp
}

impl Claims {
    pub fn account_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}
