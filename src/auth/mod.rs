//! Authentication Module
//! Mission: Identify the calling account from an HS256 bearer token

pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::JwtHandler;
pub use middleware::{auth_middleware, AuthError};
pub use models::Claims;
