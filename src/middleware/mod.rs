pub mod jwt_auth;

pub use jwt_auth::{optional_user, JwtAuthMiddleware, UserId};
