pub mod auth;
pub mod jwt;
pub mod password;

pub use auth::{extract_bearer_token, AuthenticatedUser};
pub use jwt::{Claims, JwtManager};
pub use password::{hash_password, verify_password, PasswordCheck};
