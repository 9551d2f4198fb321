pub mod auth;

pub use auth::{issue_token, require_auth, require_role, Claims};
