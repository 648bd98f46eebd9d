mod extract;
mod middleware;
mod password;
mod token;

pub use extract::AuthenticatedUser;
pub use middleware::{Access, RequireAuth, RequireAuthLayer};
pub use password::{
    compute_password_hash, hash_password, validate_credentials, verify_password_hash, AuthError,
    Credentials,
};
pub use token::{Claims, TokenIssuer};
