//! Session-credential lifecycle.
//!
//! - `token`: signs and verifies access/refresh tokens (separate secrets)
//! - `session`: login, logout, single-use refresh rotation, password change
//! - `gateway`: resolves the caller from an access token on protected routes
//! - `password`: Argon2 hashing

pub mod gateway;
pub mod handlers;
pub mod password;
pub mod session;
pub mod token;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

pub use gateway::{AuthGateway, Authenticated};
pub use session::{LoginOutcome, SessionManager, SessionPolicy, SessionTokens};
pub use token::{Claims, TokenCodec, TokenError, TokenKind};
