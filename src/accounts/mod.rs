//! Registration and profile management. Everything here is plain store
//! CRUD plus media uploads; session state belongs to `auth`.

pub mod handlers;
mod service;

pub use service::{AccountService, RegisterInput};
