//! Credential store: per-account authentication state.
//!
//! `PgCredentialStore` is the production backend; `MemoryCredentialStore`
//! backs local runs and tests.

pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

pub use memory::MemoryCredentialStore;
pub use models::{Account, AccountView, NewAccount, Role};
pub use operations::PgCredentialStore;
pub use store::CredentialStore;
