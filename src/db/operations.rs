use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::db::models::{Account, AccountRow, NewAccount};
use crate::db::store::CredentialStore;
use crate::error::{AppError, DatabaseError};
use crate::Result;

const ACCOUNT_COLUMNS: &str = "id, username, email, full_name, avatar, cover_image, \
     password_hash, refresh_token, role, created_at, updated_at";

/// Postgres-backed [`CredentialStore`].
pub struct PgCredentialStore {
    pool: Arc<PgPool>,
}

impl PgCredentialStore {
    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        Ok(())
    }
}

fn into_account(row: AccountRow) -> Result<Account> {
    Account::try_from(row).map_err(|e| AppError::DatabaseError(DatabaseError::QueryError(e)))
}

/// Runs an idempotent read, retrying once if the first attempt hit a
/// transient connection failure.
async fn read_with_retry<T, F, Fut>(operation: &str, mut query: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match query().await {
        Ok(value) => Ok(value),
        Err(e) => match AppError::from(e) {
            AppError::DatabaseError(ref db) if db.is_transient() => {
                warn!(operation, error = %db, "Transient store failure, retrying once");
                Ok(query().await?)
            }
            other => Err(other),
        },
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username_or_email(&self, username: &str, email: &str) -> Result<Option<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE ($1 <> '' AND username = $1) OR ($2 <> '' AND email = $2) \
             LIMIT 1"
        );
        let row = read_with_retry("find_by_username_or_email", || {
            sqlx::query_as::<_, AccountRow>(&sql)
                .bind(username)
                .bind(email)
                .fetch_optional(self.pool.as_ref())
        })
        .await?;

        row.map(into_account).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = read_with_retry("find_by_id", || {
            sqlx::query_as::<_, AccountRow>(&sql)
                .bind(id)
                .fetch_optional(self.pool.as_ref())
        })
        .await?;

        row.map(into_account).transpose()
    }

    async fn create(&self, account: NewAccount) -> Result<Account> {
        let account = account.into_account();
        let sql = format!(
            "INSERT INTO accounts (id, username, email, full_name, avatar, cover_image, \
             password_hash, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(account.id)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.full_name)
            .bind(&account.avatar)
            .bind(&account.cover_image)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.created_at)
            .bind(account.updated_at)
            .fetch_one(self.pool.as_ref())
            .await?;

        into_account(row)
    }

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn update_refresh_token(&self, id: Uuid, expected_old: &str, new: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET refresh_token = $3, updated_at = now() \
             WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id)
        .bind(expected_old)
        .bind(new)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_refresh_token(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE accounts SET refresh_token = NULL, updated_at = now() \
             WHERE id = $1 AND refresh_token IS NOT NULL",
        )
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn update_details(&self, id: Uuid, full_name: &str, email: &str) -> Result<Option<Account>> {
        let sql = format!(
            "UPDATE accounts SET full_name = $2, email = $3, updated_at = now() \
             WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .bind(full_name)
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => {
                    AppError::Conflict("Email is already in use".to_string())
                }
                other => other,
            })?;

        row.map(into_account).transpose()
    }

    async fn update_images(
        &self,
        id: Uuid,
        avatar: Option<String>,
        cover_image: Option<String>,
    ) -> Result<Option<Account>> {
        let sql = format!(
            "UPDATE accounts SET avatar = COALESCE($2, avatar), \
             cover_image = COALESCE($3, cover_image), updated_at = now() \
             WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .bind(avatar)
            .bind(cover_image)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.map(into_account).transpose()
    }
}
