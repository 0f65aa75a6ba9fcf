//! `PostgreSQL` credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use iutcart_core::{Email, Roles, UserId};

use super::{RepositoryError, UserStore, map_unique_violation};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, is_admin, is_seller, reset_token, \
                            created_at, updated_at";

/// Raw `users` row before validation.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    email: String,
    password_hash: String,
    is_admin: bool,
    is_seller: bool,
    reset_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            email,
            password_hash: row.password_hash,
            roles: Roles::new(row.is_admin, row.is_seller),
            reset_token: row.reset_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>, RepositoryError> {
    row.map(User::try_from).transpose()
}

/// Users table access.
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn select_where(predicate: &str) -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}")
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash, is_admin, is_seller) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.name)
            .bind(user.email.as_str())
            .bind(&user.password_hash)
            .bind(user.roles.is_admin)
            .bind(user.roles.is_seller)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "email"))?;

        User::try_from(row)
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&select_where("email = $1"))
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;
        into_user(row)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&select_where("id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        into_user(row)
    }

    async fn get_by_reset_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&select_where("reset_token = $1"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        into_user(row)
    }

    async fn set_reset_token(&self, id: UserId, token: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET reset_token = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "UPDATE users \
             SET password_hash = $2, reset_token = NULL, updated_at = now() \
             WHERE reset_token = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .await?;
        into_user(row)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
