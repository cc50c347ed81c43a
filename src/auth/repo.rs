use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for user records, keyed by id and by unique email.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Replaces the password hash and bumps `updated_at`. `None` if no such user.
    async fn update_password(&self, id: Uuid, password_hash: &str)
        -> Result<Option<User>, StoreError>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(u) => Ok(u),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateEmail)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET password_hash = $2, updated_at = now()
             WHERE id = $1
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .context("update password")?;
        Ok(user)
    }
}

/// In-process store for development without a database, and for tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn count_by_email(&self, email: &str) -> usize {
        self.users
            .read()
            .await
            .values()
            .filter(|u| u.email == email)
            .count()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|u| {
            u.password_hash = password_hash.to_string();
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            username: "alice".into(),
            email: email.into(),
            password_hash: "$argon2id$placeholder".into(),
        }
    }

    #[tokio::test]
    async fn memory_store_enforces_unique_email() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("a@x.com")).await.expect("first insert");
        let err = store.create(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.count_by_email("a@x.com").await, 1);
    }

    #[tokio::test]
    async fn memory_store_email_is_case_sensitive() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("a@x.com")).await.unwrap();
        store.create(new_user("A@x.com")).await.expect("different email");
        assert!(store.find_by_email("A@X.COM").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_lookup_and_update() {
        let store = MemoryCredentialStore::new();
        let created = store.create(new_user("a@x.com")).await.unwrap();

        let by_email = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        let updated = store
            .update_password(created.id, "$argon2id$other")
            .await
            .unwrap()
            .expect("user exists");
        assert_eq!(updated.password_hash, "$argon2id$other");
        assert!(updated.updated_at >= created.updated_at);

        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.password_hash, "$argon2id$other");

        assert!(store
            .update_password(Uuid::new_v4(), "x")
            .await
            .unwrap()
            .is_none());
    }
}
