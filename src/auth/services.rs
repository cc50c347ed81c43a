use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::Claims,
        dto::LoginOutcome,
        jwt::{TokenError, TokenService},
        ledger::ResetLedger,
        password::{hash_password, verify_password},
        repo::{CredentialStore, StoreError},
        repo_types::{NewUser, User},
    },
    errors::AuthError,
    notify::{reset_link, Notifier},
};

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AuthError::DuplicateUser,
            StoreError::Backend(e) => AuthError::StoreFailure(e),
        }
    }
}

/// Registration, login, identity lookup and the password-reset protocol.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    tokens: TokenService,
    ledger: Arc<ResetLedger>,
    base_url: String,
    single_use_reset: bool,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        tokens: TokenService,
        base_url: String,
        single_use_reset: bool,
    ) -> Self {
        Self {
            store,
            notifier,
            tokens,
            ledger: Arc::new(ResetLedger::new()),
            base_url,
            single_use_reset,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        // Fast path; the store's unique constraint is authoritative.
        if self.store.find_by_email(email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::DuplicateUser);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .store
            .create(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
            })
            .await
            .map_err(|e| {
                if matches!(e, StoreError::DuplicateEmail) {
                    warn!(email = %email, "lost registration race on email");
                }
                AuthError::from(e)
            })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let Some(user) = self.store.find_by_email(email).await? else {
            warn!(email = %email, "login unknown email");
            return Err(AuthError::UserNotFound);
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue_session(user.id, &user.email)?;
        info!(user_id = %user.id, "user logged in");
        Ok(LoginOutcome { token, user })
    }

    /// `claims` must already have been verified by the request gate.
    pub async fn get_identity(&self, claims: &Claims) -> Result<User, AuthError> {
        self.store.find_by_id(claims.id).await?.ok_or_else(|| {
            warn!(user_id = %claims.id, "token subject no longer exists");
            AuthError::UserNotFound
        })
    }

    pub async fn initiate_reset(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.find_by_email(email).await? else {
            warn!(email = %email, "reset requested for unknown email");
            return Err(AuthError::UserNotFound);
        };

        let token = self.tokens.issue_reset(user.id, &user.email)?;
        let link = reset_link(&self.base_url, &token);
        self.notifier
            .send_reset_link(&user.email, &link)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user.id, "reset email delivery failed");
                AuthError::StoreFailure(e)
            })?;

        info!(user_id = %user.id, "reset link issued");
        Ok(())
    }

    pub async fn complete_reset(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        self.complete_reset_at(token, new_password, OffsetDateTime::now_utc())
            .await
    }

    pub async fn complete_reset_at(
        &self,
        token: &str,
        new_password: &str,
        now: OffsetDateTime,
    ) -> Result<(), AuthError> {
        let claims = self.tokens.verify_at(token, now).map_err(|e| {
            warn!(error = %e, "reset token rejected");
            match e {
                TokenError::Expired => AuthError::TokenExpired,
                TokenError::Invalid => AuthError::TokenInvalid,
            }
        })?;

        // Session tokens have no jti and must not authorize a reset.
        let (Some(jti), Some(exp)) = (claims.jti, claims.exp) else {
            warn!(user_id = %claims.id, "non-reset token presented for reset");
            return Err(AuthError::TokenInvalid);
        };

        if self.store.find_by_id(claims.id).await?.is_none() {
            warn!(user_id = %claims.id, "reset for missing user");
            return Err(AuthError::UserNotFound);
        }

        // Claim before writing so two concurrent uses cannot both succeed.
        if self.single_use_reset && !self.ledger.try_consume(jti, exp, now.unix_timestamp()) {
            warn!(user_id = %claims.id, %jti, "reset token replayed");
            return Err(AuthError::TokenInvalid);
        }

        if let Err(e) = self.store_new_password(claims.id, new_password).await {
            if self.single_use_reset {
                self.ledger.release(jti);
            }
            warn!(user_id = %claims.id, %jti, "password write failed; reset token released");
            return Err(e);
        }

        info!(user_id = %claims.id, "password reset");
        Ok(())
    }

    async fn store_new_password(&self, id: Uuid, new_password: &str) -> Result<(), AuthError> {
        let password_hash = hash_password(new_password)?;
        self.store
            .update_password(id, &password_hash)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn consumed_resets(&self) -> usize {
        self.ledger.len()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::{
        auth::repo::MemoryCredentialStore, config::JwtConfig,
        notify::testing::RecordingNotifier,
    };

    pub struct Harness {
        pub auth: AuthService,
        pub store: Arc<MemoryCredentialStore>,
        pub notifier: Arc<RecordingNotifier>,
    }

    pub fn harness_with(notifier: RecordingNotifier, single_use_reset: bool) -> Harness {
        let store = Arc::new(MemoryCredentialStore::new());
        let notifier = Arc::new(notifier);
        let tokens = TokenService::from_config(&JwtConfig {
            secret: "test-secret".into(),
            session_ttl_minutes: None,
            reset_ttl_minutes: 60,
        })
        .expect("valid token config");
        let auth = AuthService::new(
            store.clone(),
            notifier.clone(),
            tokens,
            "http://localhost:8080".into(),
            single_use_reset,
        );
        Harness {
            auth,
            store,
            notifier,
        }
    }

    pub fn harness() -> Harness {
        harness_with(RecordingNotifier::default(), true)
    }

    /// Pulls the token out of the last link the notifier captured.
    pub fn last_reset_token(notifier: &RecordingNotifier) -> String {
        let (_, link) = notifier.sent().pop().expect("a reset link was sent");
        link.split("token=").nth(1).expect("token param").to_string()
    }
}
