use anyhow::{anyhow, ensure};
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{auth::claims::Claims, config::JwtConfig, state::AppState};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature or structure is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
}

/// Signs and verifies the self-contained bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session_ttl: Option<TimeDuration>,
    reset_ttl: TimeDuration,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.tokens().clone()
    }
}

impl TokenService {
    pub fn from_config(cfg: &JwtConfig) -> anyhow::Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            session_ttl: cfg.session_ttl_minutes.map(ttl_from_minutes).transpose()?,
            reset_ttl: ttl_from_minutes(cfg.reset_ttl_minutes)?,
        })
    }

    fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?;
        debug!(user_id = %claims.id, has_exp = claims.exp.is_some(), "jwt signed");
        Ok(token)
    }

    pub fn issue_session(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        self.issue_session_at(user_id, email, OffsetDateTime::now_utc())
    }

    pub fn issue_session_at(
        &self,
        user_id: Uuid,
        email: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let mut claims = Claims::session(user_id, email);
        claims.exp = self.session_ttl.map(|ttl| expiry(now, ttl)).transpose()?;
        self.sign(&claims)
    }

    pub fn issue_reset(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        self.issue_reset_at(user_id, email, OffsetDateTime::now_utc())
    }

    pub fn issue_reset_at(
        &self,
        user_id: Uuid,
        email: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let claims = Claims {
            id: user_id,
            email: email.to_string(),
            exp: Some(expiry(now, self.reset_ttl)?),
            jti: Some(Uuid::new_v4()),
        };
        self.sign(&claims)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Checks the signature, then the `exp` claim (if any) against `now`
    /// with no leeway.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                debug!(error = %e, "jwt rejected");
                TokenError::Invalid
            })?
            .claims;

        if let Some(exp) = claims.exp {
            if now.unix_timestamp() >= exp {
                debug!(user_id = %claims.id, "jwt expired");
                return Err(TokenError::Expired);
            }
        }

        debug!(user_id = %claims.id, "jwt verified");
        Ok(claims)
    }
}

fn ttl_from_minutes(minutes: i64) -> anyhow::Result<TimeDuration> {
    ensure!(minutes > 0, "token ttl must be positive, got {minutes} minutes");
    minutes
        .checked_mul(60)
        .map(TimeDuration::seconds)
        .ok_or_else(|| anyhow!("token ttl of {minutes} minutes is out of range"))
}

fn expiry(now: OffsetDateTime, ttl: TimeDuration) -> anyhow::Result<i64> {
    now.checked_add(ttl)
        .map(OffsetDateTime::unix_timestamp)
        .ok_or_else(|| anyhow!("token expiry past the representable date range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tokens(secret: &str, session_ttl_minutes: Option<i64>) -> TokenService {
        TokenService::from_config(&JwtConfig {
            secret: secret.into(),
            session_ttl_minutes,
            reset_ttl_minutes: 60,
        })
        .unwrap()
    }

    #[test]
    fn session_token_roundtrip_without_expiry() {
        let tokens = make_tokens("dev-secret", None);
        let user_id = Uuid::new_v4();
        let token = tokens.issue_session(user_id, "a@x.com").expect("sign session");
        let claims = tokens.verify(&token).expect("verify session");
        assert_eq!(claims.id, user_id);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp, None);
        assert_eq!(claims.jti, None);
    }

    #[test]
    fn session_token_without_expiry_verifies_far_in_the_future() {
        let tokens = make_tokens("dev-secret", None);
        let t0 = OffsetDateTime::now_utc();
        let token = tokens.issue_session_at(Uuid::new_v4(), "a@x.com", t0).unwrap();
        assert!(tokens.verify_at(&token, t0 + TimeDuration::days(3650)).is_ok());
    }

    #[test]
    fn session_ttl_adds_expiry_when_configured() {
        let tokens = make_tokens("dev-secret", Some(15));
        let t0 = OffsetDateTime::now_utc();
        let token = tokens.issue_session_at(Uuid::new_v4(), "a@x.com", t0).unwrap();
        assert!(tokens.verify_at(&token, t0 + TimeDuration::minutes(14)).is_ok());
        assert_eq!(
            tokens.verify_at(&token, t0 + TimeDuration::minutes(16)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn reset_token_valid_for_one_hour() {
        let tokens = make_tokens("dev-secret", None);
        let t0 = OffsetDateTime::now_utc();
        let user_id = Uuid::new_v4();
        let token = tokens.issue_reset_at(user_id, "a@x.com", t0).unwrap();

        let claims = tokens
            .verify_at(&token, t0 + TimeDuration::minutes(59))
            .expect("still valid at T+59min");
        assert_eq!(claims.id, user_id);
        assert!(claims.jti.is_some());

        assert_eq!(
            tokens.verify_at(&token, t0 + TimeDuration::minutes(61)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn reset_tokens_get_distinct_ids() {
        let tokens = make_tokens("dev-secret", None);
        let user_id = Uuid::new_v4();
        let a = tokens.verify(&tokens.issue_reset(user_id, "a@x.com").unwrap()).unwrap();
        let b = tokens.verify(&tokens.issue_reset(user_id, "a@x.com").unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn verify_rejects_other_secret() {
        let good = make_tokens("secret-a", None);
        let bad = make_tokens("secret-b", None);
        let token = good.issue_session(Uuid::new_v4(), "a@x.com").unwrap();
        assert_eq!(bad.verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn verify_rejects_garbage() {
        let tokens = make_tokens("dev-secret", None);
        assert_eq!(tokens.verify("not.a.jwt"), Err(TokenError::Invalid));
        assert_eq!(tokens.verify(""), Err(TokenError::Invalid));
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        for minutes in [0, -1, i64::MIN] {
            let cfg = JwtConfig {
                secret: "dev-secret".into(),
                session_ttl_minutes: None,
                reset_ttl_minutes: minutes,
            };
            assert!(TokenService::from_config(&cfg).is_err(), "{minutes}");
        }
    }

    #[test]
    fn overflowing_ttl_is_rejected() {
        let cfg = JwtConfig {
            secret: "dev-secret".into(),
            session_ttl_minutes: Some(i64::MAX),
            reset_ttl_minutes: 60,
        };
        assert!(TokenService::from_config(&cfg).is_err());
    }

    #[test]
    fn expiry_past_calendar_range_is_an_error() {
        // Converts to seconds fine but lands beyond year 9999.
        let tokens = TokenService::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            session_ttl_minutes: Some(1_000_000_000_000),
            reset_ttl_minutes: 1_000_000_000_000,
        })
        .unwrap();
        let user_id = Uuid::new_v4();
        assert!(tokens.issue_reset(user_id, "a@x.com").is_err());
        assert!(tokens.issue_session(user_id, "a@x.com").is_err());
    }
}
