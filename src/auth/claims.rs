use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload. Session tokens carry only `id` and `email`; reset tokens add
/// `exp` and `jti`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>, // expires at (unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<Uuid>, // reset token id
}

impl Claims {
    pub fn session(id: Uuid, email: &str) -> Self {
        Self {
            id,
            email: email.to_string(),
            exp: None,
            jti: None,
        }
    }
}
