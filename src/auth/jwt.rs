use anyhow::Result;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

/// Verifies access tokens minted by the account service.
#[derive(Clone)]
pub struct JwtService {
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            &config.jwt_audience,
        ))
    }

    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    #[serde(default)]
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sign(secret: &str, audience: &str, expires_in: Duration) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "alice".into(),
            role: "user".into(),
            iss: "docpilot".into(),
            aud: audience.into(),
            iat: now.timestamp() as usize,
            exp: (now + expires_in).timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_tokens_for_the_configured_audience() {
        let service = JwtService::new("secret", "docpilot", "docpilot-clients");
        let token = sign("secret", "docpilot-clients", Duration::minutes(5));
        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn rejects_foreign_audience_secret_and_expired_tokens() {
        let service = JwtService::new("secret", "docpilot", "docpilot-clients");
        assert!(service
            .verify_token(&sign("secret", "other", Duration::minutes(5)))
            .is_err());
        assert!(service
            .verify_token(&sign("wrong", "docpilot-clients", Duration::minutes(5)))
            .is_err());
        assert!(service
            .verify_token(&sign("secret", "docpilot-clients", Duration::minutes(-10)))
            .is_err());
    }
}
