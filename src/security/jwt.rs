use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::config::AuthConfig;
use crate::core::shared::enums::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: i32,
    pub username: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry: Duration,
}

impl JwtManager {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            expiry: Duration::hours(expiry_hours),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        if config.jwt_secret.is_empty() {
            warn!("JWT secret not configured, generating an ephemeral one; tokens will not survive a restart");
            let secret = crate::security::password::generate_secure_password(64);
            return Self::new(&secret, config.token_expiry_hours);
        }
        Self::new(&config.jwt_secret, config.token_expiry_hours)
    }

    pub fn issue(
        &self,
        user_id: i32,
        username: &str,
        role: Role,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            user_id,
            username: username.to_string(),
            role,
            exp: (now + self.expiry).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_validate() {
        let jwt = JwtManager::new("test-secret", 24);
        let token = jwt.issue(7, "dev1", Role::Developer).unwrap();
        let claims = jwt.validate(&token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "dev1");
        assert_eq!(claims.role, Role::Developer);
    }

    #[test]
    fn test_expired_token_rejected() {
        let jwt = JwtManager::new("test-secret", -2);
        let token = jwt.issue(1, "admin", Role::Admin).unwrap();
        assert!(jwt.validate(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtManager::new("one", 1).issue(1, "a", Role::Client).unwrap();
        assert!(JwtManager::new("two", 1).validate(&token).is_err());
    }
}
