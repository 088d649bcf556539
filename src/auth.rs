//! Authentication utilities: JWT validation and business context extraction
//!
//! Tokens are issued by the platform's auth service; this worker only
//! validates them and reads the business context out of the claims.

use anyhow::{anyhow, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Request;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (business ID)
    pub sub: String,
    /// Account email
    pub email: String,
    /// Account role (admin, owner, staff)
    pub role: String,
    /// Issued at (unix timestamp)
    pub iat: usize,
    /// Expiration (unix timestamp)
    pub exp: usize,
}

/// Authentication result from extract_auth
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub business_id: Uuid,
    pub role: String,
}

/// Generate a JWT access token (used by tests and ops tooling; production
/// tokens come from the auth service)
pub fn generate_token(business_id: Uuid, email: &str, role: &str, secret: &str) -> Result<String> {
    let now = chrono::Utc::now().timestamp() as usize;
    let exp = now + 8 * 60 * 60; // 8 hours

    let claims = Claims {
        sub: business_id.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        iat: now,
        exp,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a JWT token and return claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| anyhow!("Invalid token: {}", e))?;

    Ok(token_data.claims)
}

/// Extract the business context from a NATS request. Requests without a
/// valid JWT are rejected (UNAUTHORIZED).
pub fn extract_auth<T>(request: &Request<T>, jwt_secret: &str) -> Result<AuthInfo> {
    if let Some(ref token) = request.token {
        let claims = validate_token(token, jwt_secret)?;
        let business_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| anyhow!("Invalid business_id in token: {}", e))?;
        return Ok(AuthInfo {
            business_id,
            role: claims.role,
        });
    }

    Err(anyhow!("No authentication provided — JWT token is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Request;
    use chrono::Utc;

    const TEST_SECRET: &str = "test-secret-key-for-jwt-at-least-32-bytes-long";

    #[test]
    fn test_generate_and_validate_token() {
        let business_id = Uuid::new_v4();
        let token = generate_token(business_id, "test@example.com", "owner", TEST_SECRET).unwrap();

        let claims = validate_token(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.sub, business_id.to_string());
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.role, "owner");
    }

    #[test]
    fn test_validate_token_wrong_secret() {
        let business_id = Uuid::new_v4();
        let token = generate_token(business_id, "test@example.com", "owner", TEST_SECRET).unwrap();

        let result = validate_token(&token, "wrong-secret-also-at-least-32-bytes!!");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_token_malformed() {
        let result = validate_token("not.a.valid.token", TEST_SECRET);
        assert!(result.is_err());
    }

    fn make_request_with_token<T: Default>(token: Option<String>) -> Request<T> {
        Request {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            token,
            payload: T::default(),
        }
    }

    #[test]
    fn test_extract_auth_with_valid_token() {
        let business_id = Uuid::new_v4();
        let token = generate_token(business_id, "test@example.com", "admin", TEST_SECRET).unwrap();

        let request = make_request_with_token::<serde_json::Value>(Some(token));
        let auth = extract_auth(&request, TEST_SECRET).unwrap();

        assert_eq!(auth.business_id, business_id);
        assert_eq!(auth.role, "admin");
    }

    #[test]
    fn test_extract_auth_no_token_fails() {
        let request = make_request_with_token::<serde_json::Value>(None);
        let result = extract_auth(&request, TEST_SECRET);
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_auth_invalid_token_fails() {
        let request = make_request_with_token::<serde_json::Value>(Some("bad-token".to_string()));
        let result = extract_auth(&request, TEST_SECRET);
        assert!(result.is_err());
    }
}
