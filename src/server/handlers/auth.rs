use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AppError;
use crate::users::UserRole;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl AccessTokenClaims {
    pub fn parsed_role(&self) -> Option<UserRole> {
        UserRole::parse(&self.role)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.parsed_role(), Some(UserRole::Admin))
    }
}

fn jwt_secret() -> String {
    std::env::var("GL_JWT_SECRET")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "giglance-dev-secret".to_string())
}

pub fn jwt_ttl_secs() -> u64 {
    std::env::var("GL_JWT_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(86400)
}

fn sign_parts(signing_input: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(jwt_secret().as_bytes())
        .map_err(|_| AppError::Config("invalid jwt secret".into()))?;
    mac.update(signing_input.as_bytes());
    Ok(B64.encode(mac.finalize().into_bytes()))
}

// HS256，紧凑 JWS 格式
pub fn issue_access_token(claims: &AccessTokenClaims) -> Result<String, AppError> {
    let header = B64.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = B64.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{}.{}", header, payload);
    let signature = sign_parts(&signing_input)?;
    Ok(format!("{}.{}", signing_input, signature))
}

pub fn decode_access_token(token: &str) -> Result<AccessTokenClaims, AppError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AppError::Unauthorized("malformed token".into()));
    };

    let expected = sign_parts(&format!("{}.{}", header, payload))?;
    // 定长 base64 比较；长度不同直接失败
    if expected.len() != signature.len()
        || !constant_time_eq(expected.as_bytes(), signature.as_bytes())
    {
        return Err(AppError::Unauthorized("invalid token signature".into()));
    }

    let raw = B64
        .decode(payload)
        .map_err(|_| AppError::Unauthorized("malformed token".into()))?;
    let claims: AccessTokenClaims =
        serde_json::from_slice(&raw).map_err(|_| AppError::Unauthorized("malformed token".into()))?;

    if claims.exp < chrono::Utc::now().timestamp() {
        return Err(AppError::Unauthorized("token expired".into()));
    }
    Ok(claims)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

pub fn ensure_access_token(headers: &HeaderMap) -> Result<AccessTokenClaims, AppError> {
    let Some(token) = bearer_token(headers) else {
        return Err(AppError::Unauthorized("missing bearer token".into()));
    };
    decode_access_token(&token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn claims(exp_offset: i64) -> AccessTokenClaims {
        AccessTokenClaims {
            sub: "u1".into(),
            email: "u1@example.com".into(),
            role: "client".into(),
            exp: Utc::now().timestamp() + exp_offset,
            iat: Some(Utc::now().timestamp()),
        }
    }

    #[test]
    fn token_roundtrip() {
        let token = issue_access_token(&claims(3600)).unwrap();
        let decoded = decode_access_token(&token).unwrap();
        assert_eq!(decoded.sub, "u1");
        assert_eq!(decoded.parsed_role(), Some(UserRole::Client));
        assert!(!decoded.is_admin());
    }

    #[test]
    fn expired_token_rejected() {
        let token = issue_access_token(&claims(-10)).unwrap();
        assert!(matches!(
            decode_access_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn tampered_token_rejected() {
        let token = issue_access_token(&claims(3600)).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_payload = B64.encode(
            serde_json::to_vec(&AccessTokenClaims {
                role: "admin".into(),
                ..claims(3600)
            })
            .unwrap(),
        );
        parts[1] = &forged_payload;
        let forged = parts.join(".");
        assert!(decode_access_token(&forged).is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(decode_access_token("not-a-token").is_err());
        assert!(decode_access_token("a.b").is_err());
        assert!(decode_access_token("a.b.c.d").is_err());
    }
}
