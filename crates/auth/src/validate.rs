use std::collections::HashMap;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Claims inspected during validation. Everything is optional so a missing
/// claim fails its check instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InspectedClaims {
    /// Expiry, seconds since epoch.
    pub exp: Option<i64>,
    /// Issued-at, seconds since epoch.
    pub iat: Option<i64>,
    /// Audience.
    pub aud: Option<String>,
    /// Issuer.
    pub iss: Option<String>,
    /// Directory tenant id.
    pub tid: Option<String>,
    /// Application id, when present.
    pub appid: Option<String>,
}

/// Outcome of inspecting a bearer token's claims.
#[derive(Debug, Clone)]
pub struct TokenValidation {
    /// Whether every check passed.
    pub valid: bool,
    /// The first failing check, when invalid.
    pub reason: Option<String>,
    /// Per-check outcomes.
    pub checks: HashMap<String, bool>,
    /// The decoded claims.
    pub claims: InspectedClaims,
}

/// Inspect a bearer token's claims against the configured expectations.
///
/// This is claim inspection only: signature verification is delegated to the
/// platform that issued the token, so the decoder runs with signature
/// validation disabled. Checks: `exp` in the future, `iat` within the max
/// age, `aud` equal to the configured audience, `iss` starting with the
/// expected prefix, and `tid` equal to the configured tenant.
pub fn validate_claims(token: &str, config: &AuthConfig) -> Result<TokenValidation, AuthError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.algorithms = vec![Algorithm::RS256, Algorithm::HS256];

    let data = decode::<InspectedClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AuthError::InvalidToken(format!("token decode failed: {e}")))?;
    let claims = data.claims;

    let now = chrono::Utc::now().timestamp();
    let mut checks = HashMap::new();

    checks.insert(
        "not_expired".to_owned(),
        claims.exp.is_some_and(|exp| exp > now),
    );
    checks.insert(
        "issued_recently".to_owned(),
        claims
            .iat
            .is_some_and(|iat| iat <= now && now - iat <= config.max_token_age_seconds),
    );
    checks.insert(
        "audience_matches".to_owned(),
        claims.aud.as_deref() == Some(config.audience.as_str()),
    );
    checks.insert(
        "issuer_trusted".to_owned(),
        claims
            .iss
            .as_deref()
            .is_some_and(|iss| iss.starts_with(&config.issuer_prefix)),
    );
    checks.insert(
        "tenant_matches".to_owned(),
        claims.tid.as_deref() == Some(config.tenant_id.as_str()),
    );

    let reason = checks
        .iter()
        .find(|(_, passed)| !**passed)
        .map(|(name, _)| name.clone());

    Ok(TokenValidation {
        valid: reason.is_none(),
        reason,
        checks,
        claims,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        exp: i64,
        iat: i64,
        aud: String,
        iss: String,
        tid: String,
    }

    fn config() -> AuthConfig {
        AuthConfig::new("tenant-1", "client-1", "secret")
    }

    fn token(claims: &TestClaims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"test"),
        )
        .unwrap()
    }

    fn good_claims() -> TestClaims {
        let now = chrono::Utc::now().timestamp();
        TestClaims {
            exp: now + 3600,
            iat: now - 60,
            aud: "https://graph.microsoft.com".to_owned(),
            iss: "https://login.microsoftonline.com/tenant-1/v2.0".to_owned(),
            tid: "tenant-1".to_owned(),
        }
    }

    #[test]
    fn valid_token_passes_every_check() {
        let result = validate_claims(&token(&good_claims()), &config()).unwrap();
        assert!(result.valid, "failed: {:?}", result.reason);
        assert!(result.checks.values().all(|&v| v));
        assert_eq!(result.claims.tid.as_deref(), Some("tenant-1"));
    }

    #[test]
    fn expired_token_fails() {
        let mut claims = good_claims();
        claims.exp = chrono::Utc::now().timestamp() - 10;
        let result = validate_claims(&token(&claims), &config()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.checks.get("not_expired"), Some(&false));
    }

    #[test]
    fn stale_iat_fails() {
        let mut claims = good_claims();
        claims.iat = chrono::Utc::now().timestamp() - 48 * 3600;
        let result = validate_claims(&token(&claims), &config()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.checks.get("issued_recently"), Some(&false));
    }

    #[test]
    fn wrong_audience_fails() {
        let mut claims = good_claims();
        claims.aud = "https://evil.example.com".to_owned();
        let result = validate_claims(&token(&claims), &config()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.checks.get("audience_matches"), Some(&false));
    }

    #[test]
    fn untrusted_issuer_fails() {
        let mut claims = good_claims();
        claims.iss = "https://issuer.example.com/tenant-1".to_owned();
        let result = validate_claims(&token(&claims), &config()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.checks.get("issuer_trusted"), Some(&false));
    }

    #[test]
    fn wrong_tenant_fails() {
        let mut claims = good_claims();
        claims.tid = "other-tenant".to_owned();
        let result = validate_claims(&token(&claims), &config()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.checks.get("tenant_matches"), Some(&false));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            validate_claims("not-a-jwt", &config()),
            Err(AuthError::InvalidToken(_))
        ));
    }
}
