//! Unverified decoding of session token claims.
//!
//! The backend checks the signature on every request; the claims decoded here
//! only drive display and navigation hints (admin badge, user label).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;

use crate::types::UserRole;

/// Fields of a token payload.
///
/// Known claims of an unexpected shape read as absent rather than failing
/// the whole payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Account identifier
    #[serde(default, deserialize_with = "string_or_none")]
    pub sub: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub role: Option<String>,
    /// Expiry as a unix timestamp (NumericDate, fractions truncated)
    #[serde(default, deserialize_with = "numeric_date")]
    pub exp: Option<i64>,
    /// Issue time as a unix timestamp
    #[serde(default, deserialize_with = "numeric_date")]
    pub iat: Option<i64>,
    /// Any other claims, kept verbatim
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(Some(value)),
        _ => Ok(None),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| value.as_f64().map(|seconds| seconds.floor() as i64)))
}

impl Claims {
    /// Whether `exp` lies at or before `now`. No `exp` means not expired.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.exp.is_some_and(|exp| now.unix_timestamp() >= exp)
    }

    /// The `role` claim, if it names a known role (case-insensitive).
    pub fn user_role(&self) -> Option<UserRole> {
        self.role.as_deref()?.parse().ok()
    }

    pub fn is_admin(&self) -> bool {
        self.user_role() == Some(UserRole::Admin)
    }

    /// Short form of the subject for display.
    pub fn label(&self) -> Option<String> {
        let sub = self.sub.as_deref().filter(|sub| !sub.is_empty())?;
        Some(sub.chars().take(8).collect())
    }
}

/// Decodes the payload of `token` without checking its signature.
///
/// Returns `None` for a missing token or anything that is not a three-part
/// token with a JSON object payload.
pub fn decode(token: Option<&str>) -> Option<Claims> {
    let token = token?.trim();
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// True iff the claims carry an expiry that has passed.
pub fn is_expired(claims: Option<&Claims>) -> bool {
    claims.is_some_and(|claims| claims.is_expired_at(OffsetDateTime::now_utc()))
}

/// True iff the claims carry the admin role.
pub fn has_admin_role(claims: Option<&Claims>) -> bool {
    claims.is_some_and(Claims::is_admin)
}

/// Label for the signed-in user, or `fallback` when nothing is decodable.
pub fn display_label(claims: Option<&Claims>, fallback: &str) -> String {
    claims
        .and_then(Claims::label)
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn decodes_subject_role_and_expiry() {
        let token = token_with(&serde_json::json!({
            "sub": "3f2a9c1e-5b7d-4e8f-9a0b-1c2d3e4f5a6b",
            "role": "ADMIN",
            "exp": 4_102_444_800_i64,
            "iss": "auth-svc"
        }));
        let claims = decode(Some(&token)).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("3f2a9c1e-5b7d-4e8f-9a0b-1c2d3e4f5a6b"));
        assert_eq!(claims.exp, Some(4_102_444_800));
        assert_eq!(claims.extra.get("iss"), Some(&serde_json::json!("auth-svc")));
        assert_eq!(claims.label().as_deref(), Some("3f2a9c1e"));
        assert!(has_admin_role(Some(&claims)));
        assert!(!is_expired(Some(&claims)));
    }

    #[test]
    fn absent_or_garbage_tokens_decode_to_none() {
        assert_eq!(decode(None), None);
        assert_eq!(decode(Some("")), None);
        assert_eq!(decode(Some("not-a-token")), None);
        assert_eq!(decode(Some("a.!!!.c")), None);
        assert_eq!(decode(Some("a.b.c.d")), None);
        let array_payload = format!("x.{}.y", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert_eq!(decode(Some(&array_payload)), None);
    }

    #[test]
    fn admin_role_is_case_insensitive() {
        let mut claims = decode(Some(&token_with(&serde_json::json!({
            "sub": "u1",
            "role": "admin"
        }))))
        .unwrap();
        assert!(claims.is_admin());
        claims.role = Some("CLIENT".to_string());
        assert!(!claims.is_admin());
        assert_eq!(claims.user_role(), Some(UserRole::Client));
        claims.role = Some("auditor".to_string());
        assert_eq!(claims.user_role(), None);
        claims.role = None;
        assert!(!claims.is_admin());
        assert!(!has_admin_role(None));
    }

    #[test]
    fn expiry_is_checked_against_now() {
        let claims = decode(Some(&token_with(&serde_json::json!({
            "sub": "u1",
            "exp": 1_000
        }))))
        .unwrap();
        assert!(is_expired(Some(&claims)));
        assert!(!claims.is_expired_at(OffsetDateTime::from_unix_timestamp(999).unwrap()));
        assert!(claims.is_expired_at(OffsetDateTime::from_unix_timestamp(1_000).unwrap()));

        let no_exp = Claims {
            exp: None,
            ..claims
        };
        assert!(!is_expired(Some(&no_exp)));
        assert!(!is_expired(None));
    }

    #[test]
    fn label_falls_back_without_claims() {
        assert_eq!(display_label(None, "User"), "User");
    }

    #[test]
    fn fractional_expiry_is_accepted() {
        let claims = decode(Some(&token_with(&serde_json::json!({
            "sub": "u1",
            "role": "ADMIN",
            "exp": 4_102_444_800.5
        }))))
        .unwrap();
        assert_eq!(claims.exp, Some(4_102_444_800));
        assert!(claims.is_admin());
        assert!(!is_expired(Some(&claims)));
    }

    #[test]
    fn payload_without_subject_still_decodes() {
        let claims = decode(Some(&token_with(&serde_json::json!({
            "role": "ADMIN",
            "exp": 4_102_444_800_i64
        }))))
        .unwrap();
        assert_eq!(claims.sub, None);
        assert!(has_admin_role(Some(&claims)));
        assert_eq!(display_label(Some(&claims), "Admin"), "Admin");
    }

    #[test]
    fn oddly_typed_claims_read_as_absent() {
        let claims = decode(Some(&token_with(&serde_json::json!({
            "sub": 42,
            "role": "ADMIN",
            "iat": "yesterday"
        }))))
        .unwrap();
        assert_eq!(claims.sub, None);
        assert_eq!(claims.iat, None);
        assert!(claims.is_admin());

        let claims = decode(Some(&token_with(&serde_json::json!({
            "sub": "u1",
            "role": ["ADMIN"],
            "exp": null
        }))))
        .unwrap();
        assert_eq!(claims.role, None);
        assert_eq!(claims.exp, None);
        assert!(!claims.is_admin());
    }
}
