//! Proof Key for Code Exchange (RFC 7636).

use crate::error::{OAuthError, OAuthResult};
use crate::oauth2::scope::UnknownValue;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    S256,
    Plain,
}

impl ChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeMethod::S256 => "S256",
            ChallengeMethod::Plain => "plain",
        }
    }

    /// An absent method means `plain` (RFC 7636 §4.3).
    pub fn parse_optional(method: Option<&str>) -> OAuthResult<Self> {
        match method {
            None => Ok(ChallengeMethod::Plain),
            Some(m) => m.parse().map_err(|_| {
                OAuthError::InvalidRequest(format!(
                    "Unsupported code_challenge_method '{m}'; use S256 or plain"
                ))
            }),
        }
    }
}

impl fmt::Display for ChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeMethod {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(ChallengeMethod::S256),
            "plain" => Ok(ChallengeMethod::Plain),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// 43 to 128 characters from `[A-Za-z0-9-._~]`. Applies to verifiers and
/// to challenges.
pub fn is_valid_pkce_string(value: &str) -> bool {
    (43..=128).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Constant-time comparison of the derived challenge against the stored one.
pub fn verify(method: ChallengeMethod, challenge: &str, verifier: &str) -> bool {
    let derived = match method {
        ChallengeMethod::S256 => s256_challenge(verifier),
        ChallengeMethod::Plain => verifier.to_string(),
    };
    derived.as_bytes().ct_eq(challenge.as_bytes()).into()
}

/// Check the verifier presented at the token endpoint against what was
/// recorded with the authorization code.
pub fn check_redemption(
    challenge: Option<&str>,
    method: Option<&str>,
    verifier: Option<&str>,
) -> OAuthResult<()> {
    let Some(challenge) = challenge else {
        return match verifier {
            Some(_) => Err(OAuthError::InvalidGrant(
                "code_verifier supplied but the authorization request carried no code_challenge"
                    .into(),
            )),
            None => Ok(()),
        };
    };

    let verifier = verifier
        .ok_or_else(|| OAuthError::InvalidRequest("code_verifier is required".into()))?;
    let method = ChallengeMethod::parse_optional(method)?;
    // A malformed verifier can never match a stored challenge.
    if !is_valid_pkce_string(verifier) || !verify(method, challenge, verifier) {
        return Err(OAuthError::InvalidGrant("PKCE verification failed".into()));
    }
    Ok(())
}
