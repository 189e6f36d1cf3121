//! Token verification and workspace access checks for the WebSocket
//! handshake.
//!
//! Both concerns sit behind traits so deployments can swap in their own
//! backends; the defaults are HS256 JWT verification against a shared
//! secret and an allow-everyone workspace policy.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

use tack_core::{UserId, WorkspaceId};

/// Why a presented token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token failed validation: bad signature, expired, or malformed.
    #[error("Invalid token")]
    InvalidToken,
}

/// Why workspace access was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The workspace does not exist.
    #[error("Workspace not found")]
    NotFound,
    /// The workspace exists but this user may not attach to it.
    #[error("Access denied")]
    Denied,
}

/// Verifies bearer tokens presented during the handshake.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a token to the user it authenticates.
    async fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Decides whether a user may attach to a workspace.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Check access for `user` (`None` for anonymous connections).
    async fn check_access(
        &self,
        user: Option<&UserId>,
        workspace: &WorkspaceId,
    ) -> Result<(), AccessError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// HS256 JWT verification against a shared secret.
///
/// Tokens must carry a non-empty `sub` claim (the user ID) and an `exp`
/// claim; expired tokens are rejected.
pub struct JwtTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    /// Build a verifier from the shared signing secret.
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(UserId::from_string(data.claims.sub))
    }
}

/// Policy that admits every user to every workspace.
///
/// `NotFound` and `Denied` never occur under this policy; it stands in
/// until a deployment wires a real workspace lookup behind [`AccessPolicy`].
pub struct AllowAllPolicy;

#[async_trait]
impl AccessPolicy for AllowAllPolicy {
    async fn check_access(
        &self,
        _user: Option<&UserId>,
        _workspace: &WorkspaceId,
    ) -> Result<(), AccessError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use jsonwebtoken::{EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &str = "test-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
    }

    fn mint(sub: &str, exp_offset_secs: i64, secret: &str) -> String {
        let claims = TestClaims {
            sub: sub.to_owned(),
            exp: chrono::Utc::now().timestamp() + exp_offset_secs,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_resolves_subject() {
        let verifier = JwtTokenVerifier::new(SECRET);
        let token = mint("alice", 3600, SECRET);
        let user = verifier.verify(&token).await.unwrap();
        assert_eq!(user, UserId::from("alice"));
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let verifier = JwtTokenVerifier::new(SECRET);
        let token = mint("alice", 3600, "some-other-secret");
        assert_matches!(verifier.verify(&token).await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let verifier = JwtTokenVerifier::new(SECRET);
        let token = mint("alice", -3600, SECRET);
        assert_matches!(verifier.verify(&token).await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn token_without_subject_is_rejected() {
        #[derive(Serialize)]
        struct NoSub {
            exp: i64,
        }
        let token = jsonwebtoken::encode(
            &Header::default(),
            &NoSub {
                exp: chrono::Utc::now().timestamp() + 3600,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let verifier = JwtTokenVerifier::new(SECRET);
        assert_matches!(verifier.verify(&token).await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn empty_subject_is_rejected() {
        let verifier = JwtTokenVerifier::new(SECRET);
        let token = mint("", 3600, SECRET);
        assert_matches!(verifier.verify(&token).await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let verifier = JwtTokenVerifier::new(SECRET);
        assert_matches!(
            verifier.verify("definitely.not.a-jwt").await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn allow_all_policy_admits_anyone() {
        let policy = AllowAllPolicy;
        let user = UserId::from("alice");
        let workspace = WorkspaceId::from("ws-1");
        assert!(policy.check_access(Some(&user), &workspace).await.is_ok());
        assert!(policy.check_access(None, &workspace).await.is_ok());
    }

    #[test]
    fn error_messages_match_close_reasons() {
        assert_eq!(AuthError::InvalidToken.to_string(), "Invalid token");
        assert_eq!(AccessError::NotFound.to_string(), "Workspace not found");
        assert_eq!(AccessError::Denied.to_string(), "Access denied");
    }
}
