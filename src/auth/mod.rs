use axum::http::HeaderMap;
use async_trait::async_trait;
use std::collections::HashSet;


/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or(TokenError::InvalidFormat)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    Missing,
    /// Not "Bearer <token>"
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "No token provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Identity behind an accepted token
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub subject: String,
}

/// Verification failures
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    Token(TokenError),
    InvalidToken,
    /// Verifier itself failed (network, provider outage)
    Unavailable(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Token(e) => write!(f, "Unauthorized: {}", e),
            AuthError::InvalidToken => write!(f, "Unauthorized: Invalid token"),
            AuthError::Unavailable(msg) => write!(f, "Token verifier unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        AuthError::Token(e)
    }
}

/// External identity-token verifier.
///
/// Token format and verification logic belong to the implementation; callers
/// only learn "authorized as X" or "rejected".
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Accepts a fixed set of tokens from configuration
pub struct StaticTokenVerifier {
    tokens: HashSet<String>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        if self.tokens.contains(token) {
            Ok(Principal {
                subject: "static".to_string(),
            })
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Authorize a request: extract the bearer token and ask the verifier.
///
/// With `enabled == false` every request is authorized.
pub async fn authorize(
    headers: &HeaderMap,
    verifier: &dyn TokenVerifier,
    enabled: bool,
) -> Result<Option<Principal>, AuthError> {
    if !enabled {
        return Ok(None);
    }
    let token = extract_bearer_token(headers)?;
    verifier.verify(&token).await.map(Some)
}
