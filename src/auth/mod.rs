/*!
 * # Authentication and Authorization Module
 *
 * Validates bearer tokens issued by the campus identity provider and exposes
 * the caller to handlers as an [`AuthUser`] request extension. Authorization
 * is role-based: the token carries a single `role` claim (student, staff or
 * admin) and the permission set is derived from it server-side, so tokens
 * never embed permission lists.
 */

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ErrorResponse;

mod permissions;

pub use permissions::*;

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,          // Subject (user ID)
    pub name: Option<String>, // User's display name
    pub email: Option<String>, // User's email
    pub role: String,         // Campus role: student, staff or admin
    pub jti: String,          // JWT ID (unique identifier for this token)
    pub iat: i64,             // Issued at time
    pub exp: i64,             // Expiration time
    pub nbf: i64,             // Not valid before time
    pub iss: String,          // Issuer
    pub aud: String,          // Audience
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Build an authenticated user from validated claims
    pub fn from_claims(claims: &Claims) -> Result<Self, AuthError> {
        let id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        Ok(Self {
            id,
            name: claims.name.clone(),
            email: claims.email.clone(),
            role: claims.role.clone(),
            permissions: role_permissions(&claims.role)
                .iter()
                .map(|p| p.to_string())
                .collect(),
        })
    }

    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Check if the user has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Check if the user is an admin
    pub fn is_admin(&self) -> bool {
        self.has_role(roles::ADMIN)
    }

    /// Check if the user works behind the counter. Back-office users see
    /// every order and invoice; students only see their own.
    pub fn is_back_office(&self) -> bool {
        self.has_role(roles::STAFF) || self.has_role(roles::ADMIN)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_issuer: String,
        jwt_audience: String,
        token_expiration: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            token_expiration,
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_issuer: cfg.auth_issuer.clone(),
            jwt_audience: cfg.auth_audience.clone(),
            token_expiration: Duration::from_secs(cfg.jwt_expiration as u64),
        }
    }
}

/// Authentication service that handles token issuance and validation
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Generate a signed JWT for a user
    pub fn issue_token(
        &self,
        user_id: Uuid,
        name: &str,
        email: Option<&str>,
        role: &str,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.token_expiration)
                .map_err(|_| AuthError::TokenCreation("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            name: Some(name.to_string()),
            email: email.map(|e| e.to_string()),
            role: role.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.set_audience(&[&self.config.jwt_audience]);
        validation.validate_nbf = true;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        Ok(claims)
    }

    /// Validate a token and resolve the caller it belongs to
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        AuthUser::from_claims(&claims)
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAuth | Self::InvalidToken | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::TokenCreation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.to_string(),
            details: None,
            request_id: crate::request_id::current_request_id()
                .map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        });

        (status, body).into_response()
    }
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let headers = request.headers().clone();

    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service not available",
            )
                .into_response();
        }
    };

    match extract_auth_from_headers(&headers, &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extract authentication info from request headers
fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_value) = auth_header.to_str() {
            if auth_value.starts_with("Bearer ") {
                let token = auth_value.trim_start_matches("Bearer ").trim();
                return auth_service.authenticate(token);
            }
        }
    }

    Err(AuthError::MissingAuth)
}

/// Permission middleware to check if a user has the required permission.
/// Runs after `auth_middleware`, which populates the `AuthUser` extension.
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => return Err(AuthError::MissingAuth),
    };

    if !user.has_permission(&required_permission) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef".to_string(),
            "cafeteria-api".to_string(),
            "cafeteria-clients".to_string(),
            Duration::from_secs(3600),
        ))
    }

    #[test]
    fn issued_tokens_round_trip() {
        let service = test_service();
        let user_id = Uuid::new_v4();

        let token = service
            .issue_token(user_id, "Dana Lee", Some("dana@campus.edu"), roles::STAFF)
            .unwrap();
        let user = service.authenticate(&token).unwrap();

        assert_eq!(user.id, user_id);
        assert_eq!(user.name.as_deref(), Some("Dana Lee"));
        assert_eq!(user.email.as_deref(), Some("dana@campus.edu"));
        assert_eq!(user.role, roles::STAFF);
        assert!(user.has_permission(consts::ORDERS_MANAGE));
        assert!(!user.has_permission(consts::MENU_DELETE));
    }

    #[test]
    fn tokens_signed_with_other_secret_are_rejected() {
        let service = test_service();
        let other = AuthService::new(AuthConfig::new(
            "fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210".to_string(),
            "cafeteria-api".to_string(),
            "cafeteria-clients".to_string(),
            Duration::from_secs(3600),
        ));

        let token = other
            .issue_token(Uuid::new_v4(), "Mallory", None, roles::ADMIN)
            .unwrap();

        assert!(matches!(
            service.validate_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let service = test_service();
        let now = Utc::now();

        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            name: None,
            email: None,
            role: roles::STUDENT.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: (now - ChronoDuration::hours(2)).timestamp(),
            exp: (now - ChronoDuration::hours(1)).timestamp(),
            nbf: (now - ChronoDuration::hours(2)).timestamp(),
            iss: "cafeteria-api".to_string(),
            aud: "cafeteria-clients".to_string(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(service.config.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            service.validate_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let service = test_service();
        let other = AuthService::new(AuthConfig::new(
            service.config.jwt_secret.clone(),
            "cafeteria-api".to_string(),
            "some-other-app".to_string(),
            Duration::from_secs(3600),
        ));

        let token = other
            .issue_token(Uuid::new_v4(), "Jo", None, roles::STUDENT)
            .unwrap();

        assert!(matches!(
            service.validate_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn malformed_subject_is_rejected() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            name: None,
            email: None,
            role: roles::STUDENT.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: 0,
            exp: 0,
            nbf: 0,
            iss: String::new(),
            aud: String::new(),
        };

        assert!(matches!(
            AuthUser::from_claims(&claims),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn unknown_role_has_no_permissions() {
        let service = test_service();
        let token = service
            .issue_token(Uuid::new_v4(), "Ghost", None, "janitor")
            .unwrap();

        let user = service.authenticate(&token).unwrap();
        assert!(user.permissions.is_empty());
        assert!(!user.has_permission(consts::ORDERS_READ));
    }
}
