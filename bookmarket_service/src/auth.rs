use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::{Role, StatusResponse, User, UserId};
use crate::users_repository::{UserRepository, UserRepositoryError};

pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 86_400;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("No token provided.")]
    MissingToken,

    #[error("Invalid Token.")]
    InvalidToken,

    #[error("User Not Found")]
    UserNotFound,

    #[error("Access Denied")]
    AccessDenied,

    #[error("Failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Store failure {0}")]
    Store(#[from] UserRepositoryError),

    #[error("Service misconfigured: {0}")]
    Misconfigured(&'static str),
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::AccessDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Authentication failed {}", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(StatusResponse::failure(message))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TokenClaims {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub exp: u64,
}

/// Issues and verifies the bearer tokens handed out on register and login
pub trait TokenService: Send + Sync {
    fn issue(&self, user: &User) -> Result<String, AuthError>;
    fn verify(&self, token: &str) -> Result<TokenClaims, AuthError>;
}

/// HS512 signed JWTs
pub struct JwtTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: u64,
}

impl JwtTokenService {
    pub fn new(secret: &str, ttl_seconds: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, user: &User) -> Result<String, AuthError> {
        let claims = TokenClaims {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            exp: Utc::now().timestamp().max(0) as u64 + self.ttl_seconds,
        };
        encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)
            .map_err(AuthError::Signing)
    }

    fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        decode::<TokenClaims>(token, &self.decoding_key, &Validation::new(Algorithm::HS512))
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!("Rejected token: {}", err);
                AuthError::InvalidToken
            })
    }
}

/// Turns plain text passwords into stored credentials and checks them back
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, AuthError>;
    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError>;
}

/// Argon2id with a random salt per credential
#[derive(Default)]
pub struct Argon2CredentialHasher;

impl CredentialHasher for Argon2CredentialHasher {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::Hashing(err.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash).map_err(|err| AuthError::Hashing(err.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

/// The caller identified by the bearer token. Extracting it refreshes the
/// user's `lastSeen`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
}

impl AuthenticatedUser {
    pub fn id(&self) -> &UserId {
        &self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.details.role
    }

    pub fn is_admin(&self) -> bool {
        self.role() >= Role::Adm
    }

    /// True for the owner of a resource and for admins
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.user.id == owner_id || self.is_admin()
    }

    async fn authenticate(req: HttpRequest) -> Result<Self, AuthError> {
        let tokens = req
            .app_data::<Data<Arc<dyn TokenService>>>()
            .ok_or(AuthError::Misconfigured("token service"))?;
        let users = req
            .app_data::<Data<Arc<dyn UserRepository>>>()
            .ok_or(AuthError::Misconfigured("user repository"))?;

        let token = bearer_token(&req).ok_or(AuthError::MissingToken)?;
        let claims = tokens.verify(token)?;

        let mut user = users
            .get_user(&claims.id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        user.details.dates.last_seen = Utc::now();
        if let Err(err) = users.update_user(&user).await {
            tracing::warn!("Failed to update last seen of user {}: {}", user.id, err);
        }
        Ok(Self { user })
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { Self::authenticate(req).await.map_err(Into::into) })
    }
}

impl paperclip::v2::schema::Apiv2Schema for AuthenticatedUser {}
impl paperclip::actix::OperationModifier for AuthenticatedUser {}

/// Caller of an endpoint that is public but shows more to authenticated users.
/// Requests without a token are anonymous, a token that does not verify is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeAuthenticatedUser(pub Option<AuthenticatedUser>);

impl MaybeAuthenticatedUser {
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.0
            .as_ref()
            .is_some_and(|caller| caller.can_manage(owner_id))
    }
}

impl FromRequest for MaybeAuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            if bearer_token(&req).is_none() {
                return Ok(Self(None));
            }
            let caller = AuthenticatedUser::authenticate(req).await?;
            Ok(Self(Some(caller)))
        })
    }
}

impl paperclip::v2::schema::Apiv2Schema for MaybeAuthenticatedUser {}
impl paperclip::actix::OperationModifier for MaybeAuthenticatedUser {}
