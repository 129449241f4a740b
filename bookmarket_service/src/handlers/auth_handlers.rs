use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use chrono::Utc;
use paperclip::actix::{api_v2_operation, web};

use crate::api::{LoginRequest, RegisterRequest, TokenResponse, User, UserDetails, UserView};
use crate::auth::{AuthenticatedUser, CredentialHasher, TokenService};
use crate::handlers::{failure, internal_error, user_store_failure};
use crate::id_generator::IdGenerator;
use crate::users_repository::UserRepository;
use crate::validation::{validate_email, validate_password};

fn token_response(status: StatusCode, tokens: &Arc<dyn TokenService>, user: &User) -> HttpResponse {
    match tokens.issue(user) {
        Ok(token) => HttpResponse::build(status).json(TokenResponse { auth: true, token }),
        Err(err) => internal_error("Token issue", err),
    }
}

#[api_v2_operation]
/// Creates an account with the user role and returns a token for it
pub async fn register(
    users: Data<Arc<dyn UserRepository>>,
    hasher: Data<Arc<dyn CredentialHasher>>,
    tokens: Data<Arc<dyn TokenService>>,
    ids: Data<Arc<IdGenerator>>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, Error> {
    let RegisterRequest {
        name,
        email,
        password,
    } = request.into_inner();
    let (Some(name), Some(email), Some(password)) = (name, email, password) else {
        return Ok(failure(
            StatusCode::BAD_REQUEST,
            "name, email and password are required",
        ));
    };
    if let Err(err) = validate_password(&password).and_then(|_| validate_email(&email)) {
        return Ok(failure(StatusCode::BAD_REQUEST, err.to_string()));
    }

    let password = match hasher.hash(&password) {
        Ok(hash) => hash,
        Err(err) => return Ok(internal_error("Register", err)),
    };
    let user = User {
        id: ids.generate(),
        name,
        email,
        password,
        phone: None,
        details: UserDetails::new_at(Utc::now()),
    };

    Ok(match users.add_user(user).await {
        Ok(user) => {
            tracing::info!("Registered user {}", user.id);
            token_response(StatusCode::CREATED, &tokens, &user)
        }
        Err(err) => user_store_failure("Register", err),
    })
}

#[api_v2_operation]
pub async fn login(
    users: Data<Arc<dyn UserRepository>>,
    hasher: Data<Arc<dyn CredentialHasher>>,
    tokens: Data<Arc<dyn TokenService>>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    let mut user = match users.get_user_by_email(&request.email).await {
        Ok(Some(user)) => user,
        Ok(None) => return Ok(failure(StatusCode::NOT_FOUND, "User Not Found")),
        Err(err) => return Ok(internal_error("Login", err)),
    };

    match hasher.verify(&request.password, &user.password) {
        Ok(true) => {}
        Ok(false) => return Ok(failure(StatusCode::UNAUTHORIZED, "Invalid Password")),
        Err(err) => return Ok(internal_error("Login", err)),
    }

    user.details.dates.last_seen = Utc::now();
    if let Err(err) = users.update_user(&user).await {
        tracing::warn!("Failed to update last seen of user {}: {}", user.id, err);
    }
    Ok(token_response(StatusCode::OK, &tokens, &user))
}

#[api_v2_operation]
/// Full profile of the caller
pub async fn me(caller: AuthenticatedUser) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(UserView::from_user(caller.user, true)))
}
