use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{ListingParams, ProfilePatch, RoleChangeRequest, TokenResponse, UserId, UserView};
use crate::auth::{AuthenticatedUser, CredentialHasher, MaybeAuthenticatedUser, TokenService};
use crate::handlers::{
    access_denied, failure, internal_error, inventory_failure, success, user_store_failure,
};
use crate::inventory::BookInventory;
use crate::users_repository::UserRepository;
use crate::validation::{validate_email, validate_password};

#[api_v2_operation]
/// Public listing, email, phone and balance are only shown to the user themself and to admins
pub async fn list_users(
    caller: MaybeAuthenticatedUser,
    users: Data<Arc<dyn UserRepository>>,
    params: web::Query<ListingParams>,
) -> Result<HttpResponse, Error> {
    Ok(match users.list_users(&params.user_query()).await {
        Ok(found) => {
            let views: Vec<UserView> = found
                .into_iter()
                .map(|user| {
                    let show_private = caller.can_manage(&user.id);
                    UserView::from_user(user, show_private)
                })
                .collect();
            HttpResponse::Ok().json(views)
        }
        Err(err) => internal_error("List users", err),
    })
}

#[api_v2_operation]
pub async fn get_user(
    caller: MaybeAuthenticatedUser,
    users: Data<Arc<dyn UserRepository>>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, Error> {
    Ok(match users.get_user(&user_id).await {
        Ok(Some(user)) => {
            let show_private = caller.can_manage(&user.id);
            HttpResponse::Ok().json(UserView::from_user(user, show_private))
        }
        Ok(None) => failure(StatusCode::NOT_FOUND, "User Not Found"),
        Err(err) => internal_error("Get user", err),
    })
}

#[api_v2_operation]
/// Books sold by the user
pub async fn get_user_books(
    inventory: Data<BookInventory>,
    user_id: web::Path<UserId>,
    params: web::Query<ListingParams>,
) -> Result<HttpResponse, Error> {
    Ok(
        match inventory
            .get_books_by_seller(&user_id, params.requested_pagination())
            .await
        {
            Ok(books) => HttpResponse::Ok().json(books),
            Err(err) => inventory_failure("Get user books", err),
        },
    )
}

#[api_v2_operation]
/// Updates the caller's own profile and returns a token carrying the new details
pub async fn update_me(
    caller: AuthenticatedUser,
    users: Data<Arc<dyn UserRepository>>,
    hasher: Data<Arc<dyn CredentialHasher>>,
    tokens: Data<Arc<dyn TokenService>>,
    patch: web::Json<ProfilePatch>,
) -> Result<HttpResponse, Error> {
    let ProfilePatch {
        name,
        email,
        password,
        phone,
    } = patch.into_inner();
    let mut user = caller.user;

    if let Some(name) = name {
        if name.trim().is_empty() {
            return Ok(failure(StatusCode::BAD_REQUEST, "name - is required"));
        }
        user.name = name;
    }
    if let Some(email) = email {
        if let Err(err) = validate_email(&email) {
            return Ok(failure(StatusCode::BAD_REQUEST, err.to_string()));
        }
        user.email = email;
    }
    if let Some(password) = password {
        if let Err(err) = validate_password(&password) {
            return Ok(failure(StatusCode::BAD_REQUEST, err.to_string()));
        }
        user.password = match hasher.hash(&password) {
            Ok(hash) => hash,
            Err(err) => return Ok(internal_error("Update profile", err)),
        };
    }
    if phone.is_some() {
        user.phone = phone;
    }

    Ok(match users.update_user(&user).await {
        Ok(true) => match tokens.issue(&user) {
            Ok(token) => HttpResponse::Ok().json(TokenResponse { auth: true, token }),
            Err(err) => internal_error("Update profile", err),
        },
        Ok(false) => failure(StatusCode::NOT_FOUND, "User Not Found"),
        Err(err) => user_store_failure("Update profile", err),
    })
}

#[api_v2_operation]
/// Admins only
pub async fn change_role(
    caller: AuthenticatedUser,
    users: Data<Arc<dyn UserRepository>>,
    user_id: web::Path<UserId>,
    request: web::Json<RoleChangeRequest>,
) -> Result<HttpResponse, Error> {
    if !caller.is_admin() {
        return Ok(access_denied());
    }
    let mut user = match users.get_user(&user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return Ok(failure(StatusCode::NOT_FOUND, "User Not Found")),
        Err(err) => return Ok(internal_error("Change role", err)),
    };
    user.details.role = request.role;

    Ok(match users.update_user(&user).await {
        Ok(true) => {
            tracing::info!(
                "User {} changed role of {} to {:?}",
                caller.id(),
                user.id,
                user.details.role
            );
            HttpResponse::Ok().json(UserView::from_user(user, true))
        }
        Ok(false) => failure(StatusCode::NOT_FOUND, "User Not Found"),
        Err(err) => user_store_failure("Change role", err),
    })
}

#[api_v2_operation]
/// Deletes the user together with the books they sell
pub async fn delete_user(
    caller: AuthenticatedUser,
    inventory: Data<BookInventory>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, Error> {
    if !caller.can_manage(&user_id) {
        return Ok(access_denied());
    }
    Ok(match inventory.delete_user(&user_id).await {
        Ok(true) => success(StatusCode::OK, "User deleted"),
        Ok(false) => failure(StatusCode::NOT_FOUND, "User Not Found"),
        Err(err) => inventory_failure("Delete user", err),
    })
}
