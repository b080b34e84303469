use actix_web::{
    cookie::{time, Cookie},
    get,
    http::header,
    post, web, HttpRequest, HttpResponse,
};

use crate::modules::user::model::{self, AuthCallbackQuery, SignUpResponse};
use crate::modules::user::service::{origin_redirect, UserService, SIGN_IN_PATH};
use crate::{
    api::{error, success},
    utils::ValidatedJson,
};
use crate::{
    middlewares::{get_claims, optional_claims, ACCESS_TOKEN_COOKIE},
    ENV,
};

#[get("/profile")]
pub async fn get_profile(
    user_service: web::Data<UserService>,
    req: HttpRequest,
) -> Result<success::Success<model::UserResponse>, error::Error> {
    let id = get_claims(&req)?.sub;
    let user = user_service.get_by_id(id).await?;
    Ok(success::Success::ok(Some(user)).message("Profile retrieved successfully"))
}

#[post("/signup")]
pub async fn sign_up(
    user_service: web::Data<UserService>,
    user_data: ValidatedJson<model::SignUpModel>,
) -> Result<success::Success<SignUpResponse>, error::Error> {
    let user_id = user_service.sign_up(user_data.0).await?;
    Ok(success::Success::created(Some(SignUpResponse { id: user_id })).message("Signup successful"))
}

#[post("/signin")]
pub async fn sign_in(
    user_service: web::Data<UserService>,
    user_data: ValidatedJson<model::SignInModel>,
) -> Result<success::Success<model::SignInResponse>, error::Error> {
    let access_token = user_service.sign_in(user_data.0).await?;
    let session_cookie = Cookie::build(ACCESS_TOKEN_COOKIE, access_token.clone())
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(ENV.access_token_expiration as i64))
        .finish();

    Ok(success::Success::ok(Some(model::SignInResponse {
        access_token,
        expires_in: ENV.access_token_expiration,
    }))
        .message("Signin successful")
        .cookies(vec![session_cookie]))
}

#[post("/signout")]
pub async fn sign_out() -> Result<success::Success<()>, error::Error> {
    let session_cookie = Cookie::build(ACCESS_TOKEN_COOKIE, "")
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(0))
        .expires(time::OffsetDateTime::UNIX_EPOCH)
        .finish();

    Ok(success::Success::no_content().cookies(vec![session_cookie]))
}

/// Sends a freshly authenticated browser back to where it started, or to sign-in.
#[get("/auth-callback")]
pub async fn auth_callback(
    user_service: web::Data<UserService>,
    query: web::Query<AuthCallbackQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, error::Error> {
    Ok(callback_redirect(&user_service, &req, ENV.jwt_secret.as_ref(), query.origin.as_deref()).await?)
}

async fn callback_redirect(
    user_service: &UserService,
    req: &HttpRequest,
    secret: &[u8],
    origin: Option<&str>,
) -> Result<HttpResponse, error::SystemError> {
    let target = match optional_claims(req, secret) {
        Some(claims) => match user_service.find_entity(claims.sub).await? {
            Some(_) => origin_redirect(origin),
            None => SIGN_IN_PATH.to_string(),
        },
        None => SIGN_IN_PATH.to_string(),
    };

    Ok(HttpResponse::SeeOther().insert_header((header::LOCATION, target)).finish())
}
