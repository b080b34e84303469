use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    Error, HttpMessage, HttpRequest,
};
use futures_util::{future::LocalBoxFuture, FutureExt};
use std::rc::Rc;

use crate::{api::error, modules::user::schema::UserRole, utils::Claims, ENV};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Token from the `Authorization: Bearer` header, falling back to the session cookie
/// so browser redirects carry it too.
pub fn request_token(req: &HttpRequest) -> Option<String> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    header.or_else(|| req.cookie(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()))
}

/// Claims of the caller when a valid token is present, without rejecting anonymous requests.
pub fn optional_claims(req: &HttpRequest, secret: &[u8]) -> Option<Claims> {
    let token = request_token(req)?;
    Claims::decode(&token, secret).ok()
}

pub async fn authentication<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<B>, Error>
where
    B: MessageBody + 'static,
{
    let token = match request_token(req.request()) {
        Some(t) => t,
        None => {
            return Err(error::Error::unauthorized("Token Invalid or Expired").into());
        }
    };

    let claims = Claims::decode(&token, ENV.jwt_secret.as_ref())
        .map_err(|_| error::Error::unauthorized("Token Invalid or Expired"))?;

    req.extensions_mut().insert(claims);

    next.call(req).await
}

pub fn get_claims(req: &HttpRequest) -> Result<Claims, error::Error> {
    let extensions = req.extensions();

    let claims = extensions
        .get::<Claims>()
        .ok_or_else(|| error::Error::unauthorized("Unauthorized"))?
        .clone();

    Ok(claims)
}

pub fn authorization<B>(
    allowed_roles: Vec<UserRole>,
) -> impl Fn(
    ServiceRequest,
    Next<B>,
) -> LocalBoxFuture<'static, Result<ServiceResponse<B>, actix_web::Error>>
where
    B: MessageBody + 'static,
{
    let allowed_roles = Rc::new(allowed_roles);
    move |req: ServiceRequest, next: Next<B>| {
        let roles = allowed_roles.clone();
        async move {
            let role = get_claims(req.request())?.role;

            if !roles.contains(&role) {
                return Err(error::Error::forbidden("No permission").into());
            }
            next.call(req).await
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{cookie::Cookie, test::TestRequest};

    #[test]
    fn test_request_token_prefers_header() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer header-token"))
            .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "cookie-token"))
            .to_http_request();
        assert_eq!(request_token(&req).as_deref(), Some("header-token"));
    }

    #[test]
    fn test_request_token_falls_back_to_cookie() {
        let req = TestRequest::default()
            .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "cookie-token"))
            .to_http_request();
        assert_eq!(request_token(&req).as_deref(), Some("cookie-token"));

        let req = TestRequest::default().insert_header(("Authorization", "Basic abc")).to_http_request();
        assert_eq!(request_token(&req), None);
    }

    #[test]
    fn test_optional_claims_ignores_invalid_token() {
        let id = uuid::Uuid::now_v7();
        let token = Claims::new(&id, &UserRole::User, 60).encode(b"secret").unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();
        assert_eq!(optional_claims(&req, b"secret").map(|c| c.sub), Some(id));
        assert!(optional_claims(&req, b"other").is_none());
    }
}
