use crate::modules::user::handle::*;
use actix_web::web::{scope, ServiceConfig};

pub fn public_api_configure(cfg: &mut ServiceConfig) {
    cfg.service(scope("/auth").service(sign_up).service(sign_in).service(sign_out));
}

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(scope("/users").service(get_profile));
}

/// Browser-facing routes outside `/api`.
pub fn page_configure(cfg: &mut ServiceConfig) {
    cfg.service(auth_callback);
}
