use actix_web::web::{scope, ServiceConfig};

use crate::modules::plan::handle::*;

pub fn public_api_configure(cfg: &mut ServiceConfig) {
    cfg.service(list_plans);
}

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(scope("/billing").service(get_subscription_plan));
}
