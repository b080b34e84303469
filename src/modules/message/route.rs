use actix_web::web::ServiceConfig;

use crate::modules::message::handle::*;

/// Must be registered ahead of the `/files` scope, which would otherwise claim the list route.
pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(list_messages).service(send_message);
}
