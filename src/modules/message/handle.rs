use actix_web::{get, http::header, post, web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        file::repository_pg::FilePgRepository,
        message::{
            model::{MessagePage, MessageQuery, SendMessageModel},
            repository_pg::MessageRepositoryPg,
            service::MessageService,
        },
    },
    utils::{ValidatedJson, ValidatedQuery},
};

pub type MessageSvc = MessageService<MessageRepositoryPg, FilePgRepository>;

#[get("/files/{file_id}/messages")]
pub async fn list_messages(
    message_service: web::Data<MessageSvc>,
    file_id: web::Path<Uuid>,
    ValidatedQuery(query): ValidatedQuery<MessageQuery>,
    req: HttpRequest,
) -> Result<success::Success<MessagePage>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let page = message_service.list_messages(&user_id, &file_id.into_inner(), &query).await?;

    Ok(success::Success::ok(Some(page)))
}

/// Streams the answer as plain text chunks while it is generated.
#[post("/message")]
pub async fn send_message(
    message_service: web::Data<MessageSvc>,
    ValidatedJson(body): ValidatedJson<SendMessageModel>,
    req: HttpRequest,
) -> Result<HttpResponse, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let answer = message_service.answer(user_id, body).await?;

    let body = answer.map(|delta| {
        delta.map(web::Bytes::from).map_err(|e| {
            log::error!("Answer stream aborted: {}", e);
            error::Error::from(e)
        })
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/plain; charset=utf-8"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(body))
}
