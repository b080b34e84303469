use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt;
use uuid::Uuid;

use crate::api::success::Success;
use crate::api::{error, success};
use crate::middlewares::{get_claims, optional_claims};
use crate::modules::file::{
    model::{DashboardResponse, FileStatusResponse},
    repository::FileRepository,
    schema::FileEntity,
    service::FileService,
};
use crate::ENV;

/// Upload a PDF from the first multipart field carrying a filename
pub async fn upload_file<R>(
    mut payload: Multipart,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<FileEntity>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let user_id = get_claims(&req)?.sub;

    while let Some(mut field) =
        payload.try_next().await.map_err(|e| error::Error::bad_request(e.to_string()))?
    {
        let Some(filename) = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
        else {
            continue;
        };

        let mime_type = field.content_type().map(|m| m.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) =
            field.try_next().await.map_err(|e| error::Error::bad_request(e.to_string()))?
        {
            bytes.extend_from_slice(&chunk);
        }

        let file = service.upload_file(user_id, filename, bytes, mime_type).await?;
        return Ok(Success::created(Some(file)).message("File uploaded successfully"));
    }

    Err(error::Error::bad_request("No file found in request"))
}

pub async fn list_files<R>(
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<Vec<FileEntity>>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let user_id = get_claims(&req)?.sub;
    let files = service.list_files(&user_id).await?;
    Ok(Success::ok(Some(files)))
}

pub async fn get_file<R>(
    file_id: web::Path<Uuid>,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<FileEntity>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let user_id = get_claims(&req)?.sub;
    let file = service.get_owned_file(&user_id, &file_id.into_inner()).await?;
    Ok(Success::ok(Some(file)))
}

pub async fn get_file_status<R>(
    file_id: web::Path<Uuid>,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<FileStatusResponse>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let user_id = get_claims(&req)?.sub;
    let file = service.get_owned_file(&user_id, &file_id.into_inner()).await?;
    Ok(Success::ok(Some(FileStatusResponse { status: file.upload_status })))
}

pub async fn delete_file<R>(
    file_id: web::Path<Uuid>,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<()>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let user_id = get_claims(&req)?.sub;
    service.delete_file(&user_id, &file_id.into_inner()).await?;
    Ok(Success::no_content())
}

/// Path of the auth callback that returns the browser to `file_id`'s chat page.
pub fn dashboard_login_redirect(file_id: &Uuid) -> String {
    format!("/auth-callback?origin=dashboard/{file_id}")
}

/// Data behind the chat page of one file; anonymous visitors are sent through sign-in.
pub async fn dashboard<R>(
    file_id: web::Path<Uuid>,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<HttpResponse, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let file_id = file_id.into_inner();

    let Some(claims) = optional_claims(&req, ENV.jwt_secret.as_ref()) else {
        return Ok(HttpResponse::SeeOther()
            .insert_header((header::LOCATION, dashboard_login_redirect(&file_id)))
            .finish());
    };

    let file = service.get_owned_file(&claims.sub, &file_id).await?;
    let plan = service.plan_service().subscription_for(&claims.sub).await?;

    Ok(HttpResponse::Ok().json(success::SuccessData {
        data: Some(DashboardResponse { file, is_subscribed: plan.is_subscribed }),
        message: None,
    }))
}
