use actix_web::web;

use crate::modules::file::{handle, repository::FileRepository};

pub fn configure<R>(cfg: &mut web::ServiceConfig)
where
    R: FileRepository + Send + Sync + 'static,
{
    cfg.service(
        web::scope("/files")
            .service(web::resource("").route(web::get().to(handle::list_files::<R>)))
            .service(web::resource("/upload").route(web::post().to(handle::upload_file::<R>)))
            .service(
                web::resource("/{file_id}")
                    .route(web::get().to(handle::get_file::<R>))
                    .route(web::delete().to(handle::delete_file::<R>)),
            )
            .service(
                web::resource("/{file_id}/status").route(web::get().to(handle::get_file_status::<R>)),
            ),
    );
}

pub fn page_configure<R>(cfg: &mut web::ServiceConfig)
where
    R: FileRepository + Send + Sync + 'static,
{
    cfg.service(web::resource("/dashboard/{file_id}").route(web::get().to(handle::dashboard::<R>)));
}
