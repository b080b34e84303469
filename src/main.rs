use actix_cors::Cors;
use actix_web::{
    self, http::header,
    middleware::{from_fn, Logger},
    web, App, HttpServer,
};
use std::sync::Arc;

use notebot::{
    configs::{
        connect_database,
        vector_store::{connect_with_retry, PineconeConnector, RetryPolicy},
        RedisCache,
    },
    middlewares::{authentication, authorization},
    modules::{
        self,
        ai::openai::OpenAiClient,
        file::{model::UploadConfig, repository_pg::FilePgRepository, service::FileService},
        message::{repository_pg::MessageRepositoryPg, service::MessageService},
        plan::service::PlanService,
        user::{repository_pg::UserRepositoryPg, schema::UserRole, service::UserService},
    },
    ENV,
};

#[actix_web::get("/")]
async fn health_check(db_pool: web::Data<sqlx::PgPool>) -> &'static str {
    match sqlx::query("SELECT 1").execute(db_pool.get_ref()).await {
        Ok(_) => "Server is running",
        Err(_) => "Server is running without database",
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing::subscriber::set_global_default(tracing_subscriber::fmt().finish())
        .map_err(std::io::Error::other)?;

    let db_pool =
        connect_database().await.map_err(|_| std::io::Error::other("Database connection error"))?;

    let redis_pool =
        RedisCache::new().await.map_err(|_| std::io::Error::other("Redis connection error"))?;

    let vector_store = connect_with_retry(
        &PineconeConnector::new(ENV.pinecone_controller_url.as_str(), ENV.pinecone_index.as_str()),
        ENV.pinecone_api_key.as_deref(),
        RetryPolicy::default(),
    )
    .await
    .map_err(|e| std::io::Error::other(format!("Vector store connection error: {e}")))?;
    let vector_store = Arc::new(vector_store);

    let ai = Arc::new(OpenAiClient::new(
        ENV.openai_api_key.as_str(),
        ENV.openai_base_url.as_str(),
        ENV.chat_model.as_str(),
        ENV.embedding_model.as_str(),
    ));

    let user_repo = Arc::new(UserRepositoryPg::new(db_pool.clone()));
    let file_repo = Arc::new(FilePgRepository::new(db_pool.clone()));
    let message_repo = Arc::new(MessageRepositoryPg::new(db_pool.clone()));

    let user_service = UserService::with_dependencies(user_repo.clone(), Arc::new(redis_pool));
    let plan_service = PlanService::with_dependencies(user_repo, ENV.stripe_mode);
    let file_service = FileService::with_dependencies(
        file_repo.clone(),
        plan_service.clone(),
        vector_store.clone(),
        ai.clone(),
        UploadConfig::new(ENV.upload_dir.as_str()),
    );
    let message_service = MessageService::with_dependencies(
        message_repo,
        file_repo,
        vector_store,
        ai.clone(),
        ai,
    );

    log::info!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&ENV.frontend_url)
            .allowed_methods(vec!["GET", "POST", "DELETE"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(user_service.clone()))
            .app_data(web::Data::new(plan_service.clone()))
            .app_data(web::Data::new(file_service.clone()))
            .app_data(web::Data::new(message_service.clone()))
            .app_data(web::Data::new(db_pool.clone()))
            .service(health_check)
            .service(
                web::scope("/api")
                    .configure(modules::user::route::public_api_configure)
                    .configure(modules::plan::route::public_api_configure)
                    .service(
                        web::scope("")
                            .wrap(from_fn(authorization(vec![UserRole::User, UserRole::Admin])))
                            .wrap(from_fn(authentication))
                            .configure(modules::user::route::configure)
                            .configure(modules::plan::route::configure)
                            .configure(modules::message::route::configure)
                            .configure(modules::file::route::configure::<FilePgRepository>),
                    ),
            )
            .configure(modules::user::route::page_configure)
            .configure(modules::file::route::page_configure::<FilePgRepository>)
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
