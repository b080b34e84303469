use std::time::Duration;

/// Default page size of the message history, shared by the server and the client.
pub const INFINITE_QUERY_LIMIT: usize = 10;
pub const MAX_QUERY_LIMIT: usize = 100;

/// Id of the placeholder entry holding an answer that is still streaming.
pub const AI_RESPONSE_SENTINEL: &str = "ai-response";

pub const VECTOR_STORE_MAX_RETRIES: u32 = 3;
pub const VECTOR_STORE_RETRY_DELAY: Duration = Duration::from_secs(2);

pub const CONTEXT_TOP_K: usize = 4;
pub const HISTORY_WINDOW: i64 = 6;

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;

pub const USER_CACHE_TTL: usize = 3600;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StripeMode {
    Test,
    Production,
}

pub struct Env {
    pub jwt_secret: String,
    pub access_token_expiration: u64,
    pub database_url: String,
    pub redis_url: String,
    pub frontend_url: String,
    pub ip: String,
    pub port: u16,
    pub pinecone_api_key: Option<String>,
    pub pinecone_index: String,
    pub pinecone_controller_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub upload_dir: String,
    pub stripe_mode: StripeMode,
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let access_token_expiration = std::env::var("ACCESS_TOKEN_EXPIRATION")
            .unwrap_or_else(|_| "86400".to_string())
            .parse::<u64>()
            .expect("ACCESS_TOKEN_EXPIRATION must be a valid u64 integer");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let redis_url = std::env::var("REDIS_URL")
            .expect("REDIS_URL must be set in .env file or environment variable");

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .expect("PORT must be a valid u16 integer");

        // Checked when the vector store is first connected, not here.
        let pinecone_api_key = std::env::var("PINECONE_API_KEY").ok();
        let pinecone_index =
            std::env::var("PINECONE_INDEX").unwrap_or_else(|_| "notebot".to_string());
        let pinecone_controller_url = std::env::var("PINECONE_CONTROLLER_URL")
            .unwrap_or_else(|_| "https://api.pinecone.io".to_string());

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .expect("OPENAI_API_KEY must be set in .env file or environment variable");
        let openai_base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        let embedding_model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-ada-002".to_string());

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());
        let stripe_mode = match std::env::var("STRIPE_MODE").as_deref() {
            Ok("production") => StripeMode::Production,
            _ => StripeMode::Test,
        };

        Env {
            jwt_secret,
            access_token_expiration,
            database_url,
            redis_url,
            frontend_url,
            ip,
            port,
            pinecone_api_key,
            pinecone_index,
            pinecone_controller_url,
            openai_api_key,
            openai_base_url,
            chat_model,
            embedding_model,
            upload_dir,
            stripe_mode,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
