use url::Url;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub stripe: Stripe,
    pub cors: Cors,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    /// Absent when the service runs without a processor credential.
    pub secret_key: Option<String>,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub success_url: Url,
    pub cancel_url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cors {
    AnyOrigin,
    Origins(Vec<String>),
}
