use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(error) = fitcoach_shared::observability::init_observability("backend") {
        eprintln!("Failed to initialize observability: {error:#}");
        std::process::exit(1);
    }

    if let Err(error) = backend::run().await {
        error!("Backend exited with error: {:#}", error);
        std::process::exit(1);
    }
}
