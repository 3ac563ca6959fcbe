// src/main.rs
use keci_dashboard::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok(); // Load environment variables from .env file

    keci_dashboard::init_tracing();

    let config = Config::from_env()?;
    keci_dashboard::run(config).await?;

    Ok(())
}
