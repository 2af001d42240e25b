use actix_web::{web, App, HttpServer};
use eliza_server::{health_check, AppError, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> eliza_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    let config = Settings::new()?;
    info!("Configuration loaded successfully ({})", config.environment);

    let state = AppState::new(config.clone())?;

    // The Eliza endpoint runs on its own listener; actix only serves /health
    let ws_listener = tokio::net::TcpListener::bind(config.ws_addr()).await?;
    tokio::spawn(state.ws_server.clone().run(ws_listener));

    let health_listener = TcpListener::bind(config.health_addr())?;
    info!("Health endpoint ready at http://{}/health", config.health_addr());

    let state = web::Data::new(state);
    let app_state = state.clone();

    // Stops on SIGINT/SIGTERM
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .route("/health", web::get().to(health_check))
    })
    .listen(health_listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    info!("Shutting down");
    state.shutdown().await?;

    Ok(())
}
