use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};

use isobox::config::AppConfig;
use isobox::coordinator::JobCoordinator;
use isobox::dispatch::JobRegistry;
use isobox::handlers::{self, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("Starting isobox server...");

    let config = match AppConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            log::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    match std::process::Command::new("docker")
        .arg("--version")
        .output()
    {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            log::info!("Docker available: {}", version.trim());
        }
        _ => {
            log::error!("Docker is not available or not running!");
            std::process::exit(1);
        }
    }

    let coordinator = Arc::new(JobCoordinator::new(config.clone()));
    let registry = Arc::new(JobRegistry::new());
    let state = web::Data::new(AppState {
        config: config.clone(),
        coordinator,
        registry,
    });

    let port = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let bind_address = format!("0.0.0.0:{port}");

    log::info!("Server starting on {bind_address}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .route("/core/ping", web::get().to(handlers::ping))
            .route("/task/create", web::post().to(handlers::create_task))
            .route(
                "/task/{task_id}/task_result",
                web::get().to(handlers::task_result),
            )
            .route(
                "/file_task/create",
                web::post().to(handlers::create_file_task),
            )
            .route(
                "/file_task/{task_id}/download",
                web::get().to(handlers::download_file_task),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
