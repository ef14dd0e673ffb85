use domain::message::DbMessageStore;
use domain::session::{spawn_expired_session_sweep, DbSessionValidator};
use log::*;
use migration::{Migrator, MigratorTrait};
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);
    info!("Starting up Social Network real-time backend ({})", config.runtime_env());

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = Migrator::up(db.as_ref(), None).await {
        error!("Failed to apply database migrations: {e}");
        std::process::exit(1);
    }

    let ws_manager = Arc::new(ws::Manager::new(
        Arc::new(DbSessionValidator::new(db.clone())),
        Arc::new(DbMessageStore::new(db.clone())),
        config.connection_settings(),
    ));

    let sweep = config
        .session_cleanup_interval()
        .map(|interval| spawn_expired_session_sweep(db.clone(), interval));

    let app_state = AppState::new(config, &db, ws_manager);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped with an error: {e}");
    }

    if let Some(sweep) = sweep {
        sweep.abort();
    }
    info!("Shut down complete");
}
