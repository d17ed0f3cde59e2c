use std::sync::Arc;

use clap::Parser;
use log::info;

use relaymux::admin::{self, AppState};
use relaymux::atoms::error::RelayResult;
use relaymux::config::AppConfig;
use relaymux::intake::{self, Intake};
use relaymux::manager::RelayManager;
use relaymux::pool::MessagePool;
use relaymux::store::Store;

#[tokio::main]
async fn main() -> RelayResult<()> {
    let app_config = AppConfig::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&app_config.log_filter)).init();

    info!("[main] opening store at {}", app_config.db_path);
    let store = Store::open(&app_config.db_path)?;

    let pool = Arc::new(MessagePool::default());
    let intake = Arc::new(Intake::new());
    let manager = RelayManager::new(pool.clone(), app_config.verify_tls);

    for relay in store.load_relays()? {
        if relay.active {
            manager.add_relay(relay.url);
        }
    }

    tokio::spawn(intake::run_intake_pump(pool.clone(), intake.clone()));
    manager.spawn_supervisor();

    let state = Arc::new(AppState {
        store,
        manager,
        pool,
        intake,
        admin_token: app_config.admin_token.clone(),
        private_ws_key: app_config.private_ws_key_bytes(),
    });

    let app = admin::router(state);
    let listener = tokio::net::TcpListener::bind(&app_config.bind_addr).await?;
    info!("[main] listening on {}", app_config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
