use domain::{EventPublisher, Store, TodoService};
use log::*;
use push::{NoopPushService, PushDomainEventHandler, PushRelay, PushService};
use service::{config::Config, logging::Logger};
use std::sync::Arc;
use web::AppState;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    info!("Starting todo platform [{}]", config.runtime_env());

    let relay = build_relay(&config);
    let push: Arc<dyn PushService> = match &relay {
        Some(relay) => relay.clone(),
        None => Arc::new(NoopPushService),
    };

    if let Some(relay) = &relay {
        relay.start().await;
    }

    let publisher =
        EventPublisher::new().with_handler(Arc::new(PushDomainEventHandler::new(push)));

    let store = if config.seed_data {
        Store::seeded()
    } else {
        Store::new()
    };
    let todos = TodoService::new(Arc::new(store), publisher);

    if let Err(e) = web::init_server(AppState::new(config, todos), shutdown_signal()).await {
        error!("Server stopped with an error: {e}");
    }

    if let Some(relay) = relay {
        relay.stop().await;
    }

    info!("Todo platform shut down");
}

fn build_relay(config: &Config) -> Option<Arc<PushRelay>> {
    if !config.push_enabled() {
        warn!("Push relay is not configured, change notifications are disabled");
        return None;
    }

    match PushRelay::from_config(config) {
        Ok(relay) => Some(Arc::new(relay)),
        Err(e) => {
            error!("Failed to set up the push relay, change notifications are disabled: {e}");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {e}");
        std::future::pending::<()>().await;
    }

    info!("Shutdown signal received, stopping server");
}
