//! chat-gateway binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use chat_gateway::api::{serve, AppState};
use chat_gateway::cli::{parse_args, print_help, print_version};
use chat_gateway::config::Config;
use chat_gateway::engine::BridgeEngineFactory;
use chat_gateway::logging;
use chat_gateway::session::SessionManager;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run 'chat-gateway --help' for usage.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_with_filter(config.log_filter());

    info!("chat-gateway v{}", env!("CARGO_PKG_VERSION"));

    let (server_config, bridge_config) =
        match (config.to_server_config(), config.bridge_config()) {
            (Ok(server), Ok(bridge)) => (server, bridge),
            (Err(e), _) | (_, Err(e)) => {
                error!("invalid configuration: {}", e);
                return ExitCode::FAILURE;
            }
        };

    let store = config.session_store();
    info!(
        auth_dir = %store.auth_dir().display(),
        cache_dir = %store.cache_dir().display(),
        "credential store"
    );
    info!(
        command = %bridge_config.command,
        args = ?bridge_config.args,
        "engine bridge"
    );

    let manager = SessionManager::start(
        store,
        Arc::new(BridgeEngineFactory::new(bridge_config)),
        config.manager_options(),
    )
    .await;

    let result = serve(server_config, AppState::new(Arc::clone(&manager))).await;

    manager.shutdown().await;

    match result {
        Ok(()) => {
            info!("chat-gateway stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
