use std::net::SocketAddr;
use tokio::net::TcpListener;

use echo_server::config::{generate_config_template, Config};
use echo_server::rooms::{seed, store};
use echo_server::{auth, db, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("echo_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter)
            .init();
    }

    tracing::info!("Echo server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    {
        let mut conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;

        // No connection survives a restart, so nobody is present
        let cleared = store::reset_all_presence(&conn)?;
        if cleared > 0 {
            tracing::info!(participants = cleared, "Cleared stale room presence");
        }

        if config.seed_official_rooms {
            let seeded = seed::seed_official_rooms(&mut conn)?;
            if seeded > 0 {
                tracing::info!(rooms = seeded, "Seeded official rooms");
            }
        }
    }

    // Build application state and router
    let app_state = state::AppState::new(db, jwt_secret);
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
