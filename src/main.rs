use std::net::SocketAddr;

use clap::Parser;
use tokensvc::cli::{
    Args, Command, build_settings, connect_cache, init_logging, load_cookie_keys, load_keys,
    open_database, run_keygen,
};
use tokensvc::password::CredentialVerifier;
use tokensvc::{ServerConfig, create_app};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    if let Some(Command::Keygen { dir }) = &args.command {
        let ok = run_keygen(dir);
        std::process::exit(if ok { 0 } else { 1 });
    }

    let Some(cookie_keys) = load_cookie_keys(args.cookie_key_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(keys) = load_keys(&args.private_key, &args.public_key) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let Some(cache) = connect_cache(&args.cache_url).await else {
        std::process::exit(1);
    };

    let verifier = CredentialVerifier::new().unwrap_or_else(|e| {
        error!(error = %e, "Failed to initialize password verifier");
        std::process::exit(1);
    });

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to get local address");
        std::process::exit(1);
    });

    let config = ServerConfig {
        settings: build_settings(&args, cookie_keys),
        db,
        keys,
        cache,
        verifier,
    };
    let app = create_app(&config).unwrap_or_else(|e| {
        error!(error = %e, "Invalid cookie configuration");
        std::process::exit(1);
    });

    info!(address = %local_addr, "Listening");

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
