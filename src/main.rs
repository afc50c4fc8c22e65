use authkeep::cli::{Args, build_config, init_logging, load_jwt_secret, open_database};
use authkeep::{AppContext, Services, run_server};
use clap::Parser;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = build_config(&args, db, jwt_secret);
    let mut ctx = match AppContext::new(config, Services::default()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "Invalid password hashing configuration");
            std::process::exit(1);
        }
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %addr, error = %e, "Failed to bind");
            ctx.shutdown().await;
            std::process::exit(1);
        }
    };

    ctx.start_cleanup().await;

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => warn!(error = %e, "Listening on unknown address"),
    }

    if let Err(e) = run_server(ctx, listener, shutdown_signal()).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
