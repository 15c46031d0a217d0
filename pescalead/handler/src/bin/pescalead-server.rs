//! PescaLead Warp Service Binary.

use std::net::ToSocketAddrs;
use std::path::PathBuf;

use clap::Parser;
use pescalead_handler::config::Settings;
use pescalead_handler::context::PescaleadContext;
use tracing::error;
use tracing::info;
use warp::Filter;

use pescalead_handler::api;
use pescalead_handler::logging;

/// Command line arguments for the local server.
#[derive(Debug, Parser)]
#[clap(name = "PescaLead Server")]
struct ServerArgs {
    /// Optional path to the configuration file. If not provided, it is expected
    /// that all parameters are provided via environment variables.
    #[clap(short = 'c', long, required = false)]
    config: Option<PathBuf>,

    /// Print human readable logs instead of JSON.
    #[clap(long)]
    pretty_logs: bool,
}

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();
    let settings = Settings::new(args.config.as_ref()).unwrap_or_else(|e| panic!("{e}"));
    logging::setup_logging(
        &settings.server.log_directives,
        args.pretty_logs || settings.server.pretty_logs,
    );

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let context = PescaleadContext::from_settings(settings).unwrap_or_else(|e| panic!("{e}"));
    context.spawn_sweepers();

    // Print configuration.
    info!("PescaLead context setup for PescaLead local server.");
    let context_string =
        serde_json::to_string_pretty(&context).expect("Context must be serializable.");
    info!(context_string);

    let routes = api::routes::routes(context)
        .recover(api::handlers::handle_rejection)
        .with(warp::log("api"));

    let addr_str = format!("{}:{}", host, port);
    info!("Server will run locally on {}", addr_str);
    let addr = match addr_str.to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => {
                error!("No addresses found for {}", addr_str);
                return;
            }
        },
        Err(e) => {
            error!("Failed to resolve address: {}", e);
            return;
        }
    };

    warp::serve(routes).run(addr).await;
}
