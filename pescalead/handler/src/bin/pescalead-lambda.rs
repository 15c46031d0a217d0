//! PescaLead API entrypoint.

use pescalead_handler::config::Settings;
use pescalead_handler::context::PescaleadContext;
use tracing::info;
use warp::Filter;

use pescalead_handler::api;
use pescalead_handler::logging;

#[tokio::main]
async fn main() {
    // Lambda settings come from `PESCALEAD_` environment variables only.
    let settings = Settings::new(None::<&str>).unwrap_or_else(|e| panic!("{e}"));
    logging::setup_logging(&settings.server.log_directives, false);

    let context = PescaleadContext::from_settings(settings).unwrap_or_else(|e| panic!("{e}"));
    context.spawn_sweepers();

    // Print configuration.
    info!("PescaLead context setup for PescaLead Lambda.");
    let context_string =
        serde_json::to_string_pretty(&context).expect("Context must be serializable.");
    info!(context_string);

    // Make routes.
    let routes = api::routes::routes(context)
        .recover(api::handlers::handle_rejection)
        .with(warp::log("api"));

    // Create warp service.
    let warp_service = warp::service(routes);

    warp_lambda::run(warp_service)
        .await
        .expect("An error occurred");
}
