//! Route definitions for the AI message sender.
use warp::Filter;

use crate::context::PescaleadContext;

use super::handlers;

/// Sender routes, relative to `internal-send-ai-message`.
pub fn routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>("x-service-role-key"))
        .and(warp::body::json())
        .then(handlers::messaging::send_ai_message)
}
