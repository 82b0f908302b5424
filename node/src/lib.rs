//! A node that serves calls from other nodes' `RemoteService`s.
//!
//! `app()` is the demo `users` service behind `ContextLayer`, so every
//! handler sees the call context the calling node sent along.

pub mod context;
pub mod error;
pub mod users;

use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;

pub use context::{restore_context, CallContext, ContextLayer};
pub use error::NodeError;
pub use users::User;

pub fn app() -> Router {
    users::router()
        .route("/context", get(echo_context))
        .layer(ContextLayer::new())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Answers with the context the request was handled under.
async fn echo_context(ctx: CallContext) -> Json<CallContext> {
    Json(ctx)
}
