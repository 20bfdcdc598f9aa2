//! Server and directory status.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Structured status.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub version: String,
    pub name: String,
    /// Whether the service credential could bind.
    pub directory: bool,
}

/// Reconnects to the directory on every call.
pub async fn status(State(state): State<AppState>) -> Json<Status> {
    let directory = match state.directory.test_connection().await {
        Ok(accepted) => accepted,
        Err(err) => {
            tracing::warn!(error = %err, "directory connection test failed");
            false
        },
    };

    Json(Status {
        version: state.config.version().to_owned(),
        name: state.config.name.clone(),
        directory,
    })
}
