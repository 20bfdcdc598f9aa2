//! Prometheus exposition.

use axum::extract::State;

use crate::AppState;
use crate::error::{Result, ServerError};

pub async fn handler(State(state): State<AppState>) -> Result<String> {
    let Some(handle) = &state.metrics else {
        return Err(ServerError::Internal {
            details: "metrics recorder is not installed".into(),
            source: None,
        });
    };

    Ok(handle.render())
}
