//! Authentication against the directory.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::ldap::Identity;
use crate::router::Valid;

/// No `Debug`: holds a password.
#[derive(Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, max = 255))]
    pub username: String,
    #[validate(length(min = 1, max = 1024))]
    pub password: String,
}

/// Handler to authenticate a user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Identity>> {
    let entry = tokio::time::timeout(
        state.config.timeout(),
        state.directory.authenticate(&body.username, &body.password),
    )
    .await
    .map_err(|_| ServerError::Timeout)??;

    Ok(Json(entry.identity()))
}
