//! Signup and account endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use super::{ApiState, AuthUser};
use crate::ledger::User;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// Bearer token for subsequent requests
    pub user_id: String,
    pub credits: u64,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id.to_string(),
            credits: user.credits,
        }
    }
}

/// Create an account with the signup balance
async fn signup(State(state): State<Arc<ApiState>>) -> Json<UserResponse> {
    Json(state.ledger.create_user().into())
}

/// Current balance for the caller
async fn current_user(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(user.into())
}

/// Build users router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/user", get(current_user))
        .with_state(state)
}
