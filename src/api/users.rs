use axum::{Json, extract::State};

use super::AppState;
use super::error::ResultExt;
use crate::auth::VerifiedSession;
use crate::db::UserRecord;
use crate::deadline::Deadline;
use crate::error::AuthError;

/// `GET /users`: every account, hashes omitted.
pub async fn list_users(
    State(state): State<AppState>,
    session: VerifiedSession,
    deadline: Deadline,
) -> Result<Json<Vec<UserRecord>>, AuthError> {
    tracing::debug!(user_id = session.user_id, jti = %session.jti, "listing users");
    let users = deadline
        .run(state.db.users().list())
        .await
        .store_err("failed to list users")?;
    Ok(Json(users))
}
