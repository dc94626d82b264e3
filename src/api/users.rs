//! User management endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::{CreateUser, UpdateUser, User},
    AppState,
};

use super::{AppJson, EntityId};

/// List all users, ordered by name
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = Vec<User>)
    )
)]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    let users = state.services.users.list_users().await?;
    Ok(Json(users))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_by_id(id).await?;
    Ok(Json(user))
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Missing name or malformed email"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AppJson(data): AppJson<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.create_user(data).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Update an existing user
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Malformed email"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    AppJson(data): AppJson<UpdateUser>,
) -> AppResult<Json<User>> {
    let user = state.services.users.update_user(id, data).await?;
    Ok(Json(user))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User has active loans")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> AppResult<StatusCode> {
    state.services.users.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
