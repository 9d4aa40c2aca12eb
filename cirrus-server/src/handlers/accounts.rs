//! `/users` handlers.
//!
//! Every handler runs the feature gate before it looks at the request, so a
//! disabled operation answers `FeatureIsDisabled` even for malformed input.
//! Extraction failures are mapped to catalog errors instead of axum's default
//! rejections.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use cirrus_core::{
    Account, AccountError, CallerIdentity, ListQuery, NewAccount,
    RequestContext, flags::operation,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    extract::Caller,
    infra::{app_state::AppState, errors::AppResult},
};

#[derive(Debug, Deserialize)]
pub struct UpdateEmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUsernameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersParams {
    pub limit: Option<i64>,
    pub last_id: Option<u64>,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl From<ListUsersParams> for ListQuery {
    fn from(params: ListUsersParams) -> Self {
        ListQuery {
            limit: params.limit.unwrap_or_default(),
            cursor: params.last_id.unwrap_or_default(),
            username: params.username,
            email: params.email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<Account>,
}

async fn authorize(
    state: &AppState,
    ctx: &RequestContext,
    operation: &str,
    caller: &CallerIdentity,
) -> AppResult<()> {
    state
        .gate
        .authorize(ctx, operation, caller)
        .await
        .map_err(|err| state.error(err))
}

fn parse_id(
    state: &AppState,
    method: &'static str,
    id: Result<Path<u64>, PathRejection>,
) -> AppResult<u64> {
    id.map(|Path(id)| id).map_err(|rejection| {
        warn!(method, error = %rejection, "failed to parse id");
        state.error(AccountError::InvalidId(rejection.body_text()))
    })
}

fn parse_body<T>(
    state: &AppState,
    method: &'static str,
    body: Result<Json<T>, JsonRejection>,
) -> AppResult<T> {
    body.map(|Json(body)| body).map_err(|rejection| {
        warn!(method, error = %rejection, "failed to parse request body");
        state.error(AccountError::InvalidBody(rejection.body_text()))
    })
}

pub async fn create_user(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<NewAccount>, JsonRejection>,
) -> AppResult<Json<Account>> {
    let ctx = state.request_context();
    authorize(&state, &ctx, operation::CREATE_USER, &caller).await?;
    let new_account = parse_body(&state, "create_user", body)?;

    let account = state
        .accounts
        .create_account(&ctx, new_account)
        .await
        .map_err(|err| state.error(err))?;
    Ok(Json(account))
}

pub async fn get_user(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<u64>, PathRejection>,
) -> AppResult<Json<Account>> {
    let ctx = state.request_context();
    authorize(&state, &ctx, operation::GET_USER, &caller).await?;
    let id = parse_id(&state, "get_user", id)?;

    let account = state
        .accounts
        .get_account(&ctx, id)
        .await
        .map_err(|err| state.error(err))?;
    Ok(Json(account))
}

pub async fn list_users(
    State(state): State<AppState>,
    Caller(caller): Caller,
    params: Result<Query<ListUsersParams>, QueryRejection>,
) -> AppResult<Json<ListUsersResponse>> {
    let ctx = state.request_context();
    authorize(&state, &ctx, operation::GET_USERS, &caller).await?;
    let Query(params) = params.map_err(|rejection| {
        warn!(
            method = "list_users",
            error = %rejection,
            "failed to parse query params"
        );
        state.error(AccountError::InvalidQuery(rejection.body_text()))
    })?;

    let users = state
        .accounts
        .list_accounts(&ctx, params.into())
        .await
        .map_err(|err| state.error(err))?;
    Ok(Json(ListUsersResponse { users }))
}

pub async fn update_email(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<UpdateEmailRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let ctx = state.request_context();
    authorize(&state, &ctx, operation::UPDATE_EMAIL, &caller).await?;
    let id = parse_id(&state, "update_email", id)?;
    let request = parse_body(&state, "update_email", body)?;

    state
        .accounts
        .update_email(&ctx, id, &request.email)
        .await
        .map_err(|err| state.error(err))?;
    Ok(StatusCode::OK)
}

pub async fn update_username(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<UpdateUsernameRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let ctx = state.request_context();
    authorize(&state, &ctx, operation::UPDATE_USERNAME, &caller).await?;
    let id = parse_id(&state, "update_username", id)?;
    let request = parse_body(&state, "update_username", body)?;

    state
        .accounts
        .update_username(&ctx, id, &request.username)
        .await
        .map_err(|err| state.error(err))?;
    Ok(StatusCode::OK)
}

pub async fn update_password(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let ctx = state.request_context();
    authorize(&state, &ctx, operation::UPDATE_PASSWORD, &caller).await?;
    let id = parse_id(&state, "update_password", id)?;
    let request = parse_body(&state, "update_password", body)?;

    state
        .accounts
        .update_password(&ctx, id, &request.old_password, &request.new_password)
        .await
        .map_err(|err| state.error(err))?;
    Ok(StatusCode::OK)
}

pub async fn delete_user(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<u64>, PathRejection>,
) -> AppResult<StatusCode> {
    let ctx = state.request_context();
    authorize(&state, &ctx, operation::DELETE_USER, &caller).await?;
    let id = parse_id(&state, "delete_user", id)?;

    state
        .accounts
        .delete_account(&ctx, id)
        .await
        .map_err(|err| state.error(err))?;
    Ok(StatusCode::OK)
}
