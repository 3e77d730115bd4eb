use crate::controller::ApiResponse;
use crate::params::todo::{IdResponse, ValueParams, ValueResponse};
use crate::{AppState, Error};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::error::Error as DomainError;
use domain::Id;

use log::*;

/// GET all todo lists as a map of id to name
pub async fn index(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    debug!("GET all Todo Lists");

    let lists = app_state.todos.all_lists().await;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), lists)))
}

/// GET the name of a particular todo list
pub async fn read(
    State(app_state): State<AppState>,
    Path(list_id): Path<Id>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET Todo List by id: {list_id}");

    let value = app_state.todos.list_name(list_id).await?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        ValueResponse { value },
    )))
}

/// POST create a new todo list, or look up the list that already has this name
pub async fn create(
    State(app_state): State<AppState>,
    Json(params): Json<ValueParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST Create a New Todo List named: {}", params.value);

    let id = app_state.todos.add_list(&params.value).await?;

    Ok(Json(ApiResponse::new(
        StatusCode::CREATED.into(),
        IdResponse { id },
    )))
}

/// PUT rename a todo list
pub async fn update(
    State(app_state): State<AppState>,
    Path(list_id): Path<Id>,
    Json(params): Json<ValueParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("PUT Rename Todo List {list_id} to: {}", params.value);

    app_state
        .todos
        .change_list_name(list_id, &params.value)
        .await?;

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::OK.into())))
}

/// DELETE a todo list along with all of its items
pub async fn delete(
    State(app_state): State<AppState>,
    Path(list_id): Path<Id>,
) -> Result<impl IntoResponse, Error> {
    debug!("DELETE Todo List by id: {list_id}");

    if !app_state.todos.delete_list(list_id).await {
        return Err(DomainError::not_found(format!("todo list {list_id}")).into());
    }

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::OK.into())))
}
