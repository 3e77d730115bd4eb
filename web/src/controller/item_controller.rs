use crate::controller::ApiResponse;
use crate::params::todo::{IdResponse, ValueParams};
use crate::{AppState, Error};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::error::Error as DomainError;
use domain::Id;

use log::*;

/// GET all items of a todo list
pub async fn index(
    State(app_state): State<AppState>,
    Path(list_id): Path<Id>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET all Todo Items of list {list_id}");

    let items = app_state.todos.all_items(list_id).await?;

    debug!("Found {} Todo Items", items.len());

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), items)))
}

/// POST add an item to a todo list, or look up the item that already has this text
pub async fn create(
    State(app_state): State<AppState>,
    Path(list_id): Path<Id>,
    Json(params): Json<ValueParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST Add Todo Item to list {list_id}: {}", params.value);

    let id = app_state.todos.add_item(list_id, &params.value).await?;

    Ok(Json(ApiResponse::new(
        StatusCode::CREATED.into(),
        IdResponse { id },
    )))
}

/// PUT change the text of a todo item
pub async fn update(
    State(app_state): State<AppState>,
    Path((list_id, item_id)): Path<(Id, Id)>,
    Json(params): Json<ValueParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("PUT Change Todo Item {item_id} of list {list_id}");

    app_state
        .todos
        .change_item_text(list_id, item_id, &params.value)
        .await?;

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::OK.into())))
}

/// POST flip the done state of a todo item
pub async fn toggle(
    State(app_state): State<AppState>,
    Path((list_id, item_id)): Path<(Id, Id)>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST Toggle Todo Item {item_id} of list {list_id}");

    app_state.todos.toggle_item_done(list_id, item_id).await?;

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::OK.into())))
}

/// DELETE a todo item
pub async fn delete(
    State(app_state): State<AppState>,
    Path((list_id, item_id)): Path<(Id, Id)>,
) -> Result<impl IntoResponse, Error> {
    debug!("DELETE Todo Item {item_id} of list {list_id}");

    if !app_state.todos.delete_item(list_id, item_id).await {
        return Err(DomainError::not_found(format!("todo item {item_id} in list {list_id}")).into());
    }

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::OK.into())))
}
