use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::instrument;

use super::dto::{
    AssignRequest, CreateDishRequest, CreatedDishResponse, DeleteDishesRequest, DishDetails,
    SearchQuery, UnassignRequest, UpdateDishRequest,
};
use super::services;
use crate::{
    calendar::dto::AssignmentView, error::AppResult, state::AppState, store::repo_types::Dish,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/dishes", get(list_dishes))
        .route("/dishes/:id", get(get_dish))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/dishes", post(create_dish).delete(delete_dishes))
        .route("/dishes/:id", put(update_dish).delete(delete_dish))
        .route("/dishes/:id/dates", post(assign_dates))
        .route("/assignments", delete(unassign))
}

#[instrument(skip(state))]
pub async fn list_dishes(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<Vec<Dish>>> {
    Ok(Json(services::search_dishes(&state, q.search.as_deref()).await?))
}

#[instrument(skip(state))]
pub async fn get_dish(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<DishDetails>> {
    Ok(Json(services::dish_details(&state, id).await?))
}

/// POST /dishes { "dish": {...} | "dish_id": n, "dates": ["YYYY-MM-DD", ...] }
#[instrument(skip(state, body))]
pub async fn create_dish(
    State(state): State<AppState>,
    Json(body): Json<CreateDishRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<CreatedDishResponse>)> {
    let created = services::create_dish(&state, body).await?;

    let mut headers = HeaderMap::new();
    let location = format!("/api/v1/dishes/{}", created.dish.dish_id);
    if let Ok(location) = HeaderValue::from_str(&location) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(created)))
}

#[instrument(skip(state, body))]
pub async fn update_dish(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateDishRequest>,
) -> AppResult<Json<Dish>> {
    Ok(Json(services::update_dish(&state, id, body.dish).await?))
}

#[instrument(skip(state))]
pub async fn assign_dates(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<AssignRequest>,
) -> AppResult<Json<Vec<AssignmentView>>> {
    Ok(Json(services::assign_existing(&state, id, &body.dates).await?))
}

/// DELETE /dishes { "dish_ids": [..] }
#[instrument(skip(state))]
pub async fn delete_dishes(
    State(state): State<AppState>,
    Json(body): Json<DeleteDishesRequest>,
) -> AppResult<StatusCode> {
    services::delete_dishes(&state, &body.dish_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn delete_dish(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    services::delete_dish(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /assignments { "date_has_dish_ids": [..] }
#[instrument(skip(state))]
pub async fn unassign(
    State(state): State<AppState>,
    Json(body): Json<UnassignRequest>,
) -> AppResult<StatusCode> {
    services::unassign(&state, &body.date_has_dish_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}
