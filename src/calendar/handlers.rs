use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::instrument;

use super::dto::{DayView, DeleteDatesRequest, WeekQuery, WeekView};
use super::services;
use crate::{error::AppResult, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/week", get(get_week))
        .route("/week/:date", get(get_week_of))
        .route("/day", get(get_today))
        .route("/day/:date", get(get_day))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/dates", delete(delete_dates))
        .route("/dates/:date", delete(delete_date))
}

#[instrument(skip(state))]
pub async fn get_week(
    State(state): State<AppState>,
    Query(q): Query<WeekQuery>,
) -> AppResult<Json<WeekView>> {
    Ok(Json(services::week_of(&state, q.date.as_deref()).await?))
}

#[instrument(skip(state))]
pub async fn get_week_of(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> AppResult<Json<WeekView>> {
    Ok(Json(services::week_of(&state, Some(&date)).await?))
}

#[instrument(skip(state))]
pub async fn get_today(State(state): State<AppState>) -> AppResult<Json<DayView>> {
    Ok(Json(services::day_of(&state, None).await?))
}

#[instrument(skip(state))]
pub async fn get_day(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> AppResult<Json<DayView>> {
    Ok(Json(services::day_of(&state, Some(&date)).await?))
}

/// DELETE /dates { "dates": ["YYYY-MM-DD", ...] }
#[instrument(skip(state))]
pub async fn delete_dates(
    State(state): State<AppState>,
    Json(body): Json<DeleteDatesRequest>,
) -> AppResult<StatusCode> {
    services::delete_dates(&state, &body.dates).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn delete_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> AppResult<StatusCode> {
    services::delete_date(&state, &date).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod calendar_handler_tests {
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use time::macros::date;
    use tower::ServiceExt;

    use super::*;
    use crate::store::repo_types::NewDish;

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn week_endpoint_serializes_dates_as_ymd() {
        let state = AppState::fake_on(date!(2025 - 01 - 20));
        let soup = state
            .store
            .create_dish(&NewDish {
                dish_name: "Soup".into(),
                dish_type: "main".into(),
                ..NewDish::default()
            })
            .await
            .unwrap();
        state
            .store
            .assign_dish(soup.dish_id, &[date!(2025 - 01 - 14)])
            .await
            .unwrap();

        let app = read_routes().with_state(state);
        let res = app
            .oneshot(
                Request::get("/week?date=2025-01-15")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let json = body_json(res).await;
        assert_eq!(json["start"], "2025-01-13");
        assert_eq!(json["end"], "2025-01-17");
        assert_eq!(json["dishes"][0]["date"], "2025-01-14");
        assert_eq!(json["dishes"][0]["dish"]["dish_name"], "Soup");
        assert!(json["dishes"][0]["average_rating"].is_null());
    }

    #[tokio::test]
    async fn malformed_day_is_bad_request() {
        let app = read_routes().with_state(AppState::fake());
        let res = app
            .oneshot(Request::get("/day/yesterday").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_unknown_date_is_not_found() {
        let app = write_routes().with_state(AppState::fake());
        let res = app
            .oneshot(
                Request::delete("/dates/2025-01-13")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
