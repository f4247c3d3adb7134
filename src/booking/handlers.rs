use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use super::dto::{
    AddRatingRequest, AggregateSnapshot, AttendanceRequest, AttendanceView, RemoveRatingRequest,
    UpdateRatingRequest,
};
use super::services;
use crate::{calendar::services::parse_date, error::AppResult, state::AppState};

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/attendance",
            post(add_attendance).delete(remove_attendance),
        )
        .route(
            "/attendance/:date",
            post(add_attendance_on).delete(remove_attendance_on),
        )
}

pub fn rating_routes() -> Router<AppState> {
    Router::new().route(
        "/ratings",
        post(add_rating).put(update_rating).delete(remove_rating),
    )
}

/// POST /attendance { "dates": ["YYYY-MM-DD", ...] }
#[instrument(skip(state))]
pub async fn add_attendance(
    State(state): State<AppState>,
    Json(body): Json<AttendanceRequest>,
) -> AppResult<Json<Vec<AttendanceView>>> {
    let rows = services::record_attendance(&state, &body.dates).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn remove_attendance(
    State(state): State<AppState>,
    Json(body): Json<AttendanceRequest>,
) -> AppResult<Json<Vec<AttendanceView>>> {
    let rows = services::cancel_attendance(&state, &body.dates).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn add_attendance_on(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> AppResult<Json<AttendanceView>> {
    let row = services::increment_attendance(&state, parse_date(&date)?).await?;
    Ok(Json(row.into()))
}

#[instrument(skip(state))]
pub async fn remove_attendance_on(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> AppResult<Json<AttendanceView>> {
    let row = services::decrement_attendance(&state, parse_date(&date)?).await?;
    Ok(Json(row.into()))
}

#[instrument(skip(state))]
pub async fn add_rating(
    State(state): State<AppState>,
    Json(body): Json<AddRatingRequest>,
) -> AppResult<Json<AggregateSnapshot>> {
    let snap = services::add_rating(&state, body.date_has_dish_id, body.rating).await?;
    Ok(Json(snap))
}

#[instrument(skip(state))]
pub async fn update_rating(
    State(state): State<AppState>,
    Json(body): Json<UpdateRatingRequest>,
) -> AppResult<Json<AggregateSnapshot>> {
    let snap = services::update_rating(
        &state,
        body.date_has_dish_id,
        body.old_rating,
        body.new_rating,
    )
    .await?;
    Ok(Json(snap))
}

#[instrument(skip(state))]
pub async fn remove_rating(
    State(state): State<AppState>,
    Json(body): Json<RemoveRatingRequest>,
) -> AppResult<Json<AggregateSnapshot>> {
    let snap = services::remove_rating(&state, body.date_has_dish_id, body.rating).await?;
    Ok(Json(snap))
}

#[cfg(test)]
mod booking_handler_tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use time::macros::date;
    use tower::ServiceExt;

    use super::*;
    use crate::store::repo_types::NewDish;

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn rating_flow_over_http() {
        let state = AppState::fake_on(date!(2025 - 01 - 20));
        let dish = state
            .store
            .create_dish(&NewDish {
                dish_name: "Curry".into(),
                dish_type: "main".into(),
                ..NewDish::default()
            })
            .await
            .unwrap();
        let id = state
            .store
            .assign_dish(dish.dish_id, &[date!(2025 - 01 - 16)])
            .await
            .unwrap()[0]
            .date_has_dish_id;
        let app = rating_routes().with_state(state);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/ratings",
                json!({ "date_has_dish_id": id, "rating": 5 }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let snap: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snap["rating_sum"], 5);
        assert_eq!(snap["rating_count"], 1);
        assert_eq!(snap["average_rating"], 5.0);

        let res = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/ratings",
                json!({ "date_has_dish_id": id, "old_rating": 5, "new_rating": 7 }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .oneshot(json_request(
                "DELETE",
                "/ratings",
                json!({ "date_has_dish_id": 4242, "rating": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn decrement_at_zero_is_conflict() {
        let app = attendance_routes().with_state(AppState::fake());

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/attendance",
                json!({ "dates": ["2025-01-22"] }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        for expected in [StatusCode::OK, StatusCode::CONFLICT] {
            let res = app
                .clone()
                .oneshot(
                    Request::delete("/attendance/2025-01-22")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(res.status(), expected);
        }
    }
}
