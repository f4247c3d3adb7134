use time::Date;
use tracing::{info, instrument, warn};

use super::dto::AggregateSnapshot;
use crate::calendar::services::parse_date_list;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::repo_types::{DateHasDish, DateSaved};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

fn validate_rating(field: &str, rating: i32) -> AppResult<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(AppError::Validation(format!(
            "{field} must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
        )));
    }
    Ok(())
}

/// Loads the assignment and checks it was served before today.
async fn rateable_assignment(st: &AppState, date_has_dish_id: i32) -> AppResult<DateHasDish> {
    let row = st
        .store
        .get_assignment(date_has_dish_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("assignment {date_has_dish_id} not found")))?;

    let today = st.clock.today();
    if row.date >= today {
        warn!(date_has_dish_id, date = %row.date, %today, "rating refused for a dish not yet served");
        return Err(AppError::Policy(format!(
            "dish served on {} cannot be rated before the following day",
            row.date
        )));
    }
    Ok(row)
}

/// Applies the deltas in one conditional store update. `min_count` is the
/// number of ratings that must already be recorded for the change to apply.
async fn apply_delta(
    st: &AppState,
    date_has_dish_id: i32,
    sum_delta: i32,
    count_delta: i32,
    min_count: i32,
) -> AppResult<AggregateSnapshot> {
    match st
        .store
        .apply_rating_delta(date_has_dish_id, sum_delta, count_delta, min_count)
        .await?
    {
        Some(row) => {
            info!(
                date_has_dish_id,
                rating_sum = row.rating_sum,
                rating_count = row.rating_count,
                "rating aggregate updated"
            );
            Ok(row.into())
        }
        None => match st.store.get_assignment(date_has_dish_id).await? {
            None => Err(AppError::NotFound(format!(
                "assignment {date_has_dish_id} not found"
            ))),
            Some(row) if row.rating_count < min_count => {
                warn!(date_has_dish_id, rating_count = row.rating_count, "no recorded ratings");
                Err(AppError::Policy(format!(
                    "assignment {date_has_dish_id} has no ratings to change"
                )))
            }
            Some(_) => {
                warn!(date_has_dish_id, sum_delta, count_delta, "rating aggregate would go negative");
                Err(AppError::Policy(
                    "rating does not match the recorded ratings".into(),
                ))
            }
        },
    }
}

#[instrument(skip(st))]
pub async fn add_rating(
    st: &AppState,
    date_has_dish_id: i32,
    rating: i32,
) -> AppResult<AggregateSnapshot> {
    validate_rating("rating", rating)?;
    rateable_assignment(st, date_has_dish_id).await?;
    apply_delta(st, date_has_dish_id, rating, 1, 0).await
}

/// Replaces one previously given rating. `old_rating` is taken on trust; the
/// store only guarantees the aggregate never goes negative.
#[instrument(skip(st))]
pub async fn update_rating(
    st: &AppState,
    date_has_dish_id: i32,
    old_rating: i32,
    new_rating: i32,
) -> AppResult<AggregateSnapshot> {
    validate_rating("old_rating", old_rating)?;
    validate_rating("new_rating", new_rating)?;
    rateable_assignment(st, date_has_dish_id).await?;
    apply_delta(st, date_has_dish_id, new_rating - old_rating, 0, 1).await
}

#[instrument(skip(st))]
pub async fn remove_rating(
    st: &AppState,
    date_has_dish_id: i32,
    rating: i32,
) -> AppResult<AggregateSnapshot> {
    validate_rating("rating", rating)?;
    rateable_assignment(st, date_has_dish_id).await?;
    apply_delta(st, date_has_dish_id, -rating, -1, 1).await
}

#[instrument(skip(st))]
pub async fn increment_attendance(st: &AppState, date: Date) -> AppResult<DateSaved> {
    let mut rows = st.store.increment_attendance(&[date]).await?;
    let row = rows
        .pop()
        .ok_or_else(|| anyhow::anyhow!("store returned no row for {date}"))?;
    info!(%date, attendance = row.attendance, "attendance incremented");
    Ok(row)
}

#[instrument(skip(st))]
pub async fn decrement_attendance(st: &AppState, date: Date) -> AppResult<DateSaved> {
    let mut rows = st.store.decrement_attendance(&[date]).await.map_err(|e| {
        warn!(%date, error = %e, "attendance decrement refused");
        e
    })?;
    let row = rows
        .pop()
        .ok_or_else(|| anyhow::anyhow!("store returned no row for {date}"))?;
    info!(%date, attendance = row.attendance, "attendance decremented");
    Ok(row)
}

/// Adds one attendee to each listed day, as one unit.
#[instrument(skip(st))]
pub async fn record_attendance(st: &AppState, raw_dates: &[String]) -> AppResult<Vec<DateSaved>> {
    let dates = parse_date_list(raw_dates)?;
    let rows = st.store.increment_attendance(&dates).await?;
    info!(count = rows.len(), "attendance recorded");
    Ok(rows)
}

/// Removes one attendee from each listed day, as one unit.
#[instrument(skip(st))]
pub async fn cancel_attendance(st: &AppState, raw_dates: &[String]) -> AppResult<Vec<DateSaved>> {
    let dates = parse_date_list(raw_dates)?;
    let rows = st.store.decrement_attendance(&dates).await.map_err(|e| {
        warn!(error = %e, "attendance cancellation refused");
        e
    })?;
    info!(count = rows.len(), "attendance cancelled");
    Ok(rows)
}
