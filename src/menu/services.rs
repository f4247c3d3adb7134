use std::collections::HashSet;

use time::Date;
use tracing::{info, instrument, warn};

use super::dto::{CreateDishRequest, CreatedDishResponse, DishDetails};
use crate::calendar::dto::{AssignmentView, YmdDate};
use crate::calendar::services::parse_dates;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::repo_types::{DateHasDish, Dish, DishPatch, NewDish};

#[derive(Debug)]
pub enum DishSource {
    New(NewDish),
    Existing(i32),
}

impl TryFrom<(Option<NewDish>, Option<i32>)> for DishSource {
    type Error = AppError;

    fn try_from(parts: (Option<NewDish>, Option<i32>)) -> AppResult<Self> {
        match parts {
            (Some(dish), None) => Ok(DishSource::New(dish)),
            (None, Some(id)) => Ok(DishSource::Existing(id)),
            (Some(_), Some(_)) => Err(AppError::Validation(
                "give either dish or dish_id, not both".into(),
            )),
            (None, None) => Err(AppError::Validation("dish or dish_id is required".into())),
        }
    }
}

fn required_text(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn check_calories(calories: Option<i32>) -> AppResult<()> {
    match calories {
        Some(c) if c < 0 => Err(AppError::Validation(
            "dish_calories must not be negative".into(),
        )),
        _ => Ok(()),
    }
}

fn validate_new_dish(dish: NewDish) -> AppResult<NewDish> {
    check_calories(dish.dish_calories)?;
    Ok(NewDish {
        dish_name: required_text("dish_name", &dish.dish_name)?,
        dish_description: optional_text(dish.dish_description.as_deref()),
        dish_type: required_text("dish_type", &dish.dish_type)?,
        ..dish
    })
}

fn validate_patch(patch: DishPatch) -> AppResult<DishPatch> {
    check_calories(patch.dish_calories)?;
    Ok(DishPatch {
        dish_name: patch
            .dish_name
            .as_deref()
            .map(|v| required_text("dish_name", v))
            .transpose()?,
        dish_description: patch
            .dish_description
            .map(|v| optional_text(v.as_deref())),
        dish_type: patch
            .dish_type
            .as_deref()
            .map(|v| required_text("dish_type", v))
            .transpose()?,
        ..patch
    })
}

/// Non-empty list of ids with repeats dropped, order kept.
fn distinct_ids(field: &str, ids: &[i32]) -> AppResult<Vec<i32>> {
    if ids.is_empty() {
        return Err(AppError::Validation(format!("{field} must be non-empty")));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
}

#[instrument(skip(st))]
pub async fn create_or_reuse_dish(st: &AppState, source: DishSource) -> AppResult<Dish> {
    match source {
        DishSource::New(dish) => {
            let dish = st.store.create_dish(&validate_new_dish(dish)?).await?;
            info!(dish_id = dish.dish_id, name = %dish.dish_name, "dish created");
            Ok(dish)
        }
        DishSource::Existing(dish_id) => st
            .store
            .get_dish(dish_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dish {dish_id} not found"))),
    }
}

/// Schedules the dish on every day given. Pairs that already exist are kept as they are.
#[instrument(skip(st))]
pub async fn assign_dish_to_dates(
    st: &AppState,
    dish_id: i32,
    dates: &[Date],
) -> AppResult<Vec<DateHasDish>> {
    let rows = st.store.assign_dish(dish_id, dates).await?;
    info!(dish_id, count = rows.len(), "dish assigned");
    Ok(rows)
}

/// Creates (or reuses) a dish and schedules it on the requested days.
pub async fn create_dish(st: &AppState, req: CreateDishRequest) -> AppResult<CreatedDishResponse> {
    // Dates are checked before anything is written.
    let dates = if req.dates.is_empty() {
        Vec::new()
    } else {
        parse_dates(&req.dates)?
    };
    let source = DishSource::try_from((req.dish, req.dish_id))?;
    let dish = create_or_reuse_dish(st, source).await?;

    let assignments = if dates.is_empty() {
        Vec::new()
    } else {
        assign_dish_to_dates(st, dish.dish_id, &dates)
            .await?
            .into_iter()
            .map(|row| AssignmentView::new(row, dish.clone()))
            .collect()
    };
    Ok(CreatedDishResponse { dish, assignments })
}

pub async fn assign_existing(
    st: &AppState,
    dish_id: i32,
    raw_dates: &[String],
) -> AppResult<Vec<AssignmentView>> {
    let dates = parse_dates(raw_dates)?;
    let dish = create_or_reuse_dish(st, DishSource::Existing(dish_id)).await?;
    let rows = assign_dish_to_dates(st, dish_id, &dates).await?;
    Ok(rows
        .into_iter()
        .map(|row| AssignmentView::new(row, dish.clone()))
        .collect())
}

pub async fn dish_details(st: &AppState, dish_id: i32) -> AppResult<DishDetails> {
    let dish = st
        .store
        .get_dish(dish_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("dish {dish_id} not found")))?;
    let dates = st.store.dish_dates(dish_id).await?;
    Ok(DishDetails {
        dish,
        dates: dates.into_iter().map(YmdDate).collect(),
    })
}

pub async fn search_dishes(st: &AppState, name: Option<&str>) -> AppResult<Vec<Dish>> {
    st.store.search_dishes(name.unwrap_or("").trim()).await
}

/// Dishes that are already scheduled stay as they are.
#[instrument(skip(st))]
pub async fn update_dish(st: &AppState, dish_id: i32, patch: DishPatch) -> AppResult<Dish> {
    let dish = st.store.update_dish(dish_id, &validate_patch(patch)?).await?;
    info!(dish_id, "dish updated");
    Ok(dish)
}

/// Removes the given assignments. An unknown id cancels the whole batch.
#[instrument(skip(st))]
pub async fn unassign(st: &AppState, date_has_dish_ids: &[i32]) -> AppResult<()> {
    let ids = distinct_ids("date_has_dish_ids", date_has_dish_ids)?;
    st.store.delete_assignments(&ids).await.map_err(|e| {
        warn!(error = %e, "unassign refused");
        e
    })?;
    info!(count = ids.len(), "assignments removed");
    Ok(())
}

/// Deletes unscheduled dishes. A scheduled or unknown dish cancels the whole batch.
#[instrument(skip(st))]
pub async fn delete_dishes(st: &AppState, dish_ids: &[i32]) -> AppResult<()> {
    let ids = distinct_ids("dish_ids", dish_ids)?;
    st.store.delete_dishes(&ids).await.map_err(|e| {
        warn!(error = %e, "dish deletion refused");
        e
    })?;
    info!(count = ids.len(), "dishes deleted");
    Ok(())
}

pub async fn delete_dish(st: &AppState, dish_id: i32) -> AppResult<()> {
    delete_dishes(st, &[dish_id]).await
}
