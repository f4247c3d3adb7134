use std::collections::{HashMap, HashSet};

use time::{format_description::FormatItem, macros::format_description, Date, Duration};
use tracing::{info, instrument, warn};

use super::dto::{AssignmentView, DayView, WeekView};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::repo_types::DateHasDish;
use crate::store::AssignmentFilter;

pub const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn parse_date(raw: &str) -> AppResult<Date> {
    Date::parse(raw.trim(), DATE_FORMAT).map_err(|_| {
        AppError::Validation(format!("invalid date {raw:?}, expected YYYY-MM-DD"))
    })
}

/// Parses a non-empty list of dates, keeping order and repeats.
pub fn parse_date_list(raw: &[String]) -> AppResult<Vec<Date>> {
    if raw.is_empty() {
        return Err(AppError::Validation("dates must be non-empty".into()));
    }
    raw.iter().map(|r| parse_date(r)).collect()
}

/// Like [`parse_date_list`], but drops repeats while keeping order.
pub fn parse_dates(raw: &[String]) -> AppResult<Vec<Date>> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut dates = parse_date_list(raw)?;
    dates.retain(|d| seen.insert(*d));
    Ok(dates)
}

/// Monday..=Friday of the week containing `date`.
pub fn week_window(date: Date) -> (Date, Date) {
    let offset = i64::from(date.weekday().number_days_from_monday());
    let start = date.saturating_sub(Duration::days(offset));
    (start, start.saturating_add(Duration::days(4)))
}

/// Resolves each row's dish; rows whose dish or parent day is gone are skipped.
async fn assignment_views(
    st: &AppState,
    rows: Vec<DateHasDish>,
    known_dates: &HashSet<Date>,
) -> AppResult<Vec<AssignmentView>> {
    let mut dish_ids: Vec<i32> = rows.iter().map(|r| r.dish_id).collect();
    dish_ids.sort_unstable();
    dish_ids.dedup();
    let dishes: HashMap<i32, _> = st
        .store
        .get_dishes(&dish_ids)
        .await?
        .into_iter()
        .map(|d| (d.dish_id, d))
        .collect();

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        if !known_dates.contains(&row.date) {
            warn!(date_has_dish_id = row.date_has_dish_id, date = %row.date, "no saved date for assignment, skipping");
            continue;
        }
        let Some(dish) = dishes.get(&row.dish_id) else {
            warn!(date_has_dish_id = row.date_has_dish_id, dish_id = row.dish_id, "no dish for assignment, skipping");
            continue;
        };
        views.push(AssignmentView::new(row, dish.clone()));
    }
    Ok(views)
}

/// Dishes scheduled Monday to Friday of the week containing `raw_date`.
/// A missing or malformed date means the current week.
#[instrument(skip(st))]
pub async fn week_of(st: &AppState, raw_date: Option<&str>) -> AppResult<WeekView> {
    let today = st.clock.today();
    let date = match raw_date {
        Some(raw) => parse_date(raw).unwrap_or_else(|_| {
            warn!(raw, "malformed week date, using today");
            today
        }),
        None => today,
    };
    let (start, end) = week_window(date);

    let rows = st
        .store
        .find_assignments(AssignmentFilter::Between(start, end))
        .await?;
    let known: HashSet<Date> = st
        .store
        .dates_between(start, end)
        .await?
        .into_iter()
        .map(|d| d.date_saved)
        .collect();
    let dishes = assignment_views(st, rows, &known).await?;

    info!(%start, %end, count = dishes.len(), "week dishes");
    Ok(WeekView { start, end, dishes })
}

/// Dishes scheduled on exactly one day plus that day's attendance.
/// A missing date means today; a malformed one is rejected.
#[instrument(skip(st))]
pub async fn day_of(st: &AppState, raw_date: Option<&str>) -> AppResult<DayView> {
    let date = match raw_date {
        Some(raw) => parse_date(raw)?,
        None => st.clock.today(),
    };

    let saved = st.store.get_date(date).await?;
    let rows = st.store.find_assignments(AssignmentFilter::On(date)).await?;
    let known: HashSet<Date> = saved.iter().map(|d| d.date_saved).collect();
    let dishes = assignment_views(st, rows, &known).await?;

    Ok(DayView {
        date,
        dishes,
        attendance: saved.map(|d| d.attendance),
    })
}

/// Deletes each day with all of its assignments. Any unknown day cancels the batch.
#[instrument(skip(st))]
pub async fn delete_dates(st: &AppState, raw_dates: &[String]) -> AppResult<()> {
    let dates = parse_dates(raw_dates)?;
    st.store.delete_dates(&dates).await?;
    info!(count = dates.len(), "dates deleted");
    Ok(())
}

pub async fn delete_date(st: &AppState, raw_date: &str) -> AppResult<()> {
    delete_dates(st, &[raw_date.to_string()]).await
}

#[cfg(test)]
mod calendar_tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::repo_types::NewDish;
    use crate::store::MemoryStore;
    use time::macros::date;

    fn dish(name: &str) -> NewDish {
        NewDish {
            dish_name: name.into(),
            dish_type: "main".into(),
            ..NewDish::default()
        }
    }

    #[test]
    fn week_window_is_monday_to_friday() {
        assert_eq!(
            week_window(date!(2025 - 01 - 15)),
            (date!(2025 - 01 - 13), date!(2025 - 01 - 17))
        );
        assert_eq!(
            week_window(date!(2025 - 01 - 13)),
            (date!(2025 - 01 - 13), date!(2025 - 01 - 17))
        );
        // Sunday belongs to the week that started six days earlier.
        assert_eq!(
            week_window(date!(2025 - 01 - 19)),
            (date!(2025 - 01 - 13), date!(2025 - 01 - 17))
        );
    }

    #[test]
    fn parse_dates_rejects_empty_and_malformed() {
        assert!(matches!(parse_dates(&[]), Err(AppError::Validation(_))));
        assert!(matches!(
            parse_dates(&["2025-13-01".into()]),
            Err(AppError::Validation(_))
        ));
        assert_eq!(
            parse_dates(&["2025-01-13".into(), "2025-01-13".into()]).unwrap(),
            vec![date!(2025 - 01 - 13)]
        );
        assert_eq!(
            parse_date_list(&["2025-01-14".into(), "2025-01-13".into(), "2025-01-14".into()])
                .unwrap(),
            vec![date!(2025 - 01 - 14), date!(2025 - 01 - 13), date!(2025 - 01 - 14)]
        );
        assert!(matches!(parse_date_list(&[]), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn week_includes_only_the_work_week() {
        let st = AppState::fake_on(date!(2025 - 01 - 20));
        let soup = st.store.create_dish(&dish("Soup")).await.unwrap();
        st.store
            .assign_dish(
                soup.dish_id,
                &[
                    date!(2025 - 01 - 12),
                    date!(2025 - 01 - 13),
                    date!(2025 - 01 - 17),
                    date!(2025 - 01 - 18),
                ],
            )
            .await
            .unwrap();

        let week = week_of(&st, Some("2025-01-15")).await.unwrap();
        assert_eq!((week.start, week.end), (date!(2025 - 01 - 13), date!(2025 - 01 - 17)));
        let dates: Vec<Date> = week.dishes.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date!(2025 - 01 - 13), date!(2025 - 01 - 17)]);
        assert!(week.dishes.iter().all(|d| d.average_rating.is_none()));
    }

    #[tokio::test]
    async fn malformed_week_date_falls_back_to_today() {
        let st = AppState::fake_on(date!(2025 - 01 - 22));
        let week = week_of(&st, Some("not-a-date")).await.unwrap();
        assert_eq!((week.start, week.end), (date!(2025 - 01 - 20), date!(2025 - 01 - 24)));
    }

    #[tokio::test]
    async fn week_skips_rows_without_parent_date() {
        let memory = Arc::new(MemoryStore::new());
        let st = AppState::fake_with(memory.clone(), date!(2025 - 01 - 20));
        let soup = st.store.create_dish(&dish("Soup")).await.unwrap();
        let kept = st
            .store
            .assign_dish(soup.dish_id, &[date!(2025 - 01 - 14)])
            .await
            .unwrap();
        memory
            .insert_orphan_assignment(date!(2025 - 01 - 15), soup.dish_id)
            .await;

        let week = week_of(&st, Some("2025-01-15")).await.unwrap();
        assert_eq!(week.dishes.len(), 1);
        assert_eq!(week.dishes[0].date_has_dish_id, kept[0].date_has_dish_id);
    }

    #[tokio::test]
    async fn day_reports_attendance_and_rejects_bad_dates() {
        let st = AppState::fake_on(date!(2025 - 01 - 15));

        let empty = day_of(&st, None).await.unwrap();
        assert_eq!(empty.date, date!(2025 - 01 - 15));
        assert!(empty.dishes.is_empty());
        assert_eq!(empty.attendance, None);

        let soup = st.store.create_dish(&dish("Soup")).await.unwrap();
        st.store
            .assign_dish(soup.dish_id, &[date!(2025 - 01 - 15)])
            .await
            .unwrap();
        st.store
            .increment_attendance(&[date!(2025 - 01 - 15)])
            .await
            .unwrap();

        let day = day_of(&st, Some("2025-01-15")).await.unwrap();
        assert_eq!(day.dishes.len(), 1);
        assert_eq!(day.dishes[0].dish.dish_name, "Soup");
        assert_eq!(day.attendance, Some(1));

        assert!(matches!(
            day_of(&st, Some("15/01/2025")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn delete_dates_is_atomic() {
        let st = AppState::fake_on(date!(2025 - 01 - 20));
        let soup = st.store.create_dish(&dish("Soup")).await.unwrap();
        st.store
            .assign_dish(soup.dish_id, &[date!(2025 - 01 - 13)])
            .await
            .unwrap();

        let err = delete_dates(&st, &["2025-01-13".into(), "2025-01-14".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(st.store.get_date(date!(2025 - 01 - 13)).await.unwrap().is_some());

        delete_date(&st, "2025-01-13").await.unwrap();
        assert!(st.store.get_date(date!(2025 - 01 - 13)).await.unwrap().is_none());
        assert!(st
            .store
            .find_assignments(AssignmentFilter::On(date!(2025 - 01 - 13)))
            .await
            .unwrap()
            .is_empty());
    }
}
