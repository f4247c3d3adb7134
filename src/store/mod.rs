//! Storage seam for dishes, calendar days and their assignments.
//!
//! Every counter mutation is a single conditional update executed by the
//! store, and every batch operation either applies completely or not at all.

use async_trait::async_trait;
use time::Date;

use crate::error::AppResult;

mod memory;
mod pg;
pub mod repo_types;

pub use memory::MemoryStore;
pub use pg::PgStore;
use repo_types::{DateHasDish, DateSaved, Dish, DishPatch, NewDish};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentFilter {
    On(Date),
    /// Inclusive on both ends.
    Between(Date, Date),
}

impl AssignmentFilter {
    fn matches(&self, date: Date) -> bool {
        match *self {
            AssignmentFilter::On(day) => date == day,
            AssignmentFilter::Between(start, end) => start <= date && date <= end,
        }
    }
}

#[async_trait]
pub trait MenuStore: Send + Sync {
    async fn create_dish(&self, dish: &NewDish) -> AppResult<Dish>;
    async fn get_dish(&self, dish_id: i32) -> AppResult<Option<Dish>>;
    async fn get_dishes(&self, dish_ids: &[i32]) -> AppResult<Vec<Dish>>;
    /// Case-insensitive substring match on the dish name, ordered by id.
    async fn search_dishes(&self, name: &str) -> AppResult<Vec<Dish>>;
    /// Refused with `Conflict` while the dish is scheduled on any day.
    async fn update_dish(&self, dish_id: i32, patch: &DishPatch) -> AppResult<Dish>;
    /// Fails with `NotFound` or `Conflict` on the first offending id; nothing is deleted then.
    async fn delete_dishes(&self, dish_ids: &[i32]) -> AppResult<()>;
    /// Days the dish is scheduled on, newest first.
    async fn dish_dates(&self, dish_id: i32) -> AppResult<Vec<Date>>;

    async fn get_date(&self, date: Date) -> AppResult<Option<DateSaved>>;
    async fn dates_between(&self, start: Date, end: Date) -> AppResult<Vec<DateSaved>>;
    /// Deletes each day together with its assignments.
    async fn delete_dates(&self, dates: &[Date]) -> AppResult<()>;

    /// Get-or-creates each day and the (day, dish) pair; existing pairs are returned untouched.
    async fn assign_dish(&self, dish_id: i32, dates: &[Date]) -> AppResult<Vec<DateHasDish>>;
    async fn get_assignment(&self, date_has_dish_id: i32) -> AppResult<Option<DateHasDish>>;
    /// Ordered by date, then id.
    async fn find_assignments(&self, filter: AssignmentFilter) -> AppResult<Vec<DateHasDish>>;
    async fn delete_assignments(&self, date_has_dish_ids: &[i32]) -> AppResult<()>;

    /// Get-or-creates each day and adds one to its attendance.
    async fn increment_attendance(&self, dates: &[Date]) -> AppResult<Vec<DateSaved>>;
    /// `NotFound` for an unknown day, `InvalidState` when a counter is already zero.
    async fn decrement_attendance(&self, dates: &[Date]) -> AppResult<Vec<DateSaved>>;
    /// Adds the deltas to `rating_sum` and `rating_count` in one statement,
    /// provided at least `min_count` ratings are recorded. Returns `None` when the
    /// row is missing, holds fewer ratings, or either aggregate would go negative.
    async fn apply_rating_delta(
        &self,
        date_has_dish_id: i32,
        sum_delta: i32,
        count_delta: i32,
        min_count: i32,
    ) -> AppResult<Option<DateHasDish>>;
}
