use std::collections::BTreeMap;

use async_trait::async_trait;
use time::Date;
use tokio::sync::Mutex;

use super::repo_types::{DateHasDish, DateSaved, Dish, DishPatch, NewDish};
use super::{AssignmentFilter, MenuStore};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct Tables {
    dishes: BTreeMap<i32, Dish>,
    dates: BTreeMap<Date, DateSaved>,
    assignments: BTreeMap<i32, DateHasDish>,
    last_dish_id: i32,
    last_assignment_id: i32,
}

impl Tables {
    fn is_assigned(&self, dish_id: i32) -> bool {
        self.assignments.values().any(|a| a.dish_id == dish_id)
    }

    fn date_or_default(&mut self, date: Date) -> &mut DateSaved {
        self.dates.entry(date).or_insert(DateSaved {
            date_saved: date,
            attendance: 0,
        })
    }
}

/// Store kept in process memory. Each call holds the lock for its whole
/// duration and works on a draft that only replaces the tables on success.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.lock().await;
        f(&tables)
    }

    async fn transact<T>(&self, f: impl FnOnce(&mut Tables) -> AppResult<T>) -> AppResult<T> {
        let mut tables = self.tables.lock().await;
        let mut draft = tables.clone();
        let out = f(&mut draft)?;
        *tables = draft;
        Ok(out)
    }

    /// Inserts an assignment row without touching its parent day.
    #[cfg(test)]
    pub(crate) async fn insert_orphan_assignment(&self, date: Date, dish_id: i32) -> i32 {
        let mut tables = self.tables.lock().await;
        tables.last_assignment_id += 1;
        let id = tables.last_assignment_id;
        tables.assignments.insert(
            id,
            DateHasDish {
                date_has_dish_id: id,
                date,
                dish_id,
                quantity: None,
                rating_sum: 0,
                rating_count: 0,
            },
        );
        id
    }
}

#[async_trait]
impl MenuStore for MemoryStore {
    async fn create_dish(&self, dish: &NewDish) -> AppResult<Dish> {
        self.transact(|t| {
            t.last_dish_id += 1;
            let row = Dish {
                dish_id: t.last_dish_id,
                dish_name: dish.dish_name.clone(),
                dish_description: dish.dish_description.clone(),
                dish_type: dish.dish_type.clone(),
                dish_calories: dish.dish_calories,
                light_healthy: dish.light_healthy,
                sugar_free: dish.sugar_free,
            };
            t.dishes.insert(row.dish_id, row.clone());
            Ok(row)
        })
        .await
    }

    async fn get_dish(&self, dish_id: i32) -> AppResult<Option<Dish>> {
        Ok(self.read(|t| t.dishes.get(&dish_id).cloned()).await)
    }

    async fn get_dishes(&self, dish_ids: &[i32]) -> AppResult<Vec<Dish>> {
        Ok(self
            .read(|t| {
                t.dishes
                    .values()
                    .filter(|d| dish_ids.contains(&d.dish_id))
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn search_dishes(&self, name: &str) -> AppResult<Vec<Dish>> {
        let needle = name.to_lowercase();
        Ok(self
            .read(|t| {
                t.dishes
                    .values()
                    .filter(|d| d.dish_name.to_lowercase().contains(&needle))
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn update_dish(&self, dish_id: i32, patch: &DishPatch) -> AppResult<Dish> {
        self.transact(|t| {
            if t.is_assigned(dish_id) {
                return Err(AppError::Conflict(format!(
                    "dish {dish_id} is scheduled and cannot be changed"
                )));
            }
            let dish = t
                .dishes
                .get_mut(&dish_id)
                .ok_or_else(|| AppError::NotFound(format!("dish {dish_id} not found")))?;
            if let Some(v) = &patch.dish_name {
                dish.dish_name = v.clone();
            }
            if let Some(v) = &patch.dish_description {
                dish.dish_description = v.clone();
            }
            if let Some(v) = &patch.dish_type {
                dish.dish_type = v.clone();
            }
            if let Some(v) = patch.dish_calories {
                dish.dish_calories = Some(v);
            }
            if let Some(v) = patch.light_healthy {
                dish.light_healthy = Some(v);
            }
            if let Some(v) = patch.sugar_free {
                dish.sugar_free = Some(v);
            }
            Ok(dish.clone())
        })
        .await
    }

    async fn delete_dishes(&self, dish_ids: &[i32]) -> AppResult<()> {
        self.transact(|t| {
            for &dish_id in dish_ids {
                if t.dishes.remove(&dish_id).is_none() {
                    return Err(AppError::NotFound(format!("dish {dish_id} not found")));
                }
                if t.is_assigned(dish_id) {
                    return Err(AppError::Conflict(format!(
                        "dish {dish_id} is still scheduled and cannot be deleted"
                    )));
                }
            }
            Ok(())
        })
        .await
    }

    async fn dish_dates(&self, dish_id: i32) -> AppResult<Vec<Date>> {
        let mut dates: Vec<Date> = self
            .read(|t| {
                t.assignments
                    .values()
                    .filter(|a| a.dish_id == dish_id)
                    .map(|a| a.date)
                    .collect()
            })
            .await;
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    async fn get_date(&self, date: Date) -> AppResult<Option<DateSaved>> {
        Ok(self.read(|t| t.dates.get(&date).cloned()).await)
    }

    async fn dates_between(&self, start: Date, end: Date) -> AppResult<Vec<DateSaved>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .read(|t| t.dates.range(start..=end).map(|(_, d)| d.clone()).collect())
            .await)
    }

    async fn delete_dates(&self, dates: &[Date]) -> AppResult<()> {
        self.transact(|t| {
            for &date in dates {
                if t.dates.remove(&date).is_none() {
                    return Err(AppError::NotFound(format!("date {date} not found")));
                }
                t.assignments.retain(|_, a| a.date != date);
            }
            Ok(())
        })
        .await
    }

    async fn assign_dish(&self, dish_id: i32, dates: &[Date]) -> AppResult<Vec<DateHasDish>> {
        self.transact(|t| {
            if !t.dishes.contains_key(&dish_id) {
                return Err(AppError::NotFound(format!("dish {dish_id} not found")));
            }
            let mut rows = Vec::with_capacity(dates.len());
            for &date in dates {
                t.date_or_default(date);
                let existing = t
                    .assignments
                    .values()
                    .find(|a| a.date == date && a.dish_id == dish_id)
                    .cloned();
                let row = match existing {
                    Some(row) => row,
                    None => {
                        t.last_assignment_id += 1;
                        let row = DateHasDish {
                            date_has_dish_id: t.last_assignment_id,
                            date,
                            dish_id,
                            quantity: None,
                            rating_sum: 0,
                            rating_count: 0,
                        };
                        t.assignments.insert(row.date_has_dish_id, row.clone());
                        row
                    }
                };
                rows.push(row);
            }
            Ok(rows)
        })
        .await
    }

    async fn get_assignment(&self, date_has_dish_id: i32) -> AppResult<Option<DateHasDish>> {
        Ok(self
            .read(|t| t.assignments.get(&date_has_dish_id).cloned())
            .await)
    }

    async fn find_assignments(&self, filter: AssignmentFilter) -> AppResult<Vec<DateHasDish>> {
        let mut rows: Vec<DateHasDish> = self
            .read(|t| {
                t.assignments
                    .values()
                    .filter(|a| filter.matches(a.date))
                    .cloned()
                    .collect()
            })
            .await;
        rows.sort_by_key(|a| (a.date, a.date_has_dish_id));
        Ok(rows)
    }

    async fn delete_assignments(&self, date_has_dish_ids: &[i32]) -> AppResult<()> {
        self.transact(|t| {
            for &id in date_has_dish_ids {
                if t.assignments.remove(&id).is_none() {
                    return Err(AppError::NotFound(format!("assignment {id} not found")));
                }
            }
            Ok(())
        })
        .await
    }

    async fn increment_attendance(&self, dates: &[Date]) -> AppResult<Vec<DateSaved>> {
        self.transact(|t| {
            let mut rows = Vec::with_capacity(dates.len());
            for &date in dates {
                let row = t.date_or_default(date);
                row.attendance += 1;
                rows.push(row.clone());
            }
            Ok(rows)
        })
        .await
    }

    async fn decrement_attendance(&self, dates: &[Date]) -> AppResult<Vec<DateSaved>> {
        self.transact(|t| {
            let mut rows = Vec::with_capacity(dates.len());
            for &date in dates {
                let row = t
                    .dates
                    .get_mut(&date)
                    .ok_or_else(|| AppError::NotFound(format!("date {date} not found")))?;
                if row.attendance <= 0 {
                    return Err(AppError::InvalidState(format!(
                        "attendance is already 0 for {date}"
                    )));
                }
                row.attendance -= 1;
                rows.push(row.clone());
            }
            Ok(rows)
        })
        .await
    }

    async fn apply_rating_delta(
        &self,
        date_has_dish_id: i32,
        sum_delta: i32,
        count_delta: i32,
        min_count: i32,
    ) -> AppResult<Option<DateHasDish>> {
        self.transact(|t| {
            let Some(row) = t.assignments.get_mut(&date_has_dish_id) else {
                return Ok(None);
            };
            let sum = row.rating_sum + sum_delta;
            let count = row.rating_count + count_delta;
            if row.rating_count < min_count || sum < 0 || count < 0 {
                return Ok(None);
            }
            row.rating_sum = sum;
            row.rating_count = count;
            Ok(Some(row.clone()))
        })
        .await
    }
}

#[cfg(test)]
mod memory_store_tests {
    use super::*;
    use time::macros::date;

    fn soup() -> NewDish {
        NewDish {
            dish_name: "Tomato soup".into(),
            dish_type: "soup".into(),
            ..NewDish::default()
        }
    }

    #[tokio::test]
    async fn assign_is_idempotent_per_pair() {
        let store = MemoryStore::new();
        let dish = store.create_dish(&soup()).await.unwrap();
        let day = date!(2025 - 01 - 15);

        let first = store.assign_dish(dish.dish_id, &[day]).await.unwrap();
        let second = store.assign_dish(dish.dish_id, &[day]).await.unwrap();

        assert_eq!(first, second);
        let rows = store.find_assignments(AssignmentFilter::On(day)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.get_date(day).await.unwrap().unwrap().attendance, 0);
    }

    #[tokio::test]
    async fn failed_batch_leaves_tables_untouched() {
        let store = MemoryStore::new();
        let dish = store.create_dish(&soup()).await.unwrap();
        let rows = store
            .assign_dish(dish.dish_id, &[date!(2025 - 01 - 13), date!(2025 - 01 - 14)])
            .await
            .unwrap();

        let err = store
            .delete_assignments(&[rows[0].date_has_dish_id, 999])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.contains("999")));
        assert!(store
            .get_assignment(rows[0].date_has_dish_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn deleting_a_date_cascades() {
        let store = MemoryStore::new();
        let dish = store.create_dish(&soup()).await.unwrap();
        let day = date!(2025 - 01 - 13);
        let rows = store.assign_dish(dish.dish_id, &[day]).await.unwrap();

        store.delete_dates(&[day]).await.unwrap();

        assert!(store.get_date(day).await.unwrap().is_none());
        assert!(store
            .get_assignment(rows[0].date_has_dish_id)
            .await
            .unwrap()
            .is_none());
        assert!(store.get_dish(dish.dish_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn decrement_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let (a, b) = (date!(2025 - 01 - 13), date!(2025 - 01 - 14));
        store.increment_attendance(&[a]).await.unwrap();

        let err = store.decrement_attendance(&[a, b]).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(store.get_date(a).await.unwrap().unwrap().attendance, 1);

        let err = store.decrement_attendance(&[a, a]).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(store.get_date(a).await.unwrap().unwrap().attendance, 1);
    }

    #[tokio::test]
    async fn rating_delta_refuses_negative_aggregates() {
        let store = MemoryStore::new();
        let dish = store.create_dish(&soup()).await.unwrap();
        let id = store
            .assign_dish(dish.dish_id, &[date!(2025 - 01 - 13)])
            .await
            .unwrap()[0]
            .date_has_dish_id;

        assert!(store.apply_rating_delta(id, -3, -1, 0).await.unwrap().is_none());
        let row = store.apply_rating_delta(id, 4, 1, 0).await.unwrap().unwrap();
        assert_eq!((row.rating_sum, row.rating_count), (4, 1));
        assert!(store.apply_rating_delta(404, 1, 1, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rating_delta_requires_min_count() {
        let store = MemoryStore::new();
        let dish = store.create_dish(&soup()).await.unwrap();
        let id = store
            .assign_dish(dish.dish_id, &[date!(2025 - 01 - 13)])
            .await
            .unwrap()[0]
            .date_has_dish_id;

        // a zero shift must still be refused while nothing is recorded
        assert!(store.apply_rating_delta(id, 0, 0, 1).await.unwrap().is_none());
        let row = store.get_assignment(id).await.unwrap().unwrap();
        assert_eq!((row.rating_sum, row.rating_count), (0, 0));

        store.apply_rating_delta(id, 3, 1, 0).await.unwrap().unwrap();
        let row = store.apply_rating_delta(id, 2, 0, 1).await.unwrap().unwrap();
        assert_eq!((row.rating_sum, row.rating_count), (5, 1));
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let store = MemoryStore::new();
        store.create_dish(&soup()).await.unwrap();
        store
            .create_dish(&NewDish {
                dish_name: "Apple pie".into(),
                dish_type: "dessert".into(),
                ..NewDish::default()
            })
            .await
            .unwrap();

        let hits = store.search_dishes("TOMATO").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].dish_name, "Tomato soup");
        assert_eq!(store.search_dishes("").await.unwrap().len(), 2);
    }
}
