use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::Date;

use super::repo_types::{DateHasDish, DateSaved, Dish, DishPatch, NewDish};
use super::{AssignmentFilter, MenuStore};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        Ok(Self { db })
    }
}

/// Escapes LIKE wildcards so user input only ever matches literally.
fn like_pattern(name: &str) -> String {
    let escaped = name
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl MenuStore for PgStore {
    async fn create_dish(&self, dish: &NewDish) -> AppResult<Dish> {
        let row = sqlx::query_as::<_, Dish>(
            r#"
            INSERT INTO dish (dish_name, dish_description, dish_type, dish_calories,
                              light_healthy, sugar_free)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING dish_id, dish_name, dish_description, dish_type, dish_calories,
                      light_healthy, sugar_free
            "#,
        )
        .bind(&dish.dish_name)
        .bind(&dish.dish_description)
        .bind(&dish.dish_type)
        .bind(dish.dish_calories)
        .bind(dish.light_healthy)
        .bind(dish.sugar_free)
        .fetch_one(&self.db)
        .await
        .context("insert dish")?;
        Ok(row)
    }

    async fn get_dish(&self, dish_id: i32) -> AppResult<Option<Dish>> {
        let row = sqlx::query_as::<_, Dish>(
            r#"
            SELECT dish_id, dish_name, dish_description, dish_type, dish_calories,
                   light_healthy, sugar_free
              FROM dish
             WHERE dish_id = $1
            "#,
        )
        .bind(dish_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn get_dishes(&self, dish_ids: &[i32]) -> AppResult<Vec<Dish>> {
        let rows = sqlx::query_as::<_, Dish>(
            r#"
            SELECT dish_id, dish_name, dish_description, dish_type, dish_calories,
                   light_healthy, sugar_free
              FROM dish
             WHERE dish_id = ANY($1)
             ORDER BY dish_id
            "#,
        )
        .bind(dish_ids.to_vec())
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn search_dishes(&self, name: &str) -> AppResult<Vec<Dish>> {
        let rows = sqlx::query_as::<_, Dish>(
            r#"
            SELECT dish_id, dish_name, dish_description, dish_type, dish_calories,
                   light_healthy, sugar_free
              FROM dish
             WHERE dish_name ILIKE $1
             ORDER BY dish_id
            "#,
        )
        .bind(like_pattern(name))
        .fetch_all(&self.db)
        .await
        .context("search dishes")?;
        Ok(rows)
    }

    async fn update_dish(&self, dish_id: i32, patch: &DishPatch) -> AppResult<Dish> {
        let mut tx = self.db.begin().await?;

        let assigned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM date_has_dish WHERE dish_id = $1)",
        )
        .bind(dish_id)
        .fetch_one(&mut *tx)
        .await?;
        if assigned {
            return Err(AppError::Conflict(format!(
                "dish {dish_id} is scheduled and cannot be changed"
            )));
        }

        let row = sqlx::query_as::<_, Dish>(
            r#"
            UPDATE dish
               SET dish_name        = COALESCE($2, dish_name),
                   dish_description = CASE WHEN $8 THEN $3 ELSE dish_description END,
                   dish_type        = COALESCE($4, dish_type),
                   dish_calories    = COALESCE($5, dish_calories),
                   light_healthy    = COALESCE($6, light_healthy),
                   sugar_free       = COALESCE($7, sugar_free)
             WHERE dish_id = $1
            RETURNING dish_id, dish_name, dish_description, dish_type, dish_calories,
                      light_healthy, sugar_free
            "#,
        )
        .bind(dish_id)
        .bind(&patch.dish_name)
        .bind(patch.dish_description.clone().flatten())
        .bind(&patch.dish_type)
        .bind(patch.dish_calories)
        .bind(patch.light_healthy)
        .bind(patch.sugar_free)
        .bind(patch.dish_description.is_some())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("dish {dish_id} not found")))?;

        tx.commit().await.context("commit dish update")?;
        Ok(row)
    }

    async fn delete_dishes(&self, dish_ids: &[i32]) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        for &dish_id in dish_ids {
            let assigned: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM date_has_dish WHERE dish_id = $1)",
            )
            .bind(dish_id)
            .fetch_one(&mut *tx)
            .await?;
            if assigned {
                return Err(AppError::Conflict(format!(
                    "dish {dish_id} is still scheduled and cannot be deleted"
                )));
            }

            let deleted = sqlx::query("DELETE FROM dish WHERE dish_id = $1")
                .bind(dish_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if deleted == 0 {
                return Err(AppError::NotFound(format!("dish {dish_id} not found")));
            }
        }
        tx.commit().await.context("commit dish deletion")?;
        Ok(())
    }

    async fn dish_dates(&self, dish_id: i32) -> AppResult<Vec<Date>> {
        let dates = sqlx::query_scalar::<_, Date>(
            "SELECT date FROM date_has_dish WHERE dish_id = $1 ORDER BY date DESC",
        )
        .bind(dish_id)
        .fetch_all(&self.db)
        .await?;
        Ok(dates)
    }

    async fn get_date(&self, date: Date) -> AppResult<Option<DateSaved>> {
        let row = sqlx::query_as::<_, DateSaved>(
            "SELECT date_saved, attendance FROM date_saved WHERE date_saved = $1",
        )
        .bind(date)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn dates_between(&self, start: Date, end: Date) -> AppResult<Vec<DateSaved>> {
        let rows = sqlx::query_as::<_, DateSaved>(
            r#"
            SELECT date_saved, attendance
              FROM date_saved
             WHERE date_saved BETWEEN $1 AND $2
             ORDER BY date_saved
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn delete_dates(&self, dates: &[Date]) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        for &date in dates {
            sqlx::query("DELETE FROM date_has_dish WHERE date = $1")
                .bind(date)
                .execute(&mut *tx)
                .await?;
            let deleted = sqlx::query("DELETE FROM date_saved WHERE date_saved = $1")
                .bind(date)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if deleted == 0 {
                return Err(AppError::NotFound(format!("date {date} not found")));
            }
        }
        tx.commit().await.context("commit date deletion")?;
        Ok(())
    }

    async fn assign_dish(&self, dish_id: i32, dates: &[Date]) -> AppResult<Vec<DateHasDish>> {
        let mut tx = self.db.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM dish WHERE dish_id = $1)")
                .bind(dish_id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(AppError::NotFound(format!("dish {dish_id} not found")));
        }

        let mut rows = Vec::with_capacity(dates.len());
        for &date in dates {
            sqlx::query(
                r#"
                INSERT INTO date_saved (date_saved, attendance)
                VALUES ($1, 0)
                ON CONFLICT (date_saved) DO NOTHING
                "#,
            )
            .bind(date)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO date_has_dish (date, dish_id, quantity)
                VALUES ($1, $2, NULL)
                ON CONFLICT (date, dish_id) DO NOTHING
                "#,
            )
            .bind(date)
            .bind(dish_id)
            .execute(&mut *tx)
            .await?;

            let row = sqlx::query_as::<_, DateHasDish>(
                r#"
                SELECT date_has_dish_id, date, dish_id, quantity, rating_sum, rating_count
                  FROM date_has_dish
                 WHERE date = $1 AND dish_id = $2
                "#,
            )
            .bind(date)
            .bind(dish_id)
            .fetch_one(&mut *tx)
            .await?;
            rows.push(row);
        }

        tx.commit().await.context("commit assignment")?;
        Ok(rows)
    }

    async fn get_assignment(&self, date_has_dish_id: i32) -> AppResult<Option<DateHasDish>> {
        let row = sqlx::query_as::<_, DateHasDish>(
            r#"
            SELECT date_has_dish_id, date, dish_id, quantity, rating_sum, rating_count
              FROM date_has_dish
             WHERE date_has_dish_id = $1
            "#,
        )
        .bind(date_has_dish_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_assignments(&self, filter: AssignmentFilter) -> AppResult<Vec<DateHasDish>> {
        let (start, end) = match filter {
            AssignmentFilter::On(day) => (day, day),
            AssignmentFilter::Between(start, end) => (start, end),
        };
        let rows = sqlx::query_as::<_, DateHasDish>(
            r#"
            SELECT date_has_dish_id, date, dish_id, quantity, rating_sum, rating_count
              FROM date_has_dish
             WHERE date BETWEEN $1 AND $2
             ORDER BY date, date_has_dish_id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn delete_assignments(&self, date_has_dish_ids: &[i32]) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        for &id in date_has_dish_ids {
            let deleted = sqlx::query("DELETE FROM date_has_dish WHERE date_has_dish_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if deleted == 0 {
                return Err(AppError::NotFound(format!("assignment {id} not found")));
            }
        }
        tx.commit().await.context("commit unassign")?;
        Ok(())
    }

    async fn increment_attendance(&self, dates: &[Date]) -> AppResult<Vec<DateSaved>> {
        let mut tx = self.db.begin().await?;
        let mut rows = Vec::with_capacity(dates.len());
        for &date in dates {
            let row = sqlx::query_as::<_, DateSaved>(
                r#"
                INSERT INTO date_saved (date_saved, attendance)
                VALUES ($1, 1)
                ON CONFLICT (date_saved)
                DO UPDATE SET attendance = date_saved.attendance + 1
                RETURNING date_saved, attendance
                "#,
            )
            .bind(date)
            .fetch_one(&mut *tx)
            .await?;
            rows.push(row);
        }
        tx.commit().await.context("commit attendance increment")?;
        Ok(rows)
    }

    async fn decrement_attendance(&self, dates: &[Date]) -> AppResult<Vec<DateSaved>> {
        let mut tx = self.db.begin().await?;
        let mut rows = Vec::with_capacity(dates.len());
        for &date in dates {
            let row = sqlx::query_as::<_, DateSaved>(
                r#"
                UPDATE date_saved
                   SET attendance = attendance - 1
                 WHERE date_saved = $1 AND attendance > 0
                RETURNING date_saved, attendance
                "#,
            )
            .bind(date)
            .fetch_optional(&mut *tx)
            .await?;

            match row {
                Some(row) => rows.push(row),
                None => {
                    let exists: bool = sqlx::query_scalar(
                        "SELECT EXISTS (SELECT 1 FROM date_saved WHERE date_saved = $1)",
                    )
                    .bind(date)
                    .fetch_one(&mut *tx)
                    .await?;
                    return Err(if exists {
                        AppError::InvalidState(format!("attendance is already 0 for {date}"))
                    } else {
                        AppError::NotFound(format!("date {date} not found"))
                    });
                }
            }
        }
        tx.commit().await.context("commit attendance decrement")?;
        Ok(rows)
    }

    async fn apply_rating_delta(
        &self,
        date_has_dish_id: i32,
        sum_delta: i32,
        count_delta: i32,
        min_count: i32,
    ) -> AppResult<Option<DateHasDish>> {
        let row = sqlx::query_as::<_, DateHasDish>(
            r#"
            UPDATE date_has_dish
               SET rating_sum   = rating_sum + $2,
                   rating_count = rating_count + $3
             WHERE date_has_dish_id = $1
               AND rating_sum + $2 >= 0
               AND rating_count + $3 >= 0
               AND rating_count >= $4
            RETURNING date_has_dish_id, date, dish_id, quantity, rating_sum, rating_count
            "#,
        )
        .bind(date_has_dish_id)
        .bind(sum_delta)
        .bind(count_delta)
        .bind(min_count)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod pg_store_tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("soup"), "%soup%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
