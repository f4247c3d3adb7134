use serde::{Deserialize, Serialize};
use time::Date;

use crate::calendar::dto::ymd;
use crate::store::repo_types::{DateHasDish, DateSaved};

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub dates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AttendanceView {
    #[serde(with = "ymd")]
    pub date: Date,
    pub attendance: i32,
}

impl From<DateSaved> for AttendanceView {
    fn from(d: DateSaved) -> Self {
        Self {
            date: d.date_saved,
            attendance: d.attendance,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddRatingRequest {
    pub date_has_dish_id: i32,
    pub rating: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRatingRequest {
    pub date_has_dish_id: i32,
    pub old_rating: i32,
    pub new_rating: i32,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRatingRequest {
    pub date_has_dish_id: i32,
    pub rating: i32,
}

/// Current rating aggregate of one assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    pub date_has_dish_id: i32,
    pub rating_sum: i32,
    pub rating_count: i32,
    pub average_rating: Option<f64>,
}

impl From<DateHasDish> for AggregateSnapshot {
    fn from(row: DateHasDish) -> Self {
        Self {
            average_rating: row.average_rating(),
            date_has_dish_id: row.date_has_dish_id,
            rating_sum: row.rating_sum,
            rating_count: row.rating_count,
        }
    }
}
