use serde::{Deserialize, Serialize};
use time::Date;

use crate::store::repo_types::{DateHasDish, Dish};

/// Serializes a [`Date`] as `YYYY-MM-DD`.
pub mod ymd {
    use serde::Serializer;
    use time::Date;

    use crate::calendar::services::DATE_FORMAT;

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        let text = date.format(DATE_FORMAT).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&text)
    }
}

/// A bare date that serializes as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YmdDate(#[serde(with = "ymd")] pub Date);

/// One dish scheduled on one day, with its rating aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    pub date_has_dish_id: i32,
    pub dish: Dish,
    #[serde(with = "ymd")]
    pub date: Date,
    pub quantity: Option<i32>,
    pub rating_sum: i32,
    pub rating_count: i32,
    pub average_rating: Option<f64>,
}

impl AssignmentView {
    pub fn new(row: DateHasDish, dish: Dish) -> Self {
        Self {
            average_rating: row.average_rating(),
            date_has_dish_id: row.date_has_dish_id,
            dish,
            date: row.date,
            quantity: row.quantity,
            rating_sum: row.rating_sum,
            rating_count: row.rating_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WeekView {
    #[serde(with = "ymd")]
    pub start: Date,
    #[serde(with = "ymd")]
    pub end: Date,
    pub dishes: Vec<AssignmentView>,
}

#[derive(Debug, Serialize)]
pub struct DayView {
    #[serde(with = "ymd")]
    pub date: Date,
    pub dishes: Vec<AssignmentView>,
    pub attendance: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDatesRequest {
    pub dates: Vec<String>,
}
