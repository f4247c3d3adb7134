use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use time::Date;

/// A row from the `dish` table.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Dish {
    pub dish_id: i32,
    pub dish_name: String,
    pub dish_description: Option<String>,
    pub dish_type: String,
    pub dish_calories: Option<i32>,
    pub light_healthy: Option<bool>,
    pub sugar_free: Option<bool>,
}

/// Attributes of a dish that does not exist yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDish {
    pub dish_name: String,
    pub dish_description: Option<String>,
    pub dish_type: String,
    pub dish_calories: Option<i32>,
    pub light_healthy: Option<bool>,
    pub sugar_free: Option<bool>,
}

/// Partial update of a dish. Absent fields keep their stored value.
/// `dish_description` is the one clearable field: `Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DishPatch {
    pub dish_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub dish_description: Option<Option<String>>,
    pub dish_type: Option<String>,
    pub dish_calories: Option<i32>,
    pub light_healthy: Option<bool>,
    pub sugar_free: Option<bool>,
}

/// Marks a field that was sent, so an explicit `null` differs from an absent key.
fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// A row from the `date_saved` table: one per calendar day that has been referenced.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DateSaved {
    pub date_saved: Date,
    pub attendance: i32,
}

/// A row from the `date_has_dish` table: a dish scheduled on a day.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DateHasDish {
    pub date_has_dish_id: i32,
    pub date: Date,
    pub dish_id: i32,
    pub quantity: Option<i32>,
    pub rating_sum: i32,
    pub rating_count: i32,
}

impl DateHasDish {
    pub fn average_rating(&self) -> Option<f64> {
        if self.rating_count == 0 {
            return None;
        }
        Some(f64::from(self.rating_sum) / f64::from(self.rating_count))
    }
}
