use serde::{Deserialize, Serialize};

use crate::calendar::dto::{AssignmentView, YmdDate};
use crate::store::repo_types::{Dish, DishPatch, NewDish};

/// Body of `POST /dishes`: either a new dish or the id of an existing one,
/// plus the days to schedule it on.
#[derive(Debug, Deserialize)]
pub struct CreateDishRequest {
    pub dish: Option<NewDish>,
    pub dish_id: Option<i32>,
    #[serde(default)]
    pub dates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedDishResponse {
    pub dish: Dish,
    pub assignments: Vec<AssignmentView>,
}

#[derive(Debug, Serialize)]
pub struct DishDetails {
    pub dish: Dish,
    pub dates: Vec<YmdDate>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDishRequest {
    pub dish: DishPatch,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub dates: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDishesRequest {
    pub dish_ids: Vec<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UnassignRequest {
    pub date_has_dish_ids: Vec<i32>,
}
