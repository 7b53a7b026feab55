use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PROTEIN_TARGET: f64 = 150.0;
pub const DEFAULT_CARBS_TARGET: f64 = 200.0;
pub const DEFAULT_FATS_TARGET: f64 = 60.0;

/// Whole-recipe macro estimate. Derived, never authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NutritionEstimate {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fats: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionGoals {
    pub user_id: Uuid,
    pub protein_target: f64,
    pub carbs_target: f64,
    pub fats_target: f64,
    pub calories_target: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl NutritionGoals {
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            protein_target: DEFAULT_PROTEIN_TARGET,
            carbs_target: DEFAULT_CARBS_TARGET,
            fats_target: DEFAULT_FATS_TARGET,
            calories_target: None,
            updated_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, update: &GoalsUpdate) {
        if let Some(v) = update.protein_target {
            self.protein_target = v;
        }
        if let Some(v) = update.carbs_target {
            self.carbs_target = v;
        }
        if let Some(v) = update.fats_target {
            self.fats_target = v;
        }
        if let Some(v) = update.calories_target {
            self.calories_target = Some(v);
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalsUpdate {
    #[serde(default)]
    pub protein_target: Option<f64>,
    #[serde(default)]
    pub carbs_target: Option<f64>,
    #[serde(default)]
    pub fats_target: Option<f64>,
    #[serde(default)]
    pub calories_target: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyIntake {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub protein_consumed: f64,
    pub carbs_consumed: f64,
    pub fats_consumed: f64,
    pub calories_consumed: Option<f64>,
}

impl DailyIntake {
    pub fn empty(user_id: Uuid, date: NaiveDate) -> Self {
        Self {
            user_id,
            date,
            protein_consumed: 0.0,
            carbs_consumed: 0.0,
            fats_consumed: 0.0,
            calories_consumed: None,
        }
    }

    pub fn add(&mut self, meal: &NewMeal) {
        self.protein_consumed += meal.protein;
        self.carbs_consumed += meal.carbs;
        self.fats_consumed += meal.fats;
        if let Some(cal) = meal.calories {
            self.calories_consumed = Some(self.calories_consumed.unwrap_or(0.0) + cal);
        }
    }

    /// Remaining macros for the day. Negative values mean the target was exceeded.
    pub fn gap(&self, goals: &NutritionGoals) -> MacroGap {
        MacroGap {
            protein: goals.protein_target - self.protein_consumed,
            carbs: goals.carbs_target - self.carbs_consumed,
            fats: goals.fats_target - self.fats_consumed,
            calories: goals
                .calories_target
                .map(|t| t - self.calories_consumed.unwrap_or(0.0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroGap {
    pub protein: f64,
    pub carbs: f64,
    pub fats: f64,
    pub calories: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeal {
    pub user_id: Uuid,
    #[serde(default)]
    pub recipe_id: Option<Uuid>,
    pub meal_name: String,
    #[serde(default)]
    pub servings: Option<f64>,
    pub protein: f64,
    pub carbs: f64,
    pub fats: f64,
    #[serde(default)]
    pub calories: Option<f64>,
    /// Defaults to now; decides which day's intake the meal counts towards.
    #[serde(default)]
    pub consumed_at: Option<DateTime<Utc>>,
}

impl NewMeal {
    pub fn validate(&self) -> Result<(), String> {
        if self.meal_name.trim().is_empty() {
            return Err("meal_name is required".to_string());
        }
        let macros = [self.protein, self.carbs, self.fats];
        if macros.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err("macros must be non-negative numbers".to_string());
        }
        if self.calories.is_some_and(|c| !c.is_finite() || c < 0.0) {
            return Err("calories must be a non-negative number".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipe_id: Option<Uuid>,
    pub meal_name: String,
    pub servings: Option<f64>,
    pub protein_consumed: f64,
    pub carbs_consumed: f64,
    pub fats_consumed: f64,
    pub calories_consumed: Option<f64>,
    pub consumed_at: DateTime<Utc>,
}
