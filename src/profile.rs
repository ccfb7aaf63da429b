use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::filter::normalize;
use crate::{
    clean, GenerationError, GenerationFilters, GenerationRequest, MealType, Pantry, ProfileError, UserId,
};

/// Category the owned ingredients are filed under when a profile is turned into a pantry.
pub const PANTRY_CATEGORY: &str = "Pantry";

fn one_person() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    #[serde(default = "one_person")]
    pub number_of_people: u32,
    #[serde(default, deserialize_with = "crate::blank_meal_type")]
    pub meal_type: Option<MealType>,
    #[serde(default, deserialize_with = "crate::blank_string")]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub dietary_requirements: Vec<String>,
}
impl Default for Parameters {
    fn default() -> Self {
        Self {
            number_of_people: one_person(),
            meal_type: None,
            cuisine: None,
            dietary_requirements: Vec::new(),
        }
    }
}

/// The stored user document.
///
/// Owned and disliked ingredients never overlap: whichever list was written
/// last claims the ingredient.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub favourite_meals: Vec<String>,
    #[serde(default)]
    pub generated_meals: Vec<String>,
    #[serde(default)]
    pub ingredients: BTreeSet<String>,
    #[serde(default)]
    pub disliked_ingredients: BTreeSet<String>,
    #[serde(default)]
    pub parameters: Parameters,
}

impl UserProfile {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            favourite_meals: Vec::new(),
            generated_meals: Vec::new(),
            ingredients: BTreeSet::new(),
            disliked_ingredients: BTreeSet::new(),
            parameters: Parameters::default(),
        }
    }

    pub fn set_ingredients(&mut self, ingredients: Vec<String>) {
        self.ingredients = dedup(ingredients);
        remove_all(&mut self.disliked_ingredients, &self.ingredients);
    }

    pub fn set_disliked(&mut self, disliked: Vec<String>) {
        self.disliked_ingredients = dedup(disliked);
        remove_all(&mut self.ingredients, &self.disliked_ingredients);
    }

    pub fn add_disliked(&mut self, ingredient: &str) -> Result<(), ProfileError> {
        let ingredient = ingredient.trim();
        if ingredient.is_empty() {
            return Err(ProfileError::BlankIngredient);
        }
        let key = normalize(ingredient);
        self.disliked_ingredients.retain(|d| normalize(d) != key);
        self.disliked_ingredients.insert(ingredient.to_string());
        self.ingredients.retain(|i| normalize(i) != key);
        Ok(())
    }

    /// Returns whether anything was removed.
    pub fn remove_disliked(&mut self, ingredient: &str) -> Result<bool, ProfileError> {
        let key = normalize(ingredient);
        if key.is_empty() {
            return Err(ProfileError::BlankIngredient);
        }
        let before = self.disliked_ingredients.len();
        self.disliked_ingredients.retain(|d| normalize(d) != key);
        Ok(self.disliked_ingredients.len() != before)
    }

    pub fn add_favourite(&mut self, meal: &str) -> Result<(), ProfileError> {
        let meal = meal.trim();
        if meal.is_empty() {
            return Err(ProfileError::BlankMeal);
        }
        let key = normalize(meal);
        if !self.favourite_meals.iter().any(|m| normalize(m) == key) {
            self.favourite_meals.push(meal.to_string());
        }
        Ok(())
    }

    pub fn remove_favourite(&mut self, meal: &str) -> Result<bool, ProfileError> {
        let key = normalize(meal);
        if key.is_empty() {
            return Err(ProfileError::BlankMeal);
        }
        let before = self.favourite_meals.len();
        self.favourite_meals.retain(|m| normalize(m) != key);
        Ok(self.favourite_meals.len() != before)
    }

    /// History is append-only; repeats are recorded as they happen.
    pub fn record_generated(&mut self, meal: &str) {
        self.generated_meals.push(meal.to_string());
    }

    pub fn set_parameters(&mut self, parameters: Parameters) -> Result<(), ProfileError> {
        if parameters.number_of_people == 0 {
            return Err(ProfileError::InvalidParameters(
                "numberOfPeople must be at least 1".to_string(),
            ));
        }
        self.parameters = Parameters {
            dietary_requirements: clean(parameters.dietary_requirements),
            ..parameters
        };
        Ok(())
    }

    pub fn pantry(&self) -> Pantry {
        Pantry(BTreeMap::from([(
            PANTRY_CATEGORY.to_string(),
            self.ingredients.iter().cloned().collect(),
        )]))
    }

    /// Snapshot of this profile as a generation request. Blank filters fall
    /// back to the stored parameters.
    pub fn generation_request(&self, filters: &GenerationFilters) -> Result<GenerationRequest, GenerationError> {
        Ok(GenerationRequest {
            favourite_meals: self.favourite_meals.clone(),
            generated_meals: self.generated_meals.clone(),
            pantry: self.pantry(),
            disliked_ingredients: self.disliked_ingredients.iter().cloned().collect(),
            meal_type: filters.meal_type()?.or(self.parameters.meal_type),
            cuisine: filters.cuisine().or_else(|| self.parameters.cuisine.clone()),
            dietary_requirements: filters
                .dietary_requirements()
                .unwrap_or_else(|| self.parameters.dietary_requirements.clone()),
        })
    }
}

/// Keeps the first spelling of each case-insensitively distinct name.
fn dedup(items: Vec<String>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    clean(items)
        .into_iter()
        .filter(|item| seen.insert(normalize(item)))
        .collect()
}

fn remove_all(set: &mut BTreeSet<String>, other: &BTreeSet<String>) {
    let other = other.iter().map(|o| normalize(o)).collect::<BTreeSet<_>>();
    set.retain(|item| !other.contains(&normalize(item)));
}
