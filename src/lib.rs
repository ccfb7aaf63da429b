pub mod error;
pub mod filter;
pub mod profile;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use error::{GenerationError, ProfileError};
pub use filter::{filter_candidates, suggest};
pub use profile::{Parameters, UserProfile};

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
pub struct UserId(pub String);
impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl UserId {
    /// Reads an `Authorization` header value, with or without the `Bearer ` scheme.
    pub fn from_token(token: impl AsRef<str>) -> Option<Self> {
        let token = token.as_ref().trim();
        let token = match token.strip_prefix("Bearer") {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim_start(),
            _ => token,
        };
        if token.is_empty() {
            return None;
        }
        Some(Self(token.to_string()))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Dessert,
}
impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "Breakfast",
            MealType::Lunch => "Lunch",
            MealType::Dinner => "Dinner",
            MealType::Snack => "Snack",
            MealType::Dessert => "Dessert",
        }
    }
}
impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for MealType {
    type Err = GenerationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(MealType::Breakfast),
            "lunch" => Ok(MealType::Lunch),
            "dinner" => Ok(MealType::Dinner),
            "snack" => Ok(MealType::Snack),
            "dessert" => Ok(MealType::Dessert),
            _ => Err(GenerationError::invalid(format!("unknown meal type `{}`", s.trim()))),
        }
    }
}
impl TryFrom<String> for MealType {
    type Error = GenerationError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MealCandidate {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ingredients: Vec<String>,
    #[serde(default, deserialize_with = "blank_meal_type")]
    pub meal_type: Option<MealType>,
    #[serde(default, deserialize_with = "blank_string")]
    pub cuisine: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dietary: Vec<String>,
}
impl MealCandidate {
    pub fn new(name: impl Into<String>, ingredients: &[&str]) -> Self {
        Self {
            name: name.into(),
            ingredients: ingredients.iter().map(|i| i.to_string()).collect(),
            ..Default::default()
        }
    }
    pub fn with_meal_type(mut self, meal_type: MealType) -> Self {
        self.meal_type = Some(meal_type);
        self
    }
    pub fn with_cuisine(mut self, cuisine: impl Into<String>) -> Self {
        self.cuisine = Some(cuisine.into());
        self
    }
    pub fn with_dietary(mut self, tags: &[&str]) -> Self {
        self.dietary = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Ingredients a user owns, grouped by category.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(transparent)]
pub struct Pantry(pub BTreeMap<String, Vec<String>>);
impl Pantry {
    pub fn ingredients(&self) -> impl Iterator<Item = &str> {
        self.0.values().flatten().map(String::as_str)
    }
    pub fn contains(&self, ingredient: &str) -> bool {
        let wanted = filter::normalize(ingredient);
        self.ingredients().any(|owned| filter::normalize(owned) == wanted)
    }
    pub fn is_empty(&self) -> bool {
        self.ingredients().next().is_none()
    }
}
impl TryFrom<Value> for Pantry {
    type Error = GenerationError;
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(categories) = value else {
            return Err(GenerationError::invalid("ingredient inventory must map categories to lists"));
        };
        let mut pantry = BTreeMap::new();
        for (category, items) in categories {
            let items = items.as_array().ok_or_else(|| {
                GenerationError::invalid(format!("ingredient category `{category}` is not a list"))
            })?;
            let items = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        GenerationError::invalid(format!("ingredient category `{category}` holds a non-string item"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            pantry.insert(category, clean(items));
        }
        Ok(Pantry(pantry))
    }
}

/// A single string or a list of strings; the web frontend sends both shapes for dietary requirements.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}
impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(one) => clean(vec![one]),
            OneOrMany::Many(many) => clean(many),
        }
    }
}

/// Optional categorical constraints. Blank values mean "no constraint".
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationFilters {
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub dietary_requirements: Option<OneOrMany>,
}
impl GenerationFilters {
    pub fn meal_type(&self) -> Result<Option<MealType>, GenerationError> {
        match self.meal_type.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(meal_type) => meal_type.parse().map(Some),
        }
    }
    pub fn cuisine(&self) -> Option<String> {
        self.cuisine
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }
    pub fn dietary_requirements(&self) -> Option<Vec<String>> {
        self.dietary_requirements
            .clone()
            .map(OneOrMany::into_vec)
            .filter(|d| !d.is_empty())
    }
}

/// The generation body as it arrives over the wire, before validation.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPayload {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub favourite_meals: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub generated_meals: Vec<String>,
    #[serde(default)]
    pub ingredients: Option<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub disliked_ingredients: Vec<String>,
    #[serde(flatten)]
    pub filters: GenerationFilters,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GenerationRequest {
    pub favourite_meals: Vec<String>,
    pub generated_meals: Vec<String>,
    pub pantry: Pantry,
    pub disliked_ingredients: Vec<String>,
    pub meal_type: Option<MealType>,
    pub cuisine: Option<String>,
    pub dietary_requirements: Vec<String>,
}
impl TryFrom<GenerationPayload> for GenerationRequest {
    type Error = GenerationError;
    fn try_from(payload: GenerationPayload) -> Result<Self, Self::Error> {
        let pantry = match payload.ingredients {
            Some(inventory) => Pantry::try_from(inventory)?,
            None => return Err(GenerationError::invalid("ingredient inventory is missing")),
        };
        Ok(Self {
            meal_type: payload.filters.meal_type()?,
            cuisine: payload.filters.cuisine(),
            dietary_requirements: payload.filters.dietary_requirements().unwrap_or_default(),
            favourite_meals: clean(payload.favourite_meals),
            generated_meals: clean(payload.generated_meals),
            disliked_ingredients: clean(payload.disliked_ingredients),
            pantry,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MealSuggestion {
    #[serde(flatten)]
    pub meal: MealCandidate,
    pub missing_ingredients: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct GenerationResponse {
    pub meals: Vec<MealSuggestion>,
}
impl GenerationResponse {
    pub fn names(&self) -> Vec<&str> {
        self.meals.iter().map(|m| m.meal.name.as_str()).collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngredientData {
    pub ingredients: Vec<String>,
    pub disliked_ingredients: Vec<String>,
}
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct IngredientsBody {
    pub ingredients: Option<Vec<String>>,
}
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DislikedBody {
    pub disliked_ingredients: Option<Vec<String>>,
}
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DislikedAdd {
    pub disliked_ingredient_to_add: Option<OneOrMany>,
}
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DislikedRemove {
    pub disliked_ingredient_to_remove: Option<String>,
}
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct MealBody {
    pub meal: Option<String>,
}
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

/// Trims every entry and drops the blank ones.
pub(crate) fn clean(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn blank_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

pub(crate) fn blank_meal_type<'de, D>(deserializer: D) -> Result<Option<MealType>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(meal_type) => meal_type.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
