//! Meal candidate selection.
//!
//! A candidate survives when it avoids every disliked ingredient, has not been
//! suggested before, and matches each categorical filter the request sets.
//! Survivors keep their input order; nothing is scored.
use std::collections::HashSet;

use tracing::trace;

use crate::{GenerationRequest, MealCandidate, MealSuggestion, Pantry};

/// Key used for every ingredient and meal name comparison.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn normalized_set<'a>(names: impl IntoIterator<Item = &'a String>) -> HashSet<String> {
    names
        .into_iter()
        .map(|name| normalize(name))
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn filter_candidates(request: &GenerationRequest, candidates: &[MealCandidate]) -> Vec<MealCandidate> {
    let disliked = normalized_set(&request.disliked_ingredients);
    let history = normalized_set(&request.generated_meals);

    candidates
        .iter()
        .filter(|candidate| {
            let eligible = avoids_disliked(candidate, &disliked)
                && !history.contains(&normalize(&candidate.name))
                && matches_filters(candidate, request);
            trace!(meal = %candidate.name, eligible, "filtered candidate");
            eligible
        })
        .cloned()
        .collect()
}

/// Filters, then notes which required ingredients the pantry lacks.
pub fn suggest(request: &GenerationRequest, candidates: &[MealCandidate]) -> Vec<MealSuggestion> {
    filter_candidates(request, candidates)
        .into_iter()
        .map(|meal| MealSuggestion {
            missing_ingredients: missing_ingredients(&request.pantry, &meal),
            meal,
        })
        .collect()
}

pub fn missing_ingredients(pantry: &Pantry, meal: &MealCandidate) -> Vec<String> {
    let owned = pantry.ingredients().map(normalize).collect::<HashSet<_>>();
    meal.ingredients
        .iter()
        .filter(|ingredient| !owned.contains(&normalize(ingredient)))
        .cloned()
        .collect()
}

fn avoids_disliked(candidate: &MealCandidate, disliked: &HashSet<String>) -> bool {
    candidate
        .ingredients
        .iter()
        .all(|ingredient| !disliked.contains(&normalize(ingredient)))
}

fn matches_filters(candidate: &MealCandidate, request: &GenerationRequest) -> bool {
    if let Some(meal_type) = request.meal_type {
        if candidate.meal_type != Some(meal_type) {
            return false;
        }
    }
    if let Some(cuisine) = request.cuisine.as_deref().map(str::trim) {
        if candidate.cuisine.as_deref().map(str::trim) != Some(cuisine) {
            return false;
        }
    }
    request.dietary_requirements.iter().all(|requirement| {
        candidate
            .dietary
            .iter()
            .any(|tag| tag.trim() == requirement.trim())
    })
}
