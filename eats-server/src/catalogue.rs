use std::{fs, path::PathBuf, sync::Arc};

use anyhow::Context;
use eats_common::{GenerationError, MealCandidate};
use tracing::{info, warn};

use crate::config::Config;

const BUNDLED_MEALS: &str = include_str!("../meals.json");

/// Where generation gets its candidate meals from.
pub trait MealSource: Send + Sync {
    fn candidates(&self) -> Result<Vec<MealCandidate>, GenerationError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticMeals(Arc<Vec<MealCandidate>>);

impl StaticMeals {
    pub fn new(meals: Vec<MealCandidate>) -> Self {
        Self(Arc::new(meals))
    }

    pub fn bundled() -> anyhow::Result<Self> {
        let meals: Vec<MealCandidate> =
            serde_json::from_str(BUNDLED_MEALS).context("Error parsing bundled meal catalogue")?;
        Ok(Self::new(meals))
    }
}

impl MealSource for StaticMeals {
    fn candidates(&self) -> Result<Vec<MealCandidate>, GenerationError> {
        Ok(self.0.as_ref().clone())
    }
}

/// A catalogue file read on every request, so edits show up without a restart.
#[derive(Debug, Clone)]
pub struct MealFile {
    path: PathBuf,
}

impl MealFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MealSource for MealFile {
    fn candidates(&self) -> Result<Vec<MealCandidate>, GenerationError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            warn!("Failed to read meal catalogue {}: {e}", self.path.display());
            GenerationError::UpstreamUnavailable(format!("meal catalogue {} unreadable", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            warn!("Failed to parse meal catalogue {}: {e}", self.path.display());
            GenerationError::UpstreamUnavailable(format!("meal catalogue {} is malformed", self.path.display()))
        })
    }
}

pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn MealSource>> {
    Ok(match &config.meals_path {
        Some(path) => {
            info!("Serving meals from {}", path.display());
            Arc::new(MealFile::new(path))
        }
        None => {
            info!("EATS_MEALS_PATH not set, serving bundled meals");
            Arc::new(StaticMeals::bundled()?)
        }
    })
}
