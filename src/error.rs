use thiserror::Error;

/// Failures of a generation call. An empty suggestion list is not one of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Meal source unavailable: {0}")]
    UpstreamUnavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Ingredient name is blank")]
    BlankIngredient,

    #[error("Meal name is blank")]
    BlankMeal,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl GenerationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
