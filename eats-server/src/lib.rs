use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use eats_common::{
    suggest, ErrorBody, GenerationError, GenerationFilters, GenerationRequest, GenerationResponse, ProfileError,
    UserId,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sled::Db;
use tokio::signal;
use tracing::{debug, error, info, warn};

pub mod catalogue;
pub mod config;
pub mod identity;
pub mod users;

use catalogue::MealSource;
use config::Config;
use identity::{bearer, IdentityProvider, TokenAsUserId};
use users::Users;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    Upstream(String),
    Internal(anyhow::Error),
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Missing or invalid authorization".to_string()),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Upstream(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            AppError::Internal(err) => {
                error!("Request failed: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Something went wrong: {err}"))
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

// This enables using `?` on anything that converts into `anyhow::Error`. Domain
// errors from the common crate keep their meaning; everything else is a 500.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        if let Some(generation) = err.downcast_ref::<GenerationError>() {
            return match generation {
                GenerationError::InvalidRequest(message) => Self::BadRequest(message.clone()),
                GenerationError::UpstreamUnavailable(message) => Self::Upstream(message.clone()),
            };
        }
        if let Some(profile) = err.downcast_ref::<ProfileError>() {
            return Self::BadRequest(profile.to_string());
        }
        Self::Internal(err)
    }
}

fn missing(field: &str) -> AppError {
    AppError::BadRequest(format!("Missing `{field}`"))
}

type JsonBody = std::result::Result<Json<Value>, JsonRejection>;

/// Bodies are taken as raw JSON and decoded here, so that unreadable JSON and
/// mistyped fields both come back as a 400 with an error body.
fn parse<T: DeserializeOwned>(body: JsonBody) -> Result<T> {
    let Json(value) = body.map_err(|rejection| AppError::BadRequest(rejection.to_string()))?;
    serde_json::from_value(value).map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))
}

#[derive(Clone)]
pub struct State {
    _db: Db,
    users: Users,
    identity: Arc<dyn IdentityProvider>,
    meals: Arc<dyn MealSource>,
}
impl State {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let db = sled::open(&config.db_path)
            .with_context(|| format!("Error opening database at {}", config.db_path.display()))?;
        Self::from_parts(db, catalogue::from_config(config)?)
    }
    /// Backed by a temporary database that disappears with the last clone.
    pub fn in_memory(meals: Arc<dyn MealSource>) -> anyhow::Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_parts(db, meals)
    }
    fn from_parts(db: Db, meals: Arc<dyn MealSource>) -> anyhow::Result<Self> {
        Ok(Self {
            users: Users::new(&db)?,
            _db: db,
            identity: Arc::new(TokenAsUserId),
            meals,
        })
    }
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }
    pub fn authorise(&self, headers: &HeaderMap) -> Result<UserId> {
        bearer(headers)
            .and_then(|token| self.identity.resolve(token))
            .ok_or_else(|| {
                warn!("Rejected request without a usable authorization header");
                AppError::Unauthorized
            })
    }
    pub fn generate(&self, request: &GenerationRequest, limit: Option<usize>) -> Result<GenerationResponse> {
        let candidates = self.meals.candidates()?;
        let mut meals = suggest(request, &candidates);
        if let Some(limit) = limit {
            meals.truncate(limit);
        }
        debug!(candidates = candidates.len(), returned = meals.len(), "Generated suggestions");
        Ok(GenerationResponse { meals })
    }

    /// Suggests from the user's stored profile and appends the top pick to
    /// their history. The read, the pick and the write happen in one
    /// compare-and-swap, so concurrent calls never hand out the same meal.
    pub fn generate_for(&self, id: &UserId, filters: &GenerationFilters, limit: Option<usize>) -> Result<GenerationResponse> {
        self.users.try_user_mut(id, |user| {
            let response = self.generate(&user.generation_request(filters)?, limit)?;
            if let Some(first) = response.meals.first() {
                user.record_generated(&first.meal.name);
            }
            Ok(response)
        })
    }
}

pub fn app(state: State) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/users", post(users_api::create_user).get(users_api::get_user))
        .route("/api/users/ingredients", get(users_api::get_ingredients).put(users_api::put_ingredients))
        .route("/api/users/ingredients/disliked", get(users_api::get_disliked).put(users_api::put_disliked))
        .route("/api/users/ingredients/disliked/add", put(users_api::add_disliked))
        .route("/api/users/ingredients/disliked/remove", put(users_api::remove_disliked))
        .route("/api/users/meals/favourites", get(users_api::get_favourites))
        .route("/api/users/meals/favourites/add", put(users_api::add_favourite))
        .route("/api/users/meals/favourites/remove", put(users_api::remove_favourite))
        .route("/api/users/meals/generated", get(users_api::get_generated))
        .route("/api/users/parameters", get(users_api::get_parameters).put(users_api::put_parameters))
        .route(
            "/api/generation/basicStrict",
            get(generation_api::basic_strict).post(generation_api::basic_strict),
        )
        .route("/api/generation/profile", post(generation_api::for_profile))
        .layer(Extension(state))
}

pub async fn serve(
    listener: TcpListener,
    state: State,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    info!("Listening on {}", listener.local_addr()?);
    axum::Server::from_tcp(listener)?
        .serve(app(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn root() -> &'static str {
    "Intelligent Eats"
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

mod users_api {
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use eats_common::{
        DislikedAdd, DislikedBody, DislikedRemove, IngredientData, IngredientsBody, MealBody, Parameters,
        ProfileError, UserProfile,
    };
    use tracing::{debug, info};

    use super::{missing, parse, JsonBody};
    use crate::{Result, State};

    pub async fn create_user(Extension(state): Extension<State>, headers: HeaderMap) -> Result<impl IntoResponse> {
        let profile = UserProfile::new(state.authorise(&headers)?);
        state.users.create(&profile)?;
        info!(user = %profile.id, "Created user");
        Ok((StatusCode::CREATED, Json(profile)))
    }

    pub async fn get_user(Extension(state): Extension<State>, headers: HeaderMap) -> Result<Json<UserProfile>> {
        Ok(Json(state.users.user(&state.authorise(&headers)?)?))
    }

    pub async fn get_ingredients(Extension(state): Extension<State>, headers: HeaderMap) -> Result<Json<IngredientData>> {
        let profile = state.users.user(&state.authorise(&headers)?)?;
        Ok(Json(IngredientData {
            ingredients: profile.ingredients.into_iter().collect(),
            disliked_ingredients: profile.disliked_ingredients.into_iter().collect(),
        }))
    }

    pub async fn put_ingredients(
        Extension(state): Extension<State>,
        headers: HeaderMap,
        body: JsonBody,
    ) -> Result<StatusCode> {
        let id = state.authorise(&headers)?;
        let body: IngredientsBody = parse(body)?;
        let ingredients = body.ingredients.ok_or_else(|| missing("ingredients"))?;
        state.users.user_mut(&id, |user| user.set_ingredients(ingredients.clone()))?;
        debug!(user = %id, "Replaced ingredients");
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn get_disliked(Extension(state): Extension<State>, headers: HeaderMap) -> Result<Json<Vec<String>>> {
        let profile = state.users.user(&state.authorise(&headers)?)?;
        Ok(Json(profile.disliked_ingredients.into_iter().collect()))
    }

    pub async fn put_disliked(
        Extension(state): Extension<State>,
        headers: HeaderMap,
        body: JsonBody,
    ) -> Result<StatusCode> {
        let id = state.authorise(&headers)?;
        let body: DislikedBody = parse(body)?;
        let disliked = body.disliked_ingredients.ok_or_else(|| missing("dislikedIngredients"))?;
        state.users.user_mut(&id, |user| user.set_disliked(disliked.clone()))?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn add_disliked(
        Extension(state): Extension<State>,
        headers: HeaderMap,
        body: JsonBody,
    ) -> Result<StatusCode> {
        let id = state.authorise(&headers)?;
        let body: DislikedAdd = parse(body)?;
        let ingredients = body
            .disliked_ingredient_to_add
            .ok_or_else(|| missing("dislikedIngredientToAdd"))?
            .into_vec();
        if ingredients.is_empty() {
            return Err(ProfileError::BlankIngredient.into());
        }
        state.users.try_user_mut(&id, |user| {
            ingredients.iter().try_for_each(|ingredient| user.add_disliked(ingredient))?;
            Ok(())
        })?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn remove_disliked(
        Extension(state): Extension<State>,
        headers: HeaderMap,
        body: JsonBody,
    ) -> Result<StatusCode> {
        let id = state.authorise(&headers)?;
        let body: DislikedRemove = parse(body)?;
        let ingredient = body
            .disliked_ingredient_to_remove
            .ok_or_else(|| missing("dislikedIngredientToRemove"))?;
        let removed = state.users.try_user_mut(&id, |user| Ok(user.remove_disliked(&ingredient)?))?;
        debug!(user = %id, removed, "Removed disliked ingredient");
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn get_favourites(Extension(state): Extension<State>, headers: HeaderMap) -> Result<Json<Vec<String>>> {
        Ok(Json(state.users.user(&state.authorise(&headers)?)?.favourite_meals))
    }

    pub async fn add_favourite(
        Extension(state): Extension<State>,
        headers: HeaderMap,
        body: JsonBody,
    ) -> Result<StatusCode> {
        let id = state.authorise(&headers)?;
        let body: MealBody = parse(body)?;
        let meal = body.meal.ok_or_else(|| missing("meal"))?;
        state.users.try_user_mut(&id, |user| Ok(user.add_favourite(&meal)?))?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn remove_favourite(
        Extension(state): Extension<State>,
        headers: HeaderMap,
        body: JsonBody,
    ) -> Result<StatusCode> {
        let id = state.authorise(&headers)?;
        let body: MealBody = parse(body)?;
        let meal = body.meal.ok_or_else(|| missing("meal"))?;
        state.users.try_user_mut(&id, |user| Ok(user.remove_favourite(&meal)?))?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn get_generated(Extension(state): Extension<State>, headers: HeaderMap) -> Result<Json<Vec<String>>> {
        Ok(Json(state.users.user(&state.authorise(&headers)?)?.generated_meals))
    }

    pub async fn get_parameters(Extension(state): Extension<State>, headers: HeaderMap) -> Result<Json<Parameters>> {
        Ok(Json(state.users.user(&state.authorise(&headers)?)?.parameters))
    }

    pub async fn put_parameters(
        Extension(state): Extension<State>,
        headers: HeaderMap,
        body: JsonBody,
    ) -> Result<StatusCode> {
        let id = state.authorise(&headers)?;
        let parameters: Parameters = parse(body)?;
        state
            .users
            .try_user_mut(&id, |user| Ok(user.set_parameters(parameters.clone())?))?;
        Ok(StatusCode::NO_CONTENT)
    }
}

mod generation_api {
    use axum::body::Bytes;
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::{Extension, Json};
    use eats_common::{GenerationFilters, GenerationPayload, GenerationRequest, GenerationResponse};
    use serde::Deserialize;
    use tracing::debug;

    use super::{parse, JsonBody};
    use crate::{AppError, Result, State};

    #[derive(Debug, Default, Deserialize)]
    pub struct Page {
        limit: Option<usize>,
    }

    pub async fn basic_strict(
        Extension(state): Extension<State>,
        Query(page): Query<Page>,
        body: JsonBody,
    ) -> Result<Json<GenerationResponse>> {
        let payload: GenerationPayload = parse(body)?;
        let request = GenerationRequest::try_from(payload)?;
        Ok(Json(state.generate(&request, page.limit)?))
    }

    /// An empty body means no filters; anything else must decode.
    pub async fn for_profile(
        Extension(state): Extension<State>,
        headers: HeaderMap,
        Query(page): Query<Page>,
        body: Bytes,
    ) -> Result<Json<GenerationResponse>> {
        let id = state.authorise(&headers)?;
        let filters: GenerationFilters = if body.iter().all(u8::is_ascii_whitespace) {
            GenerationFilters::default()
        } else {
            serde_json::from_slice(&body)
                .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?
        };
        let response = state.generate_for(&id, &filters, page.limit)?;
        if let Some(first) = response.meals.first() {
            debug!(user = %id, meal = %first.meal.name, "Recorded generated meal");
        }
        Ok(Json(response))
    }
}
