use anyhow::{bail, Result};
use eats_common::ErrorBody;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response};

#[derive(Eq, PartialEq, Hash, Clone, Debug)]
pub struct Url(pub String);
impl Url {
    fn join(&self, path: &str) -> String {
        String::from(self.0.trim_end_matches('/')) + path
    }
}

/// A server plus the bearer token the identity provider issued for one user.
#[derive(Clone, Debug)]
pub struct Account {
    pub server: Url,
    pub token: String,
}
impl AsRef<Account> for Account {
    fn as_ref(&self) -> &Account {
        self
    }
}
impl Account {
    pub fn new(server: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server: Url(server.into()),
            token: token.into(),
        }
    }
    fn url(&self, path: &str) -> String {
        self.server.join(path)
    }
    fn authorised(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bearer {}", self.token))
    }
}

async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => String::from("no error body"),
    };
    bail!("{status}: {message}")
}

pub mod client {
    use anyhow::Result;
    use eats_common::{
        DislikedAdd, DislikedBody, DislikedRemove, GenerationFilters, GenerationPayload, GenerationResponse,
        IngredientData, IngredientsBody, MealBody, OneOrMany, Parameters, UserProfile,
    };
    use reqwest::Client;
    use serde::de::DeserializeOwned;

    use crate::{checked, Account, Url};

    async fn fetch<T: DeserializeOwned>(client: &Client, account: &Account, path: &str) -> Result<T> {
        Ok(checked(account.authorised(client.get(account.url(path))).send().await?)
            .await?
            .json::<T>()
            .await?)
    }

    pub async fn health(client: &Client, server: &Url) -> Result<()> {
        checked(client.get(server.join("/health")).send().await?).await?;
        Ok(())
    }
    pub async fn create_user(client: &Client, account: impl AsRef<Account>) -> Result<UserProfile> {
        let account = account.as_ref();
        Ok(checked(account.authorised(client.post(account.url("/api/users"))).send().await?)
            .await?
            .json::<_>()
            .await?)
    }
    pub async fn get_user(client: &Client, account: impl AsRef<Account>) -> Result<UserProfile> {
        fetch(client, account.as_ref(), "/api/users").await
    }
    pub async fn get_ingredients(client: &Client, account: impl AsRef<Account>) -> Result<IngredientData> {
        fetch(client, account.as_ref(), "/api/users/ingredients").await
    }
    pub async fn set_ingredients(client: &Client, account: impl AsRef<Account>, ingredients: Vec<String>) -> Result<()> {
        let account = account.as_ref();
        checked(account
            .authorised(client.put(account.url("/api/users/ingredients")))
            .json(&IngredientsBody { ingredients: Some(ingredients) })
            .send()
            .await?)
        .await?;
        Ok(())
    }
    pub async fn get_disliked(client: &Client, account: impl AsRef<Account>) -> Result<Vec<String>> {
        fetch(client, account.as_ref(), "/api/users/ingredients/disliked").await
    }
    pub async fn set_disliked(client: &Client, account: impl AsRef<Account>, disliked: Vec<String>) -> Result<()> {
        let account = account.as_ref();
        checked(account
            .authorised(client.put(account.url("/api/users/ingredients/disliked")))
            .json(&DislikedBody { disliked_ingredients: Some(disliked) })
            .send()
            .await?)
        .await?;
        Ok(())
    }
    pub async fn add_disliked(client: &Client, account: impl AsRef<Account>, ingredient: &str) -> Result<()> {
        let account = account.as_ref();
        checked(account
            .authorised(client.put(account.url("/api/users/ingredients/disliked/add")))
            .json(&DislikedAdd { disliked_ingredient_to_add: Some(OneOrMany::One(ingredient.to_string())) })
            .send()
            .await?)
        .await?;
        Ok(())
    }
    pub async fn remove_disliked(client: &Client, account: impl AsRef<Account>, ingredient: &str) -> Result<()> {
        let account = account.as_ref();
        checked(account
            .authorised(client.put(account.url("/api/users/ingredients/disliked/remove")))
            .json(&DislikedRemove { disliked_ingredient_to_remove: Some(ingredient.to_string()) })
            .send()
            .await?)
        .await?;
        Ok(())
    }
    pub async fn get_favourites(client: &Client, account: impl AsRef<Account>) -> Result<Vec<String>> {
        fetch(client, account.as_ref(), "/api/users/meals/favourites").await
    }
    pub async fn add_favourite(client: &Client, account: impl AsRef<Account>, meal: &str) -> Result<()> {
        let account = account.as_ref();
        checked(account
            .authorised(client.put(account.url("/api/users/meals/favourites/add")))
            .json(&MealBody { meal: Some(meal.to_string()) })
            .send()
            .await?)
        .await?;
        Ok(())
    }
    pub async fn remove_favourite(client: &Client, account: impl AsRef<Account>, meal: &str) -> Result<()> {
        let account = account.as_ref();
        checked(account
            .authorised(client.put(account.url("/api/users/meals/favourites/remove")))
            .json(&MealBody { meal: Some(meal.to_string()) })
            .send()
            .await?)
        .await?;
        Ok(())
    }
    pub async fn get_generated(client: &Client, account: impl AsRef<Account>) -> Result<Vec<String>> {
        fetch(client, account.as_ref(), "/api/users/meals/generated").await
    }
    pub async fn get_parameters(client: &Client, account: impl AsRef<Account>) -> Result<Parameters> {
        fetch(client, account.as_ref(), "/api/users/parameters").await
    }
    pub async fn set_parameters(client: &Client, account: impl AsRef<Account>, parameters: &Parameters) -> Result<()> {
        let account = account.as_ref();
        checked(account
            .authorised(client.put(account.url("/api/users/parameters")))
            .json(parameters)
            .send()
            .await?)
        .await?;
        Ok(())
    }
    /// Stateless generation: everything the filter needs travels in `payload`.
    pub async fn generate(
        client: &Client,
        server: &Url,
        payload: &GenerationPayload,
        limit: Option<usize>,
    ) -> Result<GenerationResponse> {
        let mut request = client.post(server.join("/api/generation/basicStrict")).json(payload);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        Ok(checked(request.send().await?).await?.json::<_>().await?)
    }
    pub async fn generate_for_profile(
        client: &Client,
        account: impl AsRef<Account>,
        filters: &GenerationFilters,
        limit: Option<usize>,
    ) -> Result<GenerationResponse> {
        let account = account.as_ref();
        let mut request = account
            .authorised(client.post(account.url("/api/generation/profile")))
            .json(filters);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        Ok(checked(request.send().await?).await?.json::<_>().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::Arc;

    use anyhow::Context;
    use eats_common::{GenerationFilters, GenerationPayload, MealType, Parameters};
    use eats_server::catalogue::StaticMeals;
    use eats_server::State;
    use reqwest::Client;
    use serde_json::json;
    use tokio::task::JoinHandle;

    use super::client::*;
    use super::{Account, Url};

    pub struct ServerRunner(JoinHandle<anyhow::Result<()>>);
    impl Drop for ServerRunner {
        fn drop(&mut self) {
            self.0.abort();
        }
    }

    fn start_server() -> anyhow::Result<(ServerRunner, Url)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let state = State::in_memory(Arc::new(StaticMeals::bundled()?))?;
        let handle = tokio::spawn(eats_server::serve(listener, state, std::future::pending::<()>()));
        Ok((ServerRunner(handle), Url(format!("http://{addr}"))))
    }

    #[tokio::test]
    async fn round_trip() -> anyhow::Result<()> {
        let (_server, url) = start_server()?;
        let client = Client::new();
        health(&client, &url).await?;

        let account = Account::new(url.0.clone(), "user1");
        let profile = create_user(&client, &account).await?;
        assert_eq!(profile.id.0, "user1");
        let err = create_user(&client, &account).await.unwrap_err();
        assert!(err.to_string().starts_with("409"), "{err}");

        set_ingredients(&client, &account, vec!["Milk".into(), "Flour".into(), "Egg".into()]).await?;
        add_disliked(&client, &account, "Sugar").await?;
        add_disliked(&client, &account, "egg").await?;
        let data = get_ingredients(&client, &account).await?;
        assert_eq!(data.ingredients, vec!["Flour".to_string(), "Milk".to_string()]);
        assert_eq!(get_disliked(&client, &account).await?, vec!["Sugar".to_string(), "egg".to_string()]);
        remove_disliked(&client, &account, "egg").await?;
        set_disliked(&client, &account, vec!["Sugar".into(), "Oats".into()]).await?;
        assert_eq!(get_disliked(&client, &account).await?, vec!["Oats".to_string(), "Sugar".to_string()]);

        add_favourite(&client, &account, "Waffles").await?;
        add_favourite(&client, &account, "Omelette").await?;
        remove_favourite(&client, &account, "omelette").await?;
        assert_eq!(get_favourites(&client, &account).await?, vec!["Waffles".to_string()]);

        let parameters = Parameters {
            number_of_people: 2,
            meal_type: Some(MealType::Breakfast),
            ..Default::default()
        };
        set_parameters(&client, &account, &parameters).await?;
        assert_eq!(get_parameters(&client, &account).await?, parameters);

        let first = generate_for_profile(&client, &account, &GenerationFilters::default(), None).await?;
        assert_eq!(first.names(), vec!["Waffles", "Omelette"]);
        let second = generate_for_profile(&client, &account, &GenerationFilters::default(), Some(1)).await?;
        assert_eq!(second.names(), vec!["Omelette"]);
        let history = vec!["Waffles".to_string(), "Omelette".to_string()];
        assert_eq!(get_generated(&client, &account).await?, history);
        assert_eq!(get_user(&client, &account).await?.generated_meals, history);

        let third = generate_for_profile(&client, &account, &GenerationFilters::default(), None).await?;
        assert!(third.meals.is_empty());

        let payload: GenerationPayload = serde_json::from_value(json!({
            "generatedMeals": ["Omelette"],
            "ingredients": { "Dairy": ["Milk", "Cheese"] },
            "dislikedIngredients": ["Carrots"],
            "mealType": "Snack"
        }))
        .context("Error building payload")?;
        let response = generate(&client, &url, &payload, Some(5)).await?;
        assert!(response.meals.is_empty());

        let missing: GenerationPayload = serde_json::from_value(json!({ "mealType": "Dinner" }))?;
        let err = generate(&client, &url, &missing, None).await.unwrap_err();
        assert!(err.to_string().starts_with("400"), "{err}");

        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() -> anyhow::Result<()> {
        let (_server, url) = start_server()?;
        let client = Client::new();
        let account = Account::new(url.0, "user4");
        let err = get_user(&client, &account).await.unwrap_err();
        assert!(err.to_string().contains("User not found"), "{err}");
        Ok(())
    }
}
