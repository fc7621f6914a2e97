//! Integration tests for the Cuisinova backend.
//!
//! Each fixture runs the real router over a temporary SQLite file. A single wiremock
//! server stands in for OpenAI, S3 and PayMongo, which live on disjoint paths.

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use sha2::Sha256;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, OpenAiConfig, PaymentConfig, StorageConfig};
use crate::db::{init_database, Repository};
use crate::models::{AdditionalInformation, NewRecipe, Recipe, RecipeIngredient};
use crate::{create_router, AppState};

const PSK: &str = "test-api-key";
const WEBHOOK_SECRET: &str = "whsk_test";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    mock: MockServer,
    repo: Arc<Repository>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let mock = MockServer::start().await;

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        let mut config = Config {
            api_psk: Some(PSK.to_string()),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            public_url: "http://localhost:3000".to_string(),
            free_recipe_limit: 10,
            ai_request_limit: None,
            openai: OpenAiConfig {
                api_key: Some("sk-test".to_string()),
                base_url: mock.uri(),
                chat_model: "gpt-3.5-turbo".to_string(),
                image_model: "dall-e-2".to_string(),
                tts_model: "tts-1".to_string(),
            },
            storage: StorageConfig {
                access_key_id: Some("AKIDTEST".to_string()),
                secret_access_key: Some("secret".to_string()),
                region: "ap-southeast-2".to_string(),
                bucket: Some("cuisinova".to_string()),
                endpoint: Some(mock.uri()),
                public_url: None,
            },
            payment: PaymentConfig {
                secret_key: Some("sk_test".to_string()),
                base_url: mock.uri(),
                webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            },
        };
        customize(&mut config);

        let psk = config.api_psk.clone();
        let app = create_router(AppState::new(config, repo.clone()));

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            mock,
            repo,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str, user_id: &str) -> RequestBuilder {
        self.client.get(self.url(path)).header("x-user-id", user_id)
    }

    fn post(&self, path: &str, user_id: &str) -> RequestBuilder {
        self.client.post(self.url(path)).header("x-user-id", user_id)
    }

    fn put(&self, path: &str, user_id: &str) -> RequestBuilder {
        self.client.put(self.url(path)).header("x-user-id", user_id)
    }

    fn delete(&self, path: &str, user_id: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).header("x-user-id", user_id)
    }

    async fn sign_in(&self, name: &str, email: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/auth/signin"))
            .json(&json!({ "name": name, "email": email }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"]["_id"].as_str().unwrap().to_string()
    }

    async fn seed_recipe(&self, owner_id: &str, name: &str, ingredients: &[&str]) -> Recipe {
        let recipe = new_recipe(name, ingredients, "seed-0");
        self.repo
            .insert_recipes(owner_id, &[(recipe, "/logo.svg".to_string())])
            .await
            .unwrap()
            .remove(0)
    }
}

fn new_recipe(name: &str, ingredients: &[&str], prompt_id: &str) -> NewRecipe {
    NewRecipe {
        name: name.to_string(),
        ingredients: ingredients
            .iter()
            .map(|i| RecipeIngredient {
                name: i.to_string(),
                quantity: "1 cup".to_string(),
            })
            .collect(),
        instructions: vec!["Cook it.".to_string()],
        dietary_preference: vec![],
        additional_information: AdditionalInformation {
            tips: "Taste as you go.".to_string(),
            variations: "Add chili.".to_string(),
            serving_suggestions: "Serve hot.".to_string(),
            nutritional_information: "Balanced.".to_string(),
        },
        categories: vec!["Dinner".to_string()],
        openai_prompt_id: prompt_id.to_string(),
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 40, "completion_tokens": 17, "total_tokens": 57}
    }))
}

fn image_response(url: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "created": 1700000000,
        "data": [{"url": url}]
    }))
}

fn openai_error(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error": {"message": message, "type": "invalid_request_error"}
    }))
}

fn webhook_signature(body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("1700000000.{}", body).as_bytes());
    format!(
        "t=1700000000,te=,li={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

// ==================== AUTH ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = Client::new().get(fixture.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_psk_required_for_api() {
    let fixture = TestFixture::new().await;
    let bare = Client::new();

    let resp = bare
        .post(fixture.url("/api/auth/signin"))
        .json(&json!({"name": "Ana", "email": "ana@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = bare
        .get(fixture.url("/api/get-recipes"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = bare
        .post(fixture.url("/api/auth/signin"))
        .header("authorization", format!("Bearer {}", PSK))
        .json(&json!({"name": "Ana", "email": "ana@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_session_required() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/get-recipes"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "You must be logged in.");

    let resp = fixture.get("/api/profile", "ghost").send().await.unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_wrong_method_is_rejected() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    let resp = fixture.post("/api/get-recipes", &user).send().await.unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn test_sign_in_upserts_by_email() {
    let fixture = TestFixture::new().await;

    let first = fixture.sign_in("Ana", "ana@example.com").await;
    let second = fixture.sign_in("Ana Reyes", "ana@example.com").await;
    assert_eq!(first, second);

    let user = fixture.repo.get_user(&first).await.unwrap().unwrap();
    assert_eq!(user.name, "Ana Reyes");
    assert_eq!(
        user.subscription.status,
        crate::models::SubscriptionStatus::Inactive
    );

    let resp = fixture
        .client
        .post(fixture.url("/api/auth/signin"))
        .json(&json!({"name": "Nobody", "email": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// ==================== BROWSING ====================

#[tokio::test]
async fn test_get_recipes_paginates_with_popular_tags() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    fixture.seed_recipe(&user, "Adobo", &["Chicken", "Vinegar"]).await;
    fixture.seed_recipe(&user, "Tinola", &["Chicken", "Ginger"]).await;
    fixture.seed_recipe(&user, "Sinigang", &["Pork", "Tamarind"]).await;

    let resp = fixture
        .get("/api/get-recipes?page=1&limit=2", &user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let data = &body["data"];

    assert_eq!(data["currentPage"], 1);
    assert_eq!(data["totalRecipes"], 3);
    assert_eq!(data["totalPages"], 2);
    let recipes = data["recipes"].as_array().unwrap();
    assert_eq!(recipes.len(), 2);
    // Newest first
    assert_eq!(recipes[0]["name"], "Sinigang");
    assert_eq!(recipes[0]["owns"], true);
    assert_eq!(recipes[0]["owner"]["name"], "Ana");

    let tags = data["popularTags"].as_array().unwrap();
    assert_eq!(tags[0], json!({"_id": "Chicken", "count": 2}));

    let body: Value = fixture
        .get("/api/get-recipes?page=2&limit=2", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["recipes"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["recipes"][0]["name"], "Adobo");
}

#[tokio::test]
async fn test_get_recipes_page_far_past_the_end() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    fixture.seed_recipe(&user, "Adobo", &["Chicken"]).await;

    let resp = fixture
        .get("/api/get-recipes?page=100000000000000000&limit=100", &user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["currentPage"], 100_000_000_000_000_000i64);
    assert_eq!(body["data"]["totalRecipes"], 1);
    assert!(body["data"]["recipes"].as_array().unwrap().is_empty());

    let resp = fixture
        .get("/api/search-recipes?query=adobo&page=9223372036854775807", &user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_search_recipes() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    fixture.seed_recipe(&user, "Adobo", &["Chicken", "Vinegar"]).await;
    fixture.seed_recipe(&user, "Sinigang", &["Pork", "Tamarind"]).await;

    let resp = fixture.get("/api/search-recipes", &user).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Search query (tag) is required");

    let body: Value = fixture
        .get("/api/search-recipes?query=tamar", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["totalRecipes"], 1);
    assert_eq!(body["data"]["recipes"][0]["name"], "Sinigang");

    let body: Value = fixture
        .get("/api/search-recipes?query=ADOBO", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["totalRecipes"], 1);

    let body: Value = fixture
        .get("/api/search-recipes?query=100%25", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["totalRecipes"], 0);
}

#[tokio::test]
async fn test_search_folds_non_ascii_case() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    fixture.seed_recipe(&user, "Crème Brûlée", &["Cream", "Sugar"]).await;
    fixture.seed_recipe(&user, "Adobo", &["Chicken"]).await;
    fixture.seed_recipe(&user, "Tarte", &["Ÿuzu Zest"]).await;

    // CRÈME, crème, BRÛLÉE, ÿuzu
    for (query, expected) in [
        ("CR%C3%88ME", "Crème Brûlée"),
        ("cr%C3%A8me", "Crème Brûlée"),
        ("BR%C3%9BL%C3%89E", "Crème Brûlée"),
        ("%C3%BFuzu", "Tarte"),
    ] {
        let body: Value = fixture
            .get(&format!("/api/search-recipes?query={query}"), &user)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["data"]["totalRecipes"], 1, "query {query}");
        assert_eq!(body["data"]["recipes"][0]["name"], expected);
    }
}

#[tokio::test]
async fn test_get_single_recipe() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    let recipe = fixture.seed_recipe(&user, "Adobo", &["Chicken"]).await;

    let body: Value = fixture
        .get(&format!("/api/recipes/{}", recipe.id), &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["_id"], recipe.id.as_str());
    assert_eq!(body["data"]["openaiPromptId"], "seed");
    assert_eq!(body["data"]["additionalInformation"]["tips"], "Taste as you go.");

    let resp = fixture.get("/api/recipes/missing", &user).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_like_toggle_and_liked_filter() {
    let fixture = TestFixture::new().await;
    let owner = fixture.sign_in("Ana", "ana@example.com").await;
    let fan = fixture.sign_in("Ben", "ben@example.com").await;
    let recipe = fixture.seed_recipe(&owner, "Adobo", &["Chicken"]).await;
    fixture.seed_recipe(&owner, "Tinola", &["Chicken"]).await;

    let resp = fixture
        .put("/api/like-recipe", &owner)
        .json(&json!({"recipeId": recipe.id}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = fixture
        .put("/api/like-recipe", &fan)
        .json(&json!({"recipeId": recipe.id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["liked"], true);
    assert_eq!(body["data"]["likedBy"][0]["name"], "Ben");

    let body: Value = fixture
        .get("/api/get-recipes?filterOption=liked", &fan)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["totalRecipes"], 1);
    assert_eq!(body["data"]["recipes"][0]["name"], "Adobo");

    let body: Value = fixture
        .get("/api/get-recipes?sortOption=popular", &fan)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["recipes"][0]["name"], "Adobo");

    let body: Value = fixture
        .put("/api/like-recipe", &fan)
        .json(&json!({"recipeId": recipe.id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["liked"], false);
    assert!(body["data"]["likedBy"].as_array().unwrap().is_empty());

    let resp = fixture
        .put("/api/like-recipe", &fan)
        .json(&json!({"recipeId": "missing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_delete_recipe_rules() {
    let fixture = TestFixture::new().await;
    let owner = fixture.sign_in("Ana", "ana@example.com").await;
    let other = fixture.sign_in("Ben", "ben@example.com").await;
    let recipe = fixture.seed_recipe(&owner, "Adobo", &["Chicken"]).await;

    let resp = fixture
        .delete("/api/delete-recipe", &other)
        .json(&json!({"recipeId": recipe.id}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .delete("/api/delete-recipe", &owner)
        .json(&json!({"recipeId": "missing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .delete("/api/delete-recipe", &owner)
        .json(&json!({"recipeId": recipe.id}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["message"].as_str().unwrap().contains(&recipe.id));

    assert!(fixture.repo.get_recipe(&recipe.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_profile_reports_usage() {
    let fixture = TestFixture::new().await;
    let owner = fixture.sign_in("Ana", "ana@example.com").await;
    let other = fixture.sign_in("Ben", "ben@example.com").await;

    fixture.seed_recipe(&owner, "Adobo", &["Chicken"]).await;
    fixture.seed_recipe(&owner, "Tinola", &["Chicken"]).await;
    fixture.seed_recipe(&owner, "Sinigang", &["Pork"]).await;
    let liked = fixture.seed_recipe(&other, "Lechon", &["Pork"]).await;
    fixture.seed_recipe(&other, "Kare-kare", &["Oxtail"]).await;
    fixture.repo.toggle_like(&liked.id, &owner).await.unwrap();

    let body: Value = fixture
        .get("/api/profile", &owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let data = &body["data"];
    assert_eq!(data["recipes"].as_array().unwrap().len(), 4);
    assert_eq!(data["totalGeneratedCount"], 3);
    assert_eq!(data["apiRequestLimit"], 10);
    assert_eq!(data["AIusage"], 30);
}

// ==================== GENERATION ====================

#[tokio::test]
async fn test_generate_recipes() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(r#"[{"name": "Garlic Rice"}]"#))
        .expect(1)
        .mount(&fixture.mock)
        .await;

    let resp = fixture
        .post("/api/generate-recipes", &user)
        .json(&json!({"ingredients": [], "dietaryPreferences": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Ingredients are required");

    let resp = fixture
        .post("/api/generate-recipes", &user)
        .json(&json!({
            "ingredients": [{"name": "Rice", "quantity": 2}, {"name": "Garlic"}],
            "dietaryPreferences": ["Vegan"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["recipes"], r#"[{"name": "Garlic Rice"}]"#);

    let prompt_id = body["data"]["openaiPromptId"].as_str().unwrap();
    assert_eq!(prompt_id.len(), 32);
    assert!(!prompt_id.contains('-'));

    assert_eq!(fixture.repo.count_ai_responses(&user).await.unwrap(), 1);
}

#[tokio::test]
async fn test_generate_recipes_upstream_failure() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(openai_error("overloaded"))
        .mount(&fixture.mock)
        .await;

    let resp = fixture
        .post("/api/generate-recipes", &user)
        .json(&json!({"ingredients": [{"name": "Rice"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn test_save_recipes_uploads_images_and_tags() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    let mock_uri = fixture.mock.uri();

    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(image_response(&format!("{}/generated/adobo.png", mock_uri)))
        .mount(&fixture.mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/generated/adobo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![137u8, 80, 78, 71]))
        .mount(&fixture.mock)
        .await;
    Mock::given(method("PUT"))
        .and(path("/abc123-0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fixture.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("relevant tags"))
        .respond_with(completion(r#"["Filipino", "Braised"]"#))
        .mount(&fixture.mock)
        .await;

    let recipe = json!({
        "name": "Adobo",
        "ingredients": [{"name": "Chicken", "quantity": "1 kg"}],
        "instructions": ["Marinate.", "Simmer."],
        "dietaryPreference": [],
        "additionalInformation": {
            "tips": "Use cane vinegar.",
            "variations": "Pork adobo.",
            "servingSuggestions": "With rice.",
            "nutritionalInformation": "High protein."
        },
        "categories": ["Filipino"],
        "openaiPromptId": "abc123-0"
    });

    let resp = fixture
        .post("/api/save-recipes", &user)
        .json(&json!({"recipes": [recipe]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], "Saved Recipes and generated the Images!");

    let body: Value = fixture
        .get("/api/get-recipes", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let saved = &body["data"]["recipes"][0];
    assert_eq!(saved["imgLink"], "https://cuisinova.s3.amazonaws.com/abc123-0");
    assert_eq!(saved["openaiPromptId"], "abc123");
    let recipe_id = saved["_id"].as_str().unwrap().to_string();

    // Tags are generated in the background
    let mut tags = Vec::new();
    for _ in 0..50 {
        let recipe = fixture.repo.get_recipe(&recipe_id).await.unwrap().unwrap();
        if !recipe.tags.is_empty() {
            tags = recipe.tags.into_iter().map(|t| t.tag).collect();
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(tags, vec!["filipino", "braised"]);

    let body: Value = fixture
        .get("/api/search-recipes?query=braise", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["totalRecipes"], 1);
}

#[tokio::test]
async fn test_save_recipes_falls_back_to_logo() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(openai_error("content policy"))
        .mount(&fixture.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("not json at all"))
        .mount(&fixture.mock)
        .await;

    let recipe = json!({
        "name": "Tinola",
        "ingredients": [{"name": "Ginger", "quantity": "1 thumb"}],
        "instructions": ["Boil."],
        "dietaryPreference": [],
        "additionalInformation": {
            "tips": "t", "variations": "v", "servingSuggestions": "s", "nutritionalInformation": "n"
        },
        "categories": [],
        "openaiPromptId": "zzz-0"
    });

    let resp = fixture
        .post("/api/save-recipes", &user)
        .json(&json!({"recipes": [recipe]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = fixture
        .get("/api/get-recipes", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let saved = &body["data"]["recipes"][0];
    assert_eq!(saved["imgLink"], "/logo.svg");
    let recipe_id = saved["_id"].as_str().unwrap().to_string();

    // Malformed tag output falls back to the default tags
    let mut tags = Vec::new();
    for _ in 0..50 {
        let recipe = fixture.repo.get_recipe(&recipe_id).await.unwrap().unwrap();
        if !recipe.tags.is_empty() {
            tags = recipe.tags.into_iter().map(|t| t.tag).collect();
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(tags, vec!["recipe", "tinola", "ginger"]);
}

#[tokio::test]
async fn test_save_recipes_matches_images_by_prompt_id() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    let mock_uri = fixture.mock.uri();

    // Adobo: generated and uploaded
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_string_contains("delicious Adobo"))
        .respond_with(image_response(&format!("{}/generated/adobo.png", mock_uri)))
        .mount(&fixture.mock)
        .await;
    // Tinola: image generation rejected
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_string_contains("delicious Tinola"))
        .respond_with(openai_error("content policy"))
        .mount(&fixture.mock)
        .await;
    // Sinigang: generated but the upload fails
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_string_contains("delicious Sinigang"))
        .respond_with(image_response(&format!("{}/generated/sinigang.png", mock_uri)))
        .mount(&fixture.mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/generated/adobo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![137u8, 80, 78, 71]))
        .mount(&fixture.mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/generated/sinigang.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![137u8, 80, 78, 71]))
        .mount(&fixture.mock)
        .await;
    Mock::given(method("PUT"))
        .and(path("/mix777-0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fixture.mock)
        .await;
    Mock::given(method("PUT"))
        .and(path("/mix777-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fixture.mock)
        .await;
    Mock::given(method("PUT"))
        .and(path("/mix777-2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("SlowDown"))
        .mount(&fixture.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(r#"["filipino"]"#))
        .mount(&fixture.mock)
        .await;

    let recipes: Vec<Value> = ["Adobo", "Tinola", "Sinigang"]
        .iter()
        .enumerate()
        .map(|(n, name)| {
            json!({
                "name": name,
                "ingredients": [{"name": "Garlic", "quantity": "3 cloves"}],
                "instructions": ["Cook."],
                "dietaryPreference": [],
                "additionalInformation": {
                    "tips": "t", "variations": "v", "servingSuggestions": "s", "nutritionalInformation": "n"
                },
                "categories": ["Filipino"],
                "openaiPromptId": format!("mix777-{n}")
            })
        })
        .collect();

    let resp = fixture
        .post("/api/save-recipes", &user)
        .json(&json!({ "recipes": recipes }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = fixture
        .get("/api/get-recipes", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let saved = body["data"]["recipes"].as_array().unwrap();
    assert_eq!(saved.len(), 3);

    let img_link = |name: &str| {
        saved
            .iter()
            .find(|r| r["name"] == name)
            .map(|r| r["imgLink"].clone())
            .unwrap()
    };
    assert_eq!(img_link("Adobo"), "https://cuisinova.s3.amazonaws.com/mix777-0");
    assert_eq!(img_link("Tinola"), "/logo.svg");
    assert_eq!(img_link("Sinigang"), "/logo.svg");
    assert!(saved.iter().all(|r| r["openaiPromptId"] == "mix777"));
}

#[tokio::test]
async fn test_save_recipes_validation() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    let resp = fixture
        .post("/api/save-recipes", &user)
        .json(&json!({"recipes": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "No valid recipes provided");

    let resp = fixture
        .post("/api/save-recipes", &user)
        .json(&json!({"recipes": [{"name": "Half a recipe"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Invalid recipe data provided");

    // Nothing reached OpenAI
    assert!(fixture.mock.received_requests().await.unwrap().is_empty());
}

// ==================== INGREDIENTS ====================

#[tokio::test]
async fn test_validate_ingredient_flow() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("plastic"))
        .respond_with(completion(
            r#"{"isValid": false, "possibleVariations": ["Plantain"]}"#,
        ))
        .with_priority(1)
        .mount(&fixture.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("gibberish"))
        .respond_with(completion("I think so?"))
        .with_priority(1)
        .mount(&fixture.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("ketchup"))
        .respond_with(completion(r#"["Tomato ketchup", "Catsup"]"#))
        .with_priority(1)
        .mount(&fixture.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(
            r#"{"isValid": true, "possibleVariations": ["Baby kale"]}"#,
        ))
        .mount(&fixture.mock)
        .await;

    let body: Value = fixture
        .post("/api/validate-ingredient", &user)
        .json(&json!({"ingredientName": "  kALE "}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["message"], "Success");
    assert_eq!(body["data"]["newIngredient"]["name"], "Kale");
    assert_eq!(body["data"]["suggested"], json!(["Baby kale"]));

    let body: Value = fixture
        .post("/api/validate-ingredient", &user)
        .json(&json!({"ingredientName": "kale"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["message"], "Error: This ingredient already exists");

    let body: Value = fixture
        .post("/api/validate-ingredient", &user)
        .json(&json!({"ingredientName": "plastic"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["message"], "Invalid");
    assert_eq!(body["data"]["suggested"], json!(["Plantain"]));

    // Any JSON that is not an object reads as not valid
    let resp = fixture
        .post("/api/validate-ingredient", &user)
        .json(&json!({"ingredientName": "ketchup"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["message"], "Invalid");
    assert_eq!(body["data"]["suggested"], json!([]));

    let resp = fixture
        .post("/api/validate-ingredient", &user)
        .json(&json!({"ingredientName": "gibberish"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);

    let resp = fixture
        .post("/api/validate-ingredient", &user)
        .json(&json!({"ingredientName": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = fixture
        .get("/api/get-ingredients", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["reachedLimit"], false);
    assert_eq!(body["data"]["ingredientList"][0]["name"], "Kale");
}

#[tokio::test]
async fn test_get_ingredients_free_limit() {
    let fixture = TestFixture::with_config(|c| c.free_recipe_limit = 2).await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    fixture.repo.create_ingredient("Garlic", &user).await.unwrap();

    fixture.seed_recipe(&user, "Adobo", &["Chicken"]).await;
    let body: Value = fixture
        .get("/api/get-ingredients", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["reachedLimit"], false);
    assert_eq!(body["data"]["ingredientList"].as_array().unwrap().len(), 1);

    fixture.seed_recipe(&user, "Tinola", &["Chicken"]).await;
    let body: Value = fixture
        .get("/api/get-ingredients", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["reachedLimit"], true);
    assert!(body["data"]["ingredientList"].as_array().unwrap().is_empty());
}

// ==================== NARRATION & CHAT ====================

#[tokio::test]
async fn test_tts_generates_once() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    let recipe = fixture.seed_recipe(&user, "Adobo", &["Chicken"]).await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("Welcome to the kitchen. Today we cook adobo."))
        .expect(1)
        .mount(&fixture.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFFu8, 0xFB, 0x90]))
        .expect(1)
        .mount(&fixture.mock)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/audio/{}.mp3", recipe.id)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fixture.mock)
        .await;

    let expected = format!("https://cuisinova.s3.amazonaws.com/audio/{}.mp3", recipe.id);
    for _ in 0..2 {
        let body: Value = fixture
            .post("/api/tts", &user)
            .json(&json!({"recipeId": recipe.id}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["data"]["audio"], expected.as_str());
    }

    let stored = fixture.repo.get_recipe(&recipe.id).await.unwrap().unwrap();
    assert_eq!(stored.audio.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn test_chat_assistant() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    let recipe = fixture.seed_recipe(&user, "Adobo", &["Chicken"]).await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("About 40 minutes."))
        .mount(&fixture.mock)
        .await;

    let body: Value = fixture
        .post("/api/chat-assistant", &user)
        .json(&json!({
            "message": "How long does it simmer?",
            "recipeId": recipe.id,
            "history": [{"role": "user", "content": "How long does it simmer?"}]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["reply"], "About 40 minutes.");
    assert_eq!(body["data"]["totalTokens"], 57);
    assert!(body["data"].get("reachedLimit").is_none());

    // System prompt plus the single user turn, not duplicated
    let requests = fixture.mock.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = sent["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["content"], "How long does it simmer?");

    let resp = fixture
        .post("/api/chat-assistant", &user)
        .json(&json!({"message": "", "recipeId": recipe.id, "history": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .post("/api/chat-assistant", &user)
        .json(&json!({"message": "Hi", "recipeId": "missing", "history": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_chat_assistant_falls_back_on_failure() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    let recipe = fixture.seed_recipe(&user, "Adobo", &["Chicken"]).await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(openai_error("The server had an error"))
        .mount(&fixture.mock)
        .await;

    let resp = fixture
        .post("/api/chat-assistant", &user)
        .json(&json!({"message": "Hi", "recipeId": recipe.id, "history": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["reply"], "Sorry, I had trouble responding.");
    assert_eq!(body["data"]["totalTokens"], 0);
}

#[tokio::test]
async fn test_ai_request_limit() {
    let fixture = TestFixture::with_config(|c| c.ai_request_limit = Some(0)).await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    let recipe = fixture.seed_recipe(&user, "Adobo", &["Chicken"]).await;

    let resp = fixture
        .post("/api/generate-recipes", &user)
        .json(&json!({"ingredients": [{"name": "Rice"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "LIMIT_REACHED");

    let body: Value = fixture
        .post("/api/chat-assistant", &user)
        .json(&json!({"message": "Hi", "recipeId": recipe.id, "history": []}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["reachedLimit"], true);
    assert_eq!(body["data"]["totalTokens"], 0);

    assert!(fixture.mock.received_requests().await.unwrap().is_empty());
}

// ==================== PAYMENTS ====================

#[tokio::test]
async fn test_payment_initiate_stores_pending_payment() {
    let fixture = TestFixture::new().await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "cs_1",
                "attributes": {
                    "checkout_url": "https://checkout.paymongo.com/cs_1",
                    "payment_intent": {"id": "pi_1"}
                }
            }
        })))
        .expect(1)
        .mount(&fixture.mock)
        .await;

    let resp = fixture
        .post("/api/payment/initiate", &user)
        .json(&json!({"plan": "gold", "billingCycle": "monthly", "amount": 99}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .post("/api/payment/initiate", &user)
        .json(&json!({"plan": "pro", "billingCycle": "yearly", "amount": -5}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = fixture
        .post("/api/payment/initiate", &user)
        .json(&json!({"plan": "premium", "billingCycle": "monthly", "amount": 299}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["message"], "Payment initiated successfully");
    assert_eq!(body["data"]["checkoutUrl"], "https://checkout.paymongo.com/cs_1");
    assert_eq!(body["data"]["paymentIntentId"], "pi_1");
    assert_eq!(body["data"]["checkoutSessionId"], "cs_1");

    let stored = fixture.repo.get_user(&user).await.unwrap().unwrap();
    let pending = stored.subscription.pending_payment.unwrap();
    assert_eq!(pending.checkout_session_id, "cs_1");
    assert_eq!(pending.plan, crate::models::Plan::Premium);
}

#[tokio::test]
async fn test_payment_webhook_activates_subscription() {
    let fixture = TestFixture::with_config(|c| c.free_recipe_limit = 0).await;
    let user = fixture.sign_in("Ana", "ana@example.com").await;
    let bare = Client::new();

    let body: Value = fixture
        .get("/api/get-ingredients", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["reachedLimit"], true);

    let event = json!({
        "type": "checkout_session.payment.paid",
        "data": {"metadata": {
            "userId": user,
            "plan": "pro",
            "billingCycle": "monthly",
            "startDate": "2024-01-01T00:00:00.000Z",
            "endDate": "2999-01-01T00:00:00.000Z"
        }}
    })
    .to_string();

    let resp = bare
        .post(fixture.url("/api/payment/webhook"))
        .header("paymongo-signature", "t=1700000000,te=,li=deadbeef")
        .header("content-type", "application/json")
        .body(event.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = bare
        .post(fixture.url("/api/payment/webhook"))
        .header("paymongo-signature", webhook_signature(&event))
        .header("content-type", "application/json")
        .body(event.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["received"], true);

    let stored = fixture.repo.get_user(&user).await.unwrap().unwrap();
    assert_eq!(stored.subscription.plan, Some(crate::models::Plan::Pro));
    assert!(stored.subscription.pending_payment.is_none());

    let body: Value = fixture
        .get("/api/get-ingredients", &user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["reachedLimit"], false);
}

#[tokio::test]
async fn test_payment_webhook_edge_cases() {
    let fixture = TestFixture::new().await;
    let bare = Client::new();

    let ignored = json!({"type": "payment.failed", "data": {}}).to_string();
    let resp = bare
        .post(fixture.url("/api/payment/webhook"))
        .header("paymongo-signature", webhook_signature(&ignored))
        .body(ignored)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let unknown_user = json!({
        "type": "checkout_session.payment.paid",
        "data": {"metadata": {
            "userId": "nobody", "plan": "basic", "billingCycle": "monthly",
            "startDate": "2024-01-01T00:00:00.000Z", "endDate": "2024-02-01T00:00:00.000Z"
        }}
    })
    .to_string();
    let resp = bare
        .post(fixture.url("/api/payment/webhook"))
        .header("paymongo-signature", webhook_signature(&unknown_user))
        .body(unknown_user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
