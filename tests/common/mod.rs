// tests/common/mod.rs

use katha::{
    config::{Config, DEFAULT_GOOGLE_TOKENINFO_URL, DEFAULT_GOOGLE_USERINFO_URL},
    routes,
    state::AppState,
};
use serde_json::{Value, json};
use sqlx::{PgPool, postgres::PgPoolOptions};

pub const PASSWORD: &str = "Tr1cky-Passw0rd!";

pub struct TestApp {
    pub address: String,
    pub pool: PgPool,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port. Returns `None` (and the test is skipped)
/// when DATABASE_URL is not set.
pub async fn spawn_app() -> Option<TestApp> {
    spawn_app_with(|_| {}).await
}

/// Like `spawn_app`, letting the test adjust the config first.
pub async fn spawn_app_with(configure: impl FnOnce(&mut Config)) -> Option<TestApp> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let mut config = Config {
        database_url,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        refresh_expiration: 3600,
        rust_log: "error".to_string(),
        allowed_origins: vec!["http://localhost:5173".to_string()],
        google_client_id: None,
        google_userinfo_url: DEFAULT_GOOGLE_USERINFO_URL.to_string(),
        google_tokeninfo_url: DEFAULT_GOOGLE_TOKENINFO_URL.to_string(),
        admin_username: None,
        admin_password: None,
        port: 0,
    };

    configure(&mut config);

    let state = AppState::new(pool.clone(), config).expect("Failed to build app state");
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some(TestApp {
        address: format!("http://127.0.0.1:{}/api/v1", port),
        pool,
        client: reqwest::Client::new(),
    })
}

pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Registers a user and returns (username, access token).
    pub async fn signup(&self, prefix: &str) -> (String, String) {
        let username = unique_name(prefix);

        let response = self
            .client
            .post(self.url("/register"))
            .json(&json!({ "username": username, "password": PASSWORD }))
            .send()
            .await
            .expect("Failed to register");
        assert_eq!(response.status().as_u16(), 201);

        let token = self.login(&username).await;
        (username, token)
    }

    pub async fn login(&self, username: &str) -> String {
        let body: Value = self
            .client
            .post(self.url("/token"))
            .json(&json!({ "username": username, "password": PASSWORD }))
            .send()
            .await
            .expect("Failed to log in")
            .json()
            .await
            .unwrap();

        body["access"].as_str().expect("access token").to_string()
    }

    /// Creates a post and returns its JSON.
    pub async fn create_post(&self, token: &str, title: &str) -> Value {
        let response = self
            .client
            .post(self.url("/posts"))
            .bearer_auth(token)
            .json(&json!({ "title": title, "content": "Some <b>content</b>" }))
            .send()
            .await
            .expect("Failed to create post");
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }

    /// Creates a comment (or reply) and returns its JSON.
    pub async fn comment(&self, token: &str, post: i64, parent: Option<i64>, text: &str) -> Value {
        let response = self
            .client
            .post(self.url("/comments"))
            .bearer_auth(token)
            .json(&json!({ "post": post, "parent": parent, "text": text }))
            .send()
            .await
            .expect("Failed to comment");
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }

    pub async fn get_json(&self, path: &str, token: Option<&str>) -> Value {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.expect("Failed to execute request");
        assert!(response.status().is_success(), "GET {} -> {}", path, response.status());
        response.json().await.unwrap()
    }
}
