use argon2::Params;
use classified_ads::{
    AppConfig, AppState, InMemoryRepository, create_router,
    auth::{Authenticator, CredentialStore},
    repository::{PostgresRepository, RepositoryState},
};
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn create(&self, client: &Client, user: (&str, &str), title: &str) -> Response {
        client
            .post(self.url("/create-adv/"))
            .basic_auth(user.0, Some(user.1))
            .json(&json!({ "title": title, "description": format!("{title} for sale") }))
            .send()
            .await
            .expect("req fail")
    }
}

const JOHN: (&str, &str) = ("john", "hello");
const SUSAN: (&str, &str) = ("susan", "bye");

async fn spawn_app_with(repo: RepositoryState) -> TestApp {
    let store = CredentialStore::from_spec(
        "john:hello;susan:bye",
        Params::new(8, 1, 1, None).unwrap(),
    )
    .expect("Failed to build credential store");
    let config = AppConfig::default();
    let authenticator = Authenticator::new(store, config.realm.clone());

    let state = AppState {
        repo,
        authenticator,
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(InMemoryRepository::new()) as RepositoryState).await
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = Client::new()
        .get(app.url("/health"))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app().await;
    let doc: serde_json::Value = Client::new()
        .get(app.url("/api-docs/openapi.json"))
        .send()
        .await
        .expect("req fail")
        .json()
        .await
        .unwrap();

    assert!(doc["paths"]["/create-adv/"].is_object());
    assert!(doc["components"]["securitySchemes"]["basic_auth"].is_object());
}

#[tokio::test]
async fn test_advertisement_lifecycle() {
    let app = spawn_app().await;
    let client = Client::new();

    // 1. Empty store
    let response = client.get(app.url("/advertisements")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // 2. John creates
    let response = app.create(&client, JOHN, "Bike").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Advertisement #1 added successfully");

    // 3. Anyone can read
    let listing = client
        .get(app.url("/advertisements"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(listing, "Advertisement #1 \"Bike\": Bike for sale\n");

    let detail = client
        .get(app.url("/advertisements/1"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(detail.starts_with("Advertisement #1 \"Bike\": Bike for sale (by john, "));

    // 4. Susan may neither update nor delete John's advertisement
    let response = client
        .patch(app.url("/advertisements/1/update"))
        .basic_auth(SUSAN.0, Some(SUSAN.1))
        .json(&json!({ "title": "Stolen" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .delete(app.url("/advertisements/1/delete"))
        .basic_auth(SUSAN.0, Some(SUSAN.1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // 5. John updates the title only
    let response = client
        .patch(app.url("/advertisements/1/update"))
        .basic_auth(JOHN.0, Some(JOHN.1))
        .json(&json!({ "title": "Blue bike" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Advertisement #1 updated");

    let detail = client
        .get(app.url("/advertisements/1"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(detail.starts_with("Advertisement #1 \"Blue bike\": Bike for sale (by john, "));

    // 6. John deletes; the id is gone and never reissued
    let response = client
        .delete(app.url("/advertisements/1/delete"))
        .basic_auth(JOHN.0, Some(JOHN.1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "Advertisement #1 deleted");

    let response = client.get(app.url("/advertisements/1")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.create(&client, SUSAN, "Lamp").await;
    assert_eq!(response.text().await.unwrap(), "Advertisement #2 added successfully");
}

#[tokio::test]
async fn test_mutations_require_credentials() {
    let app = spawn_app().await;
    let client = Client::new();

    let response = client
        .post(app.url("/create-adv/"))
        .json(&json!({ "title": "Bike", "description": "Red bike" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()["www-authenticate"],
        "Basic realm=\"classified-ads\""
    );

    let response = app.create(&client, ("john", "wrong"), "Bike").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.create(&client, ("mallory", "hello"), "Bike").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Nothing was stored.
    let response = client.get(app.url("/advertisements")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_authentication_runs_before_id_parsing() {
    let app = spawn_app().await;
    let response = Client::new()
        .delete(app.url("/advertisements/abc/delete"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_numeric_id_is_bad_request() {
    let app = spawn_app().await;
    let client = Client::new();

    for path in ["/advertisements/abc", "/advertisements/-1", "/advertisements/1.5"] {
        let response = client.get(app.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "path: {path}");
    }

    let response = client
        .patch(app.url("/advertisements/abc/update"))
        .basic_auth(JOHN.0, Some(JOHN.1))
        .json(&json!({ "title": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_bodies_create_nothing() {
    let app = spawn_app().await;
    let client = Client::new();

    let response = client
        .post(app.url("/create-adv/"))
        .basic_auth(JOHN.0, Some(JOHN.1))
        .body("{oops")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(app.url("/create-adv/"))
        .basic_auth(JOHN.0, Some(JOHN.1))
        .json(&json!({ "title": "x".repeat(101), "description": "d" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: serde_json::Value = response.json().await.unwrap();
    assert_eq!(error["status"], 422);

    let response = client.get(app.url("/advertisements")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch Postgres database"]
async fn test_lifecycle_against_postgres() {
    dotenv::dotenv().ok();
    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = sqlx::PgPool::connect(&db_url)
        .await
        .expect("Failed to connect to Postgres in tests");
    let postgres = PostgresRepository::new(pool.clone());
    postgres.migrate().await.expect("Failed to run migrations");
    sqlx::query("DELETE FROM advertisements")
        .execute(&pool)
        .await
        .unwrap();

    let app = spawn_app_with(Arc::new(postgres) as RepositoryState).await;
    let client = Client::new();

    let response = app.create(&client, JOHN, "Bike").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    let id: i64 = body
        .trim_start_matches("Advertisement #")
        .trim_end_matches(" added successfully")
        .parse()
        .unwrap();

    let response = client
        .delete(app.url(&format!("/advertisements/{id}/delete")))
        .basic_auth(SUSAN.0, Some(SUSAN.1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .delete(app.url(&format!("/advertisements/{id}/delete")))
        .basic_auth(JOHN.0, Some(JOHN.1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
