//! API integration tests against a running server

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080";

/// Create a book and return its id
async fn create_book(client: &Client, title: &str) -> String {
    let response = client
        .post(format!("{}/api/books", BASE_URL))
        .json(&json!({
            "title": title,
            "author": "Integration Author",
            "year_published": 2001
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_str().expect("No book ID").to_string()
}

/// Create a user with a unique email and return its id
async fn create_user(client: &Client) -> String {
    let email = format!("patron-{}@example.com", uuid::Uuid::new_v4().simple());
    let response = client
        .post(format!("{}/api/users", BASE_URL))
        .json(&json!({ "name": "Integration Patron", "email": email }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_str().expect("No user ID").to_string()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_list_books() {
    let client = Client::new();

    let response = client
        .get(format!("{}/api/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.is_array());
}

#[tokio::test]
#[ignore]
async fn test_create_user_invalid_email() {
    let client = Client::new();

    let response = client
        .post(format!("{}/api/users", BASE_URL))
        .json(&json!({ "name": "Nobody", "email": "not-an-email" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_loan_round_trip() {
    let client = Client::new();
    let book_id = create_book(&client, "Integration Book").await;
    let user_id = create_user(&client).await;

    // Lend
    let response = client
        .post(format!("{}/api/loans", BASE_URL))
        .json(&json!({ "book_id": book_id, "user_id": user_id, "days_to_return": 10 }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let loan: Value = response.json().await.expect("Failed to parse response");
    let loan_id = loan["id"].as_str().expect("No loan ID").to_string();

    // Second loan on the same book
    let response = client
        .post(format!("{}/api/loans", BASE_URL))
        .json(&json!({ "book_id": book_id, "user_id": user_id }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 409);

    // Book is in use
    let response = client
        .delete(format!("{}/api/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 409);

    // Return
    let response = client
        .put(format!("{}/api/loans/{}/return", BASE_URL, loan_id))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    // Cleanup
    let response = client
        .delete(format!("{}/api/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 204);

    let _ = client
        .delete(format!("{}/api/users/{}", BASE_URL, user_id))
        .send()
        .await;
}

#[tokio::test]
#[ignore]
async fn test_get_loan_summary() {
    let client = Client::new();

    let response = client
        .get(format!("{}/api/loans/summary", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["total"].is_number());
    assert!(body["overdue"].is_number());
}
