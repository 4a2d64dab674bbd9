use crate::config::Config;
use crate::db::{Database, ROLE_ADMIN};
use crate::server::{AppState, SESSION_COOKIE, create_router};
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
}

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        let db = Database::open_memory().unwrap();
        let state = AppState::new(Config::default(), db);
        state
            .auth
            .create_user("admin", "admin@example.com", "adminpass", "", "", ROLE_ADMIN)
            .unwrap();
        Self {
            router: create_router(state),
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.dispatch(builder.body(body).unwrap()).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply { status, cookie, body }
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let reply = self
            .send(
                Method::POST,
                "/api/auth?action=login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn register(&self, username: &str) -> String {
        let reply = self
            .send(
                Method::POST,
                "/api/auth?action=register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "secret1",
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn add_book(&self, admin: &str, title: &str) -> i64 {
        let reply = self
            .send(
                Method::POST,
                "/api/books",
                Some(admin),
                Some(json!({
                    "title": title,
                    "author": "Frank Herbert",
                    "file_path": format!("/books/{}.pdf", title),
                    "pages": "300",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.body["data"]["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new();
    let reply = app.send(Method::GET, "/api/health", None, None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["data"]["status"], "ok");
    assert_eq!(reply.body["data"]["books"], 0);
}

#[tokio::test]
async fn book_listing_uses_envelope_with_pagination() {
    let app = TestApp::new();
    let admin = app.login("admin", "adminpass").await;
    for i in 0..3 {
        app.add_book(&admin, &format!("Book {}", i)).await;
    }

    let reply = app
        .send(Method::GET, "/api/books?page=2&limit=2", None, None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["message"], "");
    assert_eq!(reply.body["data"].as_array().unwrap().len(), 1);
    assert_eq!(
        reply.body["pagination"],
        json!({ "page": 2, "limit": 2, "total": 3, "pages": 2 })
    );
    assert_eq!(reply.body["data"][0]["rating"]["total"], 0);

    // Junk parameters fall back to defaults
    let reply = app
        .send(Method::GET, "/api/books?page=abc&limit=999&category=x", None, None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["pagination"]["page"], 1);
    assert_eq!(reply.body["pagination"]["limit"], 50);
    assert_eq!(reply.body["pagination"]["total"], 3);
}

#[tokio::test]
async fn book_detail_and_soft_delete() {
    let app = TestApp::new();
    let admin = app.login("admin", "adminpass").await;
    let id = app.add_book(&admin, "Dune").await;

    let uri = format!("/api/books?id={}", id);
    let reply = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["title"], "Dune");
    assert_eq!(reply.body["data"]["pages"], 300);
    assert!(reply.body["data"]["created_at"].is_string());
    assert!(reply.body["data"]["user_progress"].is_null());

    let reply = app.send(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Book deleted successfully");
    assert!(reply.body["data"].is_null());

    let reply = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["success"], false);

    let reply = app.send(Method::GET, "/api/books?id=abc", None, None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Invalid book ID");
}

#[tokio::test]
async fn unsupported_method_gets_405_envelope() {
    let app = TestApp::new();
    let reply = app.send(Method::PATCH, "/api/books", None, None).await;

    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["message"], "Method not allowed");

    let reply = app.send(Method::PUT, "/api/reading-progress", None, None).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn protected_routes_require_login() {
    let app = TestApp::new();

    for uri in ["/api/bookmarks", "/api/reading-progress", "/api/reader?id=1"] {
        let reply = app.send(Method::GET, uri, None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(reply.body["success"], false);
        assert!(reply.body["data"].is_null());
    }

    let reply = app
        .send(Method::GET, "/api/bookmarks", Some("not-a-real-token"), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    // Reviews are public
    let reply = app.send(Method::GET, "/api/reviews", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["pagination"]["limit"], 10);
}

#[tokio::test]
async fn login_sets_cookie_and_token_works() {
    let app = TestApp::new();
    let reply = app
        .send(
            Method::POST,
            "/api/auth?action=login",
            None,
            Some(json!({ "username": "admin@example.com", "password": "adminpass" })),
        )
        .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Login successful");
    assert_eq!(reply.body["data"]["user"]["username"], "admin");
    assert!(reply.body["data"]["user"].get("password_hash").is_none());

    let token = reply.body["data"]["token"].as_str().unwrap().to_string();
    let cookie = reply.cookie.unwrap();
    assert!(cookie.starts_with(&format!("{}={}", SESSION_COOKIE, token)));
    assert!(cookie.contains("HttpOnly"));

    let reply = app
        .send(Method::GET, "/api/auth?action=check", Some(&token), None)
        .await;
    assert_eq!(reply.body["data"]["logged_in"], true);
    assert_eq!(reply.body["data"]["role"], "admin");

    // The cookie alone authenticates too
    let request = Request::builder()
        .uri("/api/auth?action=profile")
        .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
        .body(Body::empty())
        .unwrap();
    let reply = app.dispatch(request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["user"]["email"], "admin@example.com");
    assert_eq!(reply.body["data"]["stats"]["books_read"], 0);
}

#[tokio::test]
async fn wrong_password_is_generic_401() {
    let app = TestApp::new();
    let reply = app
        .send(
            Method::POST,
            "/api/auth?action=login",
            None,
            Some(json!({ "username": "admin", "password": "nope" })),
        )
        .await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Invalid username or password");
}

#[tokio::test]
async fn logout_invalidates_token() {
    let app = TestApp::new();
    let token = app.register("ada").await;

    let reply = app
        .send(Method::GET, "/api/auth?action=check", Some(&token), None)
        .await;
    assert_eq!(reply.body["data"]["logged_in"], true);

    let reply = app
        .send(Method::POST, "/api/auth?action=logout", Some(&token), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Logout successful");

    let reply = app
        .send(Method::GET, "/api/auth?action=check", Some(&token), None)
        .await;
    assert_eq!(reply.body["data"]["logged_in"], false);
}

#[tokio::test]
async fn bad_input_is_400() {
    let app = TestApp::new();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth?action=login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = app.dispatch(request).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Invalid JSON input");

    let reply = app.send(Method::GET, "/api/auth?action=dance", None, None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Invalid action");

    let token = app.register("ada").await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/bookmarks")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("[1, 2"))
        .unwrap();
    let reply = app.dispatch(request).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Invalid JSON input");
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let app = TestApp::new();
    let token = app.register("ada").await;

    let reply = app
        .send(
            Method::POST,
            "/api/categories",
            Some(&token),
            Some(json!({ "name": "Mine" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["message"], "Admin access required");

    let reply = app
        .send(Method::DELETE, "/api/books?id=1", Some(&token), None)
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = app
        .send(Method::POST, "/api/categories", None, Some(json!({ "name": "Mine" })))
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_check_precedes_body_parsing() {
    let app = TestApp::new();
    let token = app.register("ada").await;

    for (method, uri) in [
        (Method::POST, "/api/books"),
        (Method::PUT, "/api/books?id=1"),
        (Method::PUT, "/api/categories?id=1"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let reply = app.dispatch(request).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(reply.body["message"], "Admin access required");
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/books")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    assert_eq!(app.dispatch(request).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reading_flow_end_to_end() {
    let app = TestApp::new();
    let admin = app.login("admin", "adminpass").await;
    let book = app.add_book(&admin, "Dune").await;
    let reader = app.register("ada").await;

    let reply = app
        .send(
            Method::POST,
            "/api/bookmarks",
            Some(&reader),
            Some(json!({ "book_id": book, "page_number": "42", "note": "Spice" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Bookmark created successfully");

    let reply = app
        .send(
            Method::POST,
            "/api/bookmarks",
            Some(&reader),
            Some(json!({ "book_id": book, "page_number": 42 })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Bookmark already exists for this page");

    let reply = app
        .send(
            Method::POST,
            "/api/reading-progress",
            Some(&reader),
            Some(json!({ "book_id": book, "current_page": 150 })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["progress_percentage"], 50.0);

    let reply = app
        .send(
            Method::POST,
            "/api/reviews",
            Some(&reader),
            Some(json!({ "book_id": book, "rating": 5, "review_text": "<b>Great</b>" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let uri = format!("/api/reader?id={}", book);
    let reply = app.send(Method::GET, &uri, Some(&reader), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["book"]["title"], "Dune");
    assert_eq!(reply.body["data"]["progress"]["current_page"], 150);
    assert_eq!(reply.body["data"]["bookmarks"][0]["page_number"], 42);
    assert_eq!(
        reply.body["data"]["reviews"][0]["review_text"],
        "&lt;b&gt;Great&lt;/b&gt;"
    );
    assert_eq!(reply.body["data"]["rating"]["average"], 5.0);

    let uri = format!("/api/reading-progress?book_id={}", book);
    let reply = app.send(Method::DELETE, &uri, Some(&reader), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = app.send(Method::GET, &uri, Some(&reader), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["data"].is_null());
}
