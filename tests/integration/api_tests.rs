//! API integration tests
//!
//! Drive the full router (extractors, handlers, services) over the in-memory
//! store, one request at a time.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use shelfmark::{
    api,
    config::{AppConfig, BootstrapConfig, StoreBackend},
    repository::Repository,
    AppState,
};

const ADMIN_ID: &str = "admin";
const ADMIN_PASSWORD: &str = "admin123";

struct TestApp {
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let mut config = AppConfig::default();
        config.database.backend = StoreBackend::Memory;
        config.uploads.dir =
            std::env::temp_dir().join(format!("shelfmark-api-{}", uuid::Uuid::new_v4()));
        config.bootstrap = BootstrapConfig {
            admin_membership_id: Some(ADMIN_ID.to_string()),
            admin_password: Some(ADMIN_PASSWORD.to_string()),
            admin_name: None,
            admin_phone: None,
        };

        let bootstrap = config.bootstrap.clone();
        let state = AppState::new(config, Repository::in_memory());
        state
            .services
            .users
            .ensure_admin(&bootstrap)
            .await
            .expect("bootstrap admin");

        Self {
            router: api::create_router(state),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.send(request).await
    }

    async fn login(&self, membership_id: &str, password: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "userId": membership_id, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().expect("No token in response").to_string()
    }

    async fn admin_token(&self) -> String {
        self.login(ADMIN_ID, ADMIN_PASSWORD).await
    }

    /// Register a member and return (user id, token)
    async fn member(&self, membership_id: &str, phone: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "name": format!("Member {}", membership_id),
                    "userId": membership_id,
                    "password": "secret1",
                    "phone": phone,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        let id = body["id"].as_str().expect("user id").to_string();
        (id, self.login(membership_id, "secret1").await)
    }

    async fn book(&self, admin: &str, title: &str, copies: i32) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/books",
                Some(admin),
                Some(json!({
                    "title": title,
                    "author": "Octavia E. Butler",
                    "isbn": "978-0446675505",
                    "genre": "Science Fiction",
                    "publicationYear": 1993,
                    "totalCopies": copies,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create book failed: {}", body);
        body["id"].as_str().expect("book id").to_string()
    }

    async fn request_book(&self, token: &str, book_id: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/borrowings",
            Some(token),
            Some(json!({ "bookId": book_id })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.call(Method::GET, "/api/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = TestApp::new().await;
    let (id, token) = app.member("lib001", "0700000001").await;

    let (status, body) = app.call(Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["membershipId"], "LIB001");
    assert_eq!(body["membershipInfo"], "LIB001 (student)");
    assert_eq!(body["role"], "user");
    assert!(body.get("password").is_none());

    // Login is case-insensitive on the membership ID
    app.login("LiB001", "secret1").await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "userId": "lib001", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_membership_id_conflicts() {
    let app = TestApp::new().await;
    app.member("lib001", "0700000001").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "name": "Someone Else",
                "userId": "LIB001",
                "password": "secret1",
                "phone": "0700000002",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_access_gate() {
    let app = TestApp::new().await;
    let (_, member) = app.member("lib001", "0700000001").await;

    let (status, body) = app.call(Method::GET, "/api/borrowings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "No token provided");

    let (status, body) = app
        .call(Method::GET, "/api/borrowings", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token");

    let (status, _) = app.call(Method::GET, "/api/users", Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/books",
            Some(&member),
            Some(json!({
                "title": "Kindred",
                "author": "Octavia E. Butler",
                "isbn": "978-0807083697",
                "genre": "Fiction",
                "publicationYear": 1979,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deleted_user_token_is_stale() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (id, member) = app.member("lib001", "0700000001").await;

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/users/{}", id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.call(Method::GET, "/api/auth/profile", Some(&member), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User no longer exists");
}

#[tokio::test]
async fn test_borrowing_lifecycle() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (x_id, x) = app.member("lib001", "0700000001").await;
    let (_, y) = app.member("lib002", "0700000002").await;
    let book = app.book(&admin, "Parable of the Sower", 1).await;

    let (status, x_request) = app.request_book(&x, &book).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(x_request["status"], "pending");
    assert_eq!(x_request["user"]["id"], x_id.as_str());
    assert_eq!(x_request["book"]["title"], "Parable of the Sower");
    assert!(x_request["tokenNumber"].as_str().unwrap().starts_with("REQ-"));
    let x_borrowing = x_request["id"].as_str().unwrap().to_string();

    let (status, y_request) = app.request_book(&y, &book).await;
    assert_eq!(status, StatusCode::CREATED);
    let y_borrowing = y_request["id"].as_str().unwrap().to_string();

    // Requesting does not reserve a copy
    let (_, book_view) = app.call(Method::GET, &format!("/api/books/{}", book), None, None).await;
    assert_eq!(book_view["availableCopies"], 1);

    // Members cannot approve
    let (status, _) = app
        .call(Method::PUT, &format!("/api/borrowings/{}/approve", x_borrowing), Some(&x), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = app
        .call(Method::PUT, &format!("/api/borrowings/{}/approve", x_borrowing), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "borrowed");
    assert!(approved["borrowDate"].is_string());
    assert_eq!(approved["isOverdue"], false);

    let (_, book_view) = app.call(Method::GET, &format!("/api/books/{}", book), None, None).await;
    assert_eq!(book_view["availableCopies"], 0);
    assert_eq!(book_view["isAvailable"], false);

    // The last copy is gone
    let (status, _) = app
        .call(Method::PUT, &format!("/api/borrowings/{}/approve", y_borrowing), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Approving twice is a state error
    let (status, body) = app
        .call(Method::PUT, &format!("/api/borrowings/{}/approve", x_borrowing), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidState");

    // Not overdue yet
    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/borrowings/{}/calculate-fine", x_borrowing),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Someone else's loan cannot be returned by y
    let (status, _) = app
        .call(Method::PUT, &format!("/api/borrowings/{}/return", x_borrowing), Some(&y), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, returned) = app
        .call(Method::PUT, &format!("/api/borrowings/{}/return", x_borrowing), Some(&x), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["status"], "returned");
    assert_eq!(returned["fine"].as_f64(), Some(0.0));
    assert!(returned["returnDate"].is_string());

    let (_, book_view) = app.call(Method::GET, &format!("/api/books/{}", book), None, None).await;
    assert_eq!(book_view["availableCopies"], 1);

    // y's request can now go through
    let (status, _) = app
        .call(Method::PUT, &format!("/api/borrowings/{}/approve", y_borrowing), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_extend_due_date() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, member) = app.member("lib001", "0700000001").await;
    let book = app.book(&admin, "Wild Seed", 2).await;

    let (_, request) = app.request_book(&member, &book).await;
    let id = request["id"].as_str().unwrap().to_string();
    app.call(Method::PUT, &format!("/api/borrowings/{}/approve", id), Some(&admin), None)
        .await;

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/borrowings/{}", id),
            Some(&admin),
            Some(json!({ "dueDate": "2001-01-01T00:00:00Z" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, extended) = app
        .call(
            Method::PUT,
            &format!("/api/borrowings/{}", id),
            Some(&admin),
            Some(json!({ "dueDate": "2099-01-01T00:00:00Z", "notes": "Thesis" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(extended["dueDate"], "2099-01-01T00:00:00Z");
    assert_eq!(extended["status"], "borrowed");
    assert_eq!(extended["notes"], "Thesis");
}

#[tokio::test]
async fn test_user_and_book_deletion_blocked_while_borrowed() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (member_id, member) = app.member("lib001", "0700000001").await;
    let book = app.book(&admin, "Dawn", 1).await;

    let (_, request) = app.request_book(&member, &book).await;
    let id = request["id"].as_str().unwrap().to_string();
    app.call(Method::PUT, &format!("/api/borrowings/{}/approve", id), Some(&admin), None)
        .await;

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/users/{}", member_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .call(Method::DELETE, &format!("/api/books/{}", book), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.call(Method::PUT, &format!("/api/borrowings/{}/return", id), Some(&member), None)
        .await;

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/users/{}", member_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .call(Method::DELETE, &format!("/api/books/{}", book), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_listings_are_scoped_and_filtered() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (x_id, x) = app.member("lib001", "0700000001").await;
    let (y_id, y) = app.member("lib002", "0700000002").await;
    let book = app.book(&admin, "Lilith's Brood", 3).await;

    app.request_book(&x, &book).await;
    app.request_book(&y, &book).await;

    let (status, mine) = app.call(Method::GET, "/api/borrowings", Some(&x), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["userId"], x_id.as_str());

    let (_, all) = app.call(Method::GET, "/api/borrowings", Some(&admin), None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, pending) = app
        .call(Method::GET, "/api/borrowings?status=pending", Some(&admin), None)
        .await;
    assert_eq!(pending.as_array().unwrap().len(), 2);
    let (_, overdue) = app
        .call(Method::GET, "/api/borrowings?overdue=true", Some(&admin), None)
        .await;
    assert!(overdue.as_array().unwrap().is_empty());

    let (status, _) = app
        .call(Method::GET, &format!("/api/users/{}/borrowings", y_id), Some(&x), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, ys) = app
        .call(Method::GET, &format!("/api/users/{}/borrowings", y_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ys.as_array().unwrap().len(), 1);

    let (_, users) = app
        .call(Method::GET, "/api/users?search=lib00", Some(&admin), None)
        .await;
    assert_eq!(users.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_validation_and_not_found() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/books",
            Some(&admin),
            Some(json!({
                "title": "",
                "author": "Anonymous",
                "isbn": "0000",
                "genre": "Unknown",
                "publicationYear": 2000,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let missing = uuid::Uuid::new_v4();
    let (status, _) = app
        .call(Method::GET, &format!("/api/books/{}", missing), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(Method::PUT, &format!("/api/borrowings/{}/approve", missing), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_image_upload_is_served_back() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let boundary = "shelfmark-boundary";
    let payload = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"cover.png\"\r\n\
         Content-Type: image/png\r\n\r\nnot-really-a-png\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload/image")
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(payload))
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", body);
    let url = body["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/image-"));

    let (status, served) = app.call(Method::GET, &url, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, Value::String("not-really-a-png".to_string()));
}

#[tokio::test]
async fn test_pdf_upload_rejects_wrong_type() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let boundary = "shelfmark-boundary";
    let payload = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"pdf\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nhello\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload/pdf")
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(payload))
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Only PDF files are allowed");
}

#[tokio::test]
async fn test_deactivated_user_token_is_refused() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (id, member) = app.member("lib001", "0700000001").await;

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/users/{}", id),
            Some(&admin),
            Some(json!({ "isActive": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "deactivate failed: {}", body);

    let (status, _) = app.call(Method::GET, "/api/auth/profile", Some(&member), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_book_update_cannot_restock_lent_copies() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, member) = app.member("lib001", "0700000001").await;
    let book = app.book(&admin, "Kindred", 1).await;

    let (_, request) = app.request_book(&member, &book).await;
    let borrowing = request["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .call(Method::PUT, &format!("/api/borrowings/{}/approve", borrowing), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/books/{}", book),
            Some(&admin),
            Some(json!({ "availableCopies": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, book_view) = app.call(Method::GET, &format!("/api/books/{}", book), None, None).await;
    assert_eq!(book_view["availableCopies"], 0);
    assert_eq!(book_view["totalCopies"], 1);
}

#[tokio::test]
async fn test_openapi_documents_upload_forms() {
    let app = TestApp::new().await;

    let (status, doc) = app.call(Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    for path in ["/upload/image", "/upload/pdf"] {
        let body = &doc["paths"][path]["post"]["requestBody"]["content"];
        assert!(body.get("multipart/form-data").is_some(), "{} has no multipart body", path);
    }
    assert!(doc["components"]["securitySchemes"].get("bearer_auth").is_some());
}
