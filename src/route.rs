use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handler::*, AppState};

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_checker_handler))
        .route("/users", post(create_user))
        .route("/users/", post(create_user))
        .route("/todos", post(create_todo))
        .route("/todos/", post(create_todo))
        .route("/todos/{user_id}", get(get_todos))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use sqlx::SqlitePool;
    use tower::ServiceExt;

    use crate::{
        db::{self, memory_pool},
        model::{Todo, User},
        password::verify_password,
        session::DbSession,
    };

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
    }

    async fn send_request(
        router: Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    impl TestApp {
        async fn new() -> Self {
            Self::with_pool(memory_pool().await)
        }

        // Database file with several connections, so requests really overlap
        async fn on_disk(dir: &tempfile::TempDir) -> Self {
            let url = format!("sqlite://{}", dir.path().join("todo.db").display());
            let pool = db::connect(&url, 8).await.unwrap();
            db::init_schema(&pool).await.unwrap();
            Self::with_pool(pool)
        }

        fn with_pool(db: SqlitePool) -> Self {
            let state = Arc::new(AppState { db });
            Self {
                router: create_router(state.clone()),
                state,
            }
        }

        fn pool(&self) -> &SqlitePool {
            &self.state.db
        }

        async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            send_request(self.router.clone(), method, uri, body).await
        }

        // Fire every body at `uri` at once and collect the statuses
        async fn post_concurrently(&self, uri: &'static str, bodies: Vec<Value>) -> Vec<StatusCode> {
            let handles: Vec<_> = bodies
                .into_iter()
                .map(|body| {
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        send_request(router, Method::POST, uri, Some(body)).await.0
                    })
                })
                .collect();

            let mut statuses = Vec::new();
            for handle in handles {
                statuses.push(handle.await.unwrap());
            }
            statuses
        }

        async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.send(Method::POST, uri, Some(body)).await
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Method::GET, uri, None).await
        }

        async fn create_user(&self, username: &str) -> i64 {
            let (status, body) = self
                .post(
                    "/users/",
                    json!({
                        "username": username,
                        "email": format!("{username}@example.com"),
                        "password": "s3cret",
                    }),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["id"].as_i64().unwrap()
        }

        async fn counts(&self) -> (i64, i64) {
            let mut session = DbSession::acquire(&self.state).await.unwrap();
            (
                User::count(&mut session).await.unwrap(),
                Todo::count(&mut session).await.unwrap(),
            )
        }
    }

    #[tokio::test]
    async fn health_check() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
    }

    #[tokio::test]
    async fn create_user_echoes_without_password() {
        let app = TestApp::new().await;
        let (status, body) = app
            .post(
                "/users/",
                json!({"username": "ada", "email": "ada@example.com", "password": "s3cret"}),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["id"].is_i64());
        assert_eq!(body["username"], "ada");
        assert_eq!(body["email"], "ada@example.com");
        let fields: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(fields.len(), 3);
        assert!(!body.to_string().contains("s3cret"));
        assert!(!body.to_string().contains("argon2"));
    }

    #[tokio::test]
    async fn stored_password_is_hashed() {
        let app = TestApp::new().await;
        let id = app.create_user("ada").await;

        let hashed: String = sqlx::query_scalar("SELECT hashed_password FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(app.pool())
            .await
            .unwrap();
        assert_ne!(hashed, "s3cret");
        assert!(verify_password("s3cret", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let app = TestApp::new().await;
        app.create_user("ada").await;

        let (status, body) = app
            .post(
                "/users/",
                json!({"username": "ada", "email": "other@example.com", "password": "pw"}),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username already registered");
        assert_eq!(app.counts().await.0, 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let app = TestApp::new().await;
        app.create_user("ada").await;

        let (status, body) = app
            .post(
                "/users",
                json!({"username": "grace", "email": "ada@example.com", "password": "pw"}),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already registered");
        assert_eq!(app.counts().await.0, 1);
    }

    #[tokio::test]
    async fn create_user_validation_lists_fields() {
        let app = TestApp::new().await;
        let (status, body) = app.post("/users/", json!({"username": 42})).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["username", "email", "password"]);
        assert_eq!(app.counts().await.0, 0);
    }

    #[tokio::test]
    async fn malformed_json_is_422() {
        let app = TestApp::new().await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/users/")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn create_todo_for_missing_user() {
        let app = TestApp::new().await;
        let (status, body) = app
            .post(
                "/todos/",
                json!({"user_id": 99, "task": "buy milk", "due_date": "2024-01-01T00:00:00"}),
            )
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User not found");
        assert_eq!(app.counts().await.1, 0);
    }

    #[tokio::test]
    async fn create_todo_for_existing_user() {
        let app = TestApp::new().await;
        let user_id = app.create_user("ada").await;
        let before = chrono::Utc::now().naive_utc();

        let (status, body) = app
            .post(
                "/todos/",
                json!({"user_id": user_id, "task": "buy milk", "due_date": "2024-01-01T00:00:00"}),
            )
            .await;
        let after = chrono::Utc::now().naive_utc();

        assert_eq!(status, StatusCode::OK);
        assert!(body["id"].is_i64());
        assert_eq!(body["task"], "buy milk");
        assert_eq!(body["due_date"], "2024-01-01T00:00:00");
        assert_eq!(body.as_object().unwrap().len(), 3);

        let mut session = DbSession::acquire(&app.state).await.unwrap();
        let todos = Todo::list_by_user(&mut session, user_id).await.unwrap();
        assert_eq!(todos.len(), 1);
        assert!(!todos[0].is_finished);
        assert!(todos[0].created_at >= before && todos[0].created_at <= after);

        let owner = todos[0].owner(&mut session).await.unwrap().unwrap();
        assert_eq!(owner.id, user_id);
        assert_eq!(owner.todos(&mut session).await.unwrap(), todos);
    }

    #[tokio::test]
    async fn create_todo_validation_lists_fields() {
        let app = TestApp::new().await;
        let (status, body) = app
            .post("/todos/", json!({"user_id": "abc", "due_date": "later"}))
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn list_todos_empty_for_user_without_todos() {
        let app = TestApp::new().await;
        let user_id = app.create_user("ada").await;

        let (status, body) = app.get(&format!("/todos/{user_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn list_todos_empty_for_unknown_user() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/todos/12345").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn list_todos_returns_own_todos_in_insertion_order() {
        let app = TestApp::new().await;
        let ada = app.create_user("ada").await;
        let grace = app.create_user("grace").await;

        let mut created = Vec::new();
        for (user_id, task) in [(ada, "first"), (grace, "not mine"), (ada, "second"), (ada, "third")] {
            let (status, body) = app
                .post(
                    "/todos/",
                    json!({"user_id": user_id, "task": task, "due_date": "2024-06-30T12:30:00"}),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            if user_id == ada {
                created.push(body["id"].as_i64().unwrap());
            }
        }

        let (status, body) = app.get(&format!("/todos/{ada}")).await;
        assert_eq!(status, StatusCode::OK);

        let todos: Vec<Todo> = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(todos.len(), 3);
        assert_eq!(todos.iter().map(|t| t.id).collect::<Vec<_>>(), created);
        assert_eq!(
            todos.iter().map(|t| t.task.as_str()).collect::<Vec<_>>(),
            vec!["first", "second", "third"]
        );
        for (todo, raw) in todos.iter().zip(body.as_array().unwrap()) {
            assert_eq!(todo.user_id, ada);
            assert_eq!(raw["is_finished"], false);
            assert_eq!(raw["due_date"], "2024-06-30T12:30:00");
            assert!(raw["created_at"].is_string());
        }
    }

    #[tokio::test]
    async fn list_todos_rejects_non_integer_id() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/todos/abc").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0]["field"], "user_id");
    }

    #[tokio::test]
    async fn offset_due_date_is_stored_as_utc() {
        let app = TestApp::new().await;
        let user_id = app.create_user("ada").await;

        let (status, body) = app
            .post(
                "/todos/",
                json!({"user_id": user_id, "task": "call", "due_date": "2024-01-01T02:00:00+02:00"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["due_date"], "2024-01-01T00:00:00");
    }

    #[tokio::test]
    async fn integral_float_user_id_is_accepted() {
        let app = TestApp::new().await;
        let user_id = app.create_user("ada").await;

        let (status, body) = app
            .post(
                "/todos/",
                json!({"user_id": user_id as f64, "task": "t", "due_date": "2024-01-01T00:00:00"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, body) = app.get(&format!("/todos/{user_id}.0")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn padded_path_id_is_rejected() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/todos/%201%20").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0]["field"], "user_id");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_do_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::on_disk(&dir).await;

        let distinct = (0..8)
            .map(|i| json!({"username": format!("user{i}"), "email": format!("user{i}@example.com"), "password": "pw"}))
            .collect();
        let statuses = app.post_concurrently("/users/", distinct).await;
        assert!(statuses.iter().all(|s| *s == StatusCode::OK), "{statuses:?}");

        let user_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE username = 'user0'")
            .fetch_one(app.pool())
            .await
            .unwrap();
        let todos = (0..8)
            .map(|i| json!({"user_id": user_id, "task": format!("task {i}"), "due_date": "2024-01-01T00:00:00"}))
            .collect();
        let statuses = app.post_concurrently("/todos/", todos).await;
        assert!(statuses.iter().all(|s| *s == StatusCode::OK), "{statuses:?}");

        let (status, body) = app.get(&format!("/todos/{user_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 8);
        assert_eq!(app.counts().await, (8, 8));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_username_race_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::on_disk(&dir).await;

        let racers = (0..6)
            .map(|i| json!({"username": "ada", "email": format!("ada{i}@example.com"), "password": "pw"}))
            .collect();
        let statuses = app.post_concurrently("/users/", racers).await;

        let created = statuses.iter().filter(|s| **s == StatusCode::OK).count();
        let conflicts = statuses.iter().filter(|s| **s == StatusCode::BAD_REQUEST).count();
        assert_eq!((created, conflicts), (1, 5), "{statuses:?}");
        assert_eq!(app.counts().await.0, 1);
    }
}
