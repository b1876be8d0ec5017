use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use crate::{
    error::AppError,
    extractor::{UserIdPath, ValidJson},
    model::{NewTodo, NewUser, Todo, User},
    password::hash_password,
    schema::{CreateTodoSchema, CreateUserSchema, CreatedTodoResponse, UserResponse},
    session::DbSession,
};

// Handler for the health checker route
pub async fn health_checker_handler() -> impl IntoResponse {
    const MESSAGE: &str = "User and todo API with Rust, SQLx, SQLite, and Axum";

    let json_response = serde_json::json!({
        "status": "success",
        "message": MESSAGE
    });

    Json(json_response)
}

// Handler for registering a new user
pub async fn create_user(
    mut session: DbSession,
    ValidJson(body): ValidJson<CreateUserSchema>,
) -> Result<impl IntoResponse, AppError> {
    let CreateUserSchema {
        username,
        email,
        password,
    } = body;

    // Argon2 is CPU bound; keep it off the runtime and outside the write lock
    let hashed_password = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("spawn password hashing task: {e}")))??;

    let mut tx = session.begin().await?;

    if User::find_by_username(&mut tx, &username).await?.is_some() {
        return Err(AppError::Conflict("Username already registered".into()));
    }
    if User::find_by_email(&mut tx, &email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let new_user = NewUser {
        username: &username,
        email: &email,
        hashed_password: &hashed_password,
    };

    // A concurrent registration can still win the race past the checks above
    let user = User::insert(&mut tx, new_user).await.map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Conflict("Username or email already registered".into())
        }
        other => other.into(),
    })?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, username = %user.username, "user created");
    Ok((StatusCode::OK, Json(UserResponse::from(user))))
}

// Handler for creating a todo owned by an existing user
pub async fn create_todo(
    mut session: DbSession,
    ValidJson(body): ValidJson<CreateTodoSchema>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = session.begin().await?;

    if User::find_by_id(&mut tx, body.user_id).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }

    let new_todo = NewTodo {
        user_id: body.user_id,
        task: &body.task,
        due_date: body.due_date,
        created_at: Utc::now().naive_utc(),
    };
    let todo = Todo::insert(&mut tx, new_todo).await.map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            AppError::NotFound("User not found".into())
        }
        other => other.into(),
    })?;
    tx.commit().await?;

    tracing::debug!(todo_id = todo.id, user_id = todo.user_id, "todo created");
    Ok((StatusCode::OK, Json(CreatedTodoResponse::from(todo))))
}

// Handler for listing a user's todos; unknown users just have none
pub async fn get_todos(
    UserIdPath(user_id): UserIdPath,
    mut session: DbSession,
) -> Result<impl IntoResponse, AppError> {
    let todos = Todo::list_by_user(&mut session, user_id).await?;
    Ok(Json(todos))
}
