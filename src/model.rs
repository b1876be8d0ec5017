use chrono::NaiveDateTime;
use sqlx::{query_as, SqliteConnection};

const USER_COLUMNS: &str = "id, username, email, hashed_password";
const TODO_COLUMNS: &str = "id, user_id, task, is_finished, due_date, created_at";

// Row in the `users` table
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct User {
    pub(crate) id: i64,
    pub(crate) username: String,
    pub(crate) email: String,
    #[serde(skip_serializing)]
    pub(crate) hashed_password: String,
}

// Row in the `todos` table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, serde::Serialize, serde::Deserialize)]
pub struct Todo {
    pub(crate) id: i64,
    pub(crate) user_id: i64,
    pub(crate) task: String,
    pub(crate) is_finished: bool,
    pub(crate) due_date: NaiveDateTime,
    pub(crate) created_at: NaiveDateTime,
}

// Values for a user row that the database has not numbered yet
#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub hashed_password: &'a str,
}

#[derive(Debug)]
pub struct NewTodo<'a> {
    pub user_id: i64,
    pub task: &'a str,
    pub due_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl User {
    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<User>, sqlx::Error> {
        query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_username(
        conn: &mut SqliteConnection,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
            .bind(username)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_email(
        conn: &mut SqliteConnection,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(conn)
            .await
    }

    /// Insert a user and return the stored row with its generated id.
    ///
    /// Fails with a unique-violation database error if the username or email
    /// is already taken.
    pub async fn insert(
        conn: &mut SqliteConnection,
        new: NewUser<'_>,
    ) -> Result<User, sqlx::Error> {
        query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, hashed_password) VALUES (?, ?, ?) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(new.username)
        .bind(new.email)
        .bind(new.hashed_password)
        .fetch_one(conn)
        .await
    }

    /// Todos owned by this user, oldest first.
    pub async fn todos(&self, conn: &mut SqliteConnection) -> Result<Vec<Todo>, sqlx::Error> {
        Todo::list_by_user(conn, self.id).await
    }

    pub async fn count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(conn)
            .await
    }
}

impl Todo {
    /// Insert a todo; `is_finished` always starts false.
    ///
    /// Fails with a foreign-key database error if `user_id` names no user.
    pub async fn insert(
        conn: &mut SqliteConnection,
        new: NewTodo<'_>,
    ) -> Result<Todo, sqlx::Error> {
        query_as::<_, Todo>(&format!(
            "INSERT INTO todos (user_id, task, is_finished, due_date, created_at) \
             VALUES (?, ?, FALSE, ?, ?) RETURNING {TODO_COLUMNS}"
        ))
        .bind(new.user_id)
        .bind(new.task)
        .bind(new.due_date)
        .bind(new.created_at)
        .fetch_one(conn)
        .await
    }

    // Insertion order; an unknown user simply has no rows
    pub async fn list_by_user(
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<Vec<Todo>, sqlx::Error> {
        query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = ? ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(conn)
        .await
    }

    pub async fn owner(&self, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
        User::find_by_id(conn, self.user_id).await
    }

    pub async fn count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM todos")
            .fetch_one(conn)
            .await
    }
}
