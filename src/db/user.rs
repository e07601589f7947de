use serde::Serialize;
use sqlx::sqlite::SqlitePool;

/// Account record. The password hash is never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uid: String,
    email: String,
    email_verified: i32,
    password_hash: String,
    created_at: String,
    updated_at: String,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uid: row.uid,
            email: row.email,
            email_verified: row.email_verified != 0,
            password_hash: row.password_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an account. Fails with a unique violation if the email is taken.
    pub async fn insert(&self, email: &str, password_hash: &str) -> Result<UserRecord, sqlx::Error> {
        let uid = uuid::Uuid::new_v4().to_string();
        let result = sqlx::query("INSERT INTO users (uid, email, password_hash) VALUES (?, ?, ?)")
            .bind(&uid)
            .bind(email)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        let row: UserRow = sqlx::query_as(
            "SELECT id, uid, email, email_verified, password_hash, created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(result.last_insert_rowid())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    /// Get a user by email (case-insensitive).
    pub async fn read_by_email(&self, email: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uid, email, email_verified, password_hash, created_at, updated_at
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRecord::from))
    }

    /// All users, oldest first.
    pub async fn list(&self) -> Result<Vec<UserRecord>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, uid, email, email_verified, password_hash, created_at, updated_at
             FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserRecord::from).collect())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Whether `err` is a UNIQUE constraint failure.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
