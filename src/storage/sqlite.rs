use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Cents, NewStatement, OperationType, Statement, StatementId, StatementRecord, User, UserId,
    normalize_email,
};

use super::{AppendOutcome, InsertOutcome, LedgerStore, MIGRATION_001_INITIAL, UserDirectory};

const STATEMENT_COLUMNS: &str =
    "id, sequence, owner_id, counterparty_id, operation, amount_cents, description, created_at";

/// SQLite-backed user directory and ledger store.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect with explicit options, e.g. a busy timeout for concurrent writers.
    pub async fn connect_with(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let repo = Self::connect_with(options.create_if_missing(true), max_connections).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Statement helpers
    // ========================

    /// Summed in append order: every partial sum is a balance the user
    /// held, so SQLite's checked `SUM` stays in range.
    async fn balance_on<'e, E>(executor: E, user: UserId) -> Result<Cents>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user_str = user.to_string();

        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(effect), 0) AS balance
            FROM (
                SELECT CASE
                    WHEN owner_id = ? AND operation = 'deposit' THEN amount_cents
                    WHEN owner_id = ? THEN -amount_cents
                    WHEN counterparty_id = ? THEN amount_cents
                    ELSE 0
                END AS effect
                FROM statements
                WHERE owner_id = ? OR counterparty_id = ?
                ORDER BY sequence
            )
            "#,
        )
        .bind(&user_str)
        .bind(&user_str)
        .bind(&user_str)
        .bind(&user_str)
        .bind(&user_str)
        .fetch_one(executor)
        .await
        .context("Failed to compute balance")?;

        Ok(row.get("balance"))
    }

    /// Body of the guarded append. Runs inside an immediate transaction
    /// opened by the caller, so no other writer interleaves.
    async fn append_locked(
        conn: &mut SqliteConnection,
        entry: NewStatement,
    ) -> Result<AppendOutcome> {
        if entry.operation.is_debit() {
            let balance = Self::balance_on(&mut *conn, entry.owner).await?;
            if entry.amount > balance {
                return Ok(AppendOutcome::Rejected { balance });
            }
        }
        if let Some(credited) = entry.credited() {
            let balance = Self::balance_on(&mut *conn, credited).await?;
            if balance.checked_add(entry.amount).is_none() {
                return Ok(AppendOutcome::Overflow { balance });
            }
        }

        let next: i64 = sqlx::query("SELECT COALESCE(MAX(sequence), 0) + 1 AS next FROM statements")
            .fetch_one(&mut *conn)
            .await
            .context("Failed to get next sequence number")?
            .get("next");

        let owner = entry.owner;
        let record = entry.into_record(next);

        sqlx::query(
            r#"
            INSERT INTO statements
                (id, sequence, owner_id, counterparty_id, operation,
                 amount_cents, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.sequence)
        .bind(record.owner.to_string())
        .bind(record.counterparty.map(|id| id.to_string()))
        .bind(record.operation.as_str())
        .bind(record.amount)
        .bind(&record.description)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to save statement")?;

        let view = record
            .view_for(owner)
            .ok_or_else(|| anyhow::anyhow!("Owner has no view of statement {}", record.id))?;
        Ok(AppendOutcome::Committed(view))
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            name: row.get("name"),
            email: row.get("email"),
            credential_hash: row.get("credential_hash"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    fn row_to_record(row: &SqliteRow) -> Result<StatementRecord> {
        let id_str: String = row.get("id");
        let owner_str: String = row.get("owner_id");
        let counterparty_str: Option<String> = row.get("counterparty_id");
        let operation_str: String = row.get("operation");
        let created_at_str: String = row.get("created_at");

        Ok(StatementRecord {
            id: Uuid::parse_str(&id_str).context("Invalid statement ID")?,
            sequence: row.get("sequence"),
            owner: Uuid::parse_str(&owner_str).context("Invalid owner ID")?,
            counterparty: counterparty_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid counterparty ID")?,
            operation: OperationType::from_str(&operation_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid operation: {}", operation_str))?,
            amount: row.get("amount_cents"),
            description: row.get("description"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("Invalid created_at timestamp")?
        .with_timezone(&Utc))
}

#[async_trait]
impl UserDirectory for SqliteRepository {
    async fn insert_user(&self, user: &User) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, credential_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.credential_hash)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(err))
                if err.is_unique_violation() && err.message().contains("users.email") =>
            {
                Ok(InsertOutcome::DuplicateEmail)
            }
            Err(err) => Err(err).context("Failed to save user"),
        }
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, name, email, credential_hash, created_at FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, name, email, credential_hash, created_at FROM users WHERE email = ?",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by email")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }
}

#[async_trait]
impl LedgerStore for SqliteRepository {
    async fn append(&self, entry: NewStatement) -> Result<AppendOutcome> {
        // IMMEDIATE takes the write lock up front, so the balance read below
        // cannot be invalidated by another writer before our insert.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .context("Failed to begin transaction")?;

        // Rejections and errors roll back when `tx` drops, including when
        // this future is cancelled mid-append.
        let outcome = Self::append_locked(&mut tx, entry).await?;
        if let AppendOutcome::Committed(_) = outcome {
            tx.commit().await.context("Failed to commit statement")?;
        }
        Ok(outcome)
    }

    async fn balance(&self, user: UserId) -> Result<Cents> {
        Self::balance_on(&self.pool, user).await
    }

    async fn find_statement(&self, user: UserId, id: StatementId) -> Result<Option<Statement>> {
        let user_str = user.to_string();
        let query = format!(
            "SELECT {} FROM statements WHERE id = ? AND (owner_id = ? OR counterparty_id = ?)",
            STATEMENT_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(id.to_string())
            .bind(&user_str)
            .bind(&user_str)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch statement")?;

        match row {
            Some(row) => Ok(Self::row_to_record(&row)?.view_for(user)),
            None => Ok(None),
        }
    }

    async fn statements_for(&self, user: UserId) -> Result<Vec<Statement>> {
        let user_str = user.to_string();
        let query = format!(
            "SELECT {} FROM statements WHERE owner_id = ? OR counterparty_id = ? ORDER BY sequence",
            STATEMENT_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(&user_str)
            .bind(&user_str)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list statements")?;

        let mut statements = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(view) = Self::row_to_record(row)?.view_for(user) {
                statements.push(view);
            }
        }
        Ok(statements)
    }
}
