mod memory;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{Cents, NewStatement, Statement, StatementId, User, UserId};

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Result of a guarded append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was persisted.
    Committed(Statement),
    /// A debit was not covered by the owner's balance at commit time.
    /// Nothing was written.
    Rejected { balance: Cents },
    /// A credit would push the credited user's balance past `Cents::MAX`.
    /// Nothing was written.
    Overflow { balance: Cents },
}

/// Result of registering a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another user already holds the email; nothing was written.
    DuplicateEmail,
}

/// Read and registration access to users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Persist a new user. A taken email is reported as `DuplicateEmail`
    /// rather than an error, so racing registrations resolve cleanly.
    async fn insert_user(&self, user: &User) -> Result<InsertOutcome>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>>;

    /// Lookup by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// Append-only statement storage with derived balances.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an entry, assigning id, sequence and timestamp.
    ///
    /// Debits (withdraw, transfer) are checked against the owner's balance in
    /// the same atomic unit as the insert; if uncovered, nothing is written
    /// and `Rejected` is returned. Credits commit unless they would overflow
    /// the credited balance, which yields `Overflow`.
    async fn append(&self, entry: NewStatement) -> Result<AppendOutcome>;

    /// Signed sum of every entry the user is a party to.
    async fn balance(&self, user: UserId) -> Result<Cents>;

    /// The user's view of a statement, or `None` if it does not exist or the
    /// user is not a party to it.
    async fn find_statement(&self, user: UserId, id: StatementId) -> Result<Option<Statement>>;

    /// Every entry the user is a party to, in append order.
    async fn statements_for(&self, user: UserId) -> Result<Vec<Statement>>;
}
