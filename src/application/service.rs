use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::domain::{
    Cents, NewStatement, OperationType, Statement, StatementId, User, UserId, normalize_email,
};
use crate::storage::{
    AppendOutcome, InsertOutcome, LedgerStore, MemoryRepository, SqliteRepository, UserDirectory,
};

use super::AppError;

/// Application service providing the ledger's operations.
/// This is the primary interface for any client (CLI, HTTP layer, tests).
///
/// Storage is injected at construction; the service holds no other state
/// and can be shared across tasks behind an `Arc`.
#[derive(Clone)]
pub struct LedgerService {
    users: Arc<dyn UserDirectory>,
    ledger: Arc<dyn LedgerStore>,
}

/// Current balance of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    pub user_id: UserId,
    pub balance: Cents,
}

impl LedgerService {
    /// Create a new ledger service over the given stores.
    pub fn new(users: Arc<dyn UserDirectory>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { users, ledger }
    }

    /// Use one store for both users and statements.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserDirectory + LedgerStore + 'static,
    {
        Self::new(store.clone(), store)
    }

    /// A service backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryRepository::new()))
    }

    /// Create (if needed) and migrate the database described by `config`.
    pub async fn init(config: &Config) -> Result<Self, AppError> {
        let repo = SqliteRepository::init(config.connect_options(), config.max_connections).await?;
        tracing::debug!(database = %config.database.display(), "database initialized");
        Ok(Self::from_store(Arc::new(repo)))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        let repo =
            SqliteRepository::connect_with(config.connect_options(), config.max_connections)
                .await?;
        Ok(Self::from_store(Arc::new(repo)))
    }

    // ========================
    // User operations
    // ========================

    /// Register a new user. Emails are unique, compared case-insensitively.
    pub async fn create_user(
        &self,
        name: impl Into<String>,
        email: &str,
        credential_hash: Option<String>,
    ) -> Result<User, AppError> {
        let email = normalize_email(email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::UserAlreadyExists(email));
        }

        let mut user = User::new(name, email);
        if let Some(hash) = credential_hash {
            user = user.with_credential_hash(hash);
        }

        // a concurrent registration can claim the email after the lookup
        match self.users.insert_user(&user).await? {
            InsertOutcome::Inserted => {
                tracing::info!(user = %user.id, "user created");
                Ok(user)
            }
            InsertOutcome::DuplicateEmail => Err(AppError::UserAlreadyExists(user.email)),
        }
    }

    /// Get a user by id.
    pub async fn get_user(&self, id: UserId) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Get a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<User, AppError> {
        self.users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::UserNotFound(email.to_string()))
    }

    // ========================
    // Statement operations
    // ========================

    /// Validate and record a deposit, withdrawal or transfer for `user_id`.
    ///
    /// Transfers require `counterparty` (the receiver) and return the
    /// sender's view. Nothing is recorded unless every check passes.
    pub async fn create_statement(
        &self,
        user_id: UserId,
        operation: OperationType,
        amount: Cents,
        description: impl Into<String>,
        counterparty: Option<UserId>,
    ) -> Result<Statement, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount("Amount must be positive".to_string()));
        }
        match (operation, counterparty) {
            (OperationType::Transfer, None) => return Err(AppError::MissingCounterparty),
            (OperationType::Transfer, Some(to)) if to == user_id => {
                return Err(AppError::SelfTransfer);
            }
            (OperationType::Deposit | OperationType::Withdraw, Some(_)) => {
                return Err(AppError::UnexpectedCounterparty);
            }
            _ => {}
        }

        self.get_user(user_id).await?;
        if let Some(receiver) = counterparty {
            self.get_user(receiver).await?;
        }

        if operation.is_debit() {
            let balance = self.ledger.balance(user_id).await?;
            if amount > balance {
                tracing::warn!(user = %user_id, %operation, amount, balance, "debit rejected");
                return Err(AppError::InsufficientFunds {
                    balance,
                    required: amount,
                });
            }
        }

        let description = description.into();
        let entry = match counterparty {
            Some(receiver) => NewStatement::transfer(user_id, receiver, amount, description),
            None if operation == OperationType::Deposit => {
                NewStatement::deposit(user_id, amount, description)
            }
            None => NewStatement::withdraw(user_id, amount, description),
        };

        if let Some(credited) = entry.credited() {
            let balance = self.ledger.balance(credited).await?;
            if balance.checked_add(amount).is_none() {
                tracing::warn!(user = %credited, %operation, amount, balance, "credit overflows");
                return Err(overflow(credited));
            }
        }

        match self.ledger.append(entry).await? {
            AppendOutcome::Committed(statement) => {
                tracing::info!(
                    user = %user_id,
                    statement = %statement.id,
                    %operation,
                    amount,
                    "statement recorded"
                );
                Ok(statement)
            }
            // another debit committed between our check and the append
            AppendOutcome::Rejected { balance } => {
                tracing::warn!(
                    user = %user_id,
                    %operation,
                    amount,
                    balance,
                    "debit rejected at commit"
                );
                Err(AppError::InsufficientFunds {
                    balance,
                    required: amount,
                })
            }
            // or a credit pushed the receiver to the limit
            AppendOutcome::Overflow { balance } => {
                let credited = counterparty.unwrap_or(user_id);
                tracing::warn!(user = %credited, %operation, amount, balance, "credit overflows");
                Err(overflow(credited))
            }
        }
    }

    /// Record a deposit.
    pub async fn deposit(
        &self,
        user_id: UserId,
        amount: Cents,
        description: impl Into<String>,
    ) -> Result<Statement, AppError> {
        self.create_statement(user_id, OperationType::Deposit, amount, description, None)
            .await
    }

    /// Record a withdrawal.
    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: Cents,
        description: impl Into<String>,
    ) -> Result<Statement, AppError> {
        self.create_statement(user_id, OperationType::Withdraw, amount, description, None)
            .await
    }

    /// Record a transfer from `sender` to `receiver`.
    pub async fn transfer(
        &self,
        sender: UserId,
        receiver: UserId,
        amount: Cents,
        description: impl Into<String>,
    ) -> Result<Statement, AppError> {
        self.create_statement(
            sender,
            OperationType::Transfer,
            amount,
            description,
            Some(receiver),
        )
        .await
    }

    // ========================
    // Queries
    // ========================

    /// Get the current balance for a user.
    pub async fn get_balance(&self, user_id: UserId) -> Result<BalanceSummary, AppError> {
        self.get_user(user_id).await?;
        let balance = self.ledger.balance(user_id).await?;
        Ok(BalanceSummary { user_id, balance })
    }

    /// Get one statement as seen by `user_id`.
    pub async fn get_statement(
        &self,
        user_id: UserId,
        statement_id: StatementId,
    ) -> Result<Statement, AppError> {
        self.get_user(user_id).await?;
        tracing::debug!(user = %user_id, statement = %statement_id, "statement lookup");
        self.ledger
            .find_statement(user_id, statement_id)
            .await?
            .ok_or_else(|| AppError::StatementNotFound(statement_id.to_string()))
    }

    /// List a user's statement history, oldest first.
    pub async fn list_statements(&self, user_id: UserId) -> Result<Vec<Statement>, AppError> {
        self.get_user(user_id).await?;
        Ok(self.ledger.statements_for(user_id).await?)
    }
}

fn overflow(user: UserId) -> AppError {
    AppError::InvalidAmount(format!("Amount would overflow the balance of {user}"))
}
