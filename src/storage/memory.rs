use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{
    Cents, NewStatement, Statement, StatementId, StatementRecord, User, UserId, compute_balance,
    normalize_email,
};

use super::{AppendOutcome, InsertOutcome, LedgerStore, UserDirectory};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    /// Append order; index + 1 is the sequence number
    records: Vec<StatementRecord>,
}

/// In-process user directory and ledger store.
///
/// Each instance owns its own state, so tests construct one per case. All
/// writes go through a single lock, which also makes the guarded append
/// atomic with respect to concurrent debits.
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryRepository {
    async fn insert_user(&self, user: &User) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;

        if state.users.contains_key(&user.id) {
            bail!("User id already taken: {}", user.id);
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Ok(InsertOutcome::DuplicateEmail);
        }

        state.users.insert(user.id, user.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

#[async_trait]
impl LedgerStore for MemoryRepository {
    async fn append(&self, entry: NewStatement) -> Result<AppendOutcome> {
        let mut state = self.state.write().await;

        if entry.operation.is_debit() {
            let balance = compute_balance(entry.owner, &state.records);
            if entry.amount > balance {
                return Ok(AppendOutcome::Rejected { balance });
            }
        }
        if let Some(credited) = entry.credited() {
            let balance = compute_balance(credited, &state.records);
            if balance.checked_add(entry.amount).is_none() {
                return Ok(AppendOutcome::Overflow { balance });
            }
        }

        let owner = entry.owner;
        let record = entry.into_record(state.records.len() as i64 + 1);
        let view = record
            .view_for(owner)
            .ok_or_else(|| anyhow::anyhow!("Owner has no view of statement {}", record.id))?;

        state.records.push(record);
        Ok(AppendOutcome::Committed(view))
    }

    async fn balance(&self, user: UserId) -> Result<Cents> {
        Ok(compute_balance(user, &self.state.read().await.records))
    }

    async fn find_statement(&self, user: UserId, id: StatementId) -> Result<Option<Statement>> {
        Ok(self
            .state
            .read()
            .await
            .records
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.view_for(user)))
    }

    async fn statements_for(&self, user: UserId) -> Result<Vec<Statement>> {
        Ok(self
            .state
            .read()
            .await
            .records
            .iter()
            .filter_map(|r| r.view_for(user))
            .collect())
    }
}
