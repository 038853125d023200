use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, UserId};

pub type StatementId = Uuid;

/// The category of a ledger entry as requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Deposit,
    Withdraw,
    Transfer,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Deposit => "deposit",
            OperationType::Withdraw => "withdraw",
            OperationType::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(OperationType::Deposit),
            "withdraw" => Some(OperationType::Withdraw),
            "transfer" => Some(OperationType::Transfer),
            _ => None,
        }
    }

    /// Debits reduce the owner's balance and must be covered by it.
    pub fn is_debit(&self) -> bool {
        matches!(self, OperationType::Withdraw | OperationType::Transfer)
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated request to append one entry. Identifier, sequence and
/// timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatement {
    pub owner: UserId,
    /// Receiver of a transfer; `None` for deposits and withdrawals
    pub counterparty: Option<UserId>,
    pub operation: OperationType,
    pub amount: Cents,
    pub description: String,
}

impl NewStatement {
    pub fn deposit(owner: UserId, amount: Cents, description: impl Into<String>) -> Self {
        Self::single(owner, OperationType::Deposit, amount, description)
    }

    pub fn withdraw(owner: UserId, amount: Cents, description: impl Into<String>) -> Self {
        Self::single(owner, OperationType::Withdraw, amount, description)
    }

    pub fn transfer(
        sender: UserId,
        receiver: UserId,
        amount: Cents,
        description: impl Into<String>,
    ) -> Self {
        assert!(amount > 0, "Statement amount must be positive");
        Self {
            owner: sender,
            counterparty: Some(receiver),
            operation: OperationType::Transfer,
            amount,
            description: description.into(),
        }
    }

    fn single(
        owner: UserId,
        operation: OperationType,
        amount: Cents,
        description: impl Into<String>,
    ) -> Self {
        assert!(amount > 0, "Statement amount must be positive");
        Self {
            owner,
            counterparty: None,
            operation,
            amount,
            description: description.into(),
        }
    }

    /// The user whose balance this entry increases, if any.
    pub fn credited(&self) -> Option<UserId> {
        match self.operation {
            OperationType::Deposit => Some(self.owner),
            OperationType::Withdraw => None,
            OperationType::Transfer => self.counterparty,
        }
    }

    /// Materialize the record with store-assigned fields.
    pub fn into_record(self, sequence: i64) -> StatementRecord {
        StatementRecord {
            id: Uuid::new_v4(),
            sequence,
            owner: self.owner,
            counterparty: self.counterparty,
            operation: self.operation,
            amount: self.amount,
            description: self.description,
            created_at: Utc::now(),
        }
    }
}

/// An appended ledger entry as persisted. A transfer is stored once, owned
/// by the sender with the receiver as counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub id: StatementId,
    /// Append order, strictly increasing per store
    pub sequence: i64,
    pub owner: UserId,
    pub counterparty: Option<UserId>,
    pub operation: OperationType,
    pub amount: Cents,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl StatementRecord {
    /// The movement this record represents from `user`'s side, or `None`
    /// if the user is not a party to it.
    pub fn movement_for(&self, user: UserId) -> Option<Movement> {
        match (self.operation, self.counterparty) {
            (OperationType::Deposit, _) if self.owner == user => Some(Movement::Deposit),
            (OperationType::Withdraw, _) if self.owner == user => Some(Movement::Withdraw),
            (OperationType::Transfer, Some(to)) if self.owner == user => {
                Some(Movement::TransferOut { to })
            }
            (OperationType::Transfer, Some(to)) if to == user => {
                Some(Movement::TransferIn { from: self.owner })
            }
            _ => None,
        }
    }

    /// Project the record into `user`'s statement view.
    pub fn view_for(&self, user: UserId) -> Option<Statement> {
        self.movement_for(user).map(|movement| Statement {
            id: self.id,
            sequence: self.sequence,
            user_id: user,
            movement,
            amount: self.amount,
            description: self.description.clone(),
            created_at: self.created_at,
        })
    }
}

/// One side of a value movement, as observed by a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Movement {
    Deposit,
    Withdraw,
    TransferOut { to: UserId },
    TransferIn { from: UserId },
}

impl Movement {
    pub fn operation(&self) -> OperationType {
        match self {
            Movement::Deposit => OperationType::Deposit,
            Movement::Withdraw => OperationType::Withdraw,
            Movement::TransferOut { .. } | Movement::TransferIn { .. } => OperationType::Transfer,
        }
    }

    pub fn is_credit(&self) -> bool {
        matches!(self, Movement::Deposit | Movement::TransferIn { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Movement::Deposit => "deposit",
            Movement::Withdraw => "withdraw",
            Movement::TransferOut { .. } => "transfer out",
            Movement::TransferIn { .. } => "transfer in",
        }
    }
}

/// A user's view of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub id: StatementId,
    pub sequence: i64,
    /// The user this view belongs to
    pub user_id: UserId,
    #[serde(flatten)]
    pub movement: Movement,
    /// Always positive; the sign comes from `movement`
    pub amount: Cents,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Statement {
    pub fn operation(&self) -> OperationType {
        self.movement.operation()
    }

    /// Effect of this entry on the viewer's balance.
    pub fn signed_amount(&self) -> Cents {
        if self.movement.is_credit() {
            self.amount
        } else {
            -self.amount
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_users() -> (UserId, UserId) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_operation_type_parse() {
        assert_eq!(OperationType::from_str("deposit"), Some(OperationType::Deposit));
        assert_eq!(OperationType::from_str("WITHDRAW"), Some(OperationType::Withdraw));
        assert_eq!(OperationType::from_str("transfer"), Some(OperationType::Transfer));
        assert_eq!(OperationType::from_str("refund"), None);
        assert!(!OperationType::Deposit.is_debit());
        assert!(OperationType::Withdraw.is_debit());
        assert!(OperationType::Transfer.is_debit());
    }

    #[test]
    fn test_deposit_view_only_for_owner() {
        let (owner, other) = sample_users();
        let record = NewStatement::deposit(owner, 1000, "paycheck").into_record(1);

        let view = record.view_for(owner).unwrap();
        assert_eq!(view.movement, Movement::Deposit);
        assert_eq!(view.signed_amount(), 1000);
        assert_eq!(view.user_id, owner);
        assert!(record.view_for(other).is_none());
    }

    #[test]
    fn test_transfer_has_two_sides() {
        let (sender, receiver) = sample_users();
        let record = NewStatement::transfer(sender, receiver, 500, "rent share").into_record(7);

        let out = record.view_for(sender).unwrap();
        let incoming = record.view_for(receiver).unwrap();

        assert_eq!(out.movement, Movement::TransferOut { to: receiver });
        assert_eq!(incoming.movement, Movement::TransferIn { from: sender });
        assert_eq!(out.id, incoming.id);
        assert_eq!(out.signed_amount(), -500);
        assert_eq!(incoming.signed_amount(), 500);
        assert_eq!(out.operation(), OperationType::Transfer);
        assert!(record.view_for(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_credited_party() {
        let (sender, receiver) = sample_users();
        assert_eq!(NewStatement::deposit(sender, 1, "d").credited(), Some(sender));
        assert_eq!(NewStatement::withdraw(sender, 1, "w").credited(), None);
        assert_eq!(
            NewStatement::transfer(sender, receiver, 1, "t").credited(),
            Some(receiver)
        );
    }

    #[test]
    fn test_statement_json_shape() {
        let (sender, receiver) = sample_users();
        let view = NewStatement::transfer(sender, receiver, 250, "lunch")
            .into_record(1)
            .view_for(receiver)
            .unwrap();

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "transfer_in");
        assert_eq!(json["from"], sender.to_string());
        assert_eq!(json["amount"], 250);
    }

    #[test]
    #[should_panic(expected = "Statement amount must be positive")]
    fn test_statement_requires_positive_amount() {
        let (owner, _) = sample_users();
        NewStatement::withdraw(owner, 0, "nothing");
    }
}
