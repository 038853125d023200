// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use tally::config::Config;
use tally::domain::{Cents, User, UserId};
use tally::LedgerService;
use tempfile::TempDir;

/// Helper to create a service over a temporary SQLite database
pub async fn sqlite_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = Config::new(temp_dir.path().join("test.db"));
    let service = LedgerService::init(&config).await?;
    Ok((service, temp_dir))
}

/// One service per store implementation. The `TempDir` keeps the SQLite
/// file alive for the duration of the test.
pub async fn all_services() -> Result<Vec<(&'static str, LedgerService, Option<TempDir>)>> {
    let (sqlite, temp) = sqlite_service().await?;
    Ok(vec![
        ("memory", LedgerService::in_memory(), None),
        ("sqlite", sqlite, Some(temp)),
    ])
}

/// Register a user whose email is derived from `name`
pub async fn user(service: &LedgerService, name: &str) -> Result<User> {
    let email = format!("{}@example.com", name.to_lowercase());
    Ok(service.create_user(name, &email, None).await?)
}

/// Sum of the balances of `users`
pub async fn total_balance(service: &LedgerService, users: &[UserId]) -> Result<Cents> {
    let mut total = 0;
    for id in users {
        total += service.get_balance(*id).await?.balance;
    }
    Ok(total)
}
