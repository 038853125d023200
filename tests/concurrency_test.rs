//! Concurrent debit tests
//!
//! Many withdrawals race against one balance. The guarded append must let
//! exactly as many through as the balance covers, whatever the interleaving.

mod common;

use anyhow::Result;
use common::{all_services, total_balance, user};
use tally::application::ErrorClass;
use tally::AppError;
use tokio::task::JoinSet;

/// Number of concurrent debit attempts
const ATTEMPTS: usize = 20;

/// Amount each attempt tries to take
const AMOUNT: i64 = 10;

/// Balance covers this many attempts
const COVERED: usize = 5;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    for (backend, service, _guard) in all_services().await? {
        let alice = user(&service, "Alice").await?;
        service
            .deposit(alice.id, AMOUNT * COVERED as i64, "seed")
            .await?;

        let alice_id = alice.id;
        let mut tasks = JoinSet::new();
        for i in 0..ATTEMPTS {
            let service = service.clone();
            tasks.spawn(async move {
                service
                    .withdraw(alice_id, AMOUNT, format!("attempt {i}"))
                    .await
            });
        }

        let mut succeeded = 0;
        let mut rejected = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(_) => succeeded += 1,
                Err(AppError::InsufficientFunds { .. }) => rejected += 1,
                Err(other) => panic!("{backend}: unexpected error {other}"),
            }
        }

        assert_eq!(succeeded, COVERED, "{backend}");
        assert_eq!(rejected, ATTEMPTS - COVERED, "{backend}");
        assert_eq!(service.get_balance(alice.id).await?.balance, 0, "{backend}");
        assert_eq!(
            service.list_statements(alice.id).await?.len(),
            COVERED + 1,
            "{backend}"
        );
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_preserve_total() -> Result<()> {
    for (backend, service, _guard) in all_services().await? {
        let alice = user(&service, "Alice").await?;
        let bob = user(&service, "Bob").await?;
        service.deposit(alice.id, 100, "seed").await?;
        service.deposit(bob.id, 100, "seed").await?;

        let mut tasks = JoinSet::new();
        for i in 0..ATTEMPTS {
            let service = service.clone();
            let (from, to) = if i % 2 == 0 {
                (alice.id, bob.id)
            } else {
                (bob.id, alice.id)
            };
            tasks.spawn(async move { service.transfer(from, to, 30, "ping").await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(_) | Err(AppError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("{backend}: unexpected error {other}"),
            }
        }

        let alice_balance = service.get_balance(alice.id).await?.balance;
        let bob_balance = service.get_balance(bob.id).await?.balance;
        assert!(alice_balance >= 0 && bob_balance >= 0, "{backend}");
        assert_eq!(
            total_balance(&service, &[alice.id, bob.id]).await?,
            200,
            "{backend}"
        );
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_never_overflow() -> Result<()> {
    for (backend, service, _guard) in all_services().await? {
        let alice = user(&service, "Alice").await?;
        service
            .deposit(alice.id, i64::MAX - AMOUNT * COVERED as i64, "seed")
            .await?;

        let alice_id = alice.id;
        let mut tasks = JoinSet::new();
        for i in 0..ATTEMPTS {
            let service = service.clone();
            tasks.spawn(async move {
                service
                    .deposit(alice_id, AMOUNT, format!("attempt {i}"))
                    .await
            });
        }

        let mut succeeded = 0;
        let mut rejected = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(_) => succeeded += 1,
                Err(AppError::InvalidAmount(_)) => rejected += 1,
                Err(other) => panic!("{backend}: unexpected error {other}"),
            }
        }

        assert_eq!(succeeded, COVERED, "{backend}");
        assert_eq!(rejected, ATTEMPTS - COVERED, "{backend}");
        assert_eq!(
            service.get_balance(alice.id).await?.balance,
            i64::MAX,
            "{backend}"
        );
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_registrations_with_same_email() -> Result<()> {
    for (backend, service, _guard) in all_services().await? {
        let mut tasks = JoinSet::new();
        for i in 0..ATTEMPTS {
            let service = service.clone();
            tasks.spawn(async move {
                service
                    .create_user(format!("Claimant {i}"), "Shared@Example.com", None)
                    .await
            });
        }

        let mut created = Vec::new();
        let mut conflicts = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(user) => created.push(user),
                Err(err @ AppError::UserAlreadyExists(_)) => {
                    assert_eq!(err.class(), ErrorClass::Conflict, "{backend}");
                    conflicts += 1;
                }
                Err(other) => panic!("{backend}: unexpected error {other}"),
            }
        }

        assert_eq!(created.len(), 1, "{backend}");
        assert_eq!(conflicts, ATTEMPTS - 1, "{backend}");
        let stored = service.get_user_by_email("shared@example.com").await?;
        assert_eq!(stored.id, created[0].id, "{backend}");
    }
    Ok(())
}
