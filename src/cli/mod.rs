use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::Level;
use uuid::Uuid;

use crate::application::LedgerService;
use crate::config::{Config, DEFAULT_DATABASE};
use crate::domain::{Cents, Movement, Statement, User, format_cents, parse_cents};

/// Tally - Statement Ledger
#[derive(Parser)]
#[command(name = "tally")]
#[command(
    about = "Deposits, withdrawals and transfers with balances derived from statement history"
)]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "TALLY_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Milliseconds a writer waits for the database lock
    #[arg(long, env = "TALLY_BUSY_TIMEOUT_MS", default_value = "5000")]
    pub busy_timeout_ms: u64,

    /// Maximum pooled database connections
    #[arg(long, env = "TALLY_MAX_CONNECTIONS", default_value = "5")]
    pub max_connections: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Record a deposit
    Deposit {
        /// User id or email
        user: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Description of the deposit
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Record a withdrawal
    Withdraw {
        /// User id or email
        user: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Description of the withdrawal
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Transfer funds to another user
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Sending user (id or email)
        #[arg(long)]
        from: String,

        /// Receiving user (id or email)
        #[arg(long)]
        to: String,

        /// Description of the transfer
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Show a user's balance
    Balance {
        /// User id or email
        user: String,
    },

    /// List a user's statements
    Statements {
        /// User id or email
        user: String,

        /// Show only the most recent N statements
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one statement as seen by a user
    Show {
        /// User id or email
        user: String,

        /// Statement ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Create {
        /// Display name
        name: String,

        /// Email address (must be unique)
        email: String,

        /// Credential hash produced by the authentication layer
        #[arg(long)]
        credential_hash: Option<String>,
    },

    /// Show a user's profile
    Show {
        /// User id or email
        user: String,
    },
}

impl Cli {
    /// Install the stderr log subscriber. `--verbose` raises the level to debug.
    pub fn init_logging(&self) {
        let level = if self.verbose { Level::DEBUG } else { Level::WARN };
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    pub fn config(&self) -> Config {
        Config::new(&self.database)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .with_max_connections(self.max_connections)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();
        let json = self.json;

        match self.command {
            Commands::Init => {
                LedgerService::init(&config).await?;
                println!("Database initialized: {}", config.database.display());
            }

            Commands::User(cmd) => {
                let service = open(&config).await?;
                run_user_command(&service, cmd, json).await?;
            }

            Commands::Deposit {
                user,
                amount,
                description,
            } => {
                let service = open(&config).await?;
                let user = resolve_user(&service, &user).await?;
                let statement = service
                    .deposit(user.id, parse_amount(&amount)?, description)
                    .await?;
                print_recorded(&statement, json)?;
            }

            Commands::Withdraw {
                user,
                amount,
                description,
            } => {
                let service = open(&config).await?;
                let user = resolve_user(&service, &user).await?;
                let statement = service
                    .withdraw(user.id, parse_amount(&amount)?, description)
                    .await?;
                print_recorded(&statement, json)?;
            }

            Commands::Transfer {
                amount,
                from,
                to,
                description,
            } => {
                let service = open(&config).await?;
                let sender = resolve_user(&service, &from).await?;
                let receiver = resolve_user(&service, &to).await?;
                let statement = service
                    .transfer(sender.id, receiver.id, parse_amount(&amount)?, description)
                    .await?;
                print_recorded(&statement, json)?;
            }

            Commands::Balance { user } => {
                let service = open(&config).await?;
                let user = resolve_user(&service, &user).await?;
                let summary = service.get_balance(user.id).await?;
                if json {
                    print_json(&summary)?;
                } else {
                    println!("{} <{}>: {}", user.name, user.email, format_cents(summary.balance));
                }
            }

            Commands::Statements { user, limit } => {
                let service = open(&config).await?;
                let user = resolve_user(&service, &user).await?;
                let statements = service.list_statements(user.id).await?;
                run_statements_command(&statements, limit, json)?;
            }

            Commands::Show { user, id } => {
                let service = open(&config).await?;
                let user = resolve_user(&service, &user).await?;
                let statement_id = Uuid::parse_str(&id).context("Invalid statement ID")?;
                let statement = service.get_statement(user.id, statement_id).await?;
                if json {
                    print_json(&statement)?;
                } else {
                    print_statement_details(&statement);
                }
            }
        }

        Ok(())
    }
}

async fn open(config: &Config) -> Result<LedgerService> {
    LedgerService::connect(config).await.with_context(|| {
        format!(
            "Cannot open {}. Run `tally init` first",
            config.database.display()
        )
    })
}

async fn run_user_command(service: &LedgerService, cmd: UserCommands, json: bool) -> Result<()> {
    match cmd {
        UserCommands::Create {
            name,
            email,
            credential_hash,
        } => {
            let user = service.create_user(name, &email, credential_hash).await?;
            if json {
                print_json(&user)?;
            } else {
                println!("Created user: {} <{}> ({})", user.name, user.email, user.id);
            }
        }

        UserCommands::Show { user } => {
            let user = resolve_user(service, &user).await?;
            if json {
                print_json(&user)?;
            } else {
                println!("User: {}", user.id);
                println!("  Name:       {}", user.name);
                println!("  Email:      {}", user.email);
                println!(
                    "  Created at: {}",
                    user.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
    Ok(())
}

fn run_statements_command(
    statements: &[Statement],
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let skip = limit.map_or(0, |n| statements.len().saturating_sub(n));
    let shown = &statements[skip..];

    if json {
        return print_json(shown);
    }

    if shown.is_empty() {
        println!("No statements found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<13} {:>12} {:>12} DESCRIPTION",
        "DATE", "TYPE", "AMOUNT", "BALANCE"
    );
    println!("{}", "-".repeat(70));

    // running balance over the full history, printed for the shown tail
    let mut balance = running_balance(0, &statements[..skip])?;
    for statement in shown {
        balance = running_balance(balance, std::slice::from_ref(statement))?;
        println!(
            "{:<12} {:<13} {:>12} {:>12} {}",
            statement.created_at.format("%Y-%m-%d"),
            statement.movement.label(),
            format_cents(statement.signed_amount()),
            format_cents(balance),
            truncate(&statement.description, 30)
        );
    }
    Ok(())
}

fn running_balance(start: Cents, statements: &[Statement]) -> Result<Cents> {
    statements.iter().try_fold(start, |balance, statement| {
        balance
            .checked_add(statement.signed_amount())
            .context("Running balance out of range")
    })
}

fn print_recorded(statement: &Statement, json: bool) -> Result<()> {
    if json {
        return print_json(statement);
    }
    match statement.movement {
        Movement::TransferOut { to } => println!(
            "Recorded transfer: {} -> {} ({})",
            format_cents(statement.amount),
            to,
            statement.id
        ),
        _ => println!(
            "Recorded {}: {} ({})",
            statement.movement.label(),
            format_cents(statement.amount),
            statement.id
        ),
    }
    Ok(())
}

fn print_statement_details(statement: &Statement) {
    println!("Statement: {}", statement.id);
    println!("  Sequence:    {}", statement.sequence);
    println!(
        "  Date:        {}",
        statement.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Type:        {}", statement.movement.label());
    println!("  Amount:      {}", format_cents(statement.amount));
    match statement.movement {
        Movement::TransferOut { to } => println!("  To:          {}", to),
        Movement::TransferIn { from } => println!("  From:        {}", from),
        _ => {}
    }
    if !statement.description.is_empty() {
        println!("  Description: {}", statement.description);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Accept either a user id or an email address.
async fn resolve_user(service: &LedgerService, reference: &str) -> Result<User> {
    let user = match Uuid::parse_str(reference) {
        Ok(id) => service.get_user(id).await?,
        Err(_) => service.get_user_by_email(reference).await?,
    };
    Ok(user)
}

fn parse_amount(input: &str) -> Result<Cents> {
    parse_cents(input).context("Invalid amount format. Use '50.00' or '50'")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_transfer_command() {
        let cli = Cli::try_parse_from([
            "tally",
            "--database",
            "ledger.db",
            "transfer",
            "7.00",
            "--from",
            "a@example.com",
            "--to",
            "b@example.com",
            "-d",
            "split",
        ])
        .unwrap();

        assert_eq!(cli.database, PathBuf::from("ledger.db"));
        match cli.command {
            Commands::Transfer {
                amount,
                from,
                to,
                description,
            } => {
                assert_eq!(amount, "7.00");
                assert_eq!(from, "a@example.com");
                assert_eq!(to, "b@example.com");
                assert_eq!(description, "split");
            }
            _ => panic!("expected transfer command"),
        }
    }

    #[test]
    fn test_running_balance_is_checked() {
        use crate::domain::NewStatement;

        let user = Uuid::new_v4();
        let history: Vec<Statement> = [
            NewStatement::deposit(user, 700, "a"),
            NewStatement::withdraw(user, 200, "b"),
        ]
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| entry.into_record(i as i64 + 1).view_for(user))
        .collect();

        assert_eq!(running_balance(0, &history).unwrap(), 500);
        assert!(running_balance(Cents::MAX, &history[..1]).is_err());
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("café au lait, s'il vous plaît", 10), "café au...");
    }
}
