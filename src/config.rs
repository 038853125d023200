use std::path::PathBuf;
use std::time::Duration;

use sqlx::sqlite::SqliteConnectOptions;

/// Default database file, relative to the working directory.
pub const DEFAULT_DATABASE: &str = "tally.db";

/// Runtime settings for opening the SQLite store.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: PathBuf,
    /// How long a writer waits for the database lock before failing
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            busy_timeout: Duration::from_secs(5),
            max_connections: 5,
        }
    }
}

impl Config {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.database)
            .busy_timeout(self.busy_timeout)
            .foreign_keys(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database, PathBuf::from("tally.db"));
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_max_connections_at_least_one() {
        let config = Config::new("x.db").with_max_connections(0);
        assert_eq!(config.max_connections, 1);
    }
}
