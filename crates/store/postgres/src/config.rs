/// Configuration for the Postgres triage store.
pub struct PostgresStoreConfig {
    /// Postgres connection URL.
    pub url: String,
    /// Table name prefix (e.g. `triage_`).
    pub prefix: String,
    /// Maximum connections in the pool.
    pub pool_size: u32,
}

impl PostgresStoreConfig {
    /// Create a new configuration with the given URL and defaults.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prefix: "triage_".to_owned(),
            pool_size: 10,
        }
    }

    /// Set the table prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the connection pool size.
    #[must_use]
    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PostgresStoreConfig::new("postgres://localhost/triage");
        assert_eq!(config.prefix, "triage_");
        assert_eq!(config.pool_size, 10);
    }

    #[test]
    fn builder() {
        let config = PostgresStoreConfig::new("postgres://localhost/triage")
            .with_prefix("mail_")
            .with_pool_size(4);
        assert_eq!(config.prefix, "mail_");
        assert_eq!(config.pool_size, 4);
    }
}
