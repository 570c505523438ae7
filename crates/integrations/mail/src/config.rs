/// Configuration for the mail platform gateway.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// REST API base URL.
    pub base_url: String,
    /// The single monitored mailbox address.
    pub mailbox: String,
    /// Maximum messages fetched per call.
    pub batch_size: u32,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl MailConfig {
    /// Create a config for the given mailbox with platform defaults.
    pub fn new(mailbox: impl Into<String>) -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_owned(),
            mailbox: mailbox.into(),
            batch_size: 10,
            timeout_seconds: 30,
        }
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the fetch batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MailConfig::new("it@example.com");
        assert_eq!(config.base_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(config.batch_size, 10);
    }
}
