/// Configuration for the chat platform gateway.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// REST API base URL.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Provisioning probes before giving up on a new group.
    pub provision_attempts: u32,
    /// Delay between provisioning probes, in milliseconds.
    pub provision_delay_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_owned(),
            timeout_seconds: 30,
            provision_attempts: 10,
            provision_delay_ms: 2_000,
        }
    }
}

impl ChatConfig {
    /// Create a config with platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the provisioning poll policy.
    #[must_use]
    pub fn with_provisioning(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.provision_attempts = attempts;
        self.provision_delay_ms = delay_ms;
        self
    }
}
