use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// This node's own ingestion URI. Destinations with the same authority are refused.
    pub self_uri: Option<String>,
    /// Address the node listens on. Also treated as our own authority, so a
    /// node without a public URL still refuses to federate to itself.
    pub listen_host: String,
    pub listen_port: u16,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// How long a destination stays suspended after exhausting its retries.
    pub suspension: chrono::Duration,
    pub max_in_flight: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            self_uri: None,
            listen_host: "0.0.0.0".into(),
            listen_port: 3000,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            suspension: chrono::Duration::hours(1),
            max_in_flight: 32,
        }
    }
}
