/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Provider name identity mappings are filed under.
    pub provider: String,
    /// Events older than this skip reply production.
    pub stale_threshold_secs: i64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            provider: "wecom".to_string(),
            stale_threshold_secs: 120,
        }
    }
}
