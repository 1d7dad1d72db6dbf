use std::time::Duration;

/// Inactivity window used when none is configured.
pub const DEFAULT_RX_TIMEOUT: Duration = Duration::from_millis(100);

/// Receive buffers kept for the link by default.
pub const DEFAULT_RX_POOL_SIZE: usize = 2;

/// Who keeps a completed message after delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferPolicy {
    /// The handler receives the only handle; the backend keeps nothing.
    #[default]
    Release,
    /// The endpoint keeps the message until the next one completes; the
    /// handler receives a shared handle to the same buffer.
    Retain,
}

/// Configuration for a [`crate::Backend`] instance.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Inactivity window between accepted fragments. `None` waits forever.
    pub rx_timeout: Option<Duration>,
    /// Ownership of completed messages.
    pub buffer_policy: BufferPolicy,
    /// Frame-sized receive buffers kept for the link. Two lets one be
    /// served while the other is filled.
    pub rx_pool_size: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            rx_timeout: Some(DEFAULT_RX_TIMEOUT),
            buffer_policy: BufferPolicy::Release,
            rx_pool_size: DEFAULT_RX_POOL_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_release_with_double_buffering() {
        let config = BackendConfig::default();
        assert_eq!(config.rx_timeout, Some(Duration::from_millis(100)));
        assert_eq!(config.buffer_policy, BufferPolicy::Release);
        assert_eq!(config.rx_pool_size, 2);
    }
}
