use std::time::Duration;

/// Largest datagram a UDP socket can hand us.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// According to the Valve wiki, Source query responses use 1400 bytes + IP/UDP headers.
pub const DEFAULT_PACKET_SIZE: usize = 1400;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_RETRIES: usize = 3;

/// Which engine family the server belongs to.
///
/// Selects the split packet layout and the player index compatibility shim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    Source,
    GoldSource,
}

/// How to read the rule count of an A2S_RULES response.
///
/// Some historical servers write the count with its bytes swapped. There is no
/// reliable way to detect this, so [RuleCountOrder::Auto] is a best-effort
/// guess and the other two variants force a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleCountOrder {
    /// Swap only when the count as sent cannot fit in the payload but the
    /// swapped one can.
    #[default]
    Auto,
    /// Trust the little-endian count.
    LittleEndian,
    /// Always swap the two count bytes.
    Swapped,
}

/// Per-call settings for a query. Every query call takes its own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    /// How long a single attempt may wait for its full response.
    pub timeout: Duration,
    /// Total number of attempts made when the server does not answer.
    pub retries: usize,
    /// Receive buffer size for a single datagram.
    pub max_packet_size: usize,
    pub engine: Engine,
    pub rule_count_order: RuleCountOrder,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            max_packet_size: DEFAULT_PACKET_SIZE,
            engine: Engine::default(),
            rule_count_order: RuleCountOrder::default(),
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// At least one attempt is always made.
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.clamp(1, MAX_DATAGRAM_SIZE);
        self
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_rule_count_order(mut self, order: RuleCountOrder) -> Self {
        self.rule_count_order = order;
        self
    }

    /// Attempts to make, never less than one even if the field was set directly.
    pub(crate) fn attempts(&self) -> usize {
        self.retries.max(1)
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.max_packet_size.clamp(1, MAX_DATAGRAM_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.retries, 3);
        assert_eq!(config.max_packet_size, 1400);
        assert_eq!(config.engine, Engine::Source);
        assert_eq!(config.rule_count_order, RuleCountOrder::Auto);
    }

    #[test]
    fn builder_clamps() {
        let config = QueryConfig::new()
            .with_retries(0)
            .with_max_packet_size(1 << 20)
            .with_engine(Engine::GoldSource);
        assert_eq!(config.retries, 1);
        assert_eq!(config.max_packet_size, MAX_DATAGRAM_SIZE);
        assert_eq!(config.engine, Engine::GoldSource);
    }

    #[test]
    fn direct_field_writes_are_sanitised_at_use() {
        let config = QueryConfig {
            retries: 0,
            max_packet_size: 0,
            ..QueryConfig::default()
        };
        assert_eq!(config.attempts(), 1);
        assert_eq!(config.buffer_size(), 1);
    }
}
