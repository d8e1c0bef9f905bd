use tokio::net::ToSocketAddrs;
use tokio::time::Instant;

use log::{debug, trace};

use crate::challenge::{Negotiation, Step};
use crate::config::QueryConfig;
use crate::error::{Result, SourceQueryError};
use crate::framer::Reassembler;
use crate::info::ServerInfo;
use crate::packet::{RequestPacket, ResponsePacket};
use crate::players::Player;
use crate::rules::{parse_rules, Rules};
use crate::transport::{Transport, UdpTransport};

/// Where a query call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    /// Sent a placeholder challenge, waiting for the server's token.
    ChallengeRequested,
    /// Sent the real request, waiting for the first datagram.
    AwaitingPayload,
    /// Got part of a split response.
    Reassembling,
    Decoded,
    Failed,
}

/// Drives the A2S exchange over one [Transport].
///
/// Calls on the same `Query` run one after another and share nothing but the
/// transport and the configuration; challenge tokens never outlive a call.
#[derive(Debug)]
pub struct Query<T> {
    transport: T,
    config: QueryConfig,
    state: QueryState,
    attempts: usize,
}

impl<T: Transport> Query<T> {
    pub fn new(transport: T, config: QueryConfig) -> Self {
        Query {
            transport,
            config,
            state: QueryState::Idle,
            attempts: 0,
        }
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Send/receive cycles started by the last call.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// A2S_INFO
    pub async fn info(&mut self) -> Result<ServerInfo> {
        let payload = self.exchange(RequestPacket::info()).await?;
        self.finish(ServerInfo::parse(&payload))
    }

    /// A2S_PLAYER
    pub async fn players(&mut self) -> Result<Vec<Player>> {
        let payload = self.exchange(RequestPacket::players()).await?;
        let engine = self.config.engine;
        self.finish(Player::parse_all(&payload, engine))
    }

    /// A2S_RULES
    pub async fn rules(&mut self) -> Result<Rules> {
        let payload = self.exchange(RequestPacket::rules()).await?;
        let order = self.config.rule_count_order;
        self.finish(parse_rules(&payload, order))
    }

    fn set_state(&mut self, state: QueryState) {
        trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn finish<R>(&mut self, decoded: Result<R>) -> Result<R> {
        match decoded {
            Ok(value) => {
                self.set_state(QueryState::Decoded);
                Ok(value)
            }
            Err(e) => {
                self.set_state(QueryState::Failed);
                Err(e)
            }
        }
    }

    /// Run whole cycles until one yields a payload, repeating only on timeout.
    async fn exchange(&mut self, request: RequestPacket) -> Result<Vec<u8>> {
        self.attempts = 0;
        let limit = self.config.attempts();
        loop {
            self.set_state(QueryState::Idle);
            self.attempts += 1;
            match self.attempt(request).await {
                Ok(payload) => return Ok(payload),
                Err(e) if e.is_retryable() && self.attempts < limit => {
                    debug!("attempt {}/{limit} timed out, retrying", self.attempts);
                }
                Err(e) => {
                    self.set_state(QueryState::Failed);
                    return Err(e);
                }
            }
        }
    }

    /// One send/receive cycle, challenge included, bounded by one timeout.
    async fn attempt(&mut self, request: RequestPacket) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.config.timeout;
        let mut negotiation = Negotiation::new(request);
        let mut next = Some(request);
        loop {
            if let Some(request) = next.take() {
                self.set_state(if request.requests_challenge() {
                    QueryState::ChallengeRequested
                } else {
                    QueryState::AwaitingPayload
                });
                self.transport.send(&request.pack()).await?;
            }
            let payload = self.receive_payload(deadline).await?;
            match negotiation.on_payload(payload)? {
                Step::Resend(request) => next = Some(request),
                Step::Done(payload) => return Ok(payload),
                Step::Stale => {}
            }
        }
    }

    /// Receive datagrams until one logical payload is complete.
    async fn receive_payload(&mut self, deadline: Instant) -> Result<Vec<u8>> {
        // fragments of abandoned responses are dropped with this, at the end
        // of the exchange
        let mut reassembler = Reassembler::new();
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                return Err(SourceQueryError::Timeout);
            }
            let datagram = self.transport.recv(wait).await?;
            match ResponsePacket::unpack(&datagram, self.config.engine)? {
                ResponsePacket::Single(payload) => return Ok(payload),
                ResponsePacket::Split(fragment) => {
                    self.set_state(QueryState::Reassembling);
                    if let Some(payload) = reassembler.push(fragment)? {
                        return Ok(payload);
                    }
                }
            }
        }
    }
}

/// Query `host` with A2S_INFO.
///
/// Example usage:
/// ```no_run
/// # async fn run() -> a2squery::Result<()> {
/// use a2squery::QueryConfig;
///
/// let info = a2squery::info(("127.0.0.1", 27015), &QueryConfig::default()).await?;
/// println!("{} on {}", info.name, info.map);
/// # Ok(())
/// # }
/// ```
pub async fn info<A: ToSocketAddrs>(host: A, config: &QueryConfig) -> Result<ServerInfo> {
    let transport = UdpTransport::connect(host, config).await?;
    Query::new(transport, config.clone()).info().await
}

/// Query `host` with A2S_PLAYER. Players are returned in the server's order.
pub async fn players<A: ToSocketAddrs>(host: A, config: &QueryConfig) -> Result<Vec<Player>> {
    let transport = UdpTransport::connect(host, config).await?;
    Query::new(transport, config.clone()).players().await
}

/// Query `host` with A2S_RULES.
pub async fn rules<A: ToSocketAddrs>(host: A, config: &QueryConfig) -> Result<Rules> {
    let transport = UdpTransport::connect(host, config).await?;
    Query::new(transport, config.clone()).rules().await
}
