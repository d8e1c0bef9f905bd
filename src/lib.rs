//! Pure Rust async client for the [Source Query Protocol](https://developer.valvesoftware.com/wiki/Server_queries):
//! A2S_INFO, A2S_PLAYER and A2S_RULES, including the challenge handshake and
//! split, bzip2 compressed responses.
pub mod challenge;
pub mod config;
pub mod error;
pub mod framer;
pub mod info;
pub mod packet;
mod parse;
pub mod players;
pub mod query;
pub mod rules;
pub mod transport;

pub use config::{Engine, QueryConfig, RuleCountOrder};
pub use error::{DecodeReason, Result, SourceQueryError};
pub use info::ServerInfo;
pub use players::Player;
pub use query::{info, players, rules, Query, QueryState};
pub use rules::Rules;
pub use transport::{Transport, UdpTransport};
