//! S2C_CHALLENGE handshake.
//!
//! A server that wants a challenge answers the first request with `0x41` and a
//! 4-byte token; the client repeats the request carrying that token. The token
//! belongs to the call that received it and is never reused.

use log::trace;

use crate::error::{Result, SourceQueryError};
use crate::packet::{PacketType, RequestPacket};
use crate::parse::get_i32;

/// What to do after a logical payload arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send this request and wait again.
    Resend(RequestPacket),
    /// The payload is the answer to the request.
    Done(Vec<u8>),
    /// A late copy of the challenge already answered, e.g. the reply to a
    /// timed out attempt. Keep waiting without sending.
    Stale,
}

/// Handshake state for one query call.
#[derive(Debug, Clone)]
pub struct Negotiation {
    request: RequestPacket,
    token: Option<i32>,
}

impl Negotiation {
    pub fn new(request: RequestPacket) -> Self {
        Negotiation {
            request,
            token: None,
        }
    }

    /// The request to send for the next exchange.
    pub fn request(&self) -> RequestPacket {
        self.request
    }

    /// Whether a challenge token has already been answered.
    pub fn challenged(&self) -> bool {
        self.token.is_some()
    }

    /// Feed a logical payload received for [Negotiation::request].
    pub fn on_payload(&mut self, payload: Vec<u8>) -> Result<Step> {
        let Some(token) = challenge_token(&payload)? else {
            return Ok(Step::Done(payload));
        };
        match self.token {
            Some(answered) if answered == token => {
                trace!("ignoring repeated challenge {token:#010x}");
                return Ok(Step::Stale);
            }
            Some(answered) => {
                return Err(SourceQueryError::ProtocolError(format!(
                    "server answered the challenge {answered:#010x} with another challenge {token:#010x}"
                )));
            }
            None => {}
        }
        trace!("received challenge {token:#010x}");
        self.token = Some(token);
        self.request = self.request.with_challenge(token);
        Ok(Step::Resend(self.request))
    }
}

/// The token of a challenge payload, or `None` for any other payload.
pub fn challenge_token(payload: &[u8]) -> Result<Option<i32>> {
    match payload.first() {
        Some(&kind) if kind == PacketType::Challenge.to_byte() => {
            let mut offset = 1;
            let token = get_i32(payload, &mut offset).map_err(|_| {
                SourceQueryError::ProtocolError("challenge response without a token".into())
            })?;
            Ok(Some(token))
        }
        _ => Ok(None),
    }
}
