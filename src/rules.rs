use std::collections::HashMap;

use log::debug;

use crate::config::RuleCountOrder;
use crate::error::{DecodeReason, Result, SourceQueryError};
use crate::packet::PacketType;
use crate::parse::{get_string, get_u16, get_u8};

/// Server rules (cvars), as obtained by [crate::query::rules].
pub type Rules = HashMap<String, String>;

/// Smallest possible rule on the wire: empty name and value, two terminators.
const MIN_RULE_SIZE: usize = 2;

/// Decode a logical A2S_RULES payload.
///
/// A rule name sent more than once keeps its last value.
pub fn parse_rules(data: &[u8], order: RuleCountOrder) -> Result<Rules> {
    let mut offset = 0;
    let kind = get_u8(data, &mut offset)?;
    if kind != PacketType::RulesResponse.to_byte() {
        return Err(SourceQueryError::DecodeError(
            DecodeReason::UnexpectedResponseType(kind),
        ));
    }

    let sent = get_u16(data, &mut offset)?;
    let count = rule_count(sent, data.len() - offset, order);

    let mut rules = Rules::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = get_string(data, &mut offset)?;
        let value = get_string(data, &mut offset)?;
        if let Some(old) = rules.insert(name, value) {
            debug!("repeated rule, dropping earlier value {old:?}");
        }
    }
    Ok(rules)
}

/// Some old servers write the rule count with its bytes swapped.
///
/// `Auto` swaps only when the count as sent could not possibly fit in the
/// `remaining` bytes while the swapped count could.
fn rule_count(sent: u16, remaining: usize, order: RuleCountOrder) -> u16 {
    let fits = |count: u16| usize::from(count) * MIN_RULE_SIZE <= remaining;
    match order {
        RuleCountOrder::LittleEndian => sent,
        RuleCountOrder::Swapped => sent.swap_bytes(),
        RuleCountOrder::Auto if !fits(sent) && fits(sent.swap_bytes()) => {
            debug!("rule count {sent} does not fit, reading it swapped");
            sent.swap_bytes()
        }
        RuleCountOrder::Auto => sent,
    }
}
