//! Approximate token and cost accounting.
//!
//! Tokens are estimated from text length (one token per four characters,
//! rounded up). Cost is always recomputed from the cumulative totals, so the
//! figure is the same whatever order the additions happened in.

use serde::{Deserialize, Serialize};

/// USD per one million input tokens.
pub const INPUT_PRICE_PER_MILLION: f64 = 0.30;

/// USD per one million output tokens.
pub const OUTPUT_PRICE_PER_MILLION: f64 = 2.50;

const CHARS_PER_TOKEN: u64 = 4;

/// Approximate token count of `text`: `ceil(chars / 4)`.
pub fn estimate_tokens_from_text(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Cost in USD of the given totals, rounded to six decimal places.
pub fn cost_for(tokens_in: u64, tokens_out: u64) -> f64 {
    let raw = tokens_in as f64 * INPUT_PRICE_PER_MILLION / 1_000_000.0
        + tokens_out as f64 * OUTPUT_PRICE_PER_MILLION / 1_000_000.0;
    (raw * 1_000_000.0).round() / 1_000_000.0
}

/// Running token totals and the cost derived from them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
}

impl Usage {
    /// Adds to the totals and recomputes the cost.
    pub fn add(&mut self, tokens_in: u64, tokens_out: u64) {
        self.tokens_in = self.tokens_in.saturating_add(tokens_in);
        self.tokens_out = self.tokens_out.saturating_add(tokens_out);
        self.cost = cost_for(self.tokens_in, self.tokens_out);
    }

    /// Adds the estimated token counts of a prompt and a response text.
    pub fn record_exchange(&mut self, prompt: &str, response_text: &str) {
        self.add(
            estimate_tokens_from_text(prompt),
            estimate_tokens_from_text(response_text),
        );
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
