//! Redemption token generation and classification.
//!
//! # Format
//!
//! `<prefix><64 hex chars>` where the prefix names the entity kind:
//! - `tkt_` for tickets
//! - `gst_` for guest list entries
//!
//! Tokens without a known prefix (legacy or hand-typed codes) classify as
//! `Unknown` and are looked up against tickets first, then guests.

pub const TICKET_TOKEN_PREFIX: &str = "tkt_";
pub const GUEST_TOKEN_PREFIX: &str = "gst_";

/// Result of classifying a scanned code by its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ticket,
    Guest,
    Unknown,
}

/// Generate a fresh token with the given prefix (32 random bytes, hex encoded).
pub fn generate(prefix: &str) -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{prefix}{}", hex::encode(bytes))
}

/// Generate a fresh ticket token.
pub fn generate_ticket_token() -> String {
    generate(TICKET_TOKEN_PREFIX)
}

/// Generate a fresh guest list token.
pub fn generate_guest_token() -> String {
    generate(GUEST_TOKEN_PREFIX)
}

/// Classify a submitted code. Surrounding whitespace is ignored.
pub fn classify(token: &str) -> TokenKind {
    let token = token.trim();
    if token.len() > TICKET_TOKEN_PREFIX.len() && token.starts_with(TICKET_TOKEN_PREFIX) {
        TokenKind::Ticket
    } else if token.len() > GUEST_TOKEN_PREFIX.len() && token.starts_with(GUEST_TOKEN_PREFIX) {
        TokenKind::Guest
    } else {
        TokenKind::Unknown
    }
}
