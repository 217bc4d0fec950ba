//! Payload generation and optional response validation.
//!
//! Each worker builds its payload once at startup. Fixed text identifies the
//! worker; random payloads are newline-terminated so line-oriented echo
//! servers handle them.

use crate::config::PayloadMode;
use rand::Rng;

/// Build the payload a worker will send on every cycle.
///
/// `size` only applies to `RandomBytes` and includes the trailing `b'\n'`
/// terminator; configuration validation keeps it at 2 or more.
pub fn build(mode: PayloadMode, size: usize, worker: usize) -> Vec<u8> {
    match mode {
        PayloadMode::FixedText => format!("Hello from {worker}\n").into_bytes(),
        PayloadMode::RandomBytes => {
            let mut rng = rand::thread_rng();
            let mut buf: Vec<u8> = (0..size.saturating_sub(1))
                // printable, never the terminator
                .map(|_| rng.gen_range(b'!'..=b'~'))
                .collect();
            buf.push(b'\n');
            buf
        }
    }
}

/// Validation rule for echoed data: the received bytes must equal the
/// leading `received.len()` bytes of the sent payload.
///
/// A single read may legally return a fragment of the echo, so whole-buffer
/// equality would flag benign fragmentation; a length-only check would miss
/// corruption. An empty or over-long response never matches.
pub fn matches(sent: &[u8], received: &[u8]) -> bool {
    !received.is_empty() && received.len() <= sent.len() && &sent[..received.len()] == received
}
