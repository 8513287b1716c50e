// src/decoder/control.rs

use std::time::Duration;

/// Commands the decoder thread handles between packets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecoderCmd {
    /// Jump to an absolute position.
    Seek(Duration),
}
