use std::io;
use thiserror::Error;

/// Everything that can go wrong on the secure channel, from parameter
/// loading through live-frame processing.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("bad DH parameters: {0}")]
    BadParameters(String),

    #[error(
        "serialized integer of {0} bytes exceeds the {max}-byte limit",
        max = crate::wire::MAX_INT_BYTES
    )]
    OversizedInteger(usize),

    #[error("confirmation token mismatch: peer derived a different secret")]
    AuthFailed,

    #[error(
        "frame of {0} bytes is below the {min}-byte minimum",
        min = crate::frame::MIN_FRAME_SIZE
    )]
    FrameTooShort(usize),

    #[error(
        "plaintext of {0} bytes exceeds the {max}-byte per-frame limit",
        max = crate::frame::MAX_MESSAGE_SIZE
    )]
    MessageTooLarge(usize),

    #[error("frame MAC verification failed")]
    MacFailed,

    #[error("replayed or reordered frame: nonce {nonce} is not above {last}")]
    Replay { nonce: u64, last: u64 },

    #[error("peer closed the connection")]
    PeerClosed,
}

impl ChannelError {
    /// Whether the session can continue after this error.
    ///
    /// `MessageTooLarge` rejects one outbound message without touching the
    /// cipher state. Everything else either means the peer is gone or that
    /// the two keystreams can no longer be assumed in sync, so the session
    /// must be torn down. `PeerClosed` is terminal but not a fault.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::MessageTooLarge(_))
    }
}
