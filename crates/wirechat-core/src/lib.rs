//! Wirechat core — a two-party secure messaging transport.
//!
//! One listener and one connector establish a mutually authenticated,
//! confidential, integrity-protected channel over a single TCP stream and
//! exchange discrete messages until either side closes.
//!
//! The handshake mixes both peers' long-term and ephemeral Diffie-Hellman
//! keys into a 64-byte session secret, confirms it with a keyed token, and
//! seeds one AES-256-CTR keystream per direction. Live frames are
//! encrypt-then-MAC with a strictly increasing counter for replay
//! detection. Long-term public keys are read from local files and trusted
//! on first use.

pub mod config;
pub mod dh;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod keys;
pub mod session;
pub mod wire;

pub use config::ChannelConfig;
pub use error::ChannelError;
pub use session::{connect_to, listen_and_accept, Role, Session, SessionReceiver, SessionSender};
