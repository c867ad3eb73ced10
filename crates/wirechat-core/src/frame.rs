//! Live-channel frame codec.
//!
//! Every frame is `nonce(8, LE) ∥ ciphertext(N) ∥ mac(32)` with the MAC
//! computed over nonce-plus-ciphertext (encrypt-then-MAC). The ciphertext
//! is the next slice of a per-direction AES-256-CTR keystream seeded once
//! at handshake completion; the nonce is purely a replay tag bound into
//! the MAC, never a cipher input. Both peers seed encrypt and decrypt
//! state from the same `(K_enc, IV)`, which keeps the keystreams in
//! lockstep as long as every frame is delivered intact and in order. A
//! frame the codec rejects never advances the keystream or the counters,
//! so the caller can decide whether the session survives.

use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::ChannelError;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Cipher and MAC key size, bytes.
pub const KEY_SIZE: usize = 32;
/// Stream-cipher IV size, bytes. AES-256-CTR runs a 128-bit big-endian
/// block counter over this.
pub const IV_SIZE: usize = 16;
/// Per-frame replay counter, bytes.
pub const NONCE_SIZE: usize = 8;
/// HMAC-SHA256 tag size, bytes.
pub const MAC_SIZE: usize = 32;
/// Largest plaintext one frame may carry, bytes.
pub const MAX_MESSAGE_SIZE: usize = 2048;
/// The session secret: `K_enc ∥ K_mac`.
pub const SESSION_SECRET_LEN: usize = 2 * KEY_SIZE;
/// Smallest well-formed frame (empty plaintext).
pub const MIN_FRAME_SIZE: usize = NONCE_SIZE + MAC_SIZE;
/// Largest frame the channel can put on the wire.
pub const MAX_FRAME_SIZE: usize = NONCE_SIZE + MAX_MESSAGE_SIZE + MAC_SIZE;

/// Outbound half of the codec: encrypt state plus the send counter.
pub struct Sealer {
    cipher: Aes256Ctr,
    mac_key: Zeroizing<[u8; KEY_SIZE]>,
    send_counter: u64,
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer")
            .field("send_counter", &self.send_counter)
            .finish_non_exhaustive()
    }
}

impl Sealer {
    pub fn new(secret: &[u8; SESSION_SECRET_LEN], iv: &[u8; IV_SIZE]) -> Self {
        let (cipher, mac_key) = init_direction(secret, iv);
        Self {
            cipher,
            mac_key,
            send_counter: 0,
        }
    }

    /// Encrypt one message into a wire frame.
    ///
    /// An over-limit plaintext fails before the counter or the keystream
    /// move, so the rejected message costs nothing.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(ChannelError::MessageTooLarge(plaintext.len()));
        }

        let nonce = self.send_counter;
        self.send_counter += 1;

        let mut frame = Vec::with_capacity(NONCE_SIZE + plaintext.len() + MAC_SIZE);
        frame.extend_from_slice(&nonce.to_le_bytes());
        frame.extend_from_slice(plaintext);
        self.cipher.apply_keystream(&mut frame[NONCE_SIZE..]);

        let mac = compute_mac(&self.mac_key, &frame);
        frame.extend_from_slice(&mac);
        Ok(frame)
    }
}

/// Inbound half of the codec: decrypt state plus the replay discipline.
pub struct Opener {
    cipher: Aes256Ctr,
    mac_key: Zeroizing<[u8; KEY_SIZE]>,
    recv_counter: u64,
    first_recv: bool,
}

impl std::fmt::Debug for Opener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opener")
            .field("recv_counter", &self.recv_counter)
            .field("first_recv", &self.first_recv)
            .finish_non_exhaustive()
    }
}

impl Opener {
    pub fn new(secret: &[u8; SESSION_SECRET_LEN], iv: &[u8; IV_SIZE]) -> Self {
        let (cipher, mac_key) = init_direction(secret, iv);
        Self {
            cipher,
            mac_key,
            recv_counter: 0,
            first_recv: true,
        }
    }

    /// Verify and decrypt one wire frame.
    ///
    /// Order matters: length check, MAC, replay check, and only then the
    /// keystream. The first accepted frame sets the replay counter; every
    /// later frame must carry a strictly larger nonce.
    pub fn open(&mut self, frame: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if frame.len() < MIN_FRAME_SIZE {
            return Err(ChannelError::FrameTooShort(frame.len()));
        }

        let (body, tag) = frame.split_at(frame.len() - MAC_SIZE);
        if !verify_mac(&self.mac_key, body, tag) {
            return Err(ChannelError::MacFailed);
        }

        let nonce = u64::from_le_bytes(body[..NONCE_SIZE].try_into().unwrap());
        if self.first_recv {
            self.first_recv = false;
            self.recv_counter = nonce;
        } else if nonce <= self.recv_counter {
            return Err(ChannelError::Replay {
                nonce,
                last: self.recv_counter,
            });
        } else {
            self.recv_counter = nonce;
        }

        let mut plaintext = body[NONCE_SIZE..].to_vec();
        self.cipher.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }
}

fn init_direction(
    secret: &[u8; SESSION_SECRET_LEN],
    iv: &[u8; IV_SIZE],
) -> (Aes256Ctr, Zeroizing<[u8; KEY_SIZE]>) {
    let mut k_enc = Zeroizing::new([0u8; KEY_SIZE]);
    let mut mac_key = Zeroizing::new([0u8; KEY_SIZE]);
    k_enc.copy_from_slice(&secret[..KEY_SIZE]);
    mac_key.copy_from_slice(&secret[KEY_SIZE..]);

    let cipher = Aes256Ctr::new_from_slices(&k_enc[..], iv).expect("fixed key and iv sizes");
    (cipher, mac_key)
}

fn compute_mac(key: &[u8; KEY_SIZE], data: &[u8]) -> [u8; MAC_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn verify_mac(key: &[u8; KEY_SIZE], data: &[u8], tag: &[u8]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key size");
    mac.update(data);
    // verify_slice is the constant-time comparison
    mac.verify_slice(tag).is_ok()
}
