//! The authenticated key-agreement handshake.
//!
//! Four phases on each side: ephemeral exchange, triple-DH derivation,
//! key confirmation, IV exchange. The listener writes its ephemeral public
//! first and the connector reads first; that ordering is part of the wire
//! contract, and swapping either side deadlocks the exchange.
//!
//! Confirmation works by the listener sending
//! `HMAC-SHA512(K, "auth-verification-token")` and the connector answering
//! with a single verdict byte after a constant-time comparison. A mismatch
//! means the peers derived different secrets, i.e. somebody does not hold
//! the long-term secret matching the public file the other side trusts.

use std::io;

use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zeroize::Zeroizing;

use crate::dh::{combine3, DhKeyPair, DhParams};
use crate::error::ChannelError;
use crate::frame::{IV_SIZE, SESSION_SECRET_LEN};
use crate::keys::fingerprint;
use crate::wire::{read_uint, write_uint};

type HmacSha512 = Hmac<Sha512>;

/// Fixed string both sides MAC to prove they derived the same secret.
const CONFIRMATION_LABEL: &[u8] = b"auth-verification-token";
const TOKEN_SIZE: usize = 64;

/// Key material a completed handshake hands to the session layer.
#[derive(Debug)]
pub struct SessionCrypto {
    pub secret: Zeroizing<[u8; SESSION_SECRET_LEN]>,
    pub iv: [u8; IV_SIZE],
}

/// Listener side: send ephemeral first, emit the confirmation token, read
/// the verdict byte, then read the connector's IV.
pub async fn listener_handshake<T>(
    transport: &mut T,
    params: &DhParams,
    own_long_term: &DhKeyPair,
    peer_long_term_pk: &BigUint,
) -> Result<SessionCrypto, ChannelError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let ephemeral = DhKeyPair::generate(params);
    tracing::debug!("listener: sending ephemeral public key");
    write_uint(transport, ephemeral.public()).await?;

    let peer_ephemeral = read_uint(transport).await?;
    check_element(params, &peer_ephemeral)?;
    tracing::debug!(
        peer = %fingerprint(peer_long_term_pk),
        "listener: peer ephemeral key received, deriving session secret"
    );

    let secret = derive_secret(
        params,
        own_long_term,
        &ephemeral,
        peer_long_term_pk,
        &peer_ephemeral,
    )?;

    let token = confirmation_token(&secret);
    transport.write_all(&token).await?;
    transport.flush().await?;

    let mut verdict = [0u8; 1];
    transport.read_exact(&mut verdict).await?;
    if verdict[0] != 1 {
        tracing::warn!("listener: peer rejected the confirmation token");
        return Err(ChannelError::AuthFailed);
    }

    let mut iv = [0u8; IV_SIZE];
    transport.read_exact(&mut iv).await?;
    tracing::debug!("listener: secure channel keys ready");

    Ok(SessionCrypto { secret, iv })
}

/// Connector side: read the listener's ephemeral first, verify the
/// confirmation token, answer the verdict byte, then generate and send the
/// session IV.
pub async fn connector_handshake<T>(
    transport: &mut T,
    params: &DhParams,
    own_long_term: &DhKeyPair,
    peer_long_term_pk: &BigUint,
) -> Result<SessionCrypto, ChannelError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let ephemeral = DhKeyPair::generate(params);
    tracing::debug!("connector: waiting for listener ephemeral key");
    let peer_ephemeral = read_uint(transport).await?;
    check_element(params, &peer_ephemeral)?;

    write_uint(transport, ephemeral.public()).await?;
    tracing::debug!(
        peer = %fingerprint(peer_long_term_pk),
        "connector: ephemeral keys exchanged, deriving session secret"
    );

    let secret = derive_secret(
        params,
        own_long_term,
        &ephemeral,
        peer_long_term_pk,
        &peer_ephemeral,
    )?;

    let mut token = [0u8; TOKEN_SIZE];
    transport.read_exact(&mut token).await?;

    let ok = verify_token(&secret, &token);
    transport.write_all(&[ok as u8]).await?;
    transport.flush().await?;
    if !ok {
        tracing::warn!("connector: token mismatch, peer derived a different secret");
        return Err(ChannelError::AuthFailed);
    }

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    transport.write_all(&iv).await?;
    transport.flush().await?;
    tracing::debug!("connector: secure channel keys ready");

    Ok(SessionCrypto { secret, iv })
}

fn derive_secret(
    params: &DhParams,
    own_long_term: &DhKeyPair,
    own_ephemeral: &DhKeyPair,
    peer_long_term_pk: &BigUint,
    peer_ephemeral_pk: &BigUint,
) -> Result<Zeroizing<[u8; SESSION_SECRET_LEN]>, ChannelError> {
    let okm = combine3(
        params,
        own_long_term,
        own_ephemeral,
        peer_long_term_pk,
        peer_ephemeral_pk,
        SESSION_SECRET_LEN,
    )?;
    let mut secret = Zeroizing::new([0u8; SESSION_SECRET_LEN]);
    secret.copy_from_slice(&okm);
    Ok(secret)
}

fn confirmation_token(secret: &[u8; SESSION_SECRET_LEN]) -> [u8; TOKEN_SIZE] {
    let mut mac = HmacSha512::new_from_slice(secret).expect("hmac accepts any key size");
    mac.update(CONFIRMATION_LABEL);
    let mut token = [0u8; TOKEN_SIZE];
    token.copy_from_slice(&mac.finalize().into_bytes());
    token
}

fn verify_token(secret: &[u8; SESSION_SECRET_LEN], token: &[u8; TOKEN_SIZE]) -> bool {
    let mut mac = HmacSha512::new_from_slice(secret).expect("hmac accepts any key size");
    mac.update(CONFIRMATION_LABEL);
    // constant-time comparison
    mac.verify_slice(token).is_ok()
}

fn check_element(params: &DhParams, x: &BigUint) -> Result<(), ChannelError> {
    if !params.contains(x) {
        return Err(ChannelError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "peer key is not a valid group element",
        )));
    }
    Ok(())
}
