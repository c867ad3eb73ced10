//! One established secure channel: socket halves, cipher state, counters,
//! and the role entry points that produce it.
//!
//! A session is used from at most two contexts — one sender, one receiver.
//! [`Session::into_split`] hands each context its own half with disjoint
//! cipher state, so the hot path needs no locks.

use std::net::{Ipv4Addr, SocketAddr};

use num_bigint::BigUint;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};

use crate::config::ChannelConfig;
use crate::dh::{DhKeyPair, DhParams};
use crate::error::ChannelError;
use crate::frame::{Opener, Sealer, MAX_FRAME_SIZE};
use crate::handshake::{connector_handshake, listener_handshake, SessionCrypto};
use crate::keys;

/// Which side of the channel this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Listener,
    Connector,
}

/// A ready-to-use secure channel over one TCP stream.
#[derive(Debug)]
pub struct Session {
    sender: SessionSender,
    receiver: SessionReceiver,
}

impl Session {
    /// Wrap a connected stream whose handshake already completed.
    pub fn new(stream: TcpStream, role: Role, crypto: &SessionCrypto) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            sender: SessionSender {
                writer: write_half,
                sealer: Some(Sealer::new(&crypto.secret, &crypto.iv)),
                role,
            },
            receiver: SessionReceiver {
                reader: read_half,
                opener: Some(Opener::new(&crypto.secret, &crypto.iv)),
            },
        }
    }

    pub fn role(&self) -> Role {
        self.sender.role
    }

    /// Encrypt one message and write the frame; blocks until fully written.
    pub async fn send(&mut self, plaintext: &[u8]) -> Result<(), ChannelError> {
        self.sender.send(plaintext).await
    }

    /// Read and decrypt one frame; blocks until a frame arrives or the
    /// peer performs an orderly shutdown (`PeerClosed`).
    pub async fn receive(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.receiver.receive().await
    }

    /// Tear the channel down: wipe key material, half-close the socket,
    /// and drain residual inbound bytes until EOF. Calling this twice is a
    /// no-op the second time.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        if self.sender.sealer.is_none() && self.receiver.opener.is_none() {
            return Ok(());
        }
        // Dropping the cipher state zeroizes the keys even if the socket
        // teardown below fails partway.
        self.sender.sealer = None;
        self.receiver.opener = None;

        tracing::debug!(role = ?self.sender.role, "closing secure channel");
        if let Err(e) = self.sender.writer.shutdown().await {
            tracing::debug!("write-half shutdown: {e}");
        }
        drain(&mut self.receiver.reader).await;
        Ok(())
    }

    /// Split into independently owned halves for the one-sender,
    /// one-receiver discipline.
    pub fn into_split(self) -> (SessionSender, SessionReceiver) {
        (self.sender, self.receiver)
    }
}

/// The outbound context: write half of the socket plus encrypt state.
#[derive(Debug)]
pub struct SessionSender {
    writer: OwnedWriteHalf,
    sealer: Option<Sealer>,
    role: Role,
}

impl SessionSender {
    /// Seal one message and write it as a single length-prefixed unit.
    ///
    /// The prefix delimits frames on the byte stream; without it, two
    /// frames coalescing in the TCP buffer would desync the decrypt
    /// keystream on the other side.
    pub async fn send(&mut self, plaintext: &[u8]) -> Result<(), ChannelError> {
        let sealer = self.sealer.as_mut().ok_or_else(closed)?;
        let frame = sealer.seal(plaintext)?;
        let mut wire = Vec::with_capacity(4 + frame.len());
        wire.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        wire.extend_from_slice(&frame);
        self.writer.write_all(&wire).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Wipe the encrypt state and send FIN. The peer's receiver observes
    /// `PeerClosed` once it has consumed any frames still in flight.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        if self.sealer.is_none() {
            return Ok(());
        }
        self.sealer = None;
        tracing::debug!(role = ?self.role, "half-closing secure channel");
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// The inbound context: read half of the socket plus decrypt state.
#[derive(Debug)]
pub struct SessionReceiver {
    reader: OwnedReadHalf,
    opener: Option<Opener>,
}

impl SessionReceiver {
    pub async fn receive(&mut self) -> Result<Vec<u8>, ChannelError> {
        let opener = self.opener.as_mut().ok_or_else(closed)?;

        // A zero read on the frame-length boundary is the peer's orderly
        // shutdown. EOF anywhere else is a truncated frame and stays an
        // i/o error.
        let mut lenb = [0u8; 4];
        let n = self.reader.read(&mut lenb).await?;
        if n == 0 {
            return Err(ChannelError::PeerClosed);
        }
        self.reader.read_exact(&mut lenb[n..]).await?;

        let len = u32::from_le_bytes(lenb) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("announced frame of {len} bytes exceeds the limit"),
            )));
        }

        let mut frame = vec![0u8; len];
        self.reader.read_exact(&mut frame).await?;
        opener.open(&frame)
    }
}

fn closed() -> ChannelError {
    ChannelError::Io(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "session is shut down",
    ))
}

async fn drain(reader: &mut OwnedReadHalf) {
    let mut scratch = [0u8; 64];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }
}

/// Bind with address reuse, accept exactly one peer, and run the listener
/// side of the handshake with the key files named in `config`.
pub async fn listen_and_accept(config: &ChannelConfig) -> Result<Session, ChannelError> {
    let params = DhParams::from_file(&config.params_path())?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1)?;
    tracing::info!(port = config.port, "listening for a peer");

    let (stream, peer_addr) = listener.accept().await?;
    // Exactly one conversation per process: stop accepting immediately.
    drop(listener);
    tracing::info!(%peer_addr, "connection made, starting handshake");

    let own = keys::load_keypair(&config.server_key_path())?;
    let peer_pk = keys::load_public(&config.client_pub_path())?;
    establish(stream, Role::Listener, &params, own, peer_pk).await
}

/// Resolve and connect, then run the connector side of the handshake with
/// the key files named in `config`.
pub async fn connect_to(config: &ChannelConfig, host: &str) -> Result<Session, ChannelError> {
    let params = DhParams::from_file(&config.params_path())?;

    let stream = TcpStream::connect((host, config.port)).await?;
    tracing::info!(host, port = config.port, "connected, starting handshake");

    let own = keys::load_keypair(&config.client_key_path())?;
    let peer_pk = keys::load_public(&config.server_pub_path())?;
    establish(stream, Role::Connector, &params, own, peer_pk).await
}

async fn establish(
    mut stream: TcpStream,
    role: Role,
    params: &DhParams,
    own: DhKeyPair,
    peer_pk: BigUint,
) -> Result<Session, ChannelError> {
    tracing::info!(
        role = ?role,
        peer = %keys::fingerprint(&peer_pk),
        "running handshake"
    );
    let result = match role {
        Role::Listener => listener_handshake(&mut stream, params, &own, &peer_pk).await,
        Role::Connector => connector_handshake(&mut stream, params, &own, &peer_pk).await,
    };
    // `own` drops here on every path, wiping the long-term secret.
    drop(own);

    match result {
        Ok(crypto) => {
            tracing::info!(role = ?role, "secure channel established");
            Ok(Session::new(stream, role, &crypto))
        }
        Err(e) => {
            tracing::warn!(role = ?role, error = %e, "handshake failed");
            let _ = stream.shutdown().await;
            let (mut read_half, _write_half) = stream.into_split();
            drain(&mut read_half).await;
            Err(e)
        }
    }
}
