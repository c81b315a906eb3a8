//! A minimal protocol client and server fixture for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use futures::{SinkExt, StreamExt};
use machine_protocol::config::NetworkConfig;
use machine_protocol::core::codec::{CompressionSettings, FrameCodec};
use machine_protocol::error::Result;
use machine_protocol::protocol::auth::encrypt_with_public_key;
use machine_protocol::protocol::packets::*;
use machine_protocol::protocol::profile::VerifiedIdentity;
use machine_protocol::protocol::{ConnectionState, Intent, PacketCatalogue, PROTOCOL_VERSION};
use machine_protocol::server::{Server, ServerHandle};
use machine_protocol::service::IdentityVerifier;
use machine_protocol::utils::compression::DEFAULT_LEVEL;
use machine_protocol::utils::crypto::{CipherSession, SharedSecret};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use uuid::Uuid;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub shutdown: mpsc::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl TestServer {
    pub async fn start(config: NetworkConfig) -> Self {
        Self::serve(Server::new(config).expect("server should build")).await
    }

    pub async fn start_with_verifier(config: NetworkConfig, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self::serve(Server::with_verifier(config, verifier).expect("server should build")).await
    }

    async fn serve(server: Server) -> Self {
        let handle = server.handle();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(server.serve(listener, shutdown_rx));
        Self {
            addr,
            handle,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) {
        self.shutdown.send(()).await.unwrap();
        self.join().await;
    }

    pub async fn join(self) {
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Offline mode with a small compression threshold, so both framings get exercised.
pub fn offline_config() -> NetworkConfig {
    NetworkConfig::default_with_overrides(|config| {
        config.server.address = "127.0.0.1:0".into();
        config.auth.online_mode = false;
        // offline logins never use the key, so keep generation cheap
        config.auth.key_bits = 512;
        config.transport.compression_threshold = 64;
        config.status.motd = "Integration".into();
    })
}

pub struct TestClient {
    framed: Framed<TcpStream, FrameCodec>,
    catalogue: PacketCatalogue,
    pub state: ConnectionState,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(stream, FrameCodec::default()),
            catalogue: PacketCatalogue::standard().unwrap(),
            state: ConnectionState::Handshake,
        }
    }

    pub async fn send(&mut self, packet: impl Into<ServerboundPacket>) {
        let body = self
            .catalogue
            .encode_serverbound(self.state, &packet.into())
            .unwrap();
        self.framed.send(body).await.unwrap();
    }

    /// Next packet, or `None` once the server closed the stream.
    pub async fn try_recv(&mut self) -> Option<ClientboundPacket> {
        let frame = tokio::time::timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .expect("timed out waiting for the server")?;
        let frame = frame.unwrap();
        Some(
            self.catalogue
                .decode_clientbound(self.state, frame.freeze())
                .unwrap(),
        )
    }

    pub async fn recv(&mut self) -> ClientboundPacket {
        self.try_recv().await.expect("server closed the connection")
    }

    /// Whether the server closed the stream without sending anything else.
    pub async fn closed(&mut self) -> bool {
        self.try_recv().await.is_none()
    }

    pub async fn handshake(&mut self, intent: Intent) {
        self.send(ClientIntention {
            protocol_version: PROTOCOL_VERSION,
            host: "localhost".into(),
            port: 25565,
            intent,
        })
        .await;
        self.state = intent.target_state();
    }

    /// Log in without encryption and stop in configuration.
    pub async fn login_offline(&mut self, name: &str) -> VerifiedIdentity {
        self.handshake(Intent::Login).await;
        self.send(Hello {
            name: name.into(),
            profile_id: Uuid::nil(),
        })
        .await;

        let profile = self.await_login_success().await;
        self.send(LoginAcknowledged).await;
        self.state = ConnectionState::Configuration;
        profile
    }

    /// Switch both directions to the cipher derived from `secret`.
    pub fn enable_encryption(&mut self, secret: &[u8]) {
        let secret = SharedSecret::from_slice(secret).unwrap();
        let (encryptor, decryptor) = CipherSession::new(&secret).unwrap().split();
        self.framed.codec_mut().enable_encryption(encryptor, decryptor);
    }

    /// Answer an encryption request with `secret` and switch on the cipher.
    pub async fn answer_encryption(&mut self, request: &EncryptionRequest, secret: &[u8]) {
        self.send(EncryptionResponse {
            shared_secret: encrypt_with_public_key(&request.public_key, secret)
                .unwrap()
                .into(),
            verify_token: encrypt_with_public_key(&request.public_key, &request.verify_token)
                .unwrap()
                .into(),
        })
        .await;
        self.enable_encryption(secret);
    }

    /// Read login packets until login success, applying set compression on the way.
    pub async fn await_login_success(&mut self) -> VerifiedIdentity {
        loop {
            match self.recv().await {
                ClientboundPacket::SetCompression(SetCompression { threshold }) => {
                    self.framed.codec_mut().enable_compression(CompressionSettings {
                        threshold: threshold as usize,
                        level: DEFAULT_LEVEL,
                    });
                }
                ClientboundPacket::LoginSuccess(success) => return success.profile,
                other => panic!("unexpected packet during login: {other:?}"),
            }
        }
    }

    /// Wait for the server to finish configuration, then enter play.
    pub async fn enter_play(&mut self) {
        loop {
            match self.recv().await {
                ClientboundPacket::FinishConfiguration(_) => break,
                ClientboundPacket::KeepAlive(ping) => self.send(ping).await,
                other => panic!("unexpected packet during configuration: {other:?}"),
            }
        }
        self.send(FinishConfigurationAck).await;
        self.state = ConnectionState::Play;
    }
}
