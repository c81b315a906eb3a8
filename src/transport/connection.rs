//! Per-connection I/O task.
//!
//! Each accepted socket gets one task that reads and decodes frames and a
//! spawned writer that encodes and flushes them. Neither touches connection
//! state: decoded packets go to the tick context, and the tick context
//! steers both halves through their queues. A writer that fails hands its
//! error to the reader, which stops and reports it as the close.
//!
//! After a packet that can change the inbound pipeline (a new phase, the
//! compression threshold or the cipher) the reader stops decoding until the
//! tick context says it is done with that packet. The bytes after it are
//! then decoded under whatever settings the packet produced.

use crate::core::codec::{FrameDecoder, FrameEncoder};
use crate::core::legacy::{LegacyPingVersion, LEGACY_PING_MARKER};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::connection::{ConnectionId, InboundControl, Outbound};
use crate::protocol::packets::CataloguedPacket;
use crate::protocol::state::ConnectionState;
use crate::server::context::ServerContext;
use crate::server::tick::TickEvent;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, instrument, trace, warn};

/// How long to wait for the rest of a legacy ping after its marker byte.
const LEGACY_GRACE: Duration = Duration::from_millis(50);

type FrameReader = FramedRead<OwnedReadHalf, FrameDecoder>;
type FrameWriter = FramedWrite<OwnedWriteHalf, FrameEncoder>;

/// Drive one accepted socket until either side closes it.
#[instrument(skip(stream, context), fields(connection = id, peer = %peer))]
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    context: Arc<ServerContext>,
) -> Result<()> {
    let server = &context.config.server;
    if context.config.status.legacy_ping {
        if let Some(version) = detect_legacy_ping(&stream, server.read_timeout).await? {
            return answer_legacy_ping(stream, version, &context).await;
        }
    }
    stream.set_nodelay(true)?;

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let events = context.events().clone();
    events
        .send(TickEvent::Connected {
            id,
            peer,
            outbound: outbound_tx,
            control: control_tx,
        })
        .await
        .map_err(|_| ProtocolError::Custom(constants::ERR_TICK_UNAVAILABLE.to_string()))?;

    let (failed_tx, writer_failed) = oneshot::channel();
    let writer = tokio::spawn(run_writer(
        FramedWrite::new(write_half, FrameEncoder::new()),
        outbound_rx,
        context.clone(),
        failed_tx,
    ));

    let frames = FramedRead::new(
        read_half,
        FrameDecoder::new(context.config.transport.max_frame_size),
    );
    let error = read_loop(frames, control_rx, writer_failed, &events, id, &context)
        .await
        .err();
    if let Some(e) = &error {
        debug!(error = %e, "Reader stopped");
    }
    let _ = events.send(TickEvent::Closed { id, error }).await;

    // The writer still flushes whatever the tick context queued on the way out.
    match timeout(server.shutdown_timeout, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Writer task failed"),
        Err(_) => warn!("Writer did not drain in time"),
    }
    debug!("Connection finished");
    Ok(())
}

/// Peek at the first bytes without consuming them.
async fn detect_legacy_ping(stream: &TcpStream, read_timeout: Duration) -> Result<Option<LegacyPingVersion>> {
    let mut first = [0u8; 1];
    let n = timeout(read_timeout, stream.peek(&mut first))
        .await
        .map_err(|_| ProtocolError::ConnectionTimeout)??;
    if n == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    if first[0] != LEGACY_PING_MARKER {
        return Ok(None);
    }

    // 1.4+ clients send more right behind the marker.
    tokio::time::sleep(LEGACY_GRACE).await;
    let mut initial = [0u8; 3];
    let n = stream.peek(&mut initial).await?;
    Ok(LegacyPingVersion::detect(&initial[..n]))
}

async fn answer_legacy_ping(
    mut stream: TcpStream,
    version: LegacyPingVersion,
    context: &ServerContext,
) -> Result<()> {
    debug!(?version, "Legacy server list ping");
    context.metrics().legacy_ping();

    // Consume the request so closing does not reset the connection under the reply.
    let mut scratch = [0u8; 512];
    while let Ok(n) = stream.try_read(&mut scratch) {
        if n == 0 {
            break;
        }
    }

    let kick = context.legacy_status().encode_kick(version);
    stream.write_all(&kick).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn read_loop(
    mut frames: FrameReader,
    mut control: mpsc::UnboundedReceiver<InboundControl>,
    mut writer_failed: oneshot::Receiver<ProtocolError>,
    events: &mpsc::Sender<TickEvent>,
    id: ConnectionId,
    context: &ServerContext,
) -> Result<()> {
    let read_timeout = context.config.server.read_timeout;
    let metrics = context.metrics();
    let mut state = ConnectionState::Handshake;
    let mut paused = false;

    loop {
        tokio::select! {
            biased;

            command = control.recv() => match command {
                Some(InboundControl::SetState(next)) => state = next,
                Some(InboundControl::EnableCompression(threshold)) => {
                    frames.decoder_mut().enable_compression(threshold);
                }
                Some(InboundControl::EnableDecryption(cipher)) => {
                    frames.decoder_mut().enable_encryption(cipher);
                }
                Some(InboundControl::Resume) => paused = false,
                Some(InboundControl::Close) | None => return Ok(()),
            },

            failure = &mut writer_failed => return match failure {
                Ok(error) => Err(error),
                // the writer finished a close on its own
                Err(_) => Ok(()),
            },

            frame = timeout(read_timeout, frames.next()), if !paused => {
                let frame = match frame {
                    Err(_) => return Err(ProtocolError::ConnectionTimeout),
                    Ok(None) => return Ok(()),
                    Ok(Some(frame)) => frame?,
                };
                metrics.packet_received(frame.len() as u64);
                let packet = context.catalogue.decode_serverbound(state, frame.freeze())?;
                trace!(packet = packet.name(), %state, "Received");
                paused = packet.switches_pipeline();
                if events.send(TickEvent::Inbound { id, packet }).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

async fn run_writer(
    sink: FrameWriter,
    queue: mpsc::UnboundedReceiver<Outbound>,
    context: Arc<ServerContext>,
    failed: oneshot::Sender<ProtocolError>,
) {
    if let Err(e) = write_loop(sink, queue, context).await {
        debug!(error = %e, "Writer stopped");
        let _ = failed.send(e);
    }
}

async fn write_loop(
    mut sink: FrameWriter,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    context: Arc<ServerContext>,
) -> Result<()> {
    let metrics = context.metrics();
    let mut state = ConnectionState::Handshake;
    let mut threshold = None;

    while let Some(item) = queue.recv().await {
        match item {
            Outbound::Packet(packet) => {
                let body = context.catalogue.encode_clientbound(state, &packet)?;
                if threshold.is_some_and(|threshold| body.len() >= threshold) {
                    metrics.frame_compressed();
                }
                metrics.packet_sent(body.len() as u64);
                trace!(packet = packet.name(), bytes = body.len(), "Sending");
                sink.feed(body).await?;
                if queue.is_empty() {
                    sink.flush().await?;
                }
            }
            Outbound::SetState(next) => state = next,
            // Frames fed so far are already encoded; the switch applies from the next one.
            Outbound::EnableCompression(settings) => {
                threshold = Some(settings.threshold);
                sink.encoder_mut().enable_compression(settings);
            }
            Outbound::EnableEncryption(cipher) => sink.encoder_mut().enable_encryption(cipher),
            Outbound::Close => break,
        }
    }

    sink.flush().await?;
    let _ = sink.into_inner().shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::NetworkConfig;
    use crate::protocol::auth::tests::test_keys;
    use crate::protocol::dispatcher::Dispatcher;
    use crate::protocol::packets::KeepAlive;
    use crate::protocol::PacketCatalogue;
    use crate::service::SessionService;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    struct Pipe {
        context: Arc<ServerContext>,
        _events: mpsc::Receiver<TickEvent>,
        _client: TcpStream,
        _control: mpsc::UnboundedSender<InboundControl>,
        outbound: mpsc::UnboundedSender<Outbound>,
        writer: JoinHandle<()>,
        reader: Option<(FrameReader, mpsc::UnboundedReceiver<InboundControl>, oneshot::Receiver<ProtocolError>)>,
    }

    impl Pipe {
        async fn open() -> Self {
            let (events_tx, events) = mpsc::channel(16);
            let verifier = SessionService::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
            let context = Arc::new(ServerContext::new(
                Arc::new(NetworkConfig::default()),
                Arc::new(PacketCatalogue::standard().unwrap()),
                test_keys().clone(),
                Arc::new(verifier),
                Dispatcher::new(),
                events_tx,
            ));

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
            let (server, _) = listener.accept().await.unwrap();
            let (read_half, write_half) = server.into_split();

            let (outbound, outbound_rx) = mpsc::unbounded_channel();
            let (control, control_rx) = mpsc::unbounded_channel();
            let (failed_tx, writer_failed) = oneshot::channel();
            let writer = tokio::spawn(run_writer(
                FramedWrite::new(write_half, FrameEncoder::new()),
                outbound_rx,
                context.clone(),
                failed_tx,
            ));
            let frames = FramedRead::new(read_half, FrameDecoder::new(1024));
            Self {
                context,
                _events: events,
                _client: client,
                _control: control,
                outbound,
                writer,
                reader: Some((frames, control_rx, writer_failed)),
            }
        }

        async fn read(&mut self) -> Result<()> {
            let (frames, control, writer_failed) = self.reader.take().unwrap();
            let context = &self.context;
            timeout(
                Duration::from_secs(5),
                read_loop(frames, control, writer_failed, context.events(), 1, context),
            )
            .await
            .expect("reader kept running after the writer stopped")
        }
    }

    #[tokio::test]
    async fn test_writer_failure_stops_reader() {
        let mut pipe = Pipe::open().await;
        // nothing is clientbound during the handshake, so encoding fails
        pipe.outbound
            .send(Outbound::Packet(KeepAlive { id: 1 }.into()))
            .unwrap();

        let result = pipe.read().await;
        assert!(matches!(
            result,
            Err(ProtocolError::ProtocolState {
                state: ConnectionState::Handshake,
                packet: "keep_alive"
            })
        ));
        pipe.writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_close_ends_reader() {
        let mut pipe = Pipe::open().await;
        pipe.outbound.send(Outbound::Close).unwrap();

        assert!(pipe.read().await.is_ok());
        pipe.writer.await.unwrap();
    }
}
