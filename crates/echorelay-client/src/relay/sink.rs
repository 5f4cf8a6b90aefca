use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use echorelay_media::{InboundTrack, LocalStream, RemoteStream};

use crate::error::ErrorKind;

/// Where the relay publishes what it shows.
///
/// Called from the orchestrator's flow and from its inbound-track forwarder,
/// never from the transport's own callbacks.
pub trait PresentationSink: Send + Sync {
    fn on_local_stream(&self, stream: LocalStream);

    fn on_remote_stream(&self, stream: RemoteStream);

    /// Terminal setup failure
    fn on_error(&self, kind: ErrorKind, message: &str);

    /// Drop every stream previously published
    fn clear(&self);
}

/// Headless sink: logs stream events and counts echoed RTP packets
pub struct LoggingSink {
    readers: Mutex<CancellationToken>,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self {
            readers: Mutex::new(CancellationToken::new()),
        }
    }

    fn reader_token(&self) -> CancellationToken {
        match self.readers.lock() {
            Ok(token) => token.child_token(),
            Err(poisoned) => poisoned.into_inner().child_token(),
        }
    }
}

impl Default for LoggingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSink for LoggingSink {
    fn on_local_stream(&self, stream: LocalStream) {
        tracing::info!(
            "Local preview {}: {}",
            stream.stream_id,
            stream
                .tracks
                .iter()
                .map(|t| format!("{} ({:?})", t.name, t.kind))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    fn on_remote_stream(&self, stream: RemoteStream) {
        tracing::info!("Remote echo stream with {} track(s)", stream.len());
        for track in stream.tracks {
            tokio::spawn(count_rtp(track, self.reader_token()));
        }
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        tracing::error!("Echo call failed ({}): {}", kind, message);
    }

    fn clear(&self) {
        let mut readers = match self.readers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        readers.cancel();
        *readers = CancellationToken::new();
        tracing::info!("Presentation cleared");
    }
}

/// Read RTP from an echoed track until it ends or the sink is cleared
async fn count_rtp(track: InboundTrack, stop: CancellationToken) {
    let Some(remote) = track.remote.clone() else {
        return;
    };

    let mut packets = 0u64;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            read = remote.read_rtp() => match read {
                Ok((packet, _attributes)) => {
                    packets += 1;
                    if packets % 100 == 1 {
                        tracing::info!(
                            "Echo {:?} track {}: packet {}, payload {} bytes",
                            track.kind,
                            track.id,
                            packets,
                            packet.payload.len()
                        );
                    }
                }
                Err(e) => {
                    tracing::info!("Echo track {} ended: {}", track.id, e);
                    break;
                }
            }
        }
    }
    tracing::debug!("Stopped reading echo track {} after {} packets", track.id, packets);
}
