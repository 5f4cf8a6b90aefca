//! Relay orchestrator
//!
//! Runs one echo call as an explicit state machine:
//! capture -> push negotiation -> pull negotiation -> active, with a single
//! teardown path shared by failure and stop.
//!
//! Every setup step runs while holding the call lock. `stop()` cancels first
//! and then takes the lock, so an in-flight step always completes before
//! teardown starts and no new step begins afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use echorelay_media::{
    CaptureSource, InboundTrack, LocalMedia, MediaPeer, PeerFactory, RemoteStream, RtcPeerFactory,
    TrackCapture,
};
use echorelay_protocol::{BrokerSession, SessionRole, TrackDescriptor};

use crate::config::{AppConfig, BrokerConfig};
use crate::error::{BrokerError, RelayError, Result, TeardownError};
use crate::network::{HttpBroker, SessionBroker};
use crate::relay::sink::PresentationSink;
use crate::relay::state::RelayState;

/// Everything one call owns. Teardown takes it wholesale.
#[derive(Default)]
struct CallResources {
    media: Option<LocalMedia>,
    push: Option<Arc<dyn MediaPeer>>,
    pull: Option<Arc<dyn MediaPeer>>,
    push_session: Option<BrokerSession>,
    pull_session: Option<BrokerSession>,
    bindings: Vec<TrackDescriptor>,
    forwarder: Option<JoinHandle<()>>,
}

pub struct RelayOrchestrator {
    request_timeout: Duration,
    capture: Arc<dyn CaptureSource>,
    broker: Arc<dyn SessionBroker>,
    peers: Arc<dyn PeerFactory>,
    sink: Arc<dyn PresentationSink>,
    state: watch::Sender<RelayState>,
    cancel: CancellationToken,
    call: Mutex<CallResources>,
}

impl RelayOrchestrator {
    pub fn new(
        config: &BrokerConfig,
        capture: Arc<dyn CaptureSource>,
        broker: Arc<dyn SessionBroker>,
        peers: Arc<dyn PeerFactory>,
        sink: Arc<dyn PresentationSink>,
    ) -> Self {
        let (state, _) = watch::channel(RelayState::Idle);
        Self {
            request_timeout: config.request_timeout(),
            capture,
            broker,
            peers,
            sink,
            state,
            cancel: CancellationToken::new(),
            call: Mutex::new(CallResources::default()),
        }
    }

    /// Wire up the webrtc-rs peers, HTTP broker and sample-track capture
    pub fn from_config(config: &AppConfig, sink: Arc<dyn PresentationSink>) -> Result<Self> {
        let peers = RtcPeerFactory::new(&config.ice_servers)?;
        let broker = HttpBroker::new(&config.broker)?;
        let capture = TrackCapture::new(config.capture.clone());

        Ok(Self::new(
            &config.broker,
            Arc::new(capture),
            Arc::new(broker),
            Arc::new(peers),
            sink,
        ))
    }

    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    /// Run setup until the call is active.
    ///
    /// On failure everything acquired so far is torn down before the error is
    /// returned. Returns `Cancelled` when `stop()` interrupted setup.
    pub async fn start(&self) -> Result<()> {
        {
            let _call = self.call.lock().await;
            let current = self.state();
            if current != RelayState::Idle || self.cancel.is_cancelled() {
                return Err(RelayError::InvalidState {
                    action: "start",
                    state: current,
                });
            }
            self.transition(RelayState::AcquiringMedia)?;
        }

        let mut phase = RelayState::AcquiringMedia;
        while phase != RelayState::Active {
            let mut call = self.call.lock().await;
            if self.cancel.is_cancelled() {
                tracing::info!("Stop requested while {}, abandoning setup", phase);
                self.close_locked(&mut call).await;
                return Err(RelayError::Cancelled);
            }

            let step = match phase {
                RelayState::AcquiringMedia => self.acquire_media(&mut call).await,
                RelayState::PushNegotiating => self.negotiate_push(&mut call).await,
                RelayState::PullNegotiating => self.negotiate_pull(&mut call).await,
                other => Err(RelayError::InvalidState {
                    action: "continue setup",
                    state: other,
                }),
            };

            let next = match step {
                Ok(next) => next,
                Err(err) => {
                    self.fail_locked(&mut call, &err).await;
                    return Err(err);
                }
            };

            if self.cancel.is_cancelled() {
                tracing::info!("Stop requested after {}, not entering {}", phase, next);
                self.close_locked(&mut call).await;
                return Err(RelayError::Cancelled);
            }

            if let Err(err) = self.transition(next) {
                self.fail_locked(&mut call, &err).await;
                return Err(err);
            }
            phase = next;
        }

        tracing::info!("Echo call active");
        Ok(())
    }

    /// Tear the call down from whatever state it is in.
    ///
    /// Waits for an in-flight setup step to finish first. No-op once closed or failed.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut call = self.call.lock().await;
        self.close_locked(&mut call).await;
    }

    fn transition(&self, next: RelayState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            tracing::error!("Illegal relay transition {} -> {}", current, next);
            return Err(RelayError::InvalidState {
                action: "transition",
                state: current,
            });
        }
        tracing::info!("Relay {} -> {}", current, next);
        self.state.send_replace(next);
        Ok(())
    }

    /// Bound a broker call by the configured request timeout
    async fn broker_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = std::result::Result<T, BrokerError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::warn!("Broker call '{}' failed: {}", operation, err);
                Err(err.into())
            }
            Err(_) => Err(BrokerError::Timeout {
                operation,
                after: self.request_timeout,
            }
            .into()),
        }
    }

    async fn acquire_media(&self, call: &mut CallResources) -> Result<RelayState> {
        let media = self.capture.acquire().await?;
        self.sink.on_local_stream(media.describe());
        call.media = Some(media);
        Ok(RelayState::PushNegotiating)
    }

    async fn negotiate_push(&self, call: &mut CallResources) -> Result<RelayState> {
        let tracks = match &call.media {
            Some(media) => media.tracks().to_vec(),
            None => return Err(RelayError::Negotiation("no local media to push".to_string())),
        };

        let push = self.peers.create(SessionRole::Push).await?;
        call.push = Some(push.clone());

        for track in tracks {
            push.add_outbound_track(track).await?;
        }

        let offer = push.create_offer().await?;
        push.set_local_description(offer.clone()).await?;
        let bindings = push.outbound_bindings().await?;

        let session_id = self
            .broker_call("create push session", self.broker.create_session())
            .await?;
        call.push_session = Some(BrokerSession {
            id: session_id.clone(),
            role: SessionRole::Push,
        });

        let answer = self
            .broker_call(
                "push tracks",
                self.broker.push_tracks(&session_id, offer, &bindings),
            )
            .await?;
        push.set_remote_description(answer).await?;

        tracing::info!(
            "Pushed {} track(s) on session {}",
            bindings.len(),
            session_id
        );
        call.bindings = bindings;
        Ok(RelayState::PullNegotiating)
    }

    async fn negotiate_pull(&self, call: &mut CallResources) -> Result<RelayState> {
        let source = call
            .push_session
            .as_ref()
            .map(|session| session.id.clone())
            .ok_or_else(|| {
                RelayError::Negotiation("pull requires an established push session".to_string())
            })?;
        let track_names: Vec<String> = call
            .bindings
            .iter()
            .map(|binding| binding.track_name.clone())
            .collect();

        let pull = self.peers.create(SessionRole::Pull).await?;
        call.pull = Some(pull.clone());

        // Registered before any description is applied so no track is missed
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        pull.on_inbound_track(Arc::new(move |track| {
            if inbound_tx.send(track).is_err() {
                tracing::debug!("Inbound track arrived after the call ended");
            }
        }));
        call.forwarder = Some(tokio::spawn(forward_remote_stream(
            inbound_rx,
            track_names.len(),
            self.state.subscribe(),
            self.sink.clone(),
        )));

        let session_id = self
            .broker_call("create pull session", self.broker.create_session())
            .await?;
        call.pull_session = Some(BrokerSession {
            id: session_id.clone(),
            role: SessionRole::Pull,
        });

        let offer = self
            .broker_call(
                "pull tracks",
                self.broker.pull_tracks(&session_id, &source, &track_names),
            )
            .await?;
        pull.set_remote_description(offer).await?;

        let answer = pull.create_answer().await?;
        pull.set_local_description(answer.clone()).await?;

        self.broker_call("renegotiate", self.broker.renegotiate(&session_id, answer))
            .await?;

        tracing::info!(
            "Pulling {} track(s) from {} on session {}",
            track_names.len(),
            source,
            session_id
        );
        Ok(RelayState::Active)
    }

    async fn fail_locked(&self, call: &mut CallResources, err: &RelayError) {
        tracing::error!("Echo call setup failed while {}: {}", self.state(), err);
        if let Err(e) = self.transition(RelayState::Failed) {
            tracing::error!("Could not mark relay failed: {}", e);
        }
        self.teardown(call).await;
        self.sink.on_error(err.kind(), &err.to_string());
    }

    async fn close_locked(&self, call: &mut CallResources) {
        match self.state() {
            RelayState::Closing | RelayState::Closed | RelayState::Failed => return,
            RelayState::Idle => {
                let _ = self.transition(RelayState::Closed);
                return;
            }
            _ => {}
        }

        let _ = self.transition(RelayState::Closing);
        self.teardown(call).await;
        let _ = self.transition(RelayState::Closed);
    }

    /// Release everything in reverse order of acquisition. Every step runs
    /// even if an earlier one failed.
    async fn teardown(&self, call: &mut CallResources) {
        let CallResources {
            media,
            push,
            pull,
            push_session,
            pull_session,
            bindings: _,
            forwarder,
        } = std::mem::take(call);

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }

        if let Some(pull) = pull {
            if let Err(e) = pull.close().await {
                tracing::warn!("{}", TeardownError::new("close pull peer", e));
            }
        }

        if let Some(push) = push {
            if let Err(e) = push.close().await {
                tracing::warn!("{}", TeardownError::new("close push peer", e));
            }
        }

        if let Some(media) = media {
            if let Err(e) = self.capture.release(&media) {
                tracing::warn!("{}", TeardownError::new("release local media", e));
            }
        }

        self.sink.clear();

        for session in [push_session, pull_session].into_iter().flatten() {
            tracing::debug!("Abandoned {} session {}", session.role, session.id);
        }
        tracing::info!("Echo call torn down");
    }
}

impl Drop for RelayOrchestrator {
    /// Release what a dropped call still holds. Peer close runs on the
    /// runtime when one is available.
    fn drop(&mut self) {
        self.cancel.cancel();
        let call = std::mem::take(self.call.get_mut());
        if call.media.is_none() && call.push.is_none() && call.pull.is_none() {
            return;
        }

        tracing::info!("Relay dropped while {}, releasing call", self.state());
        if let Some(forwarder) = call.forwarder {
            forwarder.abort();
        }
        if let Some(media) = &call.media {
            if let Err(e) = self.capture.release(media) {
                tracing::warn!("{}", TeardownError::new("release local media", e));
            }
        }
        self.sink.clear();

        let peers: Vec<Arc<dyn MediaPeer>> = [call.pull, call.push].into_iter().flatten().collect();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for peer in peers {
                        if let Err(e) = peer.close().await {
                            tracing::warn!("{}", TeardownError::new("close peer", e));
                        }
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime to close {} peer(s) on drop", peers.len()),
        }
    }
}

/// Collect inbound tracks and publish them as one stream once every pulled
/// track has arrived and the call is active
async fn forward_remote_stream(
    mut inbound: mpsc::UnboundedReceiver<InboundTrack>,
    expected: usize,
    mut states: watch::Receiver<RelayState>,
    sink: Arc<dyn PresentationSink>,
) {
    let mut stream = RemoteStream::default();
    while stream.len() < expected {
        let Some(track) = inbound.recv().await else {
            return;
        };
        if stream.tracks.iter().any(|t| t.id == track.id && t.stream_id == track.stream_id) {
            tracing::debug!("Ignoring repeated inbound track {}", track.id);
            continue;
        }

        stream.tracks.push(track);
        tracing::debug!("Inbound track {}/{}", stream.len(), expected);
    }

    // Tracks can land before the broker accepts our answer
    let settled = states
        .wait_for(|state| !state.is_setup())
        .await
        .map(|state| *state);

    match settled {
        Ok(RelayState::Active) => sink.on_remote_stream(stream),
        Ok(state) => tracing::debug!("Dropping remote stream, relay is {}", state),
        Err(_) => tracing::debug!("Dropping remote stream, relay is gone"),
    }
}
