//! Test doubles for driving a [`RoomOrchestrator`] end to end
//!
//! `FakeConnector` hands out `FakeHandle`s that behave like a cooperative
//! remote side: `start_negotiation` emits an offer, an applied offer emits
//! an answer, and an applied answer settles the signaling state. Transport
//! lifecycle events are injected through the `emit_*` helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use meshcall::{
    ConnectionEvent, ConnectionHandle, ConnectionRequest, ConnectionState, ConnectivityErrorKind,
    Error, MediaConnector, MediaSource, MediaStream, MediaTrack, RemoteStream, RemoteTrack, Result,
    Role, RoomObserver, RoomOrchestrator, SignalKind, SignalPayload, SignalingSender, TrackKind,
    TrackSource,
};

pub type ConnectionEvents = tokio::sync::mpsc::UnboundedSender<ConnectionEvent>;

/// One fake transport connection
pub struct FakeHandle {
    pub user_id: String,
    pub connection_id: String,
    pub role: Role,
    events: ConnectionEvents,
    applied: Mutex<Vec<SignalPayload>>,
    attached: Mutex<Vec<MediaTrack>>,
    replaced: Mutex<Vec<(TrackKind, MediaTrack)>>,
    negotiated: AtomicBool,
    stable: AtomicBool,
    closed: AtomicBool,
}

impl FakeHandle {
    fn new(request: &ConnectionRequest, events: ConnectionEvents) -> Self {
        Self {
            user_id: request.user_id.clone(),
            connection_id: request.connection_id.clone(),
            role: request.role,
            events,
            applied: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
            replaced: Mutex::new(Vec::new()),
            negotiated: AtomicBool::new(false),
            stable: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn applied(&self) -> Vec<SignalPayload> {
        self.applied.lock().unwrap().clone()
    }

    pub fn attached(&self) -> Vec<MediaTrack> {
        self.attached.lock().unwrap().clone()
    }

    pub fn replaced(&self) -> Vec<(TrackKind, MediaTrack)> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn negotiation_started(&self) -> bool {
        self.negotiated.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_stable(&self, stable: bool) {
        self.stable.store(stable, Ordering::SeqCst);
    }

    /// Inject a transport-connected event
    pub fn emit_connected(&self) {
        let _ = self.events.send(ConnectionEvent::Connected {
            user_id: self.user_id.clone(),
            connection_id: self.connection_id.clone(),
        });
    }

    /// Inject a transport-failed event
    pub fn emit_failed(&self) {
        let _ = self.events.send(ConnectionEvent::Failed {
            user_id: self.user_id.clone(),
            connection_id: self.connection_id.clone(),
        });
    }

    /// Inject an incoming remote track
    pub fn emit_remote_track(&self, track_id: &str, kind: TrackKind) {
        let _ = self.events.send(ConnectionEvent::RemoteTrack {
            user_id: self.user_id.clone(),
            connection_id: self.connection_id.clone(),
            track: RemoteTrack {
                id: track_id.to_string(),
                kind,
                stream_id: format!("remote-{}", self.user_id),
            },
        });
    }
}

#[async_trait]
impl ConnectionHandle for FakeHandle {
    async fn apply_signal(&self, payload: SignalPayload) -> Result<()> {
        let kind = payload.kind;
        self.applied.lock().unwrap().push(payload);
        match kind {
            SignalKind::Offer => {
                // the remote side of the handshake answers
                let _ = self.events.send(ConnectionEvent::SignalOut {
                    user_id: self.user_id.clone(),
                    connection_id: self.connection_id.clone(),
                    payload: SignalPayload::answer(format!("answer-from-{}", self.user_id)),
                });
                self.stable.store(true, Ordering::SeqCst);
            }
            SignalKind::Answer => {
                self.stable.store(true, Ordering::SeqCst);
            }
            SignalKind::IceCandidate => {}
        }
        Ok(())
    }

    async fn start_negotiation(&self) -> Result<()> {
        self.negotiated.store(true, Ordering::SeqCst);
        let _ = self.events.send(ConnectionEvent::SignalOut {
            user_id: self.user_id.clone(),
            connection_id: self.connection_id.clone(),
            payload: SignalPayload::offer(format!("offer-to-{}", self.user_id)),
        });
        Ok(())
    }

    async fn attach_track(&self, track: MediaTrack) -> Result<()> {
        self.attached.lock().unwrap().push(track);
        Ok(())
    }

    async fn replace_outbound_track(&self, kind: TrackKind, track: MediaTrack) -> Result<()> {
        self.replaced.lock().unwrap().push((kind, track));
        Ok(())
    }

    async fn signaling_stable(&self) -> bool {
        self.stable.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Fake connection factory retaining every handle it produced
#[derive(Default)]
pub struct FakeConnector {
    created: Mutex<Vec<Arc<FakeHandle>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Most recently created handle for a participant
    pub fn latest(&self, user_id: &str) -> Option<Arc<FakeHandle>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|handle| handle.user_id == user_id)
            .map(Arc::clone)
    }

    pub fn all_for(&self, user_id: &str) -> Vec<Arc<FakeHandle>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|handle| handle.user_id == user_id)
            .map(Arc::clone)
            .collect()
    }
}

#[async_trait]
impl MediaConnector for FakeConnector {
    async fn create_connection(
        &self,
        request: ConnectionRequest,
        events: ConnectionEvents,
    ) -> Result<Arc<dyn ConnectionHandle>> {
        let handle = Arc::new(FakeHandle::new(&request, events));
        self.created.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle)
    }
}

/// Fake signaling transport recording outbound traffic
pub struct FakeSignaling {
    connected: AtomicBool,
    sent: Mutex<Vec<(String, SignalPayload)>>,
    notifications: Mutex<Vec<(String, bool)>>,
}

impl FakeSignaling {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, SignalPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: &str, kind: SignalKind) -> Vec<SignalPayload> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, payload)| target == user_id && payload.kind == kind)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn notifications(&self) -> Vec<(String, bool)> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingSender for FakeSignaling {
    async fn send_signal(&self, target_user_id: &str, payload: SignalPayload) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((target_user_id.to_string(), payload));
        Ok(())
    }

    async fn notify_audio(&self, enabled: bool) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push(("audio".to_string(), enabled));
        Ok(())
    }

    async fn notify_video(&self, enabled: bool) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push(("video".to_string(), enabled));
        Ok(())
    }

    async fn notify_screen(&self, enabled: bool) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push(("screen".to_string(), enabled));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Fake capture devices
#[derive(Default)]
pub struct FakeMediaSource {
    user_media_captures: AtomicU32,
    display_captures: AtomicU32,
    fail_next: AtomicBool,
    last_user_media: Mutex<Option<MediaStream>>,
    last_display: Mutex<Option<MediaStream>>,
}

impl FakeMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_media_captures(&self) -> u32 {
        self.user_media_captures.load(Ordering::SeqCst)
    }

    pub fn display_captures(&self) -> u32 {
        self.display_captures.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn last_user_media(&self) -> Option<MediaStream> {
        self.last_user_media.lock().unwrap().clone()
    }

    pub fn last_display(&self) -> Option<MediaStream> {
        self.last_display.lock().unwrap().clone()
    }

    fn check_failure(&self, what: &str) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::MediaAccess(format!("{what} denied")));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaSource for FakeMediaSource {
    async fn capture_user_media(&self) -> Result<MediaStream> {
        self.check_failure("user media")?;
        let n = self.user_media_captures.fetch_add(1, Ordering::SeqCst);
        let stream = MediaStream::new(
            format!("user-media-{n}"),
            vec![
                MediaTrack::new(format!("mic-{n}"), TrackKind::Audio, TrackSource::Microphone),
                MediaTrack::new(format!("cam-{n}"), TrackKind::Video, TrackSource::Camera),
            ],
        );
        *self.last_user_media.lock().unwrap() = Some(stream.clone());
        Ok(stream)
    }

    async fn capture_display(&self) -> Result<MediaStream> {
        self.check_failure("display")?;
        let n = self.display_captures.fetch_add(1, Ordering::SeqCst);
        let stream = MediaStream::new(
            format!("display-{n}"),
            vec![MediaTrack::new(
                format!("screen-{n}"),
                TrackKind::Video,
                TrackSource::Screen,
            )],
        );
        *self.last_display.lock().unwrap() = Some(stream.clone());
        Ok(stream)
    }
}

/// Observer recording every callback
#[derive(Default)]
pub struct RecordingObserver {
    streams: Mutex<Vec<(String, Vec<String>)>>,
    removed: Mutex<Vec<String>>,
    errors: Mutex<Vec<(String, ConnectivityErrorKind)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(user_id, track ids)` per stream-updated callback, in order
    pub fn stream_updates(&self) -> Vec<(String, Vec<String>)> {
        self.streams.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(String, ConnectivityErrorKind)> {
        self.errors.lock().unwrap().clone()
    }
}

impl RoomObserver for RecordingObserver {
    fn participant_stream_updated(&self, user_id: &str, stream: RemoteStream) {
        let track_ids = stream.tracks().iter().map(|t| t.id.clone()).collect();
        self.streams
            .lock()
            .unwrap()
            .push((user_id.to_string(), track_ids));
    }

    fn participant_removed(&self, user_id: &str) {
        self.removed.lock().unwrap().push(user_id.to_string());
    }

    fn connectivity_error(&self, user_id: &str, kind: ConnectivityErrorKind) {
        self.errors
            .lock()
            .unwrap()
            .push((user_id.to_string(), kind));
    }
}

/// Everything a scenario test needs, wired together
pub struct TestRoom {
    pub orchestrator: Arc<RoomOrchestrator>,
    pub connector: Arc<FakeConnector>,
    pub signaling: Arc<FakeSignaling>,
    pub source: Arc<FakeMediaSource>,
    pub observer: Arc<RecordingObserver>,
}

/// Install a fmt subscriber honoring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl TestRoom {
    pub fn with_config(config: meshcall::OrchestratorConfig) -> Self {
        init_tracing();
        let connector = Arc::new(FakeConnector::new());
        let signaling = Arc::new(FakeSignaling::new());
        let source = Arc::new(FakeMediaSource::new());
        let observer = Arc::new(RecordingObserver::new());
        let orchestrator = RoomOrchestrator::new(
            config,
            signaling.clone() as Arc<dyn SignalingSender>,
            connector.clone() as Arc<dyn MediaConnector>,
            source.clone() as Arc<dyn MediaSource>,
            observer.clone() as Arc<dyn RoomObserver>,
        )
        .expect("valid config");
        Self {
            orchestrator,
            connector,
            signaling,
            source,
            observer,
        }
    }

    pub fn new() -> Self {
        Self::with_config(meshcall::OrchestratorConfig::default())
    }

    /// Feed a join event for a participant
    pub async fn join(&self, user_id: &str) {
        self.orchestrator
            .handle_room_event(meshcall::RoomEvent::UserJoined {
                user_id: user_id.to_string(),
                display_name: None,
            })
            .await
            .expect("join handled");
    }

    /// Feed an inbound signal from a participant
    pub async fn signal(&self, from_user_id: &str, payload: SignalPayload) {
        self.orchestrator
            .handle_room_event(meshcall::RoomEvent::Signal {
                from_user_id: from_user_id.to_string(),
                payload,
            })
            .await
            .expect("signal handled");
    }

    pub fn candidate(&self, n: u32) -> SignalPayload {
        SignalPayload::ice_candidate(json!({ "candidate": format!("candidate-{n}") }))
    }
}

/// Poll a condition until it holds or a 2 second budget runs out
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Poll a participant's connection state
pub async fn wait_for_state(
    orchestrator: &RoomOrchestrator,
    user_id: &str,
    expected: ConnectionState,
) -> bool {
    for _ in 0..400 {
        if matches!(
            orchestrator.connection_state(user_id).await,
            Ok(state) if state == expected
        ) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
