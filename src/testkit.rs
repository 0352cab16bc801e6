//! In-crate test doubles for the collaborator traits

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::media::stream::{MediaStream, MediaTrack, RemoteStream, TrackKind, TrackSource};
use crate::signal::protocol::SignalPayload;
use crate::transport::{
    ConnectionEvents, ConnectionHandle, ConnectionRequest, ConnectivityErrorKind, MediaConnector,
    MediaSource, RoomObserver, SignalingSender,
};
use crate::Result;

/// Records every call made against one connection
#[derive(Default)]
pub(crate) struct StubHandle {
    applied: Mutex<Vec<SignalPayload>>,
    attached: Mutex<Vec<MediaTrack>>,
    replaced: Mutex<Vec<(TrackKind, MediaTrack)>>,
    negotiation_started: AtomicBool,
    stable: AtomicBool,
    closed: AtomicBool,
}

impl StubHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn applied(&self) -> Vec<SignalPayload> {
        self.applied.lock().unwrap().clone()
    }

    pub(crate) fn attached(&self) -> Vec<MediaTrack> {
        self.attached.lock().unwrap().clone()
    }

    pub(crate) fn replaced(&self) -> Vec<(TrackKind, MediaTrack)> {
        self.replaced.lock().unwrap().clone()
    }

    pub(crate) fn negotiation_started(&self) -> bool {
        self.negotiation_started.load(Ordering::SeqCst)
    }

    pub(crate) fn set_stable(&self, stable: bool) {
        self.stable.store(stable, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionHandle for StubHandle {
    async fn apply_signal(&self, payload: SignalPayload) -> Result<()> {
        self.applied.lock().unwrap().push(payload);
        Ok(())
    }

    async fn start_negotiation(&self) -> Result<()> {
        self.negotiation_started.store(true, Ordering::SeqCst);
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

/// Hands out [`StubHandle`]s and remembers every request
#[derive(Default)]
pub(crate) struct StubConnector {
    created: Mutex<Vec<(ConnectionRequest, Arc<StubHandle>)>>,
}

impl StubConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// The most recently created handle for a participant
    pub(crate) fn latest(&self, user_id: &str) -> Option<Arc<StubHandle>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(request, _)| request.user_id == user_id)
            .map(|(_, handle)| Arc::clone(handle))
    }

    pub(crate) fn handles(&self) -> Vec<Arc<StubHandle>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(_, handle)| Arc::clone(handle))
            .collect()
    }
}

#[async_trait]
impl MediaConnector for StubConnector {
    async fn create_connection(
        &self,
        request: ConnectionRequest,
        _events: ConnectionEvents,
    ) -> Result<Arc<dyn ConnectionHandle>> {
        let handle = Arc::new(StubHandle::new());
        self.created
            .lock()
            .unwrap()
            .push((request, Arc::clone(&handle)));
        Ok(handle)
    }
}

/// Records outbound signaling traffic
pub(crate) struct StubSignaling {
    connected: AtomicBool,
    sent: Mutex<Vec<(String, SignalPayload)>>,
    notifications: Mutex<Vec<(String, bool)>>,
}

impl StubSignaling {
    pub(crate) fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<(String, SignalPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn notifications(&self) -> Vec<(String, bool)> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingSender for StubSignaling {
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

/// Fabricates capture streams without touching any device
#[derive(Default)]
pub(crate) struct StubSource {
    user_media_captures: AtomicU32,
    display_captures: AtomicU32,
    fail_next: AtomicBool,
}

impl StubSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn user_media_captures(&self) -> u32 {
        self.user_media_captures.load(Ordering::SeqCst)
    }

    pub(crate) fn display_captures(&self) -> u32 {
        self.display_captures.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn check_failure(&self, what: &str) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(crate::Error::MediaAccess(format!("{what} denied")));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaSource for StubSource {
    async fn capture_user_media(&self) -> Result<MediaStream> {
        self.check_failure("user media")?;
        let n = self.user_media_captures.fetch_add(1, Ordering::SeqCst);
        Ok(MediaStream::new(
            format!("user-media-{n}"),
            vec![
                MediaTrack::new(format!("mic-{n}"), TrackKind::Audio, TrackSource::Microphone),
                MediaTrack::new(format!("cam-{n}"), TrackKind::Video, TrackSource::Camera),
            ],
        ))
    }

    async fn capture_display(&self) -> Result<MediaStream> {
        self.check_failure("display")?;
        let n = self.display_captures.fetch_add(1, Ordering::SeqCst);
        Ok(MediaStream::new(
            format!("display-{n}"),
            vec![MediaTrack::new(
                format!("screen-{n}"),
                TrackKind::Video,
                TrackSource::Screen,
            )],
        ))
    }
}

/// Discards every observation
pub(crate) struct NullObserver;

impl RoomObserver for NullObserver {
    fn participant_stream_updated(&self, _user_id: &str, _stream: RemoteStream) {}
    fn participant_removed(&self, _user_id: &str) {}
    fn connectivity_error(&self, _user_id: &str, _kind: ConnectivityErrorKind) {}
}
