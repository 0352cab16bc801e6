//! Local media capture and track synchronization across peer connections
//!
//! The capture stream is a per-session singleton acquired lazily and only
//! mutated here. Toggles flip the shared track flags; connections that are
//! missing a kind get the track attached, connections carrying an older
//! track object get a sender-level replacement. Screen share swaps the
//! outbound video track in place on every connection and restores the
//! retained camera track afterwards, never tearing a connection down.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::media::stream::{MediaStream, MediaTrack, TrackKind};
use crate::peer::registry::PeerRegistry;
use crate::transport::{MediaSource, SignalingSender};
use crate::{Error, Result};

#[derive(Default)]
struct LocalMediaState {
    stream: Option<MediaStream>,
    audio_enabled: bool,
    video_enabled: bool,
    /// Camera video track retained while a screen share replaces it
    camera: Option<MediaTrack>,
    screen: Option<MediaStream>,
}

/// Owns the local capture stream and mirrors track changes onto all
/// registered connections
pub struct MediaTrackManager {
    source: Arc<dyn MediaSource>,
    signaling: Arc<dyn SignalingSender>,
    registry: Arc<PeerRegistry>,
    state: RwLock<LocalMediaState>,
}

impl MediaTrackManager {
    /// Create a manager; audio and video start enabled
    pub fn new(
        source: Arc<dyn MediaSource>,
        signaling: Arc<dyn SignalingSender>,
        registry: Arc<PeerRegistry>,
    ) -> Self {
        Self {
            source,
            signaling,
            registry,
            state: RwLock::new(LocalMediaState {
                audio_enabled: true,
                video_enabled: true,
                ..Default::default()
            }),
        }
    }

    /// Acquire the capture stream, reusing the held one when present
    ///
    /// On reuse the current enabled flags are re-applied to the tracks. A
    /// capture failure surfaces as [`Error::MediaAccess`] and never touches
    /// existing connections.
    pub async fn acquire_stream(&self) -> Result<MediaStream> {
        let mut state = self.state.write().await;

        if let Some(stream) = &state.stream {
            debug!(stream_id = %stream.id(), "reusing held capture stream");
            let stream = stream.clone();
            Self::apply_flags(&state, &stream);
            return Ok(stream);
        }

        let stream = self.source.capture_user_media().await?;
        info!(
            stream_id = %stream.id(),
            tracks = stream.tracks().len(),
            "capture stream acquired"
        );
        state.camera = stream.track_of(TrackKind::Video).cloned();
        Self::apply_flags(&state, &stream);
        state.stream = Some(stream.clone());
        Ok(stream)
    }

    fn apply_flags(state: &LocalMediaState, stream: &MediaStream) {
        if let Some(audio) = stream.track_of(TrackKind::Audio) {
            audio.set_enabled(state.audio_enabled);
        }
        if let Some(video) = stream.track_of(TrackKind::Video) {
            video.set_enabled(state.video_enabled);
        }
    }

    /// The held capture stream, if any
    pub async fn current_stream(&self) -> Option<MediaStream> {
        self.state.read().await.stream.clone()
    }

    /// Tracks a newly created connection should send: microphone audio plus
    /// the screen track while sharing, the camera track otherwise
    pub async fn attachment_tracks(&self) -> Vec<MediaTrack> {
        let state = self.state.read().await;
        let mut tracks = Vec::new();
        if let Some(stream) = &state.stream {
            if let Some(audio) = stream.track_of(TrackKind::Audio) {
                tracks.push(audio.clone());
            }
        }
        if let Some(screen) = &state.screen {
            if let Some(video) = screen.track_of(TrackKind::Video) {
                tracks.push(video.clone());
            }
        } else if let Some(camera) = &state.camera {
            tracks.push(camera.clone());
        }
        tracks
    }

    /// Whether local audio is enabled
    pub async fn audio_enabled(&self) -> bool {
        self.state.read().await.audio_enabled
    }

    /// Whether local camera video is enabled
    pub async fn video_enabled(&self) -> bool {
        self.state.read().await.video_enabled
    }

    /// Whether a screen share is active
    pub async fn screen_active(&self) -> bool {
        self.state.read().await.screen.is_some()
    }

    /// Toggle the microphone
    ///
    /// Enabling with no audio track acquires the capture stream first. The
    /// flag flip is visible on every connection the track is attached to;
    /// connections missing the track get it attached. Fails fast with
    /// [`Error::SignalingUnavailable`] when signaling is down.
    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        self.ensure_signaling("toggle audio")?;

        let needs_capture = {
            let state = self.state.read().await;
            enabled
                && state
                    .stream
                    .as_ref()
                    .and_then(|s| s.track_of(TrackKind::Audio))
                    .is_none()
        };
        if needs_capture {
            self.acquire_stream().await?;
        }

        let track = {
            let mut state = self.state.write().await;
            state.audio_enabled = enabled;
            state
                .stream
                .as_ref()
                .and_then(|s| s.track_of(TrackKind::Audio))
                .cloned()
        };
        if let Some(track) = &track {
            track.set_enabled(enabled);
            self.sync_track(TrackKind::Audio, track).await;
        }

        debug!(enabled, "audio toggled");
        self.signaling.notify_audio(enabled).await
    }

    /// Toggle the camera
    ///
    /// While a screen share is active only the flag and the camera track are
    /// touched; the outbound video stays on the screen track.
    pub async fn set_video_enabled(&self, enabled: bool) -> Result<()> {
        self.ensure_signaling("toggle video")?;

        let needs_capture = {
            let state = self.state.read().await;
            enabled && state.camera.is_none() && state.screen.is_none()
        };
        if needs_capture {
            self.acquire_stream().await?;
        }

        let (camera, screen_active) = {
            let mut state = self.state.write().await;
            state.video_enabled = enabled;
            (state.camera.clone(), state.screen.is_some())
        };
        if let Some(camera) = &camera {
            camera.set_enabled(enabled);
            if !screen_active {
                self.sync_track(TrackKind::Video, camera).await;
            }
        }

        debug!(enabled, "video toggled");
        self.signaling.notify_video(enabled).await
    }

    /// Start sharing the display
    ///
    /// Captures a display stream and swaps it in as the outbound video track
    /// on every active connection. Idempotent while a share is running. A
    /// capture failure leaves all connections untouched.
    pub async fn start_screen_share(&self) -> Result<()> {
        self.ensure_signaling("start screen share")?;

        if self.state.read().await.screen.is_some() {
            debug!("screen share already active");
            return Ok(());
        }

        let display = self.source.capture_display().await?;
        let track = display
            .track_of(TrackKind::Video)
            .cloned()
            .ok_or_else(|| {
                Error::MediaAccess("display capture produced no video track".to_string())
            })?;
        track.set_enabled(true);

        self.swap_video(&track).await;
        self.state.write().await.screen = Some(display);

        info!(track_id = %track.id(), "screen share started");
        self.signaling.notify_screen(true).await
    }

    /// Stop sharing the display and restore the camera track
    ///
    /// Idempotent when no share is active.
    pub async fn stop_screen_share(&self) -> Result<()> {
        let (screen, camera, video_enabled) = {
            let mut state = self.state.write().await;
            let Some(screen) = state.screen.take() else {
                debug!("no screen share to stop");
                return Ok(());
            };
            (screen, state.camera.clone(), state.video_enabled)
        };
        screen.stop_all();

        if let Some(camera) = &camera {
            camera.set_enabled(video_enabled);
            self.swap_video(camera).await;
        }

        info!("screen share stopped");
        self.signaling.notify_screen(false).await
    }

    /// The share was revoked outside the app (OS picker, browser chrome)
    ///
    /// Same restoration as [`stop_screen_share`](Self::stop_screen_share).
    pub async fn screen_share_ended(&self) -> Result<()> {
        self.stop_screen_share().await
    }

    /// Stop every local track and drop all capture state (leave path)
    pub async fn release(&self) {
        let mut state = self.state.write().await;
        if let Some(stream) = state.stream.take() {
            stream.stop_all();
        }
        if let Some(screen) = state.screen.take() {
            screen.stop_all();
        }
        state.camera = None;
        debug!("local media released");
    }

    /// Attach when the kind is missing, replace when the track object
    /// changed; a failure on one connection never aborts the others
    async fn sync_track(&self, kind: TrackKind, track: &MediaTrack) {
        for connection in self.registry.active().await {
            let result = match connection.outbound_track(kind).await {
                None => connection.attach_track(track.clone()).await,
                Some(existing) if !existing.same_track(track) => {
                    connection.replace_track(kind, track.clone()).await
                }
                // Same track object: the shared enabled flag already covers it
                Some(_) => continue,
            };
            if let Err(e) = result {
                warn!(
                    user_id = %connection.user_id(),
                    kind = ?kind,
                    error = %e,
                    "failed to sync local track to peer"
                );
            }
        }
    }

    /// In-place video replacement on every active connection
    async fn swap_video(&self, track: &MediaTrack) {
        for connection in self.registry.active().await {
            let result = match connection.outbound_track(TrackKind::Video).await {
                Some(_) => connection.replace_track(TrackKind::Video, track.clone()).await,
                None => connection.attach_track(track.clone()).await,
            };
            if let Err(e) = result {
                warn!(
                    user_id = %connection.user_id(),
                    error = %e,
                    "failed to swap video track on peer"
                );
            }
        }
    }

    fn ensure_signaling(&self, what: &str) -> Result<()> {
        if !self.signaling.is_connected() {
            return Err(Error::SignalingUnavailable(format!(
                "cannot {what} while signaling is down"
            )));
        }
        Ok(())
    }
}
