//! Production [`MediaConnector`] backed by the `webrtc` crate
//!
//! One [`WebRtcHandle`] wraps one `RTCPeerConnection`. Transport state
//! changes, trickle ICE candidates and remote tracks are reported through
//! the shared connection-event channel, tagged with the incarnation's
//! `connection_id`. ICE candidates arriving before the remote description is
//! set are queued inside the handle and flushed once it lands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::config::IceConfig;
use crate::media::stream::{MediaTrack, RemoteTrack, TrackKind};
use crate::signal::protocol::{SignalKind, SignalPayload};
use crate::transport::{
    ConnectionEvent, ConnectionEvents, ConnectionHandle, ConnectionRequest, MediaConnector,
};
use crate::{Error, Result};

/// Creates `webrtc`-backed peer connections
#[derive(Debug, Default)]
pub struct WebRtcConnector;

impl WebRtcConnector {
    /// Create a connector
    pub fn new() -> Self {
        Self
    }

    fn ice_servers(ice: &IceConfig) -> Vec<RTCIceServer> {
        ice.stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(ice.turn_servers.iter().map(|turn| {
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect()
    }
}

#[async_trait]
impl MediaConnector for WebRtcConnector {
    async fn create_connection(
        &self,
        request: ConnectionRequest,
        events: ConnectionEvents,
    ) -> Result<Arc<dyn ConnectionHandle>> {
        let handle = WebRtcHandle::connect(request, events).await?;
        Ok(handle as Arc<dyn ConnectionHandle>)
    }
}

/// One live `RTCPeerConnection`
pub struct WebRtcHandle {
    user_id: String,
    connection_id: String,
    peer_connection: Arc<RTCPeerConnection>,
    events: ConnectionEvents,
    senders: tokio::sync::RwLock<HashMap<TrackKind, Arc<RTCRtpSender>>>,
    sample_tracks: tokio::sync::RwLock<HashMap<TrackKind, Arc<TrackLocalStaticSample>>>,
    /// Candidates received before the remote description
    queued_candidates: tokio::sync::Mutex<Vec<RTCIceCandidateInit>>,
    remote_description_set: AtomicBool,
}

impl WebRtcHandle {
    async fn connect(request: ConnectionRequest, events: ConnectionEvents) -> Result<Arc<Self>> {
        let ConnectionRequest {
            user_id,
            connection_id,
            role,
            ice,
        } = request;

        info!(
            user_id = %user_id,
            connection_id = %connection_id,
            role = ?role,
            "creating webrtc peer connection"
        );

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::Transport(format!("Failed to register codecs: {e}")))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine)
                .map_err(|e| Error::Transport(format!("Failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: WebRtcConnector::ice_servers(&ice),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::Transport(format!("Failed to create peer connection: {e}")))?,
        );

        let handle = Arc::new(Self {
            user_id,
            connection_id,
            peer_connection,
            events,
            senders: tokio::sync::RwLock::new(HashMap::new()),
            sample_tracks: tokio::sync::RwLock::new(HashMap::new()),
            queued_candidates: tokio::sync::Mutex::new(Vec::new()),
            remote_description_set: AtomicBool::new(false),
        });
        handle.install_callbacks();
        Ok(handle)
    }

    fn install_callbacks(&self) {
        // Connection state -> Connected/Failed events
        let events = self.events.clone();
        let user_id = self.user_id.clone();
        let connection_id = self.connection_id.clone();
        self.peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let events = events.clone();
                let user_id = user_id.clone();
                let connection_id = connection_id.clone();
                Box::pin(async move {
                    let event = match state {
                        RTCPeerConnectionState::Connected => ConnectionEvent::Connected {
                            user_id,
                            connection_id,
                        },
                        RTCPeerConnectionState::Failed => ConnectionEvent::Failed {
                            user_id,
                            connection_id,
                        },
                        _ => return,
                    };
                    let _ = events.send(event);
                })
            },
        ));

        // Trickle ICE -> outbound ice-candidate signals
        let events = self.events.clone();
        let user_id = self.user_id.clone();
        let connection_id = self.connection_id.clone();
        self.peer_connection.on_ice_candidate(Box::new(move |candidate| {
            let events = events.clone();
            let user_id = user_id.clone();
            let connection_id = connection_id.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    // end of gathering
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => match serde_json::to_value(&init) {
                        Ok(data) => {
                            let _ = events.send(ConnectionEvent::SignalOut {
                                user_id,
                                connection_id,
                                payload: SignalPayload::ice_candidate(data),
                            });
                        }
                        Err(e) => {
                            warn!(user_id = %user_id, error = %e, "failed to encode ICE candidate");
                        }
                    },
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "failed to serialize ICE candidate");
                    }
                }
            })
        }));

        // Remote tracks -> RemoteTrack events
        let events = self.events.clone();
        let user_id = self.user_id.clone();
        let connection_id = self.connection_id.clone();
        self.peer_connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let events = events.clone();
                let user_id = user_id.clone();
                let connection_id = connection_id.clone();
                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => TrackKind::Audio,
                        RTPCodecType::Video => TrackKind::Video,
                        _ => return,
                    };
                    debug!(
                        user_id = %user_id,
                        track_id = %track.id(),
                        kind = ?kind,
                        "remote track received"
                    );
                    let _ = events.send(ConnectionEvent::RemoteTrack {
                        user_id,
                        connection_id,
                        track: RemoteTrack {
                            id: track.id(),
                            kind,
                            stream_id: track.stream_id(),
                        },
                    });
                })
            }));
    }

    /// The sample-writer track for a kind, for feeding encoded media
    pub async fn sample_track(&self, kind: TrackKind) -> Option<Arc<TrackLocalStaticSample>> {
        self.sample_tracks.read().await.get(&kind).cloned()
    }

    fn codec_capability(kind: TrackKind) -> RTCRtpCodecCapability {
        match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
        }
    }

    fn make_sample_track(&self, track: &MediaTrack) -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            Self::codec_capability(track.kind()),
            track.id().to_string(),
            format!("stream-{}", self.connection_id),
        ))
    }

    async fn set_remote(&self, description: RTCSessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set remote description: {e}")))?;
        self.remote_description_set.store(true, Ordering::SeqCst);
        self.flush_queued_candidates().await;
        Ok(())
    }

    async fn flush_queued_candidates(&self) {
        let queued: Vec<_> = self.queued_candidates.lock().await.drain(..).collect();
        if queued.is_empty() {
            return;
        }
        debug!(
            user_id = %self.user_id,
            count = queued.len(),
            "applying queued ICE candidates"
        );
        for init in queued {
            if let Err(e) = self.peer_connection.add_ice_candidate(init).await {
                warn!(user_id = %self.user_id, error = %e, "failed to add queued ICE candidate");
            }
        }
    }

    fn emit_signal(&self, payload: SignalPayload) {
        let _ = self.events.send(ConnectionEvent::SignalOut {
            user_id: self.user_id.clone(),
            connection_id: self.connection_id.clone(),
            payload,
        });
    }
}

#[async_trait]
impl ConnectionHandle for WebRtcHandle {
    async fn apply_signal(&self, payload: SignalPayload) -> Result<()> {
        match payload.kind {
            SignalKind::Offer => {
                let offer = RTCSessionDescription::offer(payload.sdp()?)
                    .map_err(|e| Error::Negotiation(format!("Invalid offer SDP: {e}")))?;
                self.set_remote(offer).await?;

                let answer = self
                    .peer_connection
                    .create_answer(None)
                    .await
                    .map_err(|e| Error::Negotiation(format!("Failed to create answer: {e}")))?;
                self.peer_connection
                    .set_local_description(answer)
                    .await
                    .map_err(|e| Error::Negotiation(format!("Failed to set local description: {e}")))?;
                let local = self.peer_connection.local_description().await.ok_or_else(|| {
                    Error::Negotiation("No local description after answer".to_string())
                })?;
                self.emit_signal(SignalPayload::answer(local.sdp));
                Ok(())
            }
            SignalKind::Answer => {
                let answer = RTCSessionDescription::answer(payload.sdp()?)
                    .map_err(|e| Error::Negotiation(format!("Invalid answer SDP: {e}")))?;
                self.set_remote(answer).await
            }
            SignalKind::IceCandidate => {
                let init: RTCIceCandidateInit = serde_json::from_value(payload.data)?;
                if !self.remote_description_set.load(Ordering::SeqCst) {
                    debug!(
                        user_id = %self.user_id,
                        "queueing ICE candidate before remote description"
                    );
                    self.queued_candidates.lock().await.push(init);
                    return Ok(());
                }
                self.peer_connection
                    .add_ice_candidate(init)
                    .await
                    .map_err(|e| Error::Negotiation(format!("Failed to add ICE candidate: {e}")))
            }
        }
    }

    async fn start_negotiation(&self) -> Result<()> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to create offer: {e}")))?;
        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set local description: {e}")))?;
        let local = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::Negotiation("No local description after offer".to_string()))?;
        self.emit_signal(SignalPayload::offer(local.sdp));
        Ok(())
    }

    async fn attach_track(&self, track: MediaTrack) -> Result<()> {
        let sample_track = self.make_sample_track(&track);
        let sender = self
            .peer_connection
            .add_track(Arc::clone(&sample_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::Transport(format!("Failed to add track: {e}")))?;

        self.senders.write().await.insert(track.kind(), sender);
        self.sample_tracks
            .write()
            .await
            .insert(track.kind(), sample_track);
        debug!(
            user_id = %self.user_id,
            track_id = %track.id(),
            kind = ?track.kind(),
            "local track attached"
        );
        Ok(())
    }

    async fn replace_outbound_track(&self, kind: TrackKind, track: MediaTrack) -> Result<()> {
        let sender = self.senders.read().await.get(&kind).cloned();
        let Some(sender) = sender else {
            // nothing to replace yet
            return self.attach_track(track).await;
        };

        let sample_track = self.make_sample_track(&track);
        sender
            .replace_track(Some(
                Arc::clone(&sample_track) as Arc<dyn TrackLocal + Send + Sync>
            ))
            .await
            .map_err(|e| Error::Transport(format!("Failed to replace track: {e}")))?;
        self.sample_tracks
            .write()
            .await
            .insert(kind, sample_track);
        debug!(
            user_id = %self.user_id,
            track_id = %track.id(),
            kind = ?kind,
            "outbound track replaced in place"
        );
        Ok(())
    }

    async fn signaling_stable(&self) -> bool {
        self.peer_connection.signaling_state() == RTCSignalingState::Stable
    }

    async fn close(&self) {
        if let Err(e) = self.peer_connection.close().await {
            warn!(
                user_id = %self.user_id,
                connection_id = %self.connection_id,
                error = %e,
                "error closing peer connection"
            );
        }
    }
}
