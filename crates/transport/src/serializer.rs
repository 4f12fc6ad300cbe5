//! Wire protocol translator
//!
//! Converts pipeline frames to provider media messages and back. A session
//! moves `Setup -> Active -> Terminating -> Closed`; the phase is shared by
//! the outbound and inbound lanes so they can run on separate tasks.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use voice_gateway_core::{AudioChunk, KeypadEntry, PipelineFrame};

use crate::accumulator::FrameAccumulator;
use crate::call_control::{CallControl, CallControlError, TransferRequest};
use crate::codec::{l16, AudioCodec, CodecConfig, OpusDecoder, OpusEncoder};
use crate::g711;
use crate::protocol::{OutboundMessage, WireMessage};
use crate::resampler::StreamResampler;
use crate::TransportError;

/// Identifies the call for side-channel operations
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    pub stream_id: String,
    pub call_control_id: Option<String>,
    pub auth_token: Option<String>,
}

impl SessionHandle {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            ..Default::default()
        }
    }

    pub fn with_call_control_id(mut self, id: impl Into<String>) -> Self {
        self.call_control_id = Some(id.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    Setup = 0,
    Active = 1,
    Terminating = 2,
    Closed = 3,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionPhase::Setup,
            1 => SessionPhase::Active,
            2 => SessionPhase::Terminating,
            _ => SessionPhase::Closed,
        }
    }
}

/// Serializer parameters
#[derive(Debug, Clone, Copy)]
pub struct SerializerParams {
    pub codecs: CodecConfig,
    /// Hang up through call control when the pipeline ends the call
    pub auto_hang_up: bool,
}

/// State shared by both lanes of one session
#[derive(Debug)]
struct SessionState {
    phase: AtomicU8,
    pipeline_sample_rate: AtomicU32,
    hangup_attempted: AtomicBool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(SessionPhase::Setup as u8),
            pipeline_sample_rate: AtomicU32::new(0),
            hangup_attempted: AtomicBool::new(false),
        }
    }

    fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Setup -> Active; later calls are ignored
    fn activate(&self, pipeline_sample_rate: u32) -> bool {
        if self.phase() != SessionPhase::Setup {
            return false;
        }
        self.pipeline_sample_rate
            .store(pipeline_sample_rate, Ordering::Release);
        self.phase
            .compare_exchange(
                SessionPhase::Setup as u8,
                SessionPhase::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to Terminating unless already closed
    fn begin_termination(&self) {
        let _ = self
            .phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match SessionPhase::from_u8(current) {
                    SessionPhase::Setup | SessionPhase::Active => {
                        Some(SessionPhase::Terminating as u8)
                    },
                    _ => None,
                }
            });
    }

    fn close(&self) {
        self.phase.store(SessionPhase::Closed as u8, Ordering::Release);
    }

    fn pipeline_sample_rate(&self) -> u32 {
        self.pipeline_sample_rate.load(Ordering::Acquire)
    }
}

fn record_drop(reason: &'static str) {
    metrics::counter!("voice_gateway_messages_dropped_total", "reason" => reason).increment(1);
}

/// Pick the pipeline rate: a configured override wins over the announced one
fn resolve_pipeline_rate(codecs: &CodecConfig, announced: u32) -> u32 {
    codecs.pipeline_sample_rate.unwrap_or(announced)
}

enum OutboundEncoder {
    Opus {
        encoder: OpusEncoder,
        accumulator: FrameAccumulator,
    },
    L16,
    Pcmu,
    Pcma,
}

impl OutboundEncoder {
    fn new(codecs: &CodecConfig) -> Result<Self, TransportError> {
        Ok(match codecs.outbound_codec {
            AudioCodec::Opus => {
                let encoder = OpusEncoder::new(codecs.wire_sample_rate)?;
                let accumulator = FrameAccumulator::new(codecs.frame_size_bytes());
                OutboundEncoder::Opus {
                    encoder,
                    accumulator,
                }
            },
            AudioCodec::L16 => OutboundEncoder::L16,
            AudioCodec::Pcmu => OutboundEncoder::Pcmu,
            AudioCodec::Pcma => OutboundEncoder::Pcma,
        })
    }

    /// Encode wire-rate PCM into zero or more payloads
    fn encode(&mut self, pcm: &[u8]) -> Vec<Vec<u8>> {
        match self {
            OutboundEncoder::Opus {
                encoder,
                accumulator,
            } => accumulator
                .push(pcm)
                .iter()
                .filter_map(|frame| match encoder.encode_frame(frame) {
                    Ok(packet) => Some(packet),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping frame that failed to encode");
                        record_drop("encode");
                        None
                    },
                })
                .collect(),
            OutboundEncoder::L16 => vec![l16::to_wire(pcm)],
            OutboundEncoder::Pcmu => vec![g711::encode_ulaw(pcm)],
            OutboundEncoder::Pcma => vec![g711::encode_alaw(pcm)],
        }
    }

    fn clear(&mut self) {
        if let OutboundEncoder::Opus { accumulator, .. } = self {
            accumulator.clear();
        }
    }

    fn pending_len(&self) -> usize {
        match self {
            OutboundEncoder::Opus { accumulator, .. } => accumulator.pending_len(),
            _ => 0,
        }
    }
}

enum InboundDecoder {
    Opus(OpusDecoder),
    L16,
    Pcmu,
    Pcma,
}

impl InboundDecoder {
    fn new(codecs: &CodecConfig) -> Result<Self, TransportError> {
        Ok(match codecs.inbound_codec {
            AudioCodec::Opus => InboundDecoder::Opus(OpusDecoder::new(codecs.wire_sample_rate)?),
            AudioCodec::L16 => InboundDecoder::L16,
            AudioCodec::Pcmu => InboundDecoder::Pcmu,
            AudioCodec::Pcma => InboundDecoder::Pcma,
        })
    }

    /// Decode one payload into wire-rate PCM
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        match self {
            InboundDecoder::Opus(decoder) => decoder.decode(payload),
            InboundDecoder::L16 => Ok(l16::from_wire(payload)),
            InboundDecoder::Pcmu => Ok(g711::decode_ulaw(payload)),
            InboundDecoder::Pcma => Ok(g711::decode_alaw(payload)),
        }
    }
}

/// Pipeline -> provider direction
pub struct OutboundLane {
    handle: Arc<SessionHandle>,
    state: Arc<SessionState>,
    codecs: CodecConfig,
    auto_hang_up: bool,
    encoder: OutboundEncoder,
    resampler: StreamResampler,
    call_control: Option<Arc<dyn CallControl>>,
    hangup_task: Option<JoinHandle<()>>,
}

impl OutboundLane {
    /// Translate one pipeline frame into zero or more wire messages
    pub fn serialize(&mut self, frame: &PipelineFrame) -> Vec<String> {
        match frame {
            PipelineFrame::Start {
                audio_in_sample_rate,
                ..
            } => {
                self.setup(*audio_in_sample_rate);
                Vec::new()
            },
            PipelineFrame::End | PipelineFrame::Cancel => {
                self.terminate();
                Vec::new()
            },
            PipelineFrame::Interruption if self.is_active() => {
                self.encoder.clear();
                self.resampler.reset();
                match OutboundMessage::Clear.to_json() {
                    Ok(json) => vec![json],
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to render clear message");
                        Vec::new()
                    },
                }
            },
            PipelineFrame::OutputAudio(chunk) if self.is_active() => self.encode_audio(chunk),
            _ => Vec::new(),
        }
    }

    /// Activate the session with the pipeline's sample rate
    pub fn setup(&self, pipeline_sample_rate: u32) {
        let rate = resolve_pipeline_rate(&self.codecs, pipeline_sample_rate);
        if self.state.activate(rate) {
            tracing::info!(
                stream_id = %self.handle.stream_id,
                pipeline_sample_rate = rate,
                wire_sample_rate = self.codecs.wire_sample_rate,
                "Media session active"
            );
        }
    }

    /// Transfer the call through call control
    pub async fn transfer(&self, request: &TransferRequest) -> Result<(), CallControlError> {
        let control = self.call_control.as_ref().ok_or_else(|| {
            CallControlError::Configuration("No call-control client configured".to_string())
        })?;
        let call_control_id = self.handle.call_control_id.as_deref().unwrap_or_default();
        let auth_token = self.handle.auth_token.as_deref().unwrap_or_default();

        let result = control.transfer(call_control_id, auth_token, request).await;
        if let Err(e) = &result {
            tracing::warn!(
                stream_id = %self.handle.stream_id,
                error = %e,
                "Call transfer failed"
            );
        }
        result
    }

    /// Wait for an in-flight hangup request to finish
    pub async fn finish_hangup(&mut self) {
        if let Some(task) = self.hangup_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Hangup task did not complete");
            }
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn close(&self) {
        self.state.close();
    }

    /// Bytes held by the frame accumulator
    pub fn pending_frame_bytes(&self) -> usize {
        self.encoder.pending_len()
    }

    fn is_active(&self) -> bool {
        self.state.phase() == SessionPhase::Active
    }

    fn encode_audio(&mut self, chunk: &AudioChunk) -> Vec<String> {
        let pcm = match self.resampler.resample(
            chunk.data(),
            chunk.sample_rate(),
            self.codecs.wire_sample_rate,
        ) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping output audio that failed to resample");
                record_drop("resample");
                return Vec::new();
            },
        };
        if pcm.is_empty() {
            return Vec::new();
        }

        self.encoder
            .encode(&pcm)
            .into_iter()
            .filter(|payload| !payload.is_empty())
            .filter_map(|payload| match OutboundMessage::media(&payload).to_json() {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to render media message");
                    None
                },
            })
            .collect()
    }

    fn terminate(&mut self) {
        if !self.auto_hang_up {
            tracing::debug!(stream_id = %self.handle.stream_id, "Auto hang-up disabled");
            return;
        }
        self.state.begin_termination();

        if self.state.hangup_attempted.swap(true, Ordering::AcqRel) {
            tracing::debug!(stream_id = %self.handle.stream_id, "Hangup already attempted");
            return;
        }

        let Some(control) = self.call_control.clone() else {
            tracing::warn!(
                stream_id = %self.handle.stream_id,
                "Auto hang-up enabled but no call-control client configured"
            );
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("No async runtime available for hangup");
                return;
            },
        };

        let handle = Arc::clone(&self.handle);
        self.hangup_task = Some(runtime.spawn(async move {
            let call_control_id = handle.call_control_id.as_deref().unwrap_or_default();
            let auth_token = handle.auth_token.as_deref().unwrap_or_default();

            match control.hangup(call_control_id, auth_token).await {
                Ok(outcome) => {
                    metrics::counter!(
                        "voice_gateway_hangups_total",
                        "outcome" => outcome.as_str()
                    )
                    .increment(1);
                    tracing::info!(
                        stream_id = %handle.stream_id,
                        outcome = outcome.as_str(),
                        "Hangup completed"
                    );
                },
                Err(e) => {
                    metrics::counter!("voice_gateway_hangups_total", "outcome" => e.kind())
                        .increment(1);
                    tracing::warn!(
                        stream_id = %handle.stream_id,
                        error = %e,
                        "Hangup failed"
                    );
                },
            }
        }));
    }
}

/// Provider -> pipeline direction
pub struct InboundLane {
    handle: Arc<SessionHandle>,
    state: Arc<SessionState>,
    codecs: CodecConfig,
    decoder: InboundDecoder,
    resampler: StreamResampler,
    stopped: bool,
}

impl InboundLane {
    /// Translate one wire message into at most one pipeline frame
    pub fn deserialize(&mut self, text: &str) -> Option<PipelineFrame> {
        match self.state.phase() {
            SessionPhase::Active | SessionPhase::Terminating => {},
            phase => {
                tracing::debug!(?phase, "Dropping inbound message outside active session");
                record_drop("inactive");
                return None;
            },
        }

        let message = match WireMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    stream_id = %self.handle.stream_id,
                    error = %e,
                    "Dropping malformed message"
                );
                record_drop("malformed");
                return None;
            },
        };

        match message {
            WireMessage::Media { payload } => self.decode_media(&payload),
            WireMessage::Dtmf { digit } => match digit.parse::<KeypadEntry>() {
                Ok(entry) => Some(PipelineFrame::Dtmf(entry)),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping invalid DTMF digit");
                    record_drop("dtmf");
                    None
                },
            },
            WireMessage::Stop => {
                tracing::info!(stream_id = %self.handle.stream_id, "Provider stopped the stream");
                self.stopped = true;
                None
            },
            other => {
                tracing::trace!(event = other.event_name(), "Ignoring event");
                None
            },
        }
    }

    /// Whether a `stop` event has been received
    pub fn stream_stopped(&self) -> bool {
        self.stopped
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    fn decode_media(&mut self, payload: &[u8]) -> Option<PipelineFrame> {
        let pcm = match self.decoder.decode(payload) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping media that failed to decode");
                record_drop("decode");
                return None;
            },
        };

        let pipeline_rate = self.state.pipeline_sample_rate();
        let audio = match self
            .resampler
            .resample(&pcm, self.codecs.wire_sample_rate, pipeline_rate)
        {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping media that failed to resample");
                record_drop("resample");
                return None;
            },
        };

        if audio.is_empty() {
            return None;
        }
        Some(PipelineFrame::InputAudio(AudioChunk::new(audio, pipeline_rate)))
    }
}

/// Bidirectional translator for one media session
pub struct TelnyxFrameSerializer {
    outbound: OutboundLane,
    inbound: InboundLane,
}

impl TelnyxFrameSerializer {
    /// Build codecs for the session; fails on configuration errors
    pub fn new(handle: SessionHandle, params: SerializerParams) -> Result<Self, TransportError> {
        params.codecs.validate()?;

        let handle = Arc::new(handle);
        let state = Arc::new(SessionState::new());
        let encoder = OutboundEncoder::new(&params.codecs)?;
        let decoder = InboundDecoder::new(&params.codecs)?;

        tracing::info!(
            stream_id = %handle.stream_id,
            inbound = %params.codecs.inbound_codec,
            outbound = %params.codecs.outbound_codec,
            wire_sample_rate = params.codecs.wire_sample_rate,
            auto_hang_up = params.auto_hang_up,
            "Created media serializer"
        );

        Ok(Self {
            outbound: OutboundLane {
                handle: Arc::clone(&handle),
                state: Arc::clone(&state),
                codecs: params.codecs,
                auto_hang_up: params.auto_hang_up,
                encoder,
                resampler: StreamResampler::new(),
                call_control: None,
                hangup_task: None,
            },
            inbound: InboundLane {
                handle,
                state,
                codecs: params.codecs,
                decoder,
                resampler: StreamResampler::new(),
                stopped: false,
            },
        })
    }

    pub fn with_call_control(mut self, call_control: Arc<dyn CallControl>) -> Self {
        self.outbound.call_control = Some(call_control);
        self
    }

    /// Activate with the pipeline sample rate
    pub fn setup(&self, pipeline_sample_rate: u32) {
        self.outbound.setup(pipeline_sample_rate);
    }

    pub fn serialize(&mut self, frame: &PipelineFrame) -> Vec<String> {
        self.outbound.serialize(frame)
    }

    pub fn deserialize(&mut self, text: &str) -> Option<PipelineFrame> {
        self.inbound.deserialize(text)
    }

    pub async fn transfer(&self, request: &TransferRequest) -> Result<(), CallControlError> {
        self.outbound.transfer(request).await
    }

    pub async fn finish_hangup(&mut self) {
        self.outbound.finish_hangup().await;
    }

    pub fn phase(&self) -> SessionPhase {
        self.outbound.phase()
    }

    pub fn close(&self) {
        self.outbound.close();
    }

    /// The pipeline sample rate in effect, 0 before setup
    pub fn pipeline_sample_rate(&self) -> u32 {
        self.outbound.state.pipeline_sample_rate()
    }

    /// Split into lanes that can be driven from separate tasks
    pub fn into_lanes(self) -> (OutboundLane, InboundLane) {
        (self.outbound, self.inbound)
    }
}
