//! WebSocket Handler
//!
//! Bridges one provider media stream to one voice pipeline: handshake, codec
//! negotiation, then two independent lanes until either side ends the call.

use axum::extract::ws::{Message, WebSocket};
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use voice_gateway_core::{CallInfo, PipelineFrame};
use voice_gateway_transport::{
    await_stream_start, negotiate_codecs, CodecConfig, NegotiationPolicy, SerializerParams,
    SessionHandle, TelnyxFrameSerializer,
};

use crate::metrics::{record_messages, record_session_rejected, record_session_started};
use crate::state::{AppState, SessionSlot};
use crate::ServerError;

/// Why a media session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Provider sent `stop`
    CallerStopped,
    /// Socket closed or errored
    CallerDisconnected,
    /// Pipeline sent `End` or `Cancel`
    PipelineEnded,
    /// Pipeline dropped its channel without ending the call
    PipelineClosed,
}

/// Outcome of a finished media session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub stream_id: String,
    pub codecs: CodecConfig,
    pub messages_in: usize,
    pub messages_out: usize,
    pub ended_by: EndReason,
}

/// Handle an upgraded media-stream socket
pub async fn handle_socket(socket: WebSocket, state: AppState, slot: SessionSlot) {
    let connection_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("media_session", %connection_id);

    let (sink, stream) = socket.split();
    let sink = sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));
    let texts = stream
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)) | Err(_))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(text),
                _ => None,
            })
        });

    let result = run_media_session(Box::pin(texts), Box::pin(sink), &state)
        .instrument(span.clone())
        .await;

    span.in_scope(|| match result {
        Ok(summary) => tracing::info!(
            stream_id = %summary.stream_id,
            ended_by = ?summary.ended_by,
            messages_in = summary.messages_in,
            messages_out = summary.messages_out,
            "Media session finished"
        ),
        Err(e) => tracing::warn!(error = %e, "Media session refused"),
    });

    drop(slot);
}

async fn send_all<K>(outbound: &mut K, messages: Vec<String>) -> Result<usize, String>
where
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    let count = messages.len();
    for message in messages {
        outbound.send(message).await.map_err(|e| e.to_string())?;
    }
    Ok(count)
}

/// Run one media session over a stream of inbound text frames and a sink
/// for outbound text frames
///
/// Fails before any media flows when the handshake, codec setup or pipeline
/// connection fails.
pub async fn run_media_session<S, K>(
    mut inbound: S,
    mut outbound: K,
    state: &AppState,
) -> Result<SessionSummary, ServerError>
where
    S: Stream<Item = String> + Unpin + Send + 'static,
    K: Sink<String> + Unpin + Send,
    K::Error: Display,
{
    let (telephony, api_key) = {
        let config = state.get_config();
        (config.telephony.clone(), config.call_control.api_key.clone())
    };
    let handshake_timeout = Duration::from_millis(telephony.handshake_timeout_ms);

    let start = await_stream_start(&mut inbound, handshake_timeout)
        .await
        .map_err(|e| {
            record_session_rejected("handshake");
            ServerError::from(e)
        })?;

    let policy = NegotiationPolicy::from_settings(&telephony)?;
    let codecs = negotiate_codecs(&start, &policy);

    let mut handle = SessionHandle::new(start.stream_id.clone());
    handle.call_control_id = start.start.call_control_id.clone();
    handle.auth_token = api_key;

    let mut serializer = TelnyxFrameSerializer::new(
        handle,
        SerializerParams {
            codecs,
            auto_hang_up: telephony.auto_hang_up,
        },
    )
    .map_err(|e| {
        record_session_rejected("codec");
        ServerError::from(e)
    })?;
    if let Some(call_control) = &state.call_control {
        serializer = serializer.with_call_control(Arc::clone(call_control));
    }

    let call = CallInfo {
        stream_id: start.stream_id.clone(),
        call_control_id: start.start.call_control_id.clone(),
        from: start.start.from.clone(),
        to: start.start.to.clone(),
    };
    let mut link = state
        .connector
        .connect(&call)
        .await
        .map_err(|e| ServerError::Pipeline(e.to_string()))?;

    let pipeline_start = tokio::time::timeout(handshake_timeout, async {
        while let Some(frame) = link.from_pipeline.recv().await {
            if matches!(frame, PipelineFrame::Start { .. }) {
                return Some(frame);
            }
            tracing::debug!(frame = frame.stage_name(), "Dropping pipeline frame before start");
        }
        None
    })
    .await
    .map_err(|_| ServerError::Pipeline("Pipeline did not start in time".to_string()))?
    .ok_or_else(|| ServerError::Pipeline("Pipeline closed before start".to_string()))?;

    serializer.serialize(&pipeline_start);
    record_session_started();
    tracing::info!(
        stream_id = %start.stream_id,
        connector = state.connector.name(),
        inbound_codec = %codecs.inbound_codec,
        outbound_codec = %codecs.outbound_codec,
        wire_sample_rate = codecs.wire_sample_rate,
        pipeline_sample_rate = serializer.pipeline_sample_rate(),
        "Media session started"
    );

    let (mut out_lane, mut in_lane) = serializer.into_lanes();

    let received = Arc::new(AtomicUsize::new(0));
    let inbound_received = Arc::clone(&received);
    let to_pipeline = link.to_pipeline.clone();
    let mut inbound_task = tokio::spawn(
        async move {
            while let Some(text) = inbound.next().await {
                inbound_received.fetch_add(1, Ordering::Relaxed);
                if let Some(frame) = in_lane.deserialize(&text) {
                    if to_pipeline.send(frame).await.is_err() {
                        tracing::debug!("Pipeline input closed");
                        break;
                    }
                }
                if in_lane.stream_stopped() {
                    return true;
                }
            }
            false
        }
        .in_current_span(),
    );

    let mut sent = 0usize;
    let ended_by = loop {
        tokio::select! {
            frame = link.from_pipeline.recv() => {
                let Some(frame) = frame else {
                    break EndReason::PipelineClosed;
                };
                let terminating = frame.is_termination();
                match send_all(&mut outbound, out_lane.serialize(&frame)).await {
                    Ok(count) => sent += count,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to send to provider");
                        break EndReason::CallerDisconnected;
                    },
                }
                if terminating {
                    break EndReason::PipelineEnded;
                }
            }
            joined = &mut inbound_task => {
                let stopped = joined.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Inbound lane failed");
                    false
                });
                break if stopped {
                    EndReason::CallerStopped
                } else {
                    EndReason::CallerDisconnected
                };
            }
        }
    };

    // Caller-side endings still go through the termination path for hangup
    if ended_by != EndReason::PipelineEnded {
        out_lane.serialize(&PipelineFrame::End);
    }
    if link.to_pipeline.send(PipelineFrame::End).await.is_err() {
        tracing::debug!("Pipeline already gone at teardown");
    }

    out_lane.finish_hangup().await;
    out_lane.close();
    inbound_task.abort();

    if let Err(e) = outbound.close().await {
        tracing::debug!(error = %e, "Error closing provider socket");
    }

    let messages_in = received.load(Ordering::Relaxed);
    record_messages("inbound", messages_in);
    record_messages("outbound", sent);

    Ok(SessionSummary {
        stream_id: start.stream_id,
        codecs,
        messages_in,
        messages_out: sent,
        ended_by,
    })
}
