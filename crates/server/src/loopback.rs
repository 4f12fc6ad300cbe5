//! Loopback pipeline
//!
//! Diagnostic connector that plays caller audio straight back and logs
//! keypad presses. Useful for checking codec setup on a live number.

use async_trait::async_trait;

use voice_gateway_core::{
    AudioError, CallInfo, Error, PipelineConnector, PipelineFrame, PipelineLink, Result,
};

/// Echoes caller audio back to the caller
#[derive(Debug, Clone)]
pub struct LoopbackPipeline {
    sample_rate: u32,
    capacity: usize,
}

impl Default for LoopbackPipeline {
    fn default() -> Self {
        Self::new(16000)
    }
}

impl LoopbackPipeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            capacity: 256,
        }
    }
}

#[async_trait]
impl PipelineConnector for LoopbackPipeline {
    async fn connect(&self, call: &CallInfo) -> Result<PipelineLink> {
        if self.sample_rate == 0 {
            return Err(AudioError::UnsupportedSampleRate(self.sample_rate).into());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Pipeline(format!("No async runtime for loopback: {}", e)))?;

        let (link, mut inbound, outbound) = PipelineLink::channel(self.capacity);
        let sample_rate = self.sample_rate;
        let stream_id = call.stream_id.clone();

        runtime.spawn(async move {
            let start = PipelineFrame::Start {
                audio_in_sample_rate: sample_rate,
                audio_out_sample_rate: sample_rate,
            };
            if outbound.send(start).await.is_err() {
                return;
            }

            while let Some(frame) = inbound.recv().await {
                match frame {
                    PipelineFrame::InputAudio(chunk) => {
                        if outbound.send(PipelineFrame::OutputAudio(chunk)).await.is_err() {
                            break;
                        }
                    },
                    PipelineFrame::Dtmf(entry) => {
                        tracing::info!(stream_id = %stream_id, digit = %entry, "DTMF received");
                    },
                    PipelineFrame::End | PipelineFrame::Cancel => {
                        let _ = outbound.send(PipelineFrame::End).await;
                        break;
                    },
                    other => {
                        tracing::trace!(frame = other.stage_name(), "Loopback ignoring frame");
                    },
                }
            }
            tracing::debug!(stream_id = %stream_id, "Loopback pipeline finished");
        });

        Ok(link)
    }

    fn name(&self) -> &str {
        "loopback"
    }
}
