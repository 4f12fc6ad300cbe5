//! Pipeline connection traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::frame::PipelineFrame;
use crate::Result;

/// Identity of the call a pipeline is attached to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfo {
    /// Media stream identifier assigned by the provider
    pub stream_id: String,
    /// Call-control identifier used for REST actions
    pub call_control_id: Option<String>,
    /// Caller number
    pub from: Option<String>,
    /// Dialled number
    pub to: Option<String>,
}

/// Both directions of a connected pipeline
///
/// `to_pipeline` carries caller audio, DTMF and lifecycle frames in;
/// `from_pipeline` yields `Start`, output audio, interruptions and the final
/// `End`/`Cancel`.
pub struct PipelineLink {
    pub to_pipeline: mpsc::Sender<PipelineFrame>,
    pub from_pipeline: mpsc::Receiver<PipelineFrame>,
}

impl PipelineLink {
    /// Create a link plus the pipeline-side ends of both channels
    pub fn channel(
        capacity: usize,
    ) -> (Self, mpsc::Receiver<PipelineFrame>, mpsc::Sender<PipelineFrame>) {
        let (to_tx, to_rx) = mpsc::channel(capacity);
        let (from_tx, from_rx) = mpsc::channel(capacity);
        (
            Self {
                to_pipeline: to_tx,
                from_pipeline: from_rx,
            },
            to_rx,
            from_tx,
        )
    }
}

/// Opens a voice pipeline for an incoming call
///
/// # Example
///
/// ```ignore
/// let link = connector.connect(&call).await?;
/// link.to_pipeline.send(PipelineFrame::InputAudio(chunk)).await?;
/// ```
#[async_trait]
pub trait PipelineConnector: Send + Sync + 'static {
    /// Attach a pipeline to the call and return its frame channels
    async fn connect(&self, call: &CallInfo) -> Result<PipelineLink>;

    /// Connector name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioChunk;

    #[tokio::test]
    async fn test_link_channel_directions() {
        let (mut link, mut pipeline_rx, pipeline_tx) = PipelineLink::channel(4);

        link.to_pipeline
            .send(PipelineFrame::InputAudio(AudioChunk::new(vec![0; 4], 16000)))
            .await
            .unwrap();
        assert!(matches!(
            pipeline_rx.recv().await,
            Some(PipelineFrame::InputAudio(_))
        ));

        pipeline_tx.send(PipelineFrame::End).await.unwrap();
        assert_eq!(link.from_pipeline.recv().await, Some(PipelineFrame::End));
    }
}
