//! Frames exchanged with the voice pipeline

use crate::audio::AudioChunk;
use crate::dtmf::KeypadEntry;

/// Frame types that flow between the gateway and the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineFrame {
    /// Pipeline started; carries the sample rates it negotiated
    Start {
        audio_in_sample_rate: u32,
        audio_out_sample_rate: u32,
    },

    /// Caller audio decoded from the wire, headed into the pipeline
    InputAudio(AudioChunk),

    /// Synthesized audio from the pipeline, headed to the caller
    OutputAudio(AudioChunk),

    /// Keypad press received from the caller
    Dtmf(KeypadEntry),

    /// Caller barged in; anything queued for playback must be dropped
    Interruption,

    /// Graceful end of the call
    End,

    /// Call cancelled
    Cancel,
}

impl PipelineFrame {
    /// End or cancel, both of which trigger hangup
    pub fn is_termination(&self) -> bool {
        matches!(self, PipelineFrame::End | PipelineFrame::Cancel)
    }

    /// Get the stage name for this frame type
    pub fn stage_name(&self) -> &'static str {
        match self {
            PipelineFrame::Start { .. } => "start",
            PipelineFrame::InputAudio(_) => "input_audio",
            PipelineFrame::OutputAudio(_) => "output_audio",
            PipelineFrame::Dtmf(_) => "dtmf",
            PipelineFrame::Interruption => "interruption",
            PipelineFrame::End => "end",
            PipelineFrame::Cancel => "cancel",
        }
    }
}
