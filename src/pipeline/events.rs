use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Pipeline, PipelineConfig, PipelineResult, PipelineStep};
use crate::error::{Result, ReelcastError};

/// Messages a running pipeline sends to its consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Snapshot of the current step after a state change
    Progress(PipelineStep),
    /// The run ended; always the last message
    Finished(PipelineResult),
    /// The run never started
    Rejected(String),
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Progress(_))
    }
}

/// Consumer side of a spawned run
pub struct PipelineHandle {
    events: UnboundedReceiver<PipelineEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Next event in emission order; `None` after the terminal one
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Stop the run before its next step
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain remaining events and return the final result
    pub async fn finish(mut self) -> Result<PipelineResult> {
        while let Some(event) = self.events.recv().await {
            match event {
                PipelineEvent::Progress(_) => continue,
                PipelineEvent::Finished(result) => return Ok(result),
                PipelineEvent::Rejected(reason) => return Err(ReelcastError::Rejected(reason)),
            }
        }

        let reason = match self.task.await {
            Err(e) if e.is_panic() => "pipeline task panicked".to_string(),
            _ => "pipeline task ended without a result".to_string(),
        };
        Err(ReelcastError::Rejected(reason))
    }
}

/// Run `pipeline` on its own task, streaming progress over a channel
pub fn spawn_pipeline(pipeline: Arc<Pipeline>, config: PipelineConfig) -> PipelineHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = pipeline.cancellation_token();

    let task = tokio::spawn(async move {
        let terminal = match pipeline.execute(&config, &tx).await {
            Ok(result) => PipelineEvent::Finished(result),
            Err(e) => PipelineEvent::Rejected(e.to_string()),
        };
        debug!("Pipeline task sending terminal event");
        let _ = tx.send(terminal);
    });

    PipelineHandle {
        events: rx,
        cancel,
        task,
    }
}
