use skinlens_core::{FacePolicy, Label, Pipeline, PipelineError, Report};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

const REQUEST_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Fixed facts about the loaded pipeline, captured before the engine thread takes it.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub labels: Vec<Label>,
    pub input_size: u32,
    pub face_policy: FacePolicy,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Analyze {
        id: Uuid,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Report, PipelineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    info: std::sync::Arc<EngineInfo>,
}

impl EngineHandle {
    /// Run the full pipeline over one uploaded image.
    pub async fn analyze(&self, id: Uuid, image: Vec<u8>) -> Result<Report, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                id,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub fn info(&self) -> &EngineInfo {
        &self.info
    }
}

/// Move a loaded pipeline onto a dedicated OS thread and return its handle.
///
/// The pipeline owns the ONNX session, which needs exclusive access per run;
/// requests are served one at a time in arrival order.
pub fn spawn_engine(mut pipeline: Pipeline) -> Result<EngineHandle, EngineError> {
    let info = EngineInfo {
        labels: pipeline.labels().to_vec(),
        input_size: pipeline.input_size(),
        face_policy: pipeline.face_policy(),
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(REQUEST_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("skinlens-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { id, image, reply } => {
                        let started = std::time::Instant::now();
                        let result = pipeline.analyze_bytes(&image);
                        match &result {
                            Ok(report) => tracing::info!(
                                request = %id,
                                diagnosis = %report.analysis.diagnosis,
                                confidence = report.analysis.confidence,
                                face = ?report.face,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "analysis complete"
                            ),
                            Err(e) => tracing::warn!(request = %id, error = %e, "analysis failed"),
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle {
        tx,
        info: std::sync::Arc::new(info),
    })
}
