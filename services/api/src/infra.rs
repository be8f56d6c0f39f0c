use hireflow::config::AppConfig;
use hireflow::error::AppError;
use hireflow::workflows::screening::{
    AnalysisPipeline, BatchDispatcher, EvaluationEngine, FilesystemExtractor,
    InMemoryApplicationRepository, InMemoryDeduplicationIndex, InMemoryJobCatalog,
    LoggingNotifier, OpenAiAnalyst, PipelineCollaborators, StaleLeaseSweeper,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub(crate) type ServicePipeline = AnalysisPipeline<InMemoryApplicationRepository, LoggingNotifier>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wires the in-process stores with the filesystem extractor and the OpenAI-compatible analyst.
pub(crate) fn build_pipeline(config: &AppConfig) -> Result<Arc<ServicePipeline>, AppError> {
    if config.analyst.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; analyses will end in ERROR until it is configured");
    }
    let analyst = OpenAiAnalyst::new(config.analyst.clone())?;

    let collaborators = PipelineCollaborators {
        extractor: Arc::new(FilesystemExtractor::new(config.document_root.clone())),
        analyst: Arc::new(analyst),
        dedup: Arc::new(InMemoryDeduplicationIndex::default()),
        jobs: Arc::new(InMemoryJobCatalog::default()),
    };

    Ok(Arc::new(AnalysisPipeline::new(
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(LoggingNotifier),
        collaborators,
        EvaluationEngine::new(config.scoring.clone()),
        config.pipeline.clone(),
    )))
}

/// Dispatcher and sweeper tasks sharing one shutdown signal.
pub(crate) struct Workers {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    pub(crate) fn spawn(pipeline: Arc<ServicePipeline>) -> Self {
        let (shutdown, receiver) = watch::channel(false);
        let config = pipeline.config().clone();

        let sweeper = StaleLeaseSweeper::new(
            Arc::clone(pipeline.repository()),
            config.stale_after,
            config.sweep_interval,
        );
        let dispatcher = BatchDispatcher::new(pipeline);

        let dispatcher_shutdown = receiver.clone();
        let handles = vec![
            tokio::spawn(async move { dispatcher.run(dispatcher_shutdown).await }),
            tokio::spawn(async move { sweeper.run(receiver).await }),
        ];

        info!(
            worker = %config.worker_id,
            batch_size = config.batch_size,
            concurrency = config.concurrency,
            "analysis workers started"
        );
        Self { shutdown, handles }
    }

    /// Signals shutdown and waits for in-flight batches to finish.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task ended abnormally");
            }
        }
    }
}
