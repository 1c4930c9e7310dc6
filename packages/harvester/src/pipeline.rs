//! Fire-and-forget handoff to the downstream analysis pipeline.
//!
//! Every newly inserted article id is handed to an external processor
//! (summarization, grading, embedding — not this engine's concern).
//! The handoff never blocks extraction and never rolls an insertion
//! back: a processing failure is logged against its task run and
//! otherwise dropped.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::runs::{RunKind, RunStatus, TaskRunRegistry};

/// Downstream consumer of newly inserted articles.
#[async_trait]
pub trait ArticleProcessor: Send + Sync {
    async fn process(
        &self,
        article_id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Hand an article to the processor without waiting for it.
pub fn dispatch(
    processor: Arc<dyn ArticleProcessor>,
    runs: Arc<TaskRunRegistry>,
    article_id: Uuid,
) {
    let run_id = runs.start(
        RunKind::PipelineArticle,
        article_id.to_string(),
        [("article_id".to_string(), json!(article_id))],
    );

    tokio::spawn(async move {
        match processor.process(article_id).await {
            Ok(()) => runs.finish(run_id, RunStatus::Success, []),
            Err(e) => {
                warn!(%article_id, error = %e, "Downstream article processing failed");
                runs.finish(
                    run_id,
                    RunStatus::Error,
                    [("error".to_string(), json!(e.to_string()))],
                );
            }
        }
    });
}
