//! One task, end to end: prompt, generate, normalize, publish, notify.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::error::TaskError;
use crate::generation::{
    build_prompt, normalize, Attachment, Checks, DocStyle, GenerationRequest, TextGenerator,
};
use crate::notify::{EvaluationPayload, Notifier};
use crate::publish::{PublishResult, Publisher};

/// A validated task submission.
#[derive(Debug, Clone)]
pub struct TaskSubmission {
    pub email: String,
    pub task: String,
    pub brief: String,
    pub checks: Checks,
    pub attachments: Vec<Attachment>,
    pub round: u32,
    pub nonce: String,
    pub evaluation_url: String,
}

impl TaskSubmission {
    fn generation_request(&self) -> GenerationRequest {
        GenerationRequest {
            task: self.task.clone(),
            brief: self.brief.clone(),
            checks: self.checks.clone(),
            attachments: self.attachments.clone(),
            round: self.round,
        }
    }
}

/// Runs task submissions against a generator, a publisher and a notifier.
#[derive(Clone)]
pub struct TaskRunner {
    generator: Arc<dyn TextGenerator>,
    publisher: Publisher,
    notifier: Notifier,
    doc_style: DocStyle,
    settle_delay: Duration,
}

impl TaskRunner {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        publisher: Publisher,
        notifier: Notifier,
        doc_style: DocStyle,
        settle_delay: Duration,
    ) -> Self {
        Self {
            generator,
            publisher,
            notifier,
            doc_style,
            settle_delay,
        }
    }

    /// Process one submission and return where the app was published.
    ///
    /// For rounds after the first the existing repository is read before the
    /// model is called, so a missing repository fails without spending a
    /// generation. The evaluation callback runs after publishing; its outcome
    /// is logged and never changes the result.
    pub async fn run(&self, submission: &TaskSubmission) -> Result<PublishResult, TaskError> {
        let span = tracing::info_span!("task", task = %submission.task, round = submission.round);
        self.run_inner(submission).instrument(span).await
    }

    async fn run_inner(&self, submission: &TaskSubmission) -> Result<PublishResult, TaskError> {
        let request = submission.generation_request();

        let revision = if request.is_revision() {
            Some(self.publisher.revision_context(&submission.task).await?)
        } else {
            None
        };

        let prompt = build_prompt(&request, revision.as_ref(), self.doc_style);
        let inline = request
            .attachments
            .iter()
            .filter(|a| a.data_uri_mime().is_some())
            .count();
        tracing::info!(
            attachments = request.attachments.len(),
            inline_attachments = inline,
            revision = revision.is_some(),
            "Requesting generation"
        );
        let raw = self.generator.generate(&prompt.system, &prompt.user).await?;
        tracing::debug!(chars = raw.len(), "Received model reply");

        let files = normalize(&raw, &submission.brief, self.doc_style);
        if !files.is_complete() {
            tracing::error!("Normalized reply is missing index or README");
            return Err(TaskError::IncompleteGeneration);
        }

        let result = self
            .publisher
            .publish(&submission.task, &files, submission.round)
            .await?;

        if !self.settle_delay.is_zero() {
            tracing::debug!(secs = self.settle_delay.as_secs(), "Waiting before notifying evaluator");
            tokio::time::sleep(self.settle_delay).await;
        }

        let payload = EvaluationPayload {
            email: submission.email.clone(),
            task: submission.task.clone(),
            round: submission.round,
            nonce: submission.nonce.clone(),
            repo_url: result.repository_url.clone(),
            commit_sha: result.commit_sha.clone(),
            pages_url: result.pages_url.clone(),
        };
        let delivered = self.notifier.notify(&submission.evaluation_url, &payload).await;
        if !delivered {
            tracing::warn!(url = %submission.evaluation_url, "Evaluator was not notified");
        }

        Ok(result)
    }
}
