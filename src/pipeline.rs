//! End-to-end introspection of one script: transform, run, capture, clean up.

use tokio::sync::mpsc;
use tracing::info;

use crate::config::PipelineConfig;
use crate::document::CapturedDocument;
use crate::error::Result;
use crate::executor::{ProcessEvent, ProcessRunner, RunOutcome};
use crate::planner::{transform_script, TransformedScript};
use crate::session::Session;

/// Everything learned from one introspection run.
#[derive(Debug, Clone)]
pub struct IntrospectionReport {
    pub session_id: String,
    pub binding: String,
    pub report_paths: Vec<String>,
    pub outcome: RunOutcome,
    pub document: CapturedDocument,
}

/// Transform a script without touching the filesystem.
pub fn preview(script: &str, session_id: &str) -> Result<TransformedScript> {
    transform_script(script, session_id)
}

/// Run the whole pipeline for one script.
///
/// The session's files are removed afterwards whether or not the run
/// succeeded, unless `config.keep_files` is set.
pub async fn introspect(
    script: &str,
    config: &PipelineConfig,
    events: Option<mpsc::UnboundedSender<ProcessEvent>>,
) -> Result<IntrospectionReport> {
    let runner = ProcessRunner::from_config(config)?;
    let mut session = Session::new(script, &config.work_dir);

    let result = run_session(&mut session, &runner, events).await;

    if config.keep_files {
        info!(
            script = %session.script_path().display(),
            document = %session.document_path().display(),
            "Keeping session files"
        );
    } else {
        session.cleanup();
    }
    result
}

async fn run_session(
    session: &mut Session,
    runner: &ProcessRunner,
    events: Option<mpsc::UnboundedSender<ProcessEvent>>,
) -> Result<IntrospectionReport> {
    let transformed = session.transform()?;
    let binding = transformed.binding.to_string();
    let report_paths = transformed.report_paths.clone();

    let handle = session.launch(runner, events)?;
    let outcome = handle.wait().await?;
    session.complete(outcome.clone())?;
    let outcome = outcome.into_result()?;

    let document = session.read_document()?;
    info!(
        session = %session.id(),
        elapsed_ms = outcome.elapsed_ms,
        "Captured simulation document"
    );

    Ok(IntrospectionReport {
        session_id: session.id().to_string(),
        binding,
        report_paths,
        outcome,
        document,
    })
}
