mod materializer;
mod state;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::{CapturedDocument, DOCUMENT_EXTENSION};
use crate::error::Result;
use crate::executor::{ProcessEvent, ProcessRunner, RunHandle, RunOutcome};
use crate::planner::{sentinel_line, transform_script, TransformedScript};

pub use materializer::write_script;
pub use state::SessionState;

pub const SCRIPT_EXTENSION: &str = "py";

/// One script being transformed and run, named by a fresh UUID.
///
/// The script file is only ever written with transformed content, so a
/// script that fails to transform leaves nothing on disk.
#[derive(Debug)]
pub struct Session {
    id: String,
    work_dir: PathBuf,
    script_path: PathBuf,
    document_path: PathBuf,
    source: String,
    state: SessionState,
    transformed: Option<TransformedScript>,
    outcome: Option<RunOutcome>,
}

impl Session {
    pub fn new(source: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), source, work_dir)
    }

    pub fn with_id(
        id: impl Into<String>,
        source: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        let id = id.into();
        let work_dir = work_dir.into();
        let script_path = work_dir.join(format!("{id}.{SCRIPT_EXTENSION}"));
        let document_path = work_dir.join(format!("{id}.{DOCUMENT_EXTENSION}"));
        debug!(session = %id, "Session created");
        Self {
            id,
            work_dir,
            script_path,
            document_path,
            source: source.into(),
            state: SessionState::Created,
            transformed: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transformed(&self) -> Option<&TransformedScript> {
        self.transformed.as_ref()
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    /// Rewrite the source for introspection mode and write the script file.
    pub fn transform(&mut self) -> Result<&TransformedScript> {
        self.state.check(SessionState::Transformed)?;
        let transformed = transform_script(&self.source, &self.id)?;
        write_script(&self.script_path, &transformed.text())?;
        self.state.advance(SessionState::Transformed)?;
        info!(
            session = %self.id,
            binding = %transformed.binding,
            calls = transformed.rewritten_calls,
            report_path = ?transformed.report_path(),
            "Script transformed"
        );
        Ok(self.transformed.insert(transformed))
    }

    /// Start the transformed script. Returns as soon as the child is spawned.
    pub fn launch(
        &mut self,
        runner: &ProcessRunner,
        events: Option<mpsc::UnboundedSender<ProcessEvent>>,
    ) -> Result<RunHandle> {
        self.state.check(SessionState::Running)?;
        let handle = runner.spawn(
            &self.script_path,
            &self.work_dir,
            Some(sentinel_line(&self.id)),
            events,
        )?;
        self.state.advance(SessionState::Running)?;
        Ok(handle)
    }

    /// Record the outcome of the run.
    pub fn complete(&mut self, outcome: RunOutcome) -> Result<()> {
        self.state.advance(SessionState::Completed)?;
        if !outcome.sentinel_seen {
            warn!(
                session = %self.id,
                exit_code = ?outcome.exit_code,
                "Script finished without reaching the injected block"
            );
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Read the document the script wrote. Absent → `MissingOutput`.
    pub fn read_document(&self) -> Result<CapturedDocument> {
        CapturedDocument::load(&self.document_path)
    }

    /// Remove the script and document files. Failures are logged, never raised.
    pub fn cleanup(&mut self) {
        remove_logged(&self.script_path, "script");
        remove_logged(&self.document_path, "document");
        self.state = SessionState::CleanedUp;
    }
}

fn remove_logged(path: &Path, what: &str) {
    match fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "Removed {} file", what),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No {} file to remove", what)
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Could not delete {} file", what),
    }
}
