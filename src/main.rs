use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use sim_introspect::config::PipelineConfig;
use sim_introspect::document::canonical_string;
use sim_introspect::error::ResultExt;
use sim_introspect::executor::ProcessEvent;
use sim_introspect::{logging, pipeline, IntrospectError, Result};

/// Capture the structure a simulation script would build, without simulating.
#[derive(Parser, Debug)]
#[command(name = "sim-introspect", version, about)]
struct Cli {
    /// Simulation script to introspect
    script: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for generated files; the script runs here
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Path prefixed onto the child's PATH to find the simulator toolchain
    #[arg(long)]
    toolchain_path: Option<String>,

    /// Command line to run the script with, e.g. "python2 -u"
    #[arg(long)]
    interpreter: Option<String>,

    /// Seconds before the child is killed (0 = never)
    #[arg(long)]
    timeout: Option<u64>,

    /// Leave the generated script and document in place
    #[arg(long)]
    keep_files: bool,

    /// Print the transformed script instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Emit the document in NCB layout
    #[arg(long)]
    ncb: bool,

    /// Also write JSON logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(path) = &self.toolchain_path {
            config.toolchain_path = path.clone();
        }
        if let Some(interp) = &self.interpreter {
            config.interpreter = Some(interp.clone());
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        if self.keep_files {
            config.keep_files = true;
        }
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sim-introspect: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    let _guard = logging::init(config.log_file.as_deref(), cli.verbose);

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Introspection failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: &Cli, config: &PipelineConfig) -> Result<()> {
    let script =
        fs::read_to_string(&cli.script).map_err(|e| IntrospectError::io(&cli.script, e))?;

    if cli.dry_run {
        let transformed = pipeline::preview(&script, &Uuid::new_v4().to_string())?;
        print!("{}", transformed.text());
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProcessEvent::Spawned { pid } => debug!(pid = ?pid, "child spawned"),
                ProcessEvent::Stdout(line) => debug!(stream = "stdout", "{}", line),
                ProcessEvent::Stderr(line) => debug!(stream = "stderr", "{}", line),
                ProcessEvent::Exited(outcome) => {
                    debug!(exit_code = ?outcome.exit_code, "child exited")
                }
            }
        }
    });

    let result = pipeline::introspect(&script, config, Some(tx)).await;
    forwarder.await.warn_on_err();
    let report = result?;

    info!(
        session = %report.session_id,
        binding = %report.binding,
        reports = ?report.report_paths,
        "Introspection complete"
    );

    let text = if cli.ncb {
        canonical_string(&report.document.to_ncb())?
    } else {
        report.document.to_canonical_string()?
    };
    print!("{text}");
    Ok(())
}
