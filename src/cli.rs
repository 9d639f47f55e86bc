use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use evoc::config::{
    ClientConfig, Endpoints, PollPolicy, BACKEND_BASE_URL_ENV, DEFAULT_BACKEND_BASE_URL,
    DEFAULT_STORE_BASE_URL, STORE_BASE_URL_ENV,
};
use evoc::engine::{ArtifactStore, RunBackend, RunClient, ShareService};
use evoc::model::{ConfigModel, RunId, Submission, TrackEvent};
use evoc::orchestrator::{
    default_save_dir, process_run_completion, run_controller, RunStart, TrackedRun, Tracker,
    UiCommand,
};
use evoc::wizard::{GatingPolicy, Wizard, Workflow};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "evoc",
    version,
    about = "Configure, submit and track evolutionary-computation runs"
)]
pub struct Cli {
    /// Base URL of the execution backend
    #[arg(long, global = true, env = BACKEND_BASE_URL_ENV, default_value = DEFAULT_BACKEND_BASE_URL)]
    pub backend_url: String,

    /// Base URL of the object store serving run artifacts
    #[arg(long, global = true, env = STORE_BASE_URL_ENV, default_value = DEFAULT_STORE_BASE_URL)]
    pub store_url: String,

    /// Timeout for each HTTP request
    #[arg(long, global = true, default_value = "30s")]
    pub request_timeout: humantime::Duration,

    /// Print JSON results instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Clone)]
pub struct PollArgs {
    /// Delay between status checks
    #[arg(long, default_value = "4s")]
    pub poll_interval: humantime::Duration,

    /// Give up waiting after this long (0s waits forever)
    #[arg(long, default_value = "1h")]
    pub timeout: humantime::Duration,

    /// Give up after this many status checks
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct SaveArgs {
    /// Save artifacts and a run report under this directory
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Save under the default data directory
    #[arg(long, conflicts_with = "save_dir")]
    pub save: bool,
}

impl SaveArgs {
    fn target(&self) -> Option<PathBuf> {
        self.save_dir
            .clone()
            .or_else(|| if self.save { default_save_dir() } else { None })
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Submit a configuration file and track the run
    Submit {
        /// JSON configuration file
        config: PathBuf,

        /// Fill this wizard step by step before submitting
        #[arg(long, value_enum)]
        workflow: Option<Workflow>,

        /// How edits to earlier wizard steps affect later ones
        #[arg(long, value_enum, default_value_t = GatingPolicy::RevalidateDownstream)]
        policy: GatingPolicy,

        /// Print the run id and exit without tracking
        #[arg(long)]
        detach: bool,

        #[command(flatten)]
        poll: PollArgs,

        #[command(flatten)]
        save: SaveArgs,
    },
    /// Track an existing run until it finishes
    Watch {
        run_id: String,

        #[command(flatten)]
        poll: PollArgs,

        #[command(flatten)]
        save: SaveArgs,
    },
    /// Fetch the artifacts of a completed run
    Artifacts {
        run_id: String,

        #[command(flatten)]
        save: SaveArgs,
    },
    /// Share a run with other users
    Share {
        run_id: String,

        /// Comma-separated recipient emails
        emails: String,
    },
    /// Show how a configuration file walks through the wizard steps
    Steps {
        config: PathBuf,

        #[arg(long, value_enum, default_value_t = Workflow::Generic)]
        workflow: Workflow,

        #[arg(long, value_enum, default_value_t = GatingPolicy::RevalidateDownstream)]
        policy: GatingPolicy,
    },
}

/// Build a `ClientConfig` from CLI arguments.
pub fn build_config(args: &Cli, poll: Option<&PollArgs>) -> ClientConfig {
    let mut cfg = ClientConfig {
        endpoints: Endpoints::new(&args.backend_url, &args.store_url),
        request_timeout: Duration::from(args.request_timeout),
        ..ClientConfig::default()
    };
    if let Some(p) = poll {
        let timeout = Duration::from(p.timeout);
        cfg.poll = PollPolicy {
            interval: Duration::from(p.poll_interval),
            max_attempts: p.max_attempts,
            timeout: (!timeout.is_zero()).then_some(timeout),
        };
    }
    cfg
}

fn load_config(path: &Path) -> Result<ConfigModel> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid configuration in {}", path.display()))
}

fn build_tracker(cfg: &ClientConfig) -> Result<(Arc<RunClient>, Tracker)> {
    let client = Arc::new(RunClient::new(cfg).context("failed to build backend client")?);
    let store = Arc::new(ArtifactStore::new(cfg).context("failed to build object store client")?);
    let tracker = Tracker::new(client.clone(), store, cfg.poll.clone());
    Ok((client, tracker))
}

pub async fn run(args: Cli) -> Result<()> {
    match args.command.clone() {
        Command::Submit {
            config,
            workflow,
            policy,
            detach,
            poll,
            save,
        } => {
            let model = load_config(&config)?;
            let submission = match workflow {
                Some(w) => Wizard::replay(w, policy, &model)
                    .finish()
                    .context("configuration does not pass the wizard")?,
                None => Submission::new(model).context("configuration is incomplete")?,
            };
            let cfg = build_config(&args, Some(&poll));
            let (client, tracker) = build_tracker(&cfg)?;
            if detach {
                let record = client.submit(&submission).await.context("submission failed")?;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                } else {
                    println!("{}", record.id);
                }
                return Ok(());
            }
            track(&args, tracker, RunStart::Submit(submission), save.target()).await
        }
        Command::Watch { run_id, poll, save } => {
            let cfg = build_config(&args, Some(&poll));
            let (_, tracker) = build_tracker(&cfg)?;
            track(&args, tracker, RunStart::Attach(RunId::new(run_id)), save.target()).await
        }
        Command::Artifacts { run_id, save } => {
            // A single status check: artifacts are only read for a completed run.
            let mut cfg = build_config(&args, None);
            cfg.poll.max_attempts = Some(1);
            let (_, tracker) = build_tracker(&cfg)?;
            track(&args, tracker, RunStart::Attach(RunId::new(run_id)), save.target()).await
        }
        Command::Share { run_id, emails } => {
            let cfg = build_config(&args, None);
            let client = Arc::new(RunClient::new(&cfg).context("failed to build backend client")?);
            let receipt = ShareService::new(client)
                .share(&RunId::new(run_id), &emails)
                .await
                .context("share failed")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            } else {
                println!(
                    "Shared {} with: {}",
                    receipt.run_id,
                    receipt.recipients.join(", ")
                );
            }
            Ok(())
        }
        Command::Steps {
            config,
            workflow,
            policy,
        } => {
            let model = load_config(&config)?;
            let wizard = Wizard::replay(workflow, policy, &model);
            if args.json {
                let out = serde_json::json!({
                    "phase": wizard.phase(),
                    "steps": wizard.rendered_steps(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for step in wizard.rendered_steps() {
                    let mark = if step.valid { "x" } else { " " };
                    println!("[{mark}] {:>2}. {}", step.index, step.title);
                }
                println!("{:?}", wizard.phase());
            }
            Ok(())
        }
    }
}

/// Run the controller, print progress, and save/report the result.
async fn track(args: &Cli, tracker: Tracker, start: RunStart, save_dir: Option<PathBuf>) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<TrackEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let ctrl_c_tx = cmd_tx.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(UiCommand::Quit);
        }
    });

    let controller_tracker = tracker.clone();
    let handle = tokio::spawn(async move {
        run_controller(&controller_tracker, start, true, evt_tx, cmd_rx).await
    });

    while let Some(ev) = evt_rx.recv().await {
        if args.json {
            continue;
        }
        let line = match ev {
            TrackEvent::Submitted { record } => format!("Submitted run {}", record.id),
            TrackEvent::SubmissionFailed { message } => format!("Submission failed: {message}"),
            TrackEvent::StatusObserved { record, attempt } => {
                format!("Status: {} (check {attempt})", record.status)
            }
            TrackEvent::Finished { .. } => continue,
            TrackEvent::ArtifactReady { kind, .. } => format!("Fetched {kind}"),
            TrackEvent::ArtifactFailed { kind, message } => {
                format!("Could not fetch {kind}: {message}")
            }
            TrackEvent::Info(info) => info.to_message(),
        };
        let _ = out_tx.send(OutputLine::Stderr(line));
    }

    let tracked: TrackedRun = handle.await.context("controller task failed")?;
    ctrl_c.abort();
    drop(cmd_tx);

    let processed = process_run_completion(tracker.fetcher(), &tracked, save_dir.as_deref()).await;

    if args.json {
        let out = serde_json::to_string_pretty(&tracked)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in evoc::text_summary::build_text_summary(&tracked).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    for msg in processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }
    drop(out_tx);
    let _ = out_handle.await;

    if let Some(err) = tracked.submission_error.as_deref() {
        bail!("submission failed: {err}");
    }
    if !tracked.is_success() {
        bail!(
            "run {} did not complete",
            tracked
                .run_id
                .as_ref()
                .map_or("-", |id| id.as_str())
        );
    }
    Ok(())
}
