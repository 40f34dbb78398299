// src/exec/shell.rs

//! Shell command actions, one-shot and long-lived.
//!
//! One-shot commands run to completion and fail on a non-zero exit.
//! Long-lived commands (dev servers, bundler watchers) keep running after
//! the task completes; completion is signalled by readiness:
//!
//! - the first stdout line matching `ready_on_stdout`, or
//! - `ready_after` elapsing, or
//! - immediately after spawn when neither is configured.
//!
//! A long-lived task that is run again while its process is alive is
//! reported ready without respawning, unless `restart` is set, in which
//! case the old process is killed first.

use std::collections::{BTreeMap, VecDeque};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::exec::action::{ActionFuture, TaskAction, TaskContext};
use crate::types::ReloadKind;

/// Number of trailing stderr lines kept for failure reports.
const STDERR_TAIL: usize = 20;

/// Readiness options of a long-lived command.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub ready_on_stdout: Option<Regex>,
    pub ready_after: Option<Duration>,
    pub restart: bool,
}

/// Everything needed to run one shell task.
#[derive(Debug, Clone, Default)]
pub struct ShellSpec {
    pub cmd: String,
    /// Extra environment for the child, on top of the inherited one.
    pub env: BTreeMap<String, String>,
    /// `Some` for long-lived commands.
    pub service: Option<ServiceOptions>,
    /// Reload signal broadcast after each successful completion.
    pub reload: Option<ReloadKind>,
}

impl ShellSpec {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }
}

/// A command exited unsuccessfully.
#[derive(Debug, Error)]
#[error("command exited with {}", exit_description(*.code))]
pub struct CommandFailed {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stderr_tail: Vec<String>,
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// A long-lived command exited before it signalled readiness.
#[derive(Debug, Error)]
#[error("service exited before becoming ready ({})", exit_description(*.code))]
pub struct ServiceExited {
    pub code: Option<i32>,
}

/// Handle for a running long-lived process.
///
/// `cancel` asks the supervisor to kill the process; `handle` is the
/// supervisor task owning the child.
struct ActiveService {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ActiveService {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    async fn stop(mut self, task: &str) {
        info!(task = %task, "restart requested; stopping previous service instance");
        if let Some(cancel) = self.cancel.take() {
            if cancel.send(()).is_err() {
                debug!(task = %task, "previous service already finished while stopping");
            }
        }
        if let Err(e) = self.handle.await {
            warn!(task = %task, error = %e, "service supervisor did not shut down cleanly");
        }
    }
}

enum Readiness {
    Ready,
    Exited(Option<i32>),
}

/// Action running a shell command.
pub struct ShellAction {
    spec: Arc<ShellSpec>,
    service: Arc<Mutex<Option<ActiveService>>>,
}

impl ShellAction {
    pub fn new(spec: ShellSpec) -> Self {
        Self {
            spec: Arc::new(spec),
            service: Arc::new(Mutex::new(None)),
        }
    }

    pub fn spec(&self) -> &ShellSpec {
        &self.spec
    }
}

impl TaskAction for ShellAction {
    fn start(&self, ctx: TaskContext) -> ActionFuture {
        let spec = Arc::clone(&self.spec);
        let service = Arc::clone(&self.service);
        Box::pin(async move {
            match &spec.service {
                Some(opts) => run_service(&spec, opts, &service, &ctx).await?,
                None => run_to_completion(&spec, &ctx).await?,
            }
            if let Some(kind) = spec.reload {
                let clients = ctx.reload.notify(kind);
                debug!(task = %ctx.task, %kind, clients, "reload signal sent");
            }
            Ok(())
        })
    }

    fn describe(&self) -> Option<String> {
        let prefix = if self.spec.service.is_some() {
            "service"
        } else {
            "cmd"
        };
        Some(format!("{prefix}: {}", self.spec.cmd))
    }
}

fn spawn_command(spec: &ShellSpec, ctx: &TaskContext) -> Result<Child> {
    info!(
        task = %ctx.task,
        run_id = ctx.run_id,
        cmd = %spec.cmd,
        "starting task process"
    );

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&spec.cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&spec.cmd);
        c
    };

    cmd.current_dir(ctx.root())
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn()
        .with_context(|| format!("spawning process for task '{}'", ctx.task))
}

async fn run_to_completion(spec: &ShellSpec, ctx: &TaskContext) -> Result<()> {
    let mut child = spawn_command(spec, ctx)?;

    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(log_lines(ctx.task.clone(), "stdout", out)));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(collect_tail(ctx.task.clone(), err)));

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{}'", ctx.task))?;

    if let Some(handle) = stdout {
        let _ = handle.await;
    }
    let stderr_tail = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    };

    let code = status.code();
    info!(
        task = %ctx.task,
        run_id = ctx.run_id,
        exit_code = code.unwrap_or(-1),
        success = status.success(),
        "task process exited"
    );

    if status.success() {
        return Ok(());
    }

    for line in &stderr_tail {
        warn!(task = %ctx.task, "stderr: {}", line);
    }
    Err(CommandFailed { code, stderr_tail })
        .with_context(|| format!("running `{}`", spec.cmd))
}

async fn run_service(
    spec: &ShellSpec,
    opts: &ServiceOptions,
    slot: &Mutex<Option<ActiveService>>,
    ctx: &TaskContext,
) -> Result<()> {
    let mut slot = slot.lock().await;

    if let Some(existing) = slot.take() {
        if existing.is_alive() && !opts.restart {
            debug!(
                task = %ctx.task,
                run_id = ctx.run_id,
                "service already running and restart=false; reporting ready"
            );
            *slot = Some(existing);
            return Ok(());
        }
        if existing.is_alive() {
            existing.stop(&ctx.task).await;
        }
    }

    let mut child = spawn_command(spec, ctx)?;
    let (ready_tx, mut ready_rx) = mpsc::unbounded_channel::<Readiness>();

    if let Some(out) = child.stdout.take() {
        let task = ctx.task.clone();
        let pattern = opts.ready_on_stdout.clone();
        let tx = ready_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(out).lines();
            let mut signalled = false;
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, "stdout: {}", line);
                if signalled {
                    continue;
                }
                if let Some(re) = &pattern {
                    if re.is_match(&line) {
                        debug!(task = %task, "stdout matched ready_on_stdout; service ready");
                        signalled = true;
                        let _ = tx.send(Readiness::Ready);
                    }
                }
            }
        });
    }
    if let Some(err) = child.stderr.take() {
        tokio::spawn(log_lines(ctx.task.clone(), "stderr", err));
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(supervise(ctx.task.clone(), child, cancel_rx, ready_tx));
    *slot = Some(ActiveService {
        cancel: Some(cancel_tx),
        handle,
    });

    if opts.ready_on_stdout.is_none() && opts.ready_after.is_none() {
        return Ok(());
    }

    tokio::select! {
        msg = ready_rx.recv() => match msg {
            Some(Readiness::Ready) => Ok(()),
            Some(Readiness::Exited(code)) => Err(ServiceExited { code }.into()),
            None => Err(ServiceExited { code: None }.into()),
        },
        _ = ready_timer(opts.ready_after) => {
            debug!(task = %ctx.task, "ready_after elapsed; service ready");
            Ok(())
        }
    }
}

/// Own the child until it exits or a stop is requested.
async fn supervise(
    task: String,
    mut child: Child,
    cancel_rx: oneshot::Receiver<()>,
    ready_tx: mpsc::UnboundedSender<Readiness>,
) {
    tokio::select! {
        status = child.wait() => {
            let code = status.ok().and_then(|s| s.code());
            warn!(task = %task, exit_code = code.unwrap_or(-1), "service process exited");
            let _ = ready_tx.send(Readiness::Exited(code));
        }
        cancel = cancel_rx => {
            if cancel.is_ok() {
                if let Err(e) = child.kill().await {
                    warn!(task = %task, error = %e, "failed to kill service process");
                }
            }
            // Otherwise the child is killed on drop.
        }
    }
}

async fn ready_timer(after: Option<Duration>) {
    match after {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}

async fn log_lines<R>(task: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(task = %task, "{}: {}", stream, line);
    }
}

async fn collect_tail<R>(task: String, reader: R) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(task = %task, "stderr: {}", line);
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}
