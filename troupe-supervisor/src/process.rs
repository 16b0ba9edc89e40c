//! Lifecycle of a single agent process

use crate::{Result, SupervisorError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use troupe_core::channel::serve_channel;
use troupe_core::config::{IDENTITY_PLACEHOLDER, LaunchConfig};
use troupe_core::identity::AgentIdentity;
use troupe_core::queue::MessageQueue;

/// Lifecycle state of an [`AgentProcess`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::NotStarted => write!(f, "not started"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Stopped => write!(f, "stopped"),
        }
    }
}

/// How to launch an agent child
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Build from configuration, resolving the default program
    pub fn from_config(config: &LaunchConfig) -> Result<Self> {
        Ok(Self {
            program: config.resolve_program()?,
            args: config.args.clone(),
            env: config.env.clone(),
        })
    }

    /// Append an argument; `{identity}` is substituted at spawn time
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn command_for(&self, identity: AgentIdentity) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(
            self.args
                .iter()
                .map(|arg| arg.replace(IDENTITY_PLACEHOLDER, identity.as_str())),
        )
        .envs(&self.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }
}

/// Point-in-time view of an agent process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    pub identity: AgentIdentity,
    pub pid: Option<u32>,
    pub state: ProcessState,
    pub restart_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_ms: Option<u64>,
}

/// Owns one child process bound to one identity and the shared queue.
///
/// State machine: `NotStarted -> Running -> (Stopping) -> Stopped`, and
/// back to `Running` through [`AgentProcess::start`].
pub struct AgentProcess {
    identity: AgentIdentity,
    launch: LaunchSpec,
    state: ProcessState,
    child: Option<Child>,
    pid: Option<u32>,
    restart_count: u32,
    started_at: Option<DateTime<Utc>>,
    exit_status: Option<ExitStatus>,
    channel: Option<JoinHandle<()>>,
}

impl AgentProcess {
    pub fn new(identity: AgentIdentity, launch: LaunchSpec) -> Self {
        Self {
            identity,
            launch,
            state: ProcessState::NotStarted,
            child: None,
            pid: None,
            restart_count: 0,
            started_at: None,
            exit_status: None,
            channel: None,
        }
    }

    /// Carry a restart count over from the process this one replaces
    pub fn with_restart_count(mut self, restart_count: u32) -> Self {
        self.restart_count = restart_count;
        self
    }

    pub fn identity(&self) -> AgentIdentity {
        self.identity
    }

    pub fn launch(&self) -> &LaunchSpec {
        &self.launch
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// OS process id of the most recent spawn
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Exit status of the most recent spawn, once it has been observed
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Time since the last spawn, while running
    pub fn uptime(&self) -> Option<Duration> {
        if self.state != ProcessState::Running {
            return None;
        }
        self.started_at
            .and_then(|started| (Utc::now() - started).to_std().ok())
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            identity: self.identity,
            pid: self.pid,
            state: self.state,
            restart_count: self.restart_count,
            started_at: self.started_at,
            uptime_ms: self.uptime().map(|d| d.as_millis() as u64),
        }
    }

    /// Spawn the child and connect it to `queue`.
    ///
    /// The child's stdin/stdout carry its queue channel; stderr lines are
    /// re-logged under the agent's identity.
    pub fn start(&mut self, queue: &MessageQueue) -> Result<()> {
        if self.is_alive() {
            return Err(SupervisorError::AlreadyRunning(self.identity));
        }

        let identity = self.identity;
        let mut child = self
            .launch
            .command_for(identity)
            .spawn()
            .map_err(|source| SupervisorError::Spawn { identity, source })?;

        if let (Some(stdout), Some(stdin)) = (child.stdout.take(), child.stdin.take()) {
            let queue = queue.clone();
            self.channel = Some(tokio::spawn(async move {
                match serve_channel(identity, stdout, stdin, queue).await {
                    Ok(stats) => debug!(
                        "Queue channel for {} closed ({} requests)",
                        identity, stats.requests
                    ),
                    Err(e) => debug!("Queue channel for {} ended: {}", identity, e),
                }
            }));
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!("[{}] {}", identity, line);
                }
            });
        }

        self.pid = child.id();
        self.child = Some(child);
        self.started_at = Some(Utc::now());
        self.exit_status = None;
        self.state = ProcessState::Running;

        info!(
            "Agent {} started (PID: {:?}, restarts: {})",
            identity, self.pid, self.restart_count
        );
        Ok(())
    }

    /// Ask the OS whether the child is still running.
    ///
    /// Reaps the child and moves to `Stopped` when it has exited. A failed
    /// status query counts as still running.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!("Agent {} (PID: {:?}) exited: {}", self.identity, self.pid, status);
                self.finish(Some(status));
                false
            }
            Err(e) => {
                warn!("Failed to query agent {} status: {}", self.identity, e);
                true
            }
        }
    }

    /// Stop the child: SIGTERM, wait up to `timeout`, then SIGKILL.
    ///
    /// Does nothing when the child is not running.
    pub async fn stop(&mut self, timeout: Duration) -> Result<()> {
        if !self.is_alive() {
            debug!("Agent {} is not running, nothing to stop", self.identity);
            return Ok(());
        }
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        self.state = ProcessState::Stopping;
        info!(
            "Stopping agent {} (PID: {:?}, timeout: {:?})",
            self.identity, self.pid, timeout
        );

        if let Err(e) = request_termination(self.identity, &mut child) {
            warn!("{}", e);
        }

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!("Agent {} stopped gracefully ({})", self.identity, status);
                Some(status)
            }
            Ok(Err(e)) => {
                warn!("Error waiting for agent {} shutdown: {}", self.identity, e);
                None
            }
            Err(_) => {
                warn!(
                    "Agent {} did not exit within {:?}, force killing",
                    self.identity, timeout
                );
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill agent {}: {}", self.identity, e);
                }
                match child.wait().await {
                    Ok(status) => {
                        info!("Agent {} killed ({})", self.identity, status);
                        Some(status)
                    }
                    Err(e) => {
                        self.finish(None);
                        return Err(e.into());
                    }
                }
            }
        };

        self.finish(status);
        Ok(())
    }

    fn finish(&mut self, status: Option<ExitStatus>) {
        self.child = None;
        self.exit_status = status;
        self.state = ProcessState::Stopped;
        if let Some(channel) = self.channel.take() {
            channel.abort();
        }
    }
}

impl fmt::Debug for AgentProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentProcess")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .field("restart_count", &self.restart_count)
            .finish_non_exhaustive()
    }
}

/// Cooperative stop request: SIGTERM on Unix
#[cfg(unix)]
fn request_termination(identity: AgentIdentity, child: &mut Child) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
        identity,
        reason: format!("pid {} out of range", pid),
    })?;

    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| SupervisorError::Signal {
        identity,
        reason: e.to_string(),
    })
}

/// No cooperative signal off Unix; kill outright
#[cfg(not(unix))]
fn request_termination(identity: AgentIdentity, child: &mut Child) -> Result<()> {
    child.start_kill().map_err(|e| SupervisorError::Signal {
        identity,
        reason: e.to_string(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::time::Instant;

    fn sleeper() -> LaunchSpec {
        LaunchSpec::new("sleep").arg("30")
    }

    fn shell(script: &str) -> LaunchSpec {
        LaunchSpec::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_start_reports_running_process() {
        let queue = MessageQueue::new();
        let mut agent = AgentProcess::new(AgentIdentity::Agent1, sleeper());
        assert_eq!(agent.state(), ProcessState::NotStarted);
        assert!(!agent.is_alive());

        agent.start(&queue).unwrap();

        assert!(agent.is_alive());
        assert_eq!(agent.state(), ProcessState::Running);
        assert!(agent.pid().is_some());
        assert!(agent.started_at().is_some());
        assert!(agent.uptime().is_some());

        let status = agent.status();
        assert_eq!(status.identity, AgentIdentity::Agent1);
        assert_eq!(status.restart_count, 0);

        agent.stop(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_graceful_and_idempotent() {
        let queue = MessageQueue::new();
        let mut agent = AgentProcess::new(AgentIdentity::Agent2, sleeper());
        agent.start(&queue).unwrap();

        let started = Instant::now();
        agent.stop(Duration::from_secs(2)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!agent.is_alive());
        assert_eq!(agent.state(), ProcessState::Stopped);
        assert_eq!(agent.exit_status().and_then(|s| s.signal()), Some(15));
        assert!(agent.uptime().is_none());

        agent.stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(agent.state(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let queue = MessageQueue::new();
        let mut agent = AgentProcess::new(AgentIdentity::Agent1, shell("trap '' TERM; exec sleep 30"));
        agent.start(&queue).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        agent.stop(Duration::from_millis(300)).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(5));
        assert!(!agent.is_alive());
        assert_eq!(agent.exit_status().and_then(|s| s.signal()), Some(9));
    }

    #[tokio::test]
    async fn test_exit_is_observed() {
        let queue = MessageQueue::new();
        let mut agent = AgentProcess::new(AgentIdentity::Agent1, shell("exit 3"));
        agent.start(&queue).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!agent.is_alive());
        assert_eq!(agent.state(), ProcessState::Stopped);
        assert_eq!(agent.exit_status().and_then(|s| s.code()), Some(3));
    }

    #[tokio::test]
    async fn test_unknown_status_still_stops() {
        use nix::sys::wait::waitpid;
        use nix::unistd::Pid;

        let queue = MessageQueue::new();
        let mut agent = AgentProcess::new(AgentIdentity::Agent1, sleeper());
        agent.start(&queue).unwrap();

        // Reap the child behind the wrapper's back so status queries fail
        let pid = Pid::from_raw(agent.pid().unwrap() as i32);
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL).unwrap();
        waitpid(pid, None).unwrap();

        assert!(agent.is_alive());
        assert_eq!(agent.state(), ProcessState::Running);

        tokio::time::timeout(Duration::from_secs(5), agent.stop(Duration::from_millis(300)))
            .await
            .expect("stop did not return")
            .unwrap();
        assert_eq!(agent.state(), ProcessState::Stopped);
        assert!(agent.exit_status().is_none());
        assert!(!agent.is_alive());
    }

    #[tokio::test]
    async fn test_status_serializes_for_reporting() {
        let queue = MessageQueue::new();
        let mut agent = AgentProcess::new(AgentIdentity::Agent2, sleeper()).with_restart_count(1);
        agent.start(&queue).unwrap();

        let json = serde_json::to_value(agent.status()).unwrap();
        assert_eq!(json["identity"], "agent2");
        assert_eq!(json["state"], "running");
        assert_eq!(json["restart_count"], 1);
        assert!(json["pid"].is_u64());

        agent.stop(Duration::from_secs(2)).await.unwrap();
        let json = serde_json::to_value(agent.status()).unwrap();
        assert_eq!(json["state"], "stopped");
        assert!(json["uptime_ms"].is_null());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let queue = MessageQueue::new();
        let mut agent = AgentProcess::new(AgentIdentity::Agent1, sleeper());
        agent.start(&queue).unwrap();

        let err = agent.start(&queue).unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyRunning(AgentIdentity::Agent1)));

        agent.stop(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let queue = MessageQueue::new();
        let mut agent = AgentProcess::new(AgentIdentity::Agent2, sleeper()).with_restart_count(2);
        agent.start(&queue).unwrap();
        let first_pid = agent.pid();
        agent.stop(Duration::from_secs(2)).await.unwrap();

        agent.start(&queue).unwrap();
        assert!(agent.is_alive());
        assert_ne!(agent.pid(), first_pid);
        assert_eq!(agent.restart_count(), 2);

        agent.stop(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let queue = MessageQueue::new();
        let mut agent =
            AgentProcess::new(AgentIdentity::Agent1, LaunchSpec::new("/nonexistent/troupe-agent"));

        let err = agent.start(&queue).unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { identity: AgentIdentity::Agent1, .. }));
        assert_eq!(agent.state(), ProcessState::NotStarted);
    }

    #[tokio::test]
    async fn test_identity_placeholder_and_env_reach_child() {
        let queue = MessageQueue::new();
        let launch = shell("test \"$1\" = agent2 && test \"$TROUPE_TEST\" = yes && exec sleep 30")
            .args(["sh", IDENTITY_PLACEHOLDER])
            .env("TROUPE_TEST", "yes");
        let mut agent = AgentProcess::new(AgentIdentity::Agent2, launch);
        agent.start(&queue).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(agent.is_alive());
        agent.stop(Duration::from_secs(2)).await.unwrap();
    }
}
