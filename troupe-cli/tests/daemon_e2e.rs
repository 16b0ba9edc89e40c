//! Runs the real `troupe` binary as agents under a team daemon

#![cfg(unix)]

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::time::{Duration, Instant};
use troupe_core::config::DaemonConfig;
use troupe_core::identity::AgentIdentity::{self, Agent1, Agent2};
use troupe_supervisor::{LaunchSpec, ProcessState, TeamDaemon};

fn agent_launch() -> LaunchSpec {
    LaunchSpec::new(env!("CARGO_BIN_EXE_troupe"))
        .args(["agent", "--identity", "{identity}"])
        .env("TROUPE_AGENT__TICK_INTERVAL", "50ms")
        .env("RUST_LOG", "warn")
}

fn daemon_config() -> DaemonConfig {
    DaemonConfig {
        identities: vec![Agent1, Agent2],
        health_check_interval: Duration::from_millis(100),
        max_restarts: 3,
        shutdown_timeout: Duration::from_secs(5),
    }
}

fn pid_of(daemon: &TeamDaemon, identity: AgentIdentity) -> Pid {
    let pid = daemon.agent(identity).unwrap().pid().unwrap();
    Pid::from_raw(pid as i32)
}

#[tokio::test]
async fn test_agents_run_and_stop_gracefully() {
    let mut daemon = TeamDaemon::new(daemon_config(), agent_launch()).without_signal_handlers();
    daemon.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    let report = daemon.check_agents();
    assert_eq!(report.healthy, vec![Agent1, Agent2]);

    let started = Instant::now();
    daemon.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));

    for identity in [Agent1, Agent2] {
        let agent = daemon.agent(identity).unwrap();
        assert_eq!(agent.state(), ProcessState::Stopped);
        assert!(agent.exit_status().unwrap().success());
    }
    assert_eq!(daemon.queue().size().await, 0);
}

#[tokio::test]
async fn test_killed_agent_is_respawned() {
    let mut daemon = TeamDaemon::new(daemon_config(), agent_launch()).without_signal_handlers();
    daemon.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let original = pid_of(&daemon, Agent1);
    kill(original, Signal::SIGKILL).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let report = daemon.check_agents();
    assert_eq!(report.restarted, vec![Agent1]);
    assert_eq!(report.healthy, vec![Agent2]);

    let agent = daemon.agent(Agent1).unwrap();
    assert_eq!(agent.restart_count(), 1);
    assert_ne!(pid_of(&daemon, Agent1), original);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(daemon.check_agents().healthy, vec![Agent1, Agent2]);

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_long_mailbox_poll_does_not_delay_shutdown() {
    let launch = agent_launch().env("TROUPE_AGENT__POLL_TIMEOUT", "60s");
    let mut daemon = TeamDaemon::new(daemon_config(), launch).without_signal_handlers();
    daemon.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let started = Instant::now();
    daemon.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));

    for identity in [Agent1, Agent2] {
        let agent = daemon.agent(identity).unwrap();
        assert!(agent.exit_status().unwrap().success());
    }
}
