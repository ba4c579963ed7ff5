//! Process table and reap loop
//!
//! Every child PID 1 spawns is recorded here with a display name and, for
//! services, the unit it belongs to. Exits are collected one at a time by
//! `tick`, which also applies `Restart=always` and launches restarts whose
//! cool-down has expired. Orphans reparented to PID 1 are reaped the same
//! way and logged as `unknown`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::unistd::Pid;
use tokio::sync::oneshot;
use tokio::time::sleep;

use super::restart::{RestartDecision, RestartTracker};
use crate::config::InitConfig;
use crate::pid1::{ChildEvents, ExitStatus, Kernel, SpawnError};
use crate::units::{Graph, RestartPolicy, UnitDefinition};

/// Result of one reap attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Reaped(Pid),
    /// No child has exited (or there are no children at all)
    Idle,
    /// waitpid failed unexpectedly
    Failed,
}

#[derive(Debug)]
struct ProcessRecord {
    display: String,
    unit: Option<String>,
}

/// Exit notification for a process started with `spawn_and_await`
#[derive(Debug)]
pub struct Completion {
    pid: Pid,
    rx: oneshot::Receiver<ExitStatus>,
}

impl Completion {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Resolves once the reap loop collects the process. `None` if the
    /// process record was released without being reaped.
    pub async fn exited(self) -> Option<ExitStatus> {
        self.rx.await.ok()
    }
}

pub struct Supervisor {
    kernel: Rc<dyn Kernel>,
    graph: Rc<Graph>,
    env: Vec<String>,
    settle_delay: Duration,
    idle_interval: Duration,
    error_backoff: Duration,
    processes: RefCell<HashMap<Pid, ProcessRecord>>,
    waiters: RefCell<HashMap<Pid, oneshot::Sender<ExitStatus>>>,
    restarts: RefCell<RestartTracker>,
    /// Set once shutdown begins; suppresses restarts
    stopping: Cell<bool>,
}

impl Supervisor {
    pub fn new(kernel: Rc<dyn Kernel>, graph: Rc<Graph>, config: &InitConfig) -> Self {
        Self {
            kernel,
            graph,
            env: config.service_env.clone(),
            settle_delay: config.settle_delay,
            idle_interval: config.idle_interval,
            error_backoff: config.error_backoff,
            processes: RefCell::new(HashMap::new()),
            waiters: RefCell::new(HashMap::new()),
            restarts: RefCell::new(RestartTracker::new(
                config.crash_window,
                config.crash_threshold,
                config.crash_cooldown,
            )),
            stopping: Cell::new(false),
        }
    }

    /// Spawn a whitespace-split command line and record it
    pub fn spawn(&self, command: &str) -> Result<Pid, SpawnError> {
        let argv: Vec<String> = command.split_whitespace().map(String::from).collect();
        let Some(program) = argv.first().cloned() else {
            return Err(SpawnError::EmptyCommand);
        };

        let pid = self.kernel.spawn(&argv, &self.env)?;
        self.processes.borrow_mut().insert(
            pid,
            ProcessRecord {
                display: program,
                unit: None,
            },
        );
        Ok(pid)
    }

    /// Start a unit's ExecStart, if it has one
    ///
    /// Returns the PID, or `None` for units with nothing to run.
    pub fn launch_service(
        &self,
        name: &str,
        unit: &UnitDefinition,
    ) -> Result<Option<Pid>, SpawnError> {
        let Some(command) = unit.exec_start() else {
            log::info!("Reached target {}", name);
            return Ok(None);
        };

        let pid = self.spawn(command)?;
        if let Some(record) = self.processes.borrow_mut().get_mut(&pid) {
            record.display = name.to_string();
            record.unit = Some(name.to_string());
        }
        log::info!("Started {} (PID {})", name, pid);
        Ok(Some(pid))
    }

    /// Launch a service and give it the settle delay before returning
    pub async fn spawn_service(&self, name: &str, unit: &UnitDefinition) -> Result<(), SpawnError> {
        if self.launch_service(name, unit)?.is_some() {
            sleep(self.settle_delay).await;
        }
        Ok(())
    }

    /// Spawn a command and get notified when it exits
    pub fn spawn_and_await(&self, command: &str) -> Result<Completion, SpawnError> {
        let pid = self.spawn(command)?;
        let (tx, rx) = oneshot::channel();
        self.waiters.borrow_mut().insert(pid, tx);
        Ok(Completion { pid, rx })
    }

    /// Drop the record of a process collected outside the reap loop
    pub fn release(&self, pid: Pid) {
        self.processes.borrow_mut().remove(&pid);
        self.waiters.borrow_mut().remove(&pid);
    }

    /// PID of the running process for `unit`
    pub fn pid_of(&self, unit: &str) -> Option<Pid> {
        self.processes
            .borrow()
            .iter()
            .find(|(_, record)| record.unit.as_deref() == Some(unit))
            .map(|(pid, _)| *pid)
    }

    pub fn display_name(&self, pid: Pid) -> Option<String> {
        self.processes.borrow().get(&pid).map(|r| r.display.clone())
    }

    /// Number of tracked processes
    pub fn running(&self) -> usize {
        self.processes.borrow().len()
    }

    /// Stop restarting services; exits are still reaped
    pub fn stop_restarts(&self) {
        self.stopping.set(true);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.get()
    }

    /// When a crash-looping unit will be restarted
    pub fn restart_pending(&self, unit: &str) -> Option<Instant> {
        self.restarts.borrow().pending_until(unit)
    }

    /// Launch due restarts, then reap at most one child
    pub fn tick(&self, now: Instant) -> Tick {
        self.launch_due_restarts(now);

        match self.kernel.try_wait_any() {
            Ok(Some((pid, status))) => {
                self.handle_exit(pid, status, now);
                Tick::Reaped(pid)
            }
            Ok(None) | Err(Errno::ECHILD) => Tick::Idle,
            Err(e) => {
                log::error!("Monitor error: waitpid failed: {}", e);
                Tick::Failed
            }
        }
    }

    /// Reap forever
    ///
    /// Sleeps on SIGCHLD when available, polling every `idle_interval`
    /// regardless so restart deadlines are honoured.
    pub async fn supervise(&self, mut child_events: Option<ChildEvents>) {
        loop {
            match self.tick(Instant::now()) {
                Tick::Reaped(_) => tokio::task::yield_now().await,
                Tick::Idle => match child_events.as_mut() {
                    Some(events) => {
                        tokio::select! {
                            _ = events.recv() => {}
                            _ = sleep(self.idle_interval) => {}
                        }
                    }
                    None => sleep(self.idle_interval).await,
                },
                Tick::Failed => sleep(self.error_backoff).await,
            }
        }
    }

    fn handle_exit(&self, pid: Pid, status: ExitStatus, now: Instant) {
        let record = self.processes.borrow_mut().remove(&pid);
        let display = record.as_ref().map_or("unknown", |r| r.display.as_str());
        log::info!("Reaped PID {} ({}) name: {}", pid, status, display);

        if let Some(tx) = self.waiters.borrow_mut().remove(&pid) {
            let _ = tx.send(status);
        }

        if let Some(unit) = record.and_then(|r| r.unit) {
            self.apply_restart_policy(&unit, now);
        }
    }

    fn apply_restart_policy(&self, name: &str, now: Instant) {
        let Some(unit) = self.graph.get(name) else {
            return;
        };
        if unit.restart != RestartPolicy::Always {
            return;
        }
        if self.is_stopping() {
            log::debug!("Not restarting {}: shutting down", name);
            return;
        }

        let decision = self.restarts.borrow_mut().record_crash(name, now);
        match decision {
            RestartDecision::RestartNow => {
                log::info!("Restarting {}...", name);
                self.relaunch(name, unit);
            }
            RestartDecision::CoolDown { until } => {
                log::warn!(
                    "Service {} crashing too fast. Pausing for {}s.",
                    name,
                    until.saturating_duration_since(now).as_secs()
                );
            }
        }
    }

    fn launch_due_restarts(&self, now: Instant) {
        if self.is_stopping() {
            return;
        }
        let due = self.restarts.borrow_mut().take_due(now);
        for name in due {
            if let Some(unit) = self.graph.get(&name) {
                log::info!("Restarting {} after backoff...", name);
                self.relaunch(&name, unit);
            }
        }
    }

    fn relaunch(&self, name: &str, unit: &UnitDefinition) {
        if let Err(e) = self.launch_service(name, unit) {
            log::error!("Failed to restart {}: {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeKernel;
    use crate::units::parse_unit;

    fn supervisor(units: &[(&str, &str)]) -> (Supervisor, Rc<FakeKernel>) {
        let mut graph = Graph::new();
        for (name, content) in units {
            graph.insert(name, parse_unit(content));
        }
        let kernel = Rc::new(FakeKernel::new());
        let supervisor = Supervisor::new(kernel.clone(), Rc::new(graph), &InitConfig::default());
        (supervisor, kernel)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    const CRASHY: &str = "[Service]\nExecStart=/bin/crashy --fast\nRestart=always\n";

    #[test]
    fn test_spawn_records_program() {
        let (supervisor, kernel) = supervisor(&[]);
        let pid = supervisor.spawn("/usr/bin/dbus-uuidgen  --ensure").unwrap();

        assert_eq!(supervisor.display_name(pid).as_deref(), Some("/usr/bin/dbus-uuidgen"));
        assert_eq!(kernel.spawn_count("/usr/bin/dbus-uuidgen"), 1);
        assert!(matches!(supervisor.spawn("   "), Err(SpawnError::EmptyCommand)));
    }

    #[test]
    fn test_launch_target_spawns_nothing() {
        let (supervisor, kernel) = supervisor(&[]);
        let target = parse_unit("[Unit]\nRequires=a.service\n");

        assert_eq!(supervisor.launch_service("multi-user.target", &target).unwrap(), None);
        assert!(kernel.spawned_programs().is_empty());
    }

    #[test]
    fn test_launch_service_records_unit() {
        let (supervisor, _kernel) = supervisor(&[("crashy.service", CRASHY)]);
        let unit = parse_unit(CRASHY);

        let pid = supervisor.launch_service("crashy.service", &unit).unwrap().unwrap();
        assert_eq!(supervisor.pid_of("crashy.service"), Some(pid));
        assert_eq!(supervisor.display_name(pid).as_deref(), Some("crashy.service"));
    }

    #[test]
    fn test_crash_loop_pauses_then_resumes() {
        let (supervisor, kernel) = supervisor(&[("crashy.service", CRASHY)]);
        let unit = parse_unit(CRASHY);
        let t0 = Instant::now();

        supervisor.launch_service("crashy.service", &unit).unwrap();
        for i in 0..5 {
            let pid = kernel.last_pid("/bin/crashy").unwrap();
            kernel.exit(pid, ExitStatus::Exited(1));
            assert_eq!(supervisor.tick(t0 + secs(i)), Tick::Reaped(pid));
        }

        // Initial start plus four restarts, then the fifth crash pauses it
        assert_eq!(kernel.spawn_count("/bin/crashy"), 5);
        let until = supervisor.restart_pending("crashy.service").unwrap();
        assert_eq!(until, t0 + secs(4) + secs(300));
        assert_eq!(supervisor.pid_of("crashy.service"), None);

        assert_eq!(supervisor.tick(t0 + secs(4 + 240)), Tick::Idle);
        assert_eq!(kernel.spawn_count("/bin/crashy"), 5);

        supervisor.tick(until);
        assert_eq!(kernel.spawn_count("/bin/crashy"), 6);
        assert!(supervisor.restart_pending("crashy.service").is_none());
    }

    #[test]
    fn test_spread_out_crashes_keep_restarting() {
        let (supervisor, kernel) = supervisor(&[("crashy.service", CRASHY)]);
        let unit = parse_unit(CRASHY);
        let t0 = Instant::now();

        supervisor.launch_service("crashy.service", &unit).unwrap();
        for at in [0, 1, 2, 3, 20] {
            let pid = kernel.last_pid("/bin/crashy").unwrap();
            kernel.exit(pid, ExitStatus::Signaled(9));
            supervisor.tick(t0 + secs(at));
        }

        assert_eq!(kernel.spawn_count("/bin/crashy"), 6);
        assert!(supervisor.restart_pending("crashy.service").is_none());
    }

    #[test]
    fn test_no_restart_while_stopping() {
        let (supervisor, kernel) = supervisor(&[("crashy.service", CRASHY)]);
        let unit = parse_unit(CRASHY);
        let t0 = Instant::now();

        supervisor.launch_service("crashy.service", &unit).unwrap();
        for i in 0..5 {
            let pid = kernel.last_pid("/bin/crashy").unwrap();
            kernel.exit(pid, ExitStatus::Exited(1));
            supervisor.tick(t0 + secs(i));
        }
        let until = supervisor.restart_pending("crashy.service").unwrap();
        assert_eq!(kernel.spawn_count("/bin/crashy"), 5);

        supervisor.stop_restarts();

        // A parked restart stays parked
        supervisor.tick(until);
        assert_eq!(kernel.spawn_count("/bin/crashy"), 5);

        // A fresh launch that dies to SIGTERM is reaped but not relaunched
        let pid = supervisor
            .launch_service("crashy.service", &unit)
            .unwrap()
            .unwrap();
        kernel.exit(pid, ExitStatus::Signaled(15));
        assert_eq!(supervisor.tick(until + secs(1)), Tick::Reaped(pid));
        assert_eq!(kernel.spawn_count("/bin/crashy"), 6);
        assert_eq!(supervisor.pid_of("crashy.service"), None);
    }

    #[test]
    fn test_no_restart_without_policy() {
        let content = "[Service]\nExecStart=/bin/oneshot\n";
        let (supervisor, kernel) = supervisor(&[("oneshot.service", content)]);

        let pid = supervisor
            .launch_service("oneshot.service", &parse_unit(content))
            .unwrap()
            .unwrap();
        kernel.exit(pid, ExitStatus::Exited(0));
        supervisor.tick(Instant::now());

        assert_eq!(kernel.spawn_count("/bin/oneshot"), 1);
        assert_eq!(supervisor.running(), 0);
    }

    #[test]
    fn test_orphan_reaped_as_unknown() {
        let (supervisor, kernel) = supervisor(&[]);
        let orphan = Pid::from_raw(4242);
        kernel.exit(orphan, ExitStatus::Exited(0));

        assert_eq!(supervisor.tick(Instant::now()), Tick::Reaped(orphan));
    }

    #[test]
    fn test_no_children_is_idle() {
        let (supervisor, kernel) = supervisor(&[]);
        assert_eq!(supervisor.tick(Instant::now()), Tick::Idle);

        supervisor.spawn("/bin/sleep 60").unwrap();
        assert_eq!(supervisor.tick(Instant::now()), Tick::Idle);

        kernel.fail_next_wait(Errno::EINTR);
        assert_eq!(supervisor.tick(Instant::now()), Tick::Failed);
    }

    #[tokio::test]
    async fn test_completion_resolves_on_reap() {
        let (supervisor, kernel) = supervisor(&[]);
        kernel.auto_exit("/usr/bin/dbus-daemon", ExitStatus::Exited(3));

        let completion = supervisor.spawn_and_await("/usr/bin/dbus-daemon --system --fork").unwrap();
        assert_eq!(supervisor.tick(Instant::now()), Tick::Reaped(completion.pid()));
        assert_eq!(completion.exited().await, Some(ExitStatus::Exited(3)));
    }

    #[tokio::test]
    async fn test_released_completion_yields_none() {
        let (supervisor, _kernel) = supervisor(&[]);
        let completion = supervisor.spawn_and_await("/bin/sh").unwrap();

        supervisor.release(completion.pid());
        assert_eq!(supervisor.running(), 0);
        assert_eq!(completion.exited().await, None);
    }
}
