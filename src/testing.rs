//! In-memory kernel and host used by unit tests

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Instant;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::pid1::{ExitStatus, Host, HostError, Kernel, NetworkError, RebootCommand, SpawnError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    Spawn(Vec<String>),
    WaitBlocking(Pid),
    SignalAll(Signal),
    Sync,
    Reboot(RebootCommand),
}

/// Records every call; children only exit when told to
pub struct FakeKernel {
    next_pid: Cell<i32>,
    live: RefCell<BTreeSet<Pid>>,
    exits: RefCell<VecDeque<(Pid, ExitStatus)>>,
    spawned: RefCell<Vec<(Pid, Vec<String>)>>,
    spawn_times: RefCell<Vec<(String, Instant)>>,
    auto_exit: RefCell<HashMap<String, ExitStatus>>,
    blocking_status: Cell<ExitStatus>,
    wait_error: Cell<Option<Errno>>,
    events: RefCell<Vec<KernelEvent>>,
}

impl FakeKernel {
    pub fn new() -> Self {
        Self {
            next_pid: Cell::new(100),
            live: RefCell::new(BTreeSet::new()),
            exits: RefCell::new(VecDeque::new()),
            spawned: RefCell::new(Vec::new()),
            spawn_times: RefCell::new(Vec::new()),
            auto_exit: RefCell::new(HashMap::new()),
            blocking_status: Cell::new(ExitStatus::Exited(0)),
            wait_error: Cell::new(None),
            events: RefCell::new(Vec::new()),
        }
    }

    /// Make every spawn of `program` exit immediately with `status`
    pub fn auto_exit(&self, program: &str, status: ExitStatus) {
        self.auto_exit.borrow_mut().insert(program.to_string(), status);
    }

    /// Status returned by `wait_blocking`
    pub fn set_blocking_status(&self, status: ExitStatus) {
        self.blocking_status.set(status);
    }

    /// Fail the next `try_wait_any` with `errno`
    pub fn fail_next_wait(&self, errno: Errno) {
        self.wait_error.set(Some(errno));
    }

    /// Queue an exit for `pid`
    pub fn exit(&self, pid: Pid, status: ExitStatus) {
        self.live.borrow_mut().remove(&pid);
        self.exits.borrow_mut().push_back((pid, status));
    }

    /// Most recent pid spawned for `program`
    pub fn last_pid(&self, program: &str) -> Option<Pid> {
        self.spawned
            .borrow()
            .iter()
            .rev()
            .find(|(_, argv)| argv[0] == program)
            .map(|(pid, _)| *pid)
    }

    pub fn spawn_count(&self, program: &str) -> usize {
        self.spawned
            .borrow()
            .iter()
            .filter(|(_, argv)| argv[0] == program)
            .count()
    }

    /// argv[0] of every spawn, in order
    pub fn spawned_programs(&self) -> Vec<String> {
        self.spawned
            .borrow()
            .iter()
            .map(|(_, argv)| argv[0].clone())
            .collect()
    }

    /// When `program` was first spawned
    pub fn first_spawned_at(&self, program: &str) -> Option<Instant> {
        self.spawn_times
            .borrow()
            .iter()
            .find(|(name, _)| name == program)
            .map(|(_, at)| *at)
    }

    pub fn events(&self) -> Vec<KernelEvent> {
        self.events.borrow().clone()
    }
}

impl Kernel for FakeKernel {
    fn spawn(&self, argv: &[String], _envp: &[String]) -> Result<Pid, SpawnError> {
        if argv.is_empty() {
            return Err(SpawnError::EmptyCommand);
        }
        let pid = Pid::from_raw(self.next_pid.get());
        self.next_pid.set(pid.as_raw() + 1);

        self.events.borrow_mut().push(KernelEvent::Spawn(argv.to_vec()));
        self.spawned.borrow_mut().push((pid, argv.to_vec()));
        self.spawn_times
            .borrow_mut()
            .push((argv[0].clone(), Instant::now()));
        self.live.borrow_mut().insert(pid);

        let auto = self.auto_exit.borrow().get(&argv[0]).copied();
        if let Some(status) = auto {
            self.exit(pid, status);
        }
        Ok(pid)
    }

    fn try_wait_any(&self) -> nix::Result<Option<(Pid, ExitStatus)>> {
        if let Some(errno) = self.wait_error.take() {
            return Err(errno);
        }
        if let Some(exit) = self.exits.borrow_mut().pop_front() {
            return Ok(Some(exit));
        }
        if self.live.borrow().is_empty() {
            return Err(Errno::ECHILD);
        }
        Ok(None)
    }

    fn wait_blocking(&self, pid: Pid) -> nix::Result<ExitStatus> {
        self.events.borrow_mut().push(KernelEvent::WaitBlocking(pid));
        self.live.borrow_mut().remove(&pid);
        self.exits.borrow_mut().retain(|(p, _)| *p != pid);
        Ok(self.blocking_status.get())
    }

    fn signal_all(&self, signal: Signal) -> nix::Result<()> {
        self.events.borrow_mut().push(KernelEvent::SignalAll(signal));
        Ok(())
    }

    fn sync(&self) {
        self.events.borrow_mut().push(KernelEvent::Sync);
    }

    fn reboot(&self, cmd: RebootCommand) -> nix::Result<()> {
        self.events.borrow_mut().push(KernelEvent::Reboot(cmd));
        Ok(())
    }
}

/// Records which setup steps ran
#[derive(Default)]
pub struct FakeHost {
    calls: RefCell<Vec<String>>,
    failing: RefCell<HashSet<&'static str>>,
    executables: RefCell<HashSet<PathBuf>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named step ("mount_all", "network_start", ...) fail
    pub fn fail(&self, step: &'static str) {
        self.failing.borrow_mut().insert(step);
    }

    pub fn add_executable(&self, path: &str) {
        self.executables.borrow_mut().insert(PathBuf::from(path));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, step: &'static str) -> Result<(), HostError> {
        self.calls.borrow_mut().push(step.to_string());
        if self.failing.borrow().contains(step) {
            return Err(NetworkError::Status(1).into());
        }
        Ok(())
    }
}

impl Host for FakeHost {
    fn mount_all(&self) -> Result<(), HostError> {
        self.record("mount_all")
    }

    fn network_start(&self) -> Result<(), HostError> {
        self.record("network_start")
    }

    fn set_hostname(&self) -> Result<(), HostError> {
        self.record("set_hostname")
    }

    fn ensure_dir(&self, path: &Path) -> Result<(), HostError> {
        self.calls
            .borrow_mut()
            .push(format!("ensure_dir {}", path.display()));
        Ok(())
    }

    fn is_executable(&self, path: &Path) -> bool {
        self.executables.borrow().contains(path)
    }
}
