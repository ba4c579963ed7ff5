//! Integration tests for loading unit directories

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use sysinit::units::{build_graph, find_cycles, Builtin, RestartPolicy, StartAction};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/sysinit-test-{}-{}", std::process::id(), id));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_unit(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

#[test]
fn test_loads_only_unit_files() {
    let dir = unique_test_dir();
    write_unit(&dir, "sshd.service", "[Service]\nExecStart=/usr/sbin/sshd -D\nRestart=always\n");
    write_unit(&dir, "multi-user.target", "[Unit]\nWants=sshd.service\n");
    write_unit(&dir, "tmp.mount", "[Mount]\nWhat=tmpfs\n");
    write_unit(&dir, "README", "not a unit");
    fs::create_dir_all(dir.join("multi-user.target.wants")).unwrap();

    let graph = build_graph(&[dir]);

    assert_eq!(graph.disk_len(), 2);
    assert!(!graph.contains("tmp.mount"));

    let sshd = graph.get("sshd.service").unwrap();
    assert_eq!(sshd.exec_start(), Some("/usr/sbin/sshd -D"));
    assert_eq!(sshd.restart, RestartPolicy::Always);

    let target = graph.get("multi-user.target").unwrap();
    assert_eq!(target.start, StartAction::Reach);
    assert!(target.dependencies.contains("sshd.service"));
}

#[test]
fn test_missing_directory_is_empty() {
    let graph = build_graph(&[PathBuf::from("/nonexistent/sysinit-units")]);
    assert_eq!(graph.disk_len(), 0);
    // Built-ins are always present
    assert!(graph.contains("mounts"));
    assert!(graph.contains("plymouth-quit.service"));
}

#[test]
fn test_first_directory_wins() {
    let system = unique_test_dir();
    let user = unique_test_dir();
    write_unit(&system, "app.service", "[Service]\nExecStart=/usr/bin/app --system\n");
    write_unit(&user, "app.service", "[Service]\nExecStart=/usr/bin/app --user\n");

    let graph = build_graph(&[system, user]);
    assert_eq!(
        graph.get("app.service").unwrap().exec_start(),
        Some("/usr/bin/app --system")
    );
}

#[test]
fn test_builtin_shadows_unit_file() {
    let dir = unique_test_dir();
    write_unit(&dir, "systemd-user-sessions.service", "[Service]\nExecStart=/bin/false\n");

    let graph = build_graph(&[dir]);
    let unit = graph.get("systemd-user-sessions.service").unwrap();
    assert_eq!(unit.start, StartAction::Builtin(Builtin::UserSessions));
}

#[test]
fn test_dot_lists_only_unit_files() {
    let dir = unique_test_dir();
    write_unit(&dir, "A", "[Unit]\nRequires=B\n");
    write_unit(&dir, "a.service", "[Unit]\nRequires=b.service\n");
    write_unit(&dir, "b.service", "[Service]\nExecStart=/bin/b\n");

    let dot = build_graph(&[dir]).to_dot();

    assert_eq!(
        dot,
        "digraph systemd {\n\
         \x20 rankdir=LR;\n\
         \x20 node [shape=box, style=filled, fillcolor=lightgrey];\n\
         \x20 \"a.service\";\n\
         \x20 \"a.service\" -> \"b.service\";\n\
         \x20 \"b.service\";\n\
         }\n"
    );
}

#[test]
fn test_cycle_across_files() {
    let dir = unique_test_dir();
    write_unit(&dir, "a.service", "[Unit]\nAfter=b.service\n");
    write_unit(&dir, "b.service", "[Unit]\nWants=a.service\n");
    write_unit(&dir, "c.target", "[Unit]\nRequires=a.service dbus\n");

    let graph = build_graph(&[dir]);
    assert_eq!(find_cycles(&graph), vec![vec!["a.service", "b.service"]]);
}
