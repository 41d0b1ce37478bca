use super::*;
use crate::classes::demo_library;
use std::time::Duration;
use taskmesh_manager::{GlobalComponentManager, InProcessHub, LocalComponentManager};
use taskmesh_protocols::{Endpoint, GlobalManagerInterface, LocalManagerInterface};

fn offline_shell() -> Shell {
    Shell::new(&ManagerConfig::new("P1")).unwrap()
}

struct Session {
    shell: Arc<Shell>,
    lcm: Arc<LocalComponentManager>,
    _hub: Arc<InProcessHub>,
}

async fn session() -> Session {
    let hub = InProcessHub::new();
    let gcm = Arc::new(GlobalComponentManager::new(hub.clone(), Duration::from_secs(5)));
    let global: Arc<dyn GlobalManagerInterface> = gcm.clone();
    hub.set_global(&global);

    let config = ManagerConfig::new("P1").with_retry(3, Duration::from_millis(20));
    let lcm = LocalComponentManager::start(config, Endpoint::in_process("P1"), global, hub.clone())
        .await
        .unwrap();
    let local: Arc<dyn LocalManagerInterface> = lcm.clone();
    hub.register_local("P1", &local);
    lcm.factory().register_library(demo_library());
    lcm.enable_manager_components(Some(gcm)).await.unwrap();

    let shell = Shell::new(lcm.config())
        .unwrap()
        .with_wait_timeout(WaitTimeout::After(Duration::from_secs(2)));
    lcm.add_component(shell.component().clone()).await.unwrap();
    lcm.connect_services(SHELL_COMPONENT).await.unwrap();
    Session {
        shell: Arc::new(shell),
        lcm,
        _hub: hub,
    }
}

async fn run(shell: &Arc<Shell>, line: &str) -> Result<String, ShellError> {
    let shell = shell.clone();
    let line = line.to_string();
    tokio::task::spawn_blocking(move || shell.execute_line(&line))
        .await
        .unwrap()
}

#[test]
fn test_strip_comment() {
    assert_eq!(strip_comment("list # all of them"), "list ");
    assert_eq!(strip_comment("list // all of them"), "list ");
    assert_eq!(strip_comment("list"), "list");
}

#[test]
fn test_unknown_command() {
    let err = offline_shell().execute_line("frobnicate now").unwrap_err();
    assert_eq!(err.to_string(), "Unknown command: frobnicate");
}

#[test]
fn test_wrong_argument_count_reports_usage() {
    let shell = offline_shell();
    assert!(matches!(
        shell.execute_line("start").unwrap_err(),
        ShellError::Usage { command: "start", .. }
    ));
    assert!(matches!(
        shell.execute_line("connect A Req B").unwrap_err(),
        ShellError::Usage { command: "connect", .. }
    ));
    assert!(matches!(
        shell.execute_line("waitfor").unwrap_err(),
        ShellError::Usage { command: "waitfor", .. }
    ));
}

#[test]
fn test_comments_and_blank_commands_do_nothing() {
    let shell = offline_shell();
    assert_eq!(shell.execute_line("# nothing here").unwrap(), "");
    assert_eq!(shell.execute_line(" ; ;").unwrap(), "");
}

#[test]
fn test_help() {
    let shell = offline_shell();
    let all = shell.execute_line("help").unwrap();
    for command in COMMANDS {
        assert!(all.contains(command.name));
    }
    let one = shell.execute_line("help waitfor").unwrap();
    assert!(one.starts_with("waitfor process [component [state]]"));
}

#[test]
fn test_quit_finishes_the_shell() {
    let shell = offline_shell();
    assert!(!shell.is_finished());
    assert_eq!(shell.execute_line("quit; help").unwrap(), "");
    assert!(shell.is_finished());
    assert!(shell
        .component()
        .wait_for_state(ComponentState::Finished, Duration::from_secs(2)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_drives_components() {
    let s = session().await;

    run(&s.shell, "load demo").await.unwrap();
    let classes = run(&s.shell, "classes").await.unwrap();
    assert_eq!(classes, "Counter\nPrinter");

    run(
        &s.shell,
        r#"create Counter C {"period_ms": 5, "tick_every": 2}; create P1 Printer P"#,
    )
    .await
    .unwrap();
    run(&s.shell, "connect P Input C Counter").await.unwrap();
    run(&s.shell, "start C; start P; waitfor P1 C ACTIVE")
        .await
        .unwrap();

    let listing = run(&s.shell, "list P1").await.unwrap();
    assert!(listing.contains("  C: ACTIVE"));
    assert!(listing.contains("  P: ACTIVE"));

    let connections = run(&s.shell, "connections P1 P").await.unwrap();
    assert!(connections.contains("P1:P:Input -> P1:C:Counter"));

    run(&s.shell, "disconnect P1 P Input P1 C Counter")
        .await
        .unwrap();
    assert!(run(&s.shell, "connections P1 P").await.unwrap().is_empty());

    run(&s.shell, "stop C; waitfor P1 C READY").await.unwrap();
    assert_eq!(s.lcm.component("C").unwrap().state(), ComponentState::Ready);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_errors_leave_the_shell_usable() {
    let s = session().await;

    let err = run(&s.shell, "create NoSuchClass X").await.unwrap_err();
    assert!(matches!(err, ShellError::Manager(ManagerError::ClassNotFound(_))));

    let err = run(&s.shell, "waitfor P1 Ghost").await.unwrap_err();
    assert!(matches!(err, ShellError::Timeout(_)));

    let err = run(&s.shell, "load demo; create Counter C {oops}")
        .await
        .unwrap_err();
    assert!(matches!(err, ShellError::InvalidArgument(_)));

    run(&s.shell, "create Counter C").await.unwrap();
    assert!(s.lcm.component("C").is_some());

    let err = run(&s.shell, "waitfor P1 C ACTIVE").await.unwrap_err();
    assert!(err.to_string().ends_with("(last known state CONSTRUCTED)"));
}
