use super::runner::{PreparedCommand, PtyRunner, RunOptions};
use super::stdin::translate_input;
use crate::bus::{EventBus, Subscriber};
use crate::control::ControlMessage;
use crate::writer::SharedBuffer;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};

fn sh(script: &str) -> PreparedCommand {
    PreparedCommand::new("/bin/sh")
        .arg("-c")
        .arg(script)
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .current_dir(std::env::temp_dir())
}

fn run(command: &PreparedCommand, bus: &EventBus) -> (i32, String) {
    let buffer = SharedBuffer::new();
    let code = PtyRunner::new()
        .run(command, vec![Box::new(buffer.clone())], bus, RunOptions::default())
        .expect("run");
    (code, buffer.contents_lossy())
}

#[test]
fn captures_output_through_the_pty() {
    let (code, output) = run(&sh("echo hello; echo world"), &EventBus::new());
    assert_eq!(code, 0);
    assert_eq!(output, "hello\r\nworld\r\n");
}

#[test]
fn reports_exit_codes_and_signals() {
    let (code, _) = run(&sh("exit 3"), &EventBus::new());
    assert_eq!(code, 3);
    let (code, _) = run(&sh("kill -TERM $$"), &EventBus::new());
    assert_eq!(code, 128 + libc::SIGTERM);
}

#[test]
fn child_sees_a_terminal_and_its_environment() {
    let command = sh("[ -t 1 ] && echo tty; echo \"$GREETING\"").env("GREETING", "hi there");
    let (_, output) = run(&command, &EventBus::new());
    assert_eq!(output, "tty\r\nhi there\r\n");
}

#[test]
fn control_sequences_are_published_not_printed() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscriber: Arc<dyn Subscriber> = Arc::new(move |message: &ControlMessage| {
        sink.lock().expect("lock").push(message.clone());
    });
    bus.subscribe(subscriber);
    let (code, output) = run(
        &sh("printf 'a\\033]R;STOPSPINNER\\234b\\n'"),
        &bus,
    );
    assert_eq!(code, 0);
    assert_eq!(output, "ab\r\n");
    assert_eq!(
        seen.lock().expect("lock").as_slice(),
        [ControlMessage::StopSpinner]
    );
}

#[test]
fn missing_working_directory_fails_in_child() {
    let command = sh("true").current_dir("/definitely/not/here");
    let (code, output) = run(&command, &EventBus::new());
    assert_eq!(code, 127);
    assert!(output.contains("chdir failed"));
}

#[test]
fn exit_code_maps_signals_like_a_shell() {
    assert_eq!(super::exit_code(ExitStatus::from_raw(0)), 0);
    assert_eq!(super::exit_code(ExitStatus::from_raw(2 << 8)), 2);
    assert_eq!(super::exit_code(ExitStatus::from_raw(libc::SIGKILL)), 128 + 9);
}

#[test]
fn carriage_returns_become_newlines() {
    assert_eq!(translate_input(b"yes\r"), b"yes\n");
    assert_eq!(translate_input(b"a\nb"), b"a\nb");
}

#[test]
fn env_replaces_existing_keys() {
    let command = PreparedCommand::new("/bin/true")
        .env("A", "1")
        .envs([("A", "2"), ("B", "3")]);
    assert_eq!(command.env_value("A"), Some("2"));
    assert_eq!(command.env_value("B"), Some("3"));
}
