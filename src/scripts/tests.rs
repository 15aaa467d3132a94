use super::*;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fs;
use std::os::unix::fs::PermissionsExt;

#[test]
fn contents_start_with_shebang_pair() {
    let script = Script::new("main", "bash", "echo hi\n");
    assert_eq!(script.contents(), "#!/usr/bin/env bash\n\necho hi\n");
    let python = Script::new("main", "python3 -u", "print(1)");
    assert!(python
        .contents()
        .starts_with("#!/usr/bin/env -S python3 -u\n\n"));
}

#[test]
fn prepend_stacks_prefixes_and_shifts_body_lines() {
    let mut script = Script::new("main", "bash", "false\n");
    assert_eq!(script.offset_lines(), 2);
    script.prepend("set -e");
    script.prepend("one\ntwo\n");
    assert_eq!(script.prefix(), "one\ntwo\nset -e\n");
    assert_eq!(script.offset_lines(), 5);
    assert_eq!(script.body_line(6), Some(1));
    assert_eq!(script.body_line(5), None);
}

#[test]
fn env_name_and_shell_detection() {
    let script = Script::new("track-progress", "/bin/bash -e", "");
    assert_eq!(script.env_name(), "SCRIPT_TRACK_PROGRESS");
    assert_eq!(script.interpreter().as_deref(), Some("bash"));
    assert!(script.is_shell_like());
    assert!(!Script::new("main", "ruby", "").is_shell_like());
}

#[test]
fn materialise_writes_executable_files_and_cleans_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manager = ScriptManager::new(dir.path());
    manager.set_base(Script::new("Main", "sh", "echo base"));
    manager.add_aux(Script::new("helper", "sh", "echo helper"));
    manager.materialise_all().expect("materialise");

    let base = manager.base().and_then(Script::path).expect("base path").to_path_buf();
    let name = base.file_name().expect("file name").to_string_lossy().into_owned();
    assert!(name.starts_with("rd-main-"), "{name}");
    let mode = fs::metadata(&base).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
    assert_eq!(
        fs::read_to_string(&base).expect("read"),
        "#!/usr/bin/env sh\n\necho base\n"
    );

    let refs = manager.env_refs();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].0, "SCRIPT_MAIN");
    assert_eq!(refs[1].0, "SCRIPT_HELPER");

    manager.remove_all();
    assert!(!base.exists());
}

#[test]
fn wrapping_keeps_the_original_reachable() {
    let mut manager = ScriptManager::in_temp_dir();
    manager.set_base(Script::new("main", "bash", "true"));
    manager.wrap_base(Script::new("tracker", "bash", "exec \"$SCRIPT_MAIN\""));
    assert_eq!(manager.base().map(Script::name), Some("tracker"));
    assert_eq!(manager.original().map(Script::name), Some("main"));
    assert_eq!(manager.scripts().len(), 2);
}

#[test]
fn missing_interpreter_is_reported() {
    let err = find_interpreter("definitely-not-an-interpreter-xyz").expect_err("missing");
    assert!(err.downcast_ref::<InterpreterNotFound>().is_some());
    assert!(find_interpreter("sh").is_ok());
}

#[test]
fn comment_to_control_rewrites_marked_comments() {
    let rewritten = comment_to_control("#> Do something\nrun_me\n# plain\n", false);
    let encoded = STANDARD.encode("Do something");
    let expected = format!(
        "printf '\\033]R;SETSPINNER %s\\234' '{encoded}'\nrun_me\n# plain\n"
    );
    assert_eq!(rewritten, expected);
}

#[test]
fn comment_to_control_all_comments_keeps_shebangs_and_indent() {
    let rewritten = comment_to_control("#!/bin/sh\n  # Step one\necho", true);
    let lines: Vec<&str> = rewritten.lines().collect();
    assert_eq!(lines[0], "#!/bin/sh");
    assert!(lines[1].starts_with("  printf '\\033]R;SETSPINNER"));
    assert_eq!(lines[2], "echo");
    assert!(!rewritten.ends_with('\n'));
}

#[test]
fn env_capture_prefix_dumps_twice() {
    let prefix = env_capture_prefix();
    assert_eq!(prefix.matches("__rd_envdump").count(), 3);
    assert!(prefix.contains("echo ENVDUMP"));
    assert!(prefix.contains("\"$RDRPC\""));
    assert!(prefix.contains("trap"));
}

#[test]
fn progress_wrapper_reports_start_and_end() {
    let wrapper = progress_wrapper("build", "SCRIPT_MAIN");
    assert!(wrapper.contains("echo \"build START\" > \"$RDRPC\""));
    assert!(wrapper.contains("\"$SCRIPT_MAIN\" \"$@\""));
    assert!(wrapper.contains("echo \"build END $__rd_status\""));
}
