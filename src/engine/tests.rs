use super::execute::{classify, host_error_for, save_key, spinner_title, Classified};
use super::*;
use crate::annotation::{AnnotationSet, Flag, Param};
use crate::config::SpinnerMode;
use crate::pty_session::TerminalModeError;
use crate::scripts::{Script, ScriptManager};
use crate::writer::SharedBuffer;

fn config() -> EngineConfig {
    EngineConfig {
        working_dir: std::env::temp_dir(),
        spinner: SpinnerMode::Silent,
        cols: Some(80),
        color: false,
        ..EngineConfig::default()
    }
}

fn engine_with(config: EngineConfig) -> (Engine, SharedBuffer) {
    let buffer = SharedBuffer::new();
    let engine = Engine::with_output(config, SharedWriter::new(Box::new(buffer.clone())));
    (engine, buffer)
}

fn run(document: &str) -> (Engine, RunOutcome, String) {
    let (mut engine, buffer) = engine_with(config());
    let outcome = engine.run_document(document);
    (engine, outcome, buffer.contents_lossy())
}

fn outputs(engine: &Engine) -> Vec<&str> {
    engine
        .records()
        .iter()
        .map(|record| record.output.as_str())
        .collect()
}

fn flags(names: &[Flag]) -> AnnotationSet {
    let mut set = AnnotationSet::new();
    for flag in names {
        set.insert_flag(*flag);
    }
    set
}

#[test]
fn prose_renders_and_block_output_is_captured() {
    let (engine, outcome, rendered) = run("Hi\n\n```bash\necho \"Hello there\"\n```\n");
    assert!(matches!(outcome, RunOutcome::Completed), "{outcome:?}");
    assert!(rendered.contains("Hi"));
    let record = &engine.records()[0];
    assert_eq!(record.exit_code, 0);
    assert!(record.output.contains("Hello there\n"));
    assert_eq!(record.state, SpinnerState::Success);
}

#[test]
fn failing_block_reports_masked_output_and_location() {
    let (engine, outcome, rendered) = run("```bash\nsome_invalid_command\n```\n");
    assert_eq!(outcome.exit_code(), 127);
    assert_eq!(
        engine.records()[0].output,
        "SCRIPT: line 3: some_invalid_command: command not found\n"
    );
    let RunOutcome::Failed(report) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(report.document_line, 2);
    match &report.error {
        ParsedError::Located(location) => {
            assert_eq!(location.line, 1);
            assert_eq!(location.message, "some_invalid_command: command not found");
        }
        other => panic!("expected a located error, got {other:?}"),
    }
    assert!(rendered.contains("Code block at line 2 failed with exit code 127"));
    assert!(rendered.contains("▶1 │ some_invalid_command"));
}

#[test]
fn env_flag_captures_only_changed_variables() {
    let (engine, outcome, _) = run("```bash env\nexport NEW_VALUE=TRUE\n```\n");
    assert!(outcome.is_success(), "{outcome:?}");
    let expected: BTreeMap<String, String> =
        [("NEW_VALUE".to_string(), "TRUE".to_string())].into();
    assert_eq!(engine.records()[0].env, expected);
    assert_eq!(engine.env().get("NEW_VALUE").map(String::as_str), Some("TRUE"));
}

#[test]
fn captured_env_reaches_later_blocks() {
    let (engine, outcome, _) = run(
        "```bash env\nexport RD_CARRIED=yes\n```\n\n```bash\necho \"carried=$RD_CARRIED\"\n```\n",
    );
    assert!(outcome.is_success(), "{outcome:?}");
    assert!(outputs(&engine)[1].contains("carried=yes"));
}

#[test]
fn control_comments_retitle_the_spinner() {
    let (engine, outcome, _) = run(
        "```bash\nrun_me() { echo ran; }\n#> Do something\nrun_me\n```\n",
    );
    assert!(outcome.is_success(), "{outcome:?}");
    let record = &engine.records()[0];
    assert_eq!(record.title, "Do something");
    assert!(record.output.contains("ran"));
    assert!(!record.raw_output.contains("SETSPINNER"));
}

#[test]
fn skip_on_success_jumps_to_next_heading() {
    let (engine, outcome, _) = run(
        "# A\n\n```bash skip-on-success\ntrue\n```\n\n```bash\necho never\n```\n\n# B\n\n```bash\necho after\n```\n",
    );
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(engine.records().len(), 2);
    assert_eq!(engine.records()[0].state, SpinnerState::Skipped);
    assert!(outputs(&engine)[1].contains("after"));
}

#[test]
fn skip_on_failure_jumps_and_keeps_going() {
    let (engine, outcome, _) = run(
        "## A\n\n```bash skip-on-failure\nexit 1\n```\n\n```bash\necho never\n```\n\n## B\n\n```bash\necho after\n```\n",
    );
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(engine.records().len(), 2);
    assert!(outputs(&engine)[1].contains("after"));
}

#[test]
fn stop_ok_ends_the_run_successfully() {
    let (engine, outcome, _) =
        run("```bash stop-ok\ntrue\n```\n\n```bash\necho never\n```\n");
    assert!(matches!(outcome, RunOutcome::Stopped { code: 0 }), "{outcome:?}");
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(engine.records().len(), 1);
}

#[test]
fn stop_fail_keeps_the_child_exit_code() {
    let (_, outcome, rendered) = run("```bash stop-fail\nexit 4\n```\n");
    assert!(matches!(outcome, RunOutcome::Stopped { code: 4 }), "{outcome:?}");
    assert_eq!(outcome.exit_code(), 4);
    assert!(!rendered.contains("failed with exit code"));
}

#[test]
fn abort_uses_its_own_exit_code() {
    let (engine, outcome, _) =
        run("```bash abort\nexit 3\n```\n\n```bash\necho never\n```\n");
    assert!(matches!(outcome, RunOutcome::Aborted { code: 3 }), "{outcome:?}");
    assert_eq!(outcome.exit_code(), EXIT_ABORTED);
    assert_eq!(engine.records().len(), 1);
}

#[test]
fn ignore_failure_continues_with_error_state() {
    let (engine, outcome, _) =
        run("```bash ignore-failure\nexit 2\n```\n\n```bash\necho next\n```\n");
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(engine.records()[0].exit_code, 2);
    assert_eq!(engine.records()[0].state, SpinnerState::Error);
    assert!(outputs(&engine)[1].contains("next"));
}

#[test]
fn setup_blocks_run_once() {
    let (engine, outcome, _) = run(
        "# Top\n\n```bash setup\necho setup-ran\n```\n\n## One\n\n```bash\necho one\n```\n\n## Two\n\n```bash\necho two\n```\n",
    );
    assert!(outcome.is_success(), "{outcome:?}");
    let outputs = outputs(&engine);
    assert_eq!(outputs.len(), 3);
    assert_eq!(
        outputs.iter().filter(|out| out.contains("setup-ran")).count(),
        1
    );
}

#[test]
fn section_runs_ancestor_setups_and_stops_at_next_sibling() {
    let mut cfg = config();
    cfg.section = Some("tgt".into());
    let (mut engine, _) = engine_with(cfg);
    let outcome = engine.run_document(
        "# Top\n\n```bash setup\necho top-setup\n```\n\n## Skipped\n\n```bash\necho skipped-section\n```\n\n## Target <r label=tgt/>\n\n```bash\necho target\n```\n\n# Other\n\n```bash\necho other\n```\n",
    );
    assert!(outcome.is_success(), "{outcome:?}");
    let outputs = outputs(&engine);
    assert_eq!(outputs.len(), 2);
    assert!(outputs[0].contains("top-setup"));
    assert!(outputs[1].contains("target"));
}

#[test]
fn unknown_section_is_a_host_error() {
    let (mut engine, _) = engine_with(config());
    let segments = segments::build("# Only\n");
    let outcome = engine.run_section(&segments, "missing");
    assert!(matches!(
        outcome,
        RunOutcome::HostError {
            kind: HostErrorKind::UnknownSection,
            ..
        }
    ));
    assert_eq!(outcome.exit_code(), EXIT_HOST_ERROR);
}

#[test]
fn missing_interpreter_is_a_host_error() {
    let (engine, outcome, _) = run("```rd-no-such-interpreter\nanything\n```\n");
    assert!(matches!(
        outcome,
        RunOutcome::HostError {
            kind: HostErrorKind::InterpreterNotFound,
            ..
        }
    ));
    assert!(engine.records().is_empty());
}

#[test]
fn host_errors_keep_their_typed_kind() {
    let kind_of = |outcome: SegmentOutcome| match outcome {
        SegmentOutcome::HostError { kind, .. } => kind,
        other => panic!("expected a host error, got {other:?}"),
    };
    let raw_mode = anyhow::Error::new(TerminalModeError(std::io::Error::other("not a tty")))
        .context("running block");
    assert_eq!(
        kind_of(host_error_for(raw_mode, HostErrorKind::Pty)),
        HostErrorKind::Terminal
    );
    assert_eq!(
        kind_of(host_error_for(anyhow::anyhow!("openpty failed"), HostErrorKind::Pty)),
        HostErrorKind::Pty
    );
}

#[test]
fn tag_directly_above_a_fence_runs_the_block() {
    let (engine, outcome, _) = run("<r nospin/>\n```bash\necho hi\n```\n");
    assert!(matches!(outcome, RunOutcome::Completed), "{outcome:?}");
    assert_eq!(engine.records().len(), 1);
    assert!(engine.records()[0].output.contains("hi"));
}

#[test]
fn save_binds_the_file_for_later_blocks() {
    let (engine, outcome, _) = run(
        "```text save=greeting.txt\nhello\n```\n\n```bash\ncat \"$GREETING\"\n```\n",
    );
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(engine.records().len(), 1);
    assert_eq!(engine.records()[0].output, "hello\n");
}

#[test]
fn block_without_language_is_only_shown() {
    let (engine, outcome, rendered) = run("```\nplain listing\n```\n");
    assert!(outcome.is_success());
    assert!(engine.records().is_empty());
    assert!(rendered.contains("plain listing"));
}

#[test]
fn norun_reveal_substitutes_known_variables() {
    let mut cfg = config();
    cfg.env.insert("RD_NAME".into(), "world".into());
    let (mut engine, buffer) = engine_with(cfg);
    let outcome = engine.run_document("```bash norun reveal sub-env\necho hello $RD_NAME\n```\n");
    assert!(outcome.is_success(), "{outcome:?}");
    assert!(engine.records().is_empty());
    assert!(buffer.contents_lossy().contains("echo hello world"));
}

#[test]
fn norun_reveal_fails_on_unresolved_variables() {
    let (_, outcome, rendered) =
        run("```bash norun reveal sub-env\necho $RD_SURELY_UNSET_VARIABLE\n```\n");
    let RunOutcome::Failed(report) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(
        report.error,
        ParsedError::Opaque("unresolved variables: RD_SURELY_UNSET_VARIABLE".into())
    );
    assert!(rendered.contains("unresolved variables"));
}

#[test]
fn norun_without_reveal_emits_nothing() {
    let (engine, outcome, rendered) = run("```bash norun\necho hidden-body\n```\n");
    assert!(outcome.is_success());
    assert!(engine.records().is_empty());
    assert!(!rendered.contains("hidden-body"));
}

#[test]
fn classification_follows_flags() {
    let none = AnnotationSet::new();
    assert_eq!(classify(0, &none), (Classified::Continue, SpinnerState::Success));
    assert_eq!(classify(1, &none), (Classified::Fail, SpinnerState::Error));
    assert_eq!(
        classify(0, &flags(&[Flag::SkipOnSuccess])),
        (Classified::Skip, SpinnerState::Skipped)
    );
    assert_eq!(
        classify(1, &flags(&[Flag::SkipOnSuccess])),
        (Classified::Continue, SpinnerState::Skipped)
    );
    assert_eq!(
        classify(0, &flags(&[Flag::SkipOnFailure])),
        (Classified::Continue, SpinnerState::Success)
    );
    assert_eq!(
        classify(1, &flags(&[Flag::SkipOnFailure])),
        (Classified::Skip, SpinnerState::Skipped)
    );
    assert_eq!(
        classify(1, &flags(&[Flag::IgnoreFailure])),
        (Classified::Continue, SpinnerState::Error)
    );
    assert_eq!(
        classify(1, &flags(&[Flag::Abort])),
        (Classified::Abort, SpinnerState::Error)
    );
    assert_eq!(
        classify(0, &flags(&[Flag::StopOk])),
        (Classified::Stop, SpinnerState::Success)
    );
    assert_eq!(
        classify(1, &flags(&[Flag::StopFail])),
        (Classified::Stop, SpinnerState::Error)
    );
}

#[test]
fn spinner_title_prefers_parameter_then_named_comment() {
    let mut set = flags(&[Flag::Named]);
    assert_eq!(spinner_title(&set, "#!/bin/bash\n# Build it\nmake\n"), "Build it");
    assert_eq!(spinner_title(&AnnotationSet::new(), "# Build it\n"), "Running");
    set.insert_param(Param::Spinner, "Custom");
    assert_eq!(spinner_title(&set, "# Build it\n"), "Custom");
}

#[test]
fn save_key_uses_upper_cased_stem() {
    assert_eq!(save_key("greeting.txt"), "GREETING");
    assert_eq!(save_key("my-config.yaml"), "MY_CONFIG");
    assert_eq!(save_key("dir/notes"), "NOTES");
}

#[test]
fn substitute_reports_unresolved_names() {
    let result = substitute("a=$A b=${B} c=$C", |name| match name {
        "A" => Some("1".into()),
        "B" => Some("2".into()),
        _ => None,
    });
    assert_eq!(result.text, "a=1 b=2 c=$C");
    assert_eq!(result.unresolved, vec!["C".to_string()]);
}

#[test]
fn error_parser_corrects_for_prefix_lines() {
    let mut scripts = ScriptManager::in_temp_dir();
    let mut script = Script::new("main", "bash", "echo ok\nbroken\n");
    script.prepend("one\ntwo\nthree\n");
    scripts.set_base(script);
    scripts.materialise_all().expect("materialise");
    let path = scripts.paths()[0].clone();

    let output = format!("noise\n{path}: line 7: broken: command not found\n");
    let ParsedError::Located(location) = parse_error(&output, &scripts) else {
        panic!("expected a located error");
    };
    assert_eq!(location.line, 2);
    assert_eq!(location.message, "broken: command not found");

    let output = format!("{path}:6: syntax error\n");
    let ParsedError::Located(location) = parse_error(&output, &scripts) else {
        panic!("expected a located error");
    };
    assert_eq!(location.line, 1);

    assert_eq!(
        parse_error("plain failure\n", &scripts),
        ParsedError::Opaque("plain failure\n".into())
    );
}

#[test]
fn error_parser_reads_dash_style_locations() {
    let mut scripts = ScriptManager::in_temp_dir();
    scripts.set_base(Script::new("main", "sh", "echo ok\nnope_cmd\n"));
    scripts.materialise_all().expect("materialise");
    let path = scripts.paths()[0].clone();

    let output = format!("ok\r\n{path}: 4: nope_cmd: not found\r\n");
    let ParsedError::Located(location) = parse_error(&output, &scripts) else {
        panic!("expected a located error");
    };
    assert_eq!(location.line, 2);
    assert_eq!(location.message, "nope_cmd: not found");
}

#[test]
fn substitute_leaves_plain_text_alone() {
    let result = substitute("no references, just $5 and $", |_| None);
    assert_eq!(result.text, "no references, just $5 and $");
    assert!(result.unresolved.is_empty());
}

#[test]
fn failure_report_frames_the_failing_line() {
    let report = FailureReport {
        exit_code: 2,
        document_line: 10,
        source: "a\nb\nc\n".into(),
        output: String::new(),
        error: ParsedError::Located(ErrorLocation {
            script: "main".into(),
            line: 2,
            message: "boom".into(),
        }),
    };
    let text = report.render(40, false);
    assert!(text.starts_with("✖ Code block at line 10 failed with exit code 2\n"));
    assert!(text.contains("│ 1 │ a\n"));
    assert!(text.contains("│▶2 │ b\n"));
    assert!(text.contains("│ 3 │ c\n"));
    assert!(text.ends_with("boom\n"));
}
