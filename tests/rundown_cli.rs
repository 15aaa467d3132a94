use std::fs;
use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn rundown_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_rundown").expect("rundown test binary not built")
}

fn document(body: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("doc.md"), body).expect("write document");
    dir
}

fn run_document(dir: &tempfile::TempDir, extra: &[&str]) -> std::process::Output {
    Command::new(rundown_bin())
        .arg(dir.path().join("doc.md"))
        .args(["--nospin", "--no-color", "--no-logs"])
        .args(extra)
        .output()
        .expect("run rundown")
}

#[test]
fn rundown_help_mentions_markdown() {
    let output = Command::new(rundown_bin())
        .arg("--help")
        .output()
        .expect("run rundown --help");
    assert!(output.status.success());
    assert!(combined_output(&output).contains("Markdown"));
}

#[test]
fn rundown_rejects_missing_document() {
    let output = Command::new(rundown_bin())
        .arg("/definitely/not/here.md")
        .output()
        .expect("run rundown");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("document not found"));
}

#[test]
fn rundown_dump_segments_prints_json() {
    let dir = document("# Title\n\n```bash nospin\necho hi\n```\n");
    let output = run_document(&dir, &["--dump-segments"]);
    assert!(output.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("segments are JSON");
    let segments = parsed["segments"].as_array().expect("segment array");
    assert!(segments.iter().any(|segment| segment.get("Heading").is_some()));
    assert!(segments.iter().any(|segment| segment.get("Code").is_some()));
}

#[test]
fn rundown_runs_blocks_in_working_directory() {
    let dir = document("Intro text\n\n```bash stdout\necho \"from $(basename \"$PWD\")\"\n```\n");
    let name = dir
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .expect("dir name")
        .to_string();
    let output = run_document(&dir, &[]);
    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Intro text"));
    assert!(stdout.contains(&format!("from {name}")));
}

#[test]
fn rundown_exits_with_the_failing_block_code() {
    let dir = document("```bash\nexit 7\n```\n\n```bash stdout\necho unreachable\n```\n");
    let output = run_document(&dir, &[]);
    assert_eq!(output.status.code(), Some(7));
    let combined = combined_output(&output);
    assert!(combined.contains("failed with exit code 7"));
    assert!(!combined.contains("unreachable"));
}

#[test]
fn rundown_env_flag_feeds_blocks() {
    let dir = document("```bash stdout\necho \"value=$GREETING\"\n```\n");
    let output = run_document(&dir, &["--env", "GREETING=hi"]);
    assert!(output.status.success(), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("value=hi"));
}
