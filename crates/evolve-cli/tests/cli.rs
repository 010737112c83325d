use assert_cmd::Command;
use evolve_testkit::{TempRepo, git_available};
use serde_json::Value;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const NEUTRAL_BLOCK: &str = "\
<<<<<<< SEARCH
a = 1
=======
a = 2
>>>>>>> REPLACE
";

const POISON_BLOCK: &str = "\
<<<<<<< SEARCH
a = 1
=======
def complex_func(a,b,c,d):
    if a:
        if b:
            if c:
                if d:
                    return 1
>>>>>>> REPLACE
";

fn evolve(workspace: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("evolve"));
    cmd.current_dir(workspace).env("HOME", workspace).env_remove("RUST_LOG");
    cmd
}

fn run_json(workspace: &Path, args: &[&str]) -> Value {
    let output = evolve(workspace)
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}

#[test]
fn score_command_reports_files_and_total() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("simple_code.py"), "a = 1\n").expect("seed");
    fs::write(
        workspace.path().join("broken.py"),
        "def f(:\n    pass\n",
    )
    .expect("seed");

    let out = run_json(
        workspace.path(),
        &["--json", "score", "simple_code.py", "broken.py"],
    );
    let files = out["files"].as_array().expect("files");
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["path"], "simple_code.py");
    assert!((files[0]["score"].as_f64().unwrap() - 2.1).abs() < 1e-9);
    assert_eq!(files[1]["parsed"], false);
    assert!((files[1]["score"].as_f64().unwrap() - 50.4).abs() < 1e-9);
    assert!((out["total"].as_f64().unwrap() - 52.5).abs() < 1e-9);
}

#[test]
fn score_command_fails_on_missing_file() {
    let workspace = TempDir::new().expect("workspace");
    evolve(workspace.path())
        .args(["score", "nope.py"])
        .assert()
        .failure();
}

#[test]
fn replace_command_applies_neutral_block_from_stdin() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("code.py"), "a = 1\n").expect("seed");

    let output = evolve(workspace.path())
        .args(["--json", "replace", "--file", "code.py"])
        .write_stdin(NEUTRAL_BLOCK)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let out: Value = serde_json::from_slice(&output).expect("json output");

    assert_eq!(out["status"], "applied");
    assert_eq!(out["target_files"][0], "code.py");
    assert_eq!(
        fs::read_to_string(workspace.path().join("code.py")).unwrap(),
        "a = 2\n"
    );
}

#[test]
fn replace_command_rejects_regression_with_distinct_exit_code() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("code.py"), "a = 1\n").expect("seed");
    let block = workspace.path().join("poison.block");
    fs::write(&block, POISON_BLOCK).expect("block");

    let output = evolve(workspace.path())
        .args(["--json", "replace", "--file", "code.py"])
        .arg(&block)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let out: Value = serde_json::from_slice(&output).expect("json output");

    assert_eq!(out["status"], "rejected_by_quality");
    assert!(out["post_toxicity"].as_f64().unwrap() > out["pre_toxicity"].as_f64().unwrap());
    assert_eq!(
        fs::read_to_string(workspace.path().join("code.py")).unwrap(),
        "a = 1\n"
    );
}

#[test]
fn replace_command_fails_on_malformed_block() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("code.py"), "a = 1\n").expect("seed");

    evolve(workspace.path())
        .args(["replace", "--file", "code.py", "-"])
        .write_stdin("<<<<<<< SEARCH\na = 1\n>>>>>>> REPLACE\n")
        .assert()
        .failure();
    assert_eq!(
        fs::read_to_string(workspace.path().join("code.py")).unwrap(),
        "a = 1\n"
    );
}

#[test]
fn human_summary_is_one_line_per_outcome() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("code.py"), "a = 1\n").expect("seed");

    let output = evolve(workspace.path())
        .args(["replace", "--file", "code.py"])
        .write_stdin(NEUTRAL_BLOCK)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert_eq!(text.lines().count(), 1);
    assert!(text.contains("status=applied"));
    assert!(text.contains("files=code.py"));
}

#[test]
fn history_lists_recorded_outcomes() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("code.py"), "a = 1\n").expect("seed");

    evolve(workspace.path())
        .args(["replace", "--file", "code.py"])
        .write_stdin(POISON_BLOCK)
        .assert()
        .code(2);
    evolve(workspace.path())
        .args(["replace", "--file", "code.py"])
        .write_stdin(NEUTRAL_BLOCK)
        .assert()
        .success();

    let all = run_json(workspace.path(), &["--json", "history"]);
    let all = all.as_array().expect("history array");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["status"], "rejected_by_quality");
    assert_eq!(all[1]["status"], "applied");
    assert!(all[1].get("at").is_some());

    let last = run_json(workspace.path(), &["--json", "history", "--limit", "1"]);
    assert_eq!(last.as_array().map(Vec::len), Some(1));
    assert_eq!(last[0]["status"], "applied");
}

#[test]
fn config_command_reflects_layered_settings() {
    let workspace = TempDir::new().expect("workspace");
    let runtime = workspace.path().join(".evolve");
    fs::create_dir_all(&runtime).expect("runtime dir");
    fs::write(
        runtime.join("settings.local.json"),
        r#"{"scoring":{"complexity_weight":3.0},"git":{"timeout_seconds":30}}"#,
    )
    .expect("settings override");

    let out = run_json(workspace.path(), &["--json", "config"]);
    assert_eq!(out["scoring"]["complexity_weight"], 3.0);
    assert_eq!(out["scoring"]["loc_weight"], 0.1);
    assert_eq!(out["git"]["program"], "git");
    assert_eq!(out["git"]["timeout_seconds"], 30);
}

#[test]
fn apply_command_gates_unified_diff_from_file() {
    if !git_available() {
        return;
    }
    let repo = TempRepo::new().expect("repo");
    repo.write("healthy_code.py", "def f(a, b):\n    return a + b\n")
        .expect("seed");
    repo.write(
        "change.patch",
        "\
--- a/healthy_code.py
+++ b/healthy_code.py
@@ -1,2 +1,2 @@
 def f(a, b):
-    return a + b
+    return a * b
",
    )
    .expect("patch");

    let out = run_json(repo.path(), &["--json", "apply", "change.patch"]);
    assert_eq!(out["status"], "applied");
    assert_eq!(out["pre_toxicity"], out["post_toxicity"]);
    assert!(repo.read("healthy_code.py").unwrap().contains("return a * b"));
}

#[test]
fn apply_command_reports_applier_rejection() {
    if !git_available() {
        return;
    }
    let repo = TempRepo::new().expect("repo");
    repo.write("code.py", "a = 1\n").expect("seed");

    let output = evolve(repo.path())
        .args(["--json", "--workspace"])
        .arg(repo.path())
        .arg("apply")
        .write_stdin("this is not a valid patch")
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let out: Value = serde_json::from_slice(&output).expect("json output");
    assert_eq!(out["status"], "rejected_by_applier");
    assert!(out["conflicts"].as_array().is_some_and(|c| !c.is_empty()));
    assert_eq!(repo.read("code.py").unwrap(), "a = 1\n");
}

#[test]
fn gate_run_delivers_telemetry_before_exit() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    listener.set_nonblocking(true).expect("nonblocking");

    let server = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut stream = loop {
            match listener.accept() {
                Ok((stream, _)) => break stream,
                Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                Err(_) => return String::new(),
            }
        };
        stream.set_nonblocking(false).expect("blocking stream");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let mut buf = vec![0_u8; 8192];
        let mut request = String::new();
        while !request.contains("telemetry.outcome") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => request.push_str(&String::from_utf8_lossy(&buf[..n])),
            }
        }
        let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK");
        request
    });

    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join("code.py"), "a = 1\n").expect("seed");
    let runtime = workspace.path().join(".evolve");
    fs::create_dir_all(&runtime).expect("runtime dir");
    fs::write(
        runtime.join("settings.json"),
        format!(r#"{{"telemetry":{{"enabled":true,"endpoint":"http://{addr}/collect"}}}}"#),
    )
    .expect("settings");

    evolve(workspace.path())
        .env("NO_PROXY", "127.0.0.1")
        .args(["replace", "--file", "code.py"])
        .write_stdin(NEUTRAL_BLOCK)
        .assert()
        .success();

    let request = server.join().expect("join server");
    assert!(request.contains("POST /collect"), "no telemetry request arrived");
    assert!(request.contains("telemetry.outcome"));
    assert!(request.contains("\"status\":\"applied\""));
}
