use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;

fn renderer() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pdf-renderer"));
    cmd.env_remove("PORT")
        .env_remove("CHROME_PATH")
        .env_remove("PDF_RENDERER_CONFIG")
        .env("RUST_LOG", "info");
    cmd
}

#[test]
fn invalid_config_exits_with_code_two() {
    let dir = TempDir::new().expect("tempdir");
    let cfg_path = dir.path().join("renderer.toml");
    std::fs::write(&cfg_path, "port = \"eighty\"\n").expect("write config");

    let status = renderer()
        .args(["--config", cfg_path.to_str().unwrap()])
        .status()
        .expect("run pdf-renderer");
    assert_eq!(status.code(), Some(2));
}

#[test]
fn invalid_port_env_exits_with_code_two() {
    let status = renderer()
        .env("PORT", "not-a-port")
        .args(["--engine", "scripted"])
        .status()
        .expect("run pdf-renderer");
    assert_eq!(status.code(), Some(2));
}

#[cfg(feature = "chromium")]
#[test]
fn eager_launch_failure_exits_with_code_one() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("no-such-chrome");

    let status = renderer()
        .env("CHROME_PATH", &missing)
        .args(["--host", "127.0.0.1", "--port", "0"])
        .status()
        .expect("run pdf-renderer");
    assert_eq!(status.code(), Some(1));
}

#[cfg(unix)]
#[test]
fn sigterm_shuts_down_cleanly() {
    let mut child = renderer()
        .args(["--engine", "scripted", "--host", "127.0.0.1", "--port", "0"])
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn pdf-renderer");

    let stderr = child.stderr.take().expect("stderr");
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if line.contains("listening") {
                let _ = tx.send(());
            }
        }
    });
    rx.recv_timeout(Duration::from_secs(30))
        .expect("server never reported listening");

    let killed = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .expect("send SIGTERM");
    assert!(killed.success());

    let status = child.wait().expect("wait for pdf-renderer");
    assert_eq!(status.code(), Some(0));
}
