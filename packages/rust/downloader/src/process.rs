//! Subprocess execution with a hard deadline.

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;
use vidkb_shared::{Result, VidkbError};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const DRAIN_WAIT: Duration = Duration::from_millis(200);

/// Run `program` with `args`, killing it once `timeout` has elapsed.
///
/// A non-zero exit, a missing executable, and a timeout all map to
/// [`VidkbError::Download`] with stderr attached.
pub fn run_with_timeout(program: &str, args: &[String], timeout: Duration) -> Result<Output> {
    let rendered = format!("{program} {}", args.join(" "));
    debug!(command = %rendered, timeout_secs = timeout.as_secs(), "spawning");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VidkbError::Download(format!("{program} not found; install it or set download.ytdlp_path"))
            } else {
                VidkbError::Download(format!("failed to start {program}: {e}"))
            }
        })?;

    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());
    let started_at = Instant::now();

    loop {
        let polled = child
            .try_wait()
            .map_err(|e| VidkbError::Download(format!("waiting on {program}: {e}")))?;

        if let Some(status) = polled {
            let output = Output {
                status,
                stdout: stdout_rx.recv_timeout(DRAIN_WAIT).unwrap_or_default(),
                stderr: stderr_rx.recv_timeout(DRAIN_WAIT).unwrap_or_default(),
            };
            return check_status(&rendered, output);
        }

        if started_at.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            let stderr = stderr_rx.recv_timeout(DRAIN_WAIT).unwrap_or_default();
            return Err(VidkbError::Download(format!(
                "{program} timed out after {}s: {}",
                timeout.as_secs(),
                tail(&String::from_utf8_lossy(&stderr))
            )));
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Read a pipe to the end on a helper thread so the child never blocks on a full buffer.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn check_status(rendered: &str, output: Output) -> Result<Output> {
    if output.status.success() {
        return Ok(output);
    }
    let code = output.status.code().unwrap_or(-1);
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(VidkbError::Download(format!(
        "`{rendered}` exited with status {code}: {}",
        tail(&stderr)
    )))
}

/// Last few lines of tool output; yt-dlp puts the real error at the end.
fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}
