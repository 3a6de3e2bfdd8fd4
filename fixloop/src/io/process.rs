//! Child process execution with a timeout and bounded output capture.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// How long to wait for the output readers once a timed-out command is killed.
const KILL_GRACE: Duration = Duration::from_secs(1);

type StreamResult = Result<(Vec<u8>, usize)>;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run `argv` in `workdir`, killing it once `timeout` elapses.
///
/// stdout and stderr are drained on reader threads while the child runs so a
/// chatty command cannot block on a full pipe. At most `output_limit_bytes`
/// per stream are kept; the rest is counted and discarded.
///
/// On Unix the child leads its own process group, and a timeout kills the
/// whole group so grandchildren (`rustc` under `cargo`) die with it. Output
/// still held open by a straggler is abandoned after a short grace period.
#[instrument(skip_all, fields(program = ?argv.first(), timeout_secs = timeout.as_secs()))]
pub fn run_command(
    argv: &[String],
    workdir: &Path,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(args = ?args, workdir = %workdir.display(), "spawning child process");
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {}", argv.join(" ")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            kill_tree(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    let deadline = timed_out.then(|| Instant::now() + KILL_GRACE);
    let (stdout, stdout_truncated) =
        collect_output(&stdout_rx, deadline).context("collect stdout")?;
    let (stderr, stderr_truncated) =
        collect_output(&stderr_rx, deadline).context("collect stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Kill the child's process group, falling back to the child alone.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => {
            warn!(%errno, "killpg failed, killing child only");
            child.kill().context("kill command")
        }
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<StreamResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone once the output has been abandoned.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

/// Wait for a reader. With a `deadline` (the command was killed), give up on
/// it once the deadline passes and report the stream as empty.
fn collect_output(rx: &Receiver<StreamResult>, deadline: Option<Instant>) -> StreamResult {
    let Some(deadline) = deadline else {
        return rx
            .recv()
            .map_err(|_| anyhow!("output reader thread panicked"))?;
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!("output still held open after kill, abandoning it");
            Ok((Vec::new(), 0))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> StreamResult {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn captures_both_streams() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_command(
            &sh("echo out; echo err >&2"),
            temp.path(),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout_text(), "out\n");
        assert_eq!(output.stderr_text(), "err\n");
        assert!(!output.timed_out);
    }

    #[test]
    fn truncates_beyond_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_command(
            &sh("printf 'abcdefghij' >&2"),
            temp.path(),
            Duration::from_secs(10),
            4,
        )
        .expect("run");
        assert_eq!(output.stderr, b"abcd");
        assert_eq!(output.stderr_truncated, 6);
    }

    #[test]
    fn kills_on_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_command(
            &sh("exec sleep 5"),
            temp.path(),
            Duration::from_millis(100),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn timeout_also_kills_grandchildren() {
        let temp = tempfile::tempdir().expect("tempdir");
        let started = Instant::now();
        let output = run_command(
            &sh("sleep 4; true"),
            temp.path(),
            Duration::from_millis(200),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn timeout_returns_even_if_a_descendant_escapes_the_group() {
        let temp = tempfile::tempdir().expect("tempdir");
        let started = Instant::now();
        let output = run_command(
            &sh("setsid sleep 4 & sleep 4"),
            temp.path(),
            Duration::from_millis(200),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn empty_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run_command(&[], temp.path(), Duration::from_secs(1), 1024).unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }
}
