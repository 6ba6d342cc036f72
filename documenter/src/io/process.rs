//! Child process execution with a timeout and bounded output capture.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

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
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Stdout followed by stderr as lossy UTF-8, with truncation notices.
    pub fn combined_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        let stderr = String::from_utf8_lossy(&self.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        text
    }
}

/// Run `cmd` for at most `timeout`, keeping up to `output_limit_bytes` of each stream.
///
/// Both pipes are drained on reader threads while the child runs. Bytes past the limit
/// are counted and dropped.
///
/// Spawn failures keep the underlying [`std::io::Error`] in the error chain; see
/// [`is_not_found`].
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    let stdout = spawn_reader(child.stdout.take(), "stdout", output_limit_bytes)?;
    let stderr = spawn_reader(child.stderr.take(), "stderr", output_limit_bytes)?;

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            child.kill().context("kill command")?;
            (child.wait().context("wait command after kill")?, true)
        }
    };

    let stdout = collect(stdout).context("collect stdout")?;
    let stderr = collect(stderr).context("collect stderr")?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_truncated = stdout.dropped,
            stderr_truncated = stderr.dropped,
            "output truncated"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        stdout_truncated: stdout.dropped,
        stderr_truncated: stderr.dropped,
        timed_out,
    })
}

/// True when `err` was caused by the executable not being found.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
}

/// Bytes kept from one stream, plus how many were dropped past the limit.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    dropped: usize,
}

type Reader = thread::JoinHandle<Result<Captured>>;

fn spawn_reader<R>(pipe: Option<R>, name: &str, limit: usize) -> Result<Reader>
where
    R: Read + Send + 'static,
{
    let pipe = pipe.ok_or_else(|| anyhow!("{name} was not piped"))?;
    Ok(thread::spawn(move || capture(pipe, limit)))
}

fn collect(reader: Reader) -> Result<Captured> {
    reader
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn capture<R: Read>(mut pipe: R, limit: usize) -> Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];
    loop {
        let read = pipe.read(&mut chunk).context("read output")?;
        if read == 0 {
            return Ok(captured);
        }
        let keep = read.min(limit.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.dropped += read - keep;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err 1>&2");
        let output =
            run_command_with_timeout(cmd, Duration::from_secs(10), 1024).expect("run command");
        assert!(output.success());
        let text = output.combined_text();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[test]
    fn output_is_bounded() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'abcdefghij'");
        let output =
            run_command_with_timeout(cmd, Duration::from_secs(10), 4).expect("run command");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn slow_command_times_out() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 5");
        let output =
            run_command_with_timeout(cmd, Duration::from_millis(100), 1024).expect("run command");
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[test]
    fn missing_program_is_detected() {
        let cmd = Command::new("definitely-not-a-real-program-4821");
        let err = run_command_with_timeout(cmd, Duration::from_secs(1), 1024).unwrap_err();
        assert!(is_not_found(&err));
    }
}
