use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct ProcessSpec<'a> {
    pub entrypoint: &'a str,
    pub tool_name: &'a str,
    pub args: &'a [String],
    pub working_dir: &'a Path,
    pub timeout: Duration,
    pub kill_grace: Duration,
    pub stream_stderr: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Builds `sh -c 'exec <entrypoint> "$@"' <tool> <args...>` so the entrypoint
/// keeps shell word splitting while arguments are passed verbatim.
pub(crate) fn build_command(spec: &ProcessSpec<'_>) -> Command {
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(format!("exec {} \"$@\"", spec.entrypoint))
        .arg(spec.tool_name)
        .args(spec.args)
        .current_dir(spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command
}

pub(crate) fn run_tool_process(spec: &ProcessSpec<'_>) -> std::io::Result<ProcessOutput> {
    let mut child = build_command(spec).spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("missing stdout pipe"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("missing stderr pipe"))?;

    let stdout_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = BufReader::new(stdout).read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    });
    let stream_stderr = spec.stream_stderr;
    let stderr_reader = thread::spawn(move || {
        let mut captured = String::new();
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    if stream_stderr {
                        eprint!("{text}");
                    }
                    captured.push_str(&text);
                }
            }
        }
        captured
    });

    let start = Instant::now();
    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            // Background children of the tool would hold the pipes open.
            kill_leftovers(&child);
            break status;
        }
        if start.elapsed() >= spec.timeout {
            timed_out = true;
            break terminate(&mut child, spec.kill_grace)?;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    Ok(ProcessOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        timed_out,
    })
}

#[cfg(unix)]
fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    let group = -(child.id() as i32);
    // SAFETY: signalling a process group we created; no memory is shared.
    unsafe {
        libc::kill(group, libc::SIGINT);
    }
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            signal_group(group, libc::SIGKILL);
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }
    signal_group(group, libc::SIGKILL);
    child.wait()
}

#[cfg(unix)]
fn signal_group(group: i32, signal: libc::c_int) {
    // SAFETY: see `terminate`.
    unsafe {
        libc::kill(group, signal);
    }
}

#[cfg(unix)]
fn kill_leftovers(child: &Child) {
    signal_group(-(child.id() as i32), libc::SIGKILL);
}

#[cfg(not(unix))]
fn kill_leftovers(_child: &Child) {}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _grace: Duration) -> std::io::Result<ExitStatus> {
    let _ = child.kill();
    child.wait()
}
