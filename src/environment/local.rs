#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::{
    collections::BTreeMap,
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::{Arc, Mutex},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use tracing::{event, Level};

use super::{Environment, EnvironmentError, ExecOutput};

/// How often a running child is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long to keep draining output after the shell exited. Commands that
/// start background processes (`server &`) hand their stdout to a process
/// that outlives the shell, so the pipe might never close.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// An [`Environment`] that runs commands as child processes of this one,
/// rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalEnvironment {
    root: PathBuf,
    vars: BTreeMap<String, String>,
}

impl LocalEnvironment {
    /// Creates a new environment rooted at `root`. The directory is created
    /// the first time a command runs.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalEnvironment {
            root: root.into(),
            vars: BTreeMap::new(),
        }
    }

    /// Set an environment variable for every command.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> (SharedBuf, JoinHandle<()>) {
    let buf: SharedBuf = Arc::new(Mutex::new(Vec::new()));
    let sink = buf.clone();
    let handle = std::thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => match sink.lock() {
                    Ok(mut b) => b.extend_from_slice(&chunk[..n]),
                    Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                },
            }
        }
    });
    (buf, handle)
}

/// Kill the child together with everything it started. The child leads its
/// own process group, so the group id is its pid.
fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("kill -s KILL -- -{}", child.id()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(err) = status {
            event!(Level::WARN, pid = child.id(), "Failed to signal process group: {err}");
        }
    }
    // Best effort, the child may have exited in between.
    let _ = child.kill();
    let _ = child.wait();
}

fn take(buf: &SharedBuf) -> String {
    let bytes = match buf.lock() {
        Ok(b) => b.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

impl Environment for LocalEnvironment {
    fn execute(
        &self,
        command: &str,
        cwd: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, EnvironmentError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
        }
        // `join` keeps absolute paths as they are.
        let dir = cwd.map_or_else(|| self.root.clone(), |c| self.root.join(c));
        event!(Level::DEBUG, cwd = %dir.display(), "Executing: {command}");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&dir)
            .envs(&self.vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EnvironmentError::Unreachable("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EnvironmentError::Unreachable("stderr not captured".to_string()))?;
        let (out_buf, out_handle) = spawn_reader(stdout);
        let (err_buf, err_handle) = spawn_reader(stderr);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    kill_process_group(&mut child);
                    event!(Level::WARN, "Command timed out after {limit:?}: {command}");
                    return Err(EnvironmentError::Timeout {
                        command: command.to_string(),
                        timeout: limit,
                    });
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let drain_deadline = Instant::now() + DRAIN_GRACE;
        while !(out_handle.is_finished() && err_handle.is_finished())
            && Instant::now() < drain_deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }

        let mut output = take(&out_buf);
        output.push_str(&take(&err_buf));

        Ok(ExecOutput {
            returncode: status.code().unwrap_or(-1),
            output,
        })
    }
}
