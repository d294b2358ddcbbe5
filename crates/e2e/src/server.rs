//! Responder management - spawning and readiness-probing the web server

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::retry::{retry, Backoff};

/// Handle to a running responder process
pub struct ServerHandle {
    child: Option<Child>,
    addr: SocketAddr,
    base_url: String,
}

impl ServerHandle {
    /// Spawn the responder and wait until its port accepts connections
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let addr = config.addr;

        // Something already listening would make the probe pass for the wrong process.
        if probe(addr).await.is_ok() {
            return Err(E2eError::PortInUse(addr));
        }

        info!("Spawning responder {} on {}", config.binary_path.display(), addr);

        let mut cmd = Command::new(&config.binary_path);
        cmd.arg("--addr")
            .arg(addr.to_string())
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {}: {}",
                config.binary_path.display(),
                e
            ))
        })?;

        forward_output(&mut child, "responder");

        let mut handle = ServerHandle {
            child: Some(child),
            addr,
            base_url: format!("http://{}/", addr),
        };

        if let Err(e) = handle
            .wait_for_ready(Backoff::fixed(config.poll_interval, config.startup_timeout))
            .await
        {
            if let Err(stop_err) = handle.stop().await {
                warn!("Failed to stop responder after startup failure: {}", stop_err);
            }
            return Err(e);
        }

        info!("Responder is ready at {}", handle.base_url);
        Ok(handle)
    }

    /// Poll the port until it accepts a connection, bailing out early if
    /// the process exits first.
    async fn wait_for_ready(&mut self, backoff: Backoff) -> E2eResult<()> {
        let addr = self.addr;
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| E2eError::ServerStartup("responder already stopped".into()))?;

        wait_for_child(child, addr, backoff)
            .await
            .map_err(|e| match e {
                NotReady::Exited(status) => E2eError::ServerExited(status),
                NotReady::TimedOut { attempts, last } => {
                    E2eError::ServerHealthCheck { attempts, last }
                }
            })
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the process has not been stopped yet
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Plain HTTP GET against the responder, bypassing the browser.
    ///
    /// Returns the status code and the body.
    pub async fn fetch(&self, path: &str) -> E2eResult<(u16, String)> {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        let resp = client.get(&url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok((status, body))
    }

    /// Stop the server. Only the first call does anything.
    pub async fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        terminate(&mut child, "responder").await
    }
}

/// Configuration for spawning the responder
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the hello-web binary
    pub binary_path: PathBuf,

    /// Extra arguments appended after `--addr`
    pub args: Vec<String>,

    /// Extra environment for the child
    pub env: HashMap<String, String>,

    /// Address the responder is told to bind
    pub addr: SocketAddr,

    /// Timeout for server startup
    pub startup_timeout: Duration,

    /// Interval between readiness probes
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("target/debug/hello-web"),
            args: Vec::new(),
            env: HashMap::new(),
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            startup_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// One connection attempt against `addr`
pub async fn probe(addr: SocketAddr) -> std::io::Result<()> {
    TcpStream::connect(addr).await.map(drop)
}

/// Wait until `addr` accepts connections.
///
/// Returns the number of probes it took.
pub async fn wait_for_port(addr: SocketAddr, backoff: Backoff) -> E2eResult<usize> {
    let mut attempts = 0;
    retry(backoff, || {
        attempts += 1;
        probe(addr)
    })
    .await
    .map_err(|e| E2eError::ServerHealthCheck {
        attempts: e.attempts,
        last: e.last.to_string(),
    })?;
    Ok(attempts)
}

/// Why a spawned child never became reachable
#[derive(Debug)]
pub(crate) enum NotReady {
    /// The process exited first; carries the exit status
    Exited(String),
    TimedOut { attempts: usize, last: String },
}

/// Probe `addr` until it accepts connections, giving up as soon as `child`
/// has exited.
pub(crate) async fn wait_for_child(
    child: &mut Child,
    addr: SocketAddr,
    backoff: Backoff,
) -> Result<(), NotReady> {
    let outcome = retry(backoff, || {
        let exited = child.try_wait();
        async move {
            match exited {
                Ok(Some(status)) => Ok(Err(status)),
                Ok(None) => probe(addr).await.map(Ok),
                Err(e) => Err(e),
            }
        }
    })
    .await;

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(status)) => Err(NotReady::Exited(describe_exit(status))),
        Err(e) => {
            debug!("Last readiness probe of {} failed: {}", addr, e.last);
            Err(NotReady::TimedOut {
                attempts: e.attempts,
                last: e.last.to_string(),
            })
        }
    }
}

/// Find a free port to use
pub fn find_free_port() -> std::io::Result<u16> {
    use std::net::TcpListener;

    Ok(TcpListener::bind("127.0.0.1:0")?.local_addr()?.port())
}

/// SIGTERM, a short grace period, then SIGKILL; always reaps the child.
pub(crate) async fn terminate(child: &mut Child, name: &str) -> E2eResult<()> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return Ok(());
    };

    info!("Stopping {} (pid: {})", name, pid);

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
            if let Ok(status) = tokio::time::timeout(Duration::from_millis(500), child.wait()).await {
                debug!("{} exited: {}", name, describe_exit(status?));
                return Ok(());
            }
        }
    }

    child.start_kill()?;
    let status = child.wait().await?;
    debug!("{} killed: {}", name, describe_exit(status));
    Ok(())
}

/// Re-emit the child's stdout/stderr lines as log events.
pub(crate) fn forward_output(child: &mut Child, source: &'static str) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pipe_lines(stdout, source, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pipe_lines(stderr, source, "stderr"));
    }
}

async fn pipe_lines<R>(reader: R, source: &'static str, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(source, stream, "{}", line);
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => format!("{}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port1 = find_free_port().unwrap();
        let port2 = find_free_port().unwrap();

        // Ports should be in valid range
        assert!(port1 > 1024);
        assert!(port2 > 1024);
    }

    #[tokio::test]
    async fn test_probe_fails_when_nothing_listens() {
        let port = find_free_port().unwrap();
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        assert!(probe(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_port_no_false_positive() {
        let port = find_free_port().unwrap();
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let err = wait_for_port(
            addr,
            Backoff::fixed(Duration::from_millis(10), Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

        match err {
            E2eError::ServerHealthCheck { attempts, ref last } => {
                assert!(attempts >= 2);
                // The cause of the last failed connect is kept.
                assert!(!last.is_empty());
                assert!(err.to_string().contains(last.as_str()));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_for_port_succeeds_once_bound() {
        let port = find_free_port().unwrap();
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let binder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            // Keep the listener alive long enough to be probed.
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(listener);
        });

        let attempts = wait_for_port(
            addr,
            Backoff::fixed(Duration::from_millis(20), Duration::from_secs(5)),
        )
        .await
        .unwrap();

        // It was not bound for the first probe.
        assert!(attempts > 1);
        binder.abort();
    }

    #[tokio::test]
    async fn test_spawn_refuses_occupied_port() {
        let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = holder.local_addr().unwrap();

        let err = ServerHandle::spawn(ServerConfig {
            binary_path: PathBuf::from("/nonexistent/hello-web"),
            addr,
            ..Default::default()
        })
        .await
        .err()
        .unwrap();

        assert!(matches!(err, E2eError::PortInUse(a) if a == addr));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_startup_error() {
        let port = find_free_port().unwrap();
        let err = ServerHandle::spawn(ServerConfig {
            binary_path: PathBuf::from("/nonexistent/hello-web"),
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            ..Default::default()
        })
        .await
        .err()
        .unwrap();

        assert!(matches!(err, E2eError::ServerStartup(_)));
        assert!(err.is_setup());
    }
}
