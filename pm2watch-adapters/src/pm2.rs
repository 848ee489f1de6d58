//! PM2 adapter using the `pm2` command line client.
//!
//! Every query spawns a fresh `pm2 jlist`, which connects to the PM2 daemon,
//! prints the process list as JSON and disconnects. There is no persistent
//! connection to keep alive or to leak: the child is killed if the query is
//! dropped or times out.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pm2watch_adapters::pm2::Pm2Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Pm2Client::builder()
//!         .binary("/usr/local/bin/pm2")
//!         .timeout(Duration::from_secs(5))
//!         .build();
//!
//!     for process in client.describe("api").await? {
//!         println!("{} -> {}", process.name, process.pm2_env.status);
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

use pm2watch_types::{current_timestamp_ms, ProcessSnapshot, ProcessStatus};

use crate::AdapterError;

/// Client for querying the PM2 daemon.
#[derive(Debug, Clone)]
pub struct Pm2Client {
    binary: PathBuf,
    pm2_home: Option<PathBuf>,
    timeout: Duration,
}

impl Pm2Client {
    /// Create a new builder for configuring the client.
    pub fn builder() -> Pm2ClientBuilder {
        Pm2ClientBuilder::default()
    }

    /// `PM2_HOME` passed to the child, if overridden.
    pub fn pm2_home(&self) -> Option<&PathBuf> {
        self.pm2_home.as_ref()
    }

    /// Describe all processes registered under `name`.
    ///
    /// An empty list means the supervisor does not know the process.
    pub async fn describe(&self, name: &str) -> Result<Vec<ProcessDescriptor>, AdapterError> {
        let all = self.list().await?;
        Ok(all.into_iter().filter(|p| p.name == name).collect())
    }

    /// Describe `name` and convert the first matching entry to a snapshot.
    pub async fn snapshot(&self, name: &str) -> Result<ProcessSnapshot, AdapterError> {
        let observed_at_ms = current_timestamp_ms();
        self.describe(name)
            .await?
            .first()
            .map(|p| p.to_snapshot(observed_at_ms))
            .ok_or_else(|| AdapterError::NotFound(name.to_string()))
    }

    /// List every process known to the daemon.
    pub async fn list(&self) -> Result<Vec<ProcessDescriptor>, AdapterError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("jlist")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(home) = &self.pm2_home {
            command.env("PM2_HOME", home);
        }

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AdapterError::Supervisor(format!(
                    "failed to run {}: {}",
                    self.binary.display(),
                    e
                )))
            }
            Err(_) => return Err(AdapterError::Timeout),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::Supervisor(format!(
                "pm2 jlist exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_jlist(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Builder for Pm2Client.
#[derive(Debug, Default)]
pub struct Pm2ClientBuilder {
    binary: Option<PathBuf>,
    pm2_home: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Pm2ClientBuilder {
    /// Set the `pm2` executable (default: `pm2` on `PATH`).
    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Set `PM2_HOME` for spawned queries.
    pub fn pm2_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.pm2_home = Some(home.into());
        self
    }

    /// Set the query timeout (default: 5 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Pm2Client {
        Pm2Client {
            binary: self.binary.unwrap_or_else(|| PathBuf::from("pm2")),
            pm2_home: self.pm2_home,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        }
    }
}

/// Parse the output of `pm2 jlist`.
///
/// PM2 sometimes prints banner or update notices before the JSON array, so
/// everything before the first `[` is skipped.
pub fn parse_jlist(output: &str) -> Result<Vec<ProcessDescriptor>, AdapterError> {
    let start = output
        .find('[')
        .ok_or_else(|| AdapterError::Parse("no process list in pm2 output".to_string()))?;
    let processes: Vec<ProcessDescriptor> = serde_json::from_str(output[start..].trim_end())?;
    Ok(processes)
}

/// One entry of the PM2 process list.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessDescriptor {
    pub name: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub pm_id: Option<u64>,
    #[serde(default)]
    pub monit: Option<Monit>,
    pub pm2_env: Pm2Env,
}

/// Resource usage reported by PM2.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Monit {
    #[serde(default)]
    pub memory: u64,
    #[serde(default)]
    pub cpu: f64,
}

/// The subset of `pm2_env` the monitor needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Pm2Env {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub pm_uptime: Option<u64>,
    #[serde(default)]
    pub created_at: Option<u64>,
    #[serde(default)]
    pub restart_time: Option<u64>,
}

impl ProcessDescriptor {
    /// Start time of the current incarnation, falling back to creation time.
    pub fn started_at_ms(&self) -> Option<u64> {
        self.pm2_env
            .pm_uptime
            .filter(|t| *t > 0)
            .or(self.pm2_env.created_at.filter(|t| *t > 0))
    }

    /// Convert to an immutable snapshot observed at `observed_at_ms`.
    pub fn to_snapshot(&self, observed_at_ms: u64) -> ProcessSnapshot {
        let monit = self.monit.clone().unwrap_or_default();
        let mut builder = ProcessSnapshot::builder(self.name.clone())
            .status(ProcessStatus::from_pm2(&self.pm2_env.status))
            .observed_at_ms(observed_at_ms)
            .memory_bytes(monit.memory)
            .cpu_percent(monit.cpu)
            .restart_count(self.pm2_env.restart_time.unwrap_or(0));

        if let Some(started) = self.started_at_ms() {
            builder = builder.started_at_ms(started);
        }
        if let Some(pid) = self.pid.filter(|p| *p > 0) {
            builder = builder.pid(pid);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JLIST: &str = r#"[
        {"pid": 4242, "name": "api", "pm_id": 0,
         "monit": {"memory": 52428800, "cpu": 1.5},
         "pm2_env": {"status": "online", "pm_uptime": 1700000000000,
                     "created_at": 1690000000000, "restart_time": 3}},
        {"pid": 0, "name": "worker", "pm_id": 1,
         "monit": {"memory": 0, "cpu": 0},
         "pm2_env": {"status": "stopped", "created_at": 1690000000000}}
    ]"#;

    #[test]
    fn test_builder_defaults() {
        let client = Pm2Client::builder().build();
        assert_eq!(client.binary, PathBuf::from("pm2"));
        assert_eq!(client.timeout, Duration::from_secs(5));
        assert!(client.pm2_home().is_none());
    }

    #[test]
    fn test_builder_custom() {
        let client = Pm2Client::builder()
            .binary("/opt/pm2/bin/pm2")
            .pm2_home("/var/lib/pm2")
            .timeout(Duration::from_secs(2))
            .build();
        assert_eq!(client.binary, PathBuf::from("/opt/pm2/bin/pm2"));
        assert_eq!(client.pm2_home(), Some(&PathBuf::from("/var/lib/pm2")));
        assert_eq!(client.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_jlist() {
        let processes = parse_jlist(JLIST).unwrap();
        assert_eq!(processes.len(), 2);
        assert_eq!(processes[0].name, "api");
        assert_eq!(processes[0].pm2_env.restart_time, Some(3));
        assert_eq!(processes[1].pm2_env.status, "stopped");
    }

    #[test]
    fn test_parse_jlist_skips_banner() {
        let output = format!(">>>> In-memory PM2 is out-of-date\n{}\n", JLIST);
        assert_eq!(parse_jlist(&output).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_jlist_rejects_garbage() {
        assert!(matches!(
            parse_jlist("daemon not running"),
            Err(AdapterError::Parse(_))
        ));
    }

    #[test]
    fn test_descriptor_to_snapshot() {
        let processes = parse_jlist(JLIST).unwrap();
        let snapshot = processes[0].to_snapshot(1_700_000_125_000);

        assert_eq!(snapshot.status, ProcessStatus::Online);
        assert_eq!(snapshot.started_at_ms, Some(1_700_000_000_000));
        assert_eq!(snapshot.uptime_ms(), 125_000);
        assert_eq!(snapshot.pid, Some(4242));
        assert_eq!(snapshot.memory_bytes, 52_428_800);
        assert_eq!(snapshot.restart_count, 3);
    }

    #[test]
    fn test_stopped_descriptor_falls_back_to_created_at() {
        let processes = parse_jlist(JLIST).unwrap();
        let snapshot = processes[1].to_snapshot(1_700_000_000_000);

        assert_eq!(snapshot.status, ProcessStatus::Stopped);
        assert_eq!(snapshot.started_at_ms, Some(1_690_000_000_000));
        assert_eq!(snapshot.pid, None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_supervisor_error() {
        let client = Pm2Client::builder()
            .binary("/nonexistent/pm2watch-test/pm2")
            .build();
        let err = client.describe("api").await.unwrap_err();
        assert!(matches!(err, AdapterError::Supervisor(_)));
        assert!(err.is_transient());
    }
}
