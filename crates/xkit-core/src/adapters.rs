//! Default system adapters for the core ports, bound by the kernel at
//! startup unless a caller (typically a test) supplies its own.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use crate::config::RuntimeConfig;
use crate::error::PortError;
use crate::ports::{
    ChildProcess, ClockPort, ConfigPort, FilesystemPort, HttpPort, HttpRequest, HttpResponse,
    LogLevel, LoggerPort, ProcessPort, ProcessSpec,
};

/// [`ConfigPort`] adapter: a read-only dotted-key view over a static JSON
/// snapshot, taken once at startup.
#[derive(Debug, Clone)]
pub struct StaticConfigPort {
    tree: Value,
}

impl StaticConfigPort {
    /// Wrap an arbitrary JSON tree.
    #[must_use]
    pub fn new(tree: Value) -> Self {
        Self { tree }
    }

    /// Snapshot a [`RuntimeConfig`] into a dotted-key view.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(serde_json::to_value(config).unwrap_or(Value::Null))
    }
}

impl ConfigPort for StaticConfigPort {
    fn get(&self, key: &str) -> Option<Value> {
        let mut current = &self.tree;
        for segment in key.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }
}

/// [`LoggerPort`] adapter that forwards to the `tracing` macros.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl LoggerPort for TracingLogger {
    fn log(&self, level: LogLevel, target: &str, message: &str, fields: &[(&str, &str)]) {
        let joined = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        match level {
            LogLevel::Trace => tracing::trace!(target: "xkit", %target, %joined, "{message}"),
            LogLevel::Debug => tracing::debug!(target: "xkit", %target, %joined, "{message}"),
            LogLevel::Info => tracing::info!(target: "xkit", %target, %joined, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "xkit", %target, %joined, "{message}"),
            LogLevel::Error => tracing::error!(target: "xkit", %target, %joined, "{message}"),
        }
    }
}

/// [`ClockPort`] adapter backed by the system clock and Tokio's timer.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// [`FilesystemPort`] adapter backed by `std::fs`.
#[derive(Debug, Default)]
pub struct StdFilesystem;

impl FilesystemPort for StdFilesystem {
    fn read_to_string(&self, path: &Path) -> Result<String, PortError> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, PortError> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// A line-oriented child process, wrapping a [`tokio::process::Child`] with
/// piped stdio.
pub struct TokioChildProcess {
    child: Child,
    stdin: tokio::process::ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
}

#[async_trait]
impl ChildProcess for TokioChildProcess {
    async fn write_line(&mut self, line: &str) -> Result<(), PortError> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>, PortError> {
        let mut buf = String::new();
        let n = self.stdout.read_line(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if buf.ends_with('\n') {
            buf.pop();
            if buf.ends_with('\r') {
                buf.pop();
            }
        }
        Ok(Some(buf))
    }

    async fn kill(&mut self) -> Result<(), PortError> {
        self.child.kill().await?;
        Ok(())
    }
}

/// [`ProcessPort`] adapter backed by `tokio::process`.
#[derive(Debug, Default)]
pub struct TokioProcessPort;

#[async_trait]
impl ProcessPort for TokioProcessPort {
    async fn spawn(&self, spec: ProcessSpec) -> Result<Box<dyn ChildProcess>, PortError> {
        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or(PortError::ProcessExited)?;
        let stdout = child.stdout.take().ok_or(PortError::ProcessExited)?;

        Ok(Box::new(TokioChildProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        }))
    }
}

/// [`HttpPort`] adapter backed by `reqwest`.
#[derive(Debug, Default)]
pub struct ReqwestHttpPort {
    client: reqwest::Client,
}

#[async_trait]
impl HttpPort for ReqwestHttpPort {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpResponse, PortError> {
        let mut builder = self.client.post(&request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| PortError::Http(e.to_string()))?
            .to_vec();
        Ok(HttpResponse { status, body })
    }

    async fn stream_events(
        &self,
        url: &str,
        headers: HashMap<String, String>,
    ) -> Result<tokio::sync::mpsc::Receiver<Value>, PortError> {
        use futures::StreamExt;

        let mut builder = self.client.get(url);
        for (key, value) in &headers {
            builder = builder.header(key, value);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Http(e.to_string()))?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let mut stream = response.bytes_stream();
        tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);
                    let payload = event.strip_prefix("data: ").unwrap_or(&event);
                    if let Ok(value) = serde_json::from_str::<Value>(payload)
                        && tx.send(value).await.is_err()
                    {
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_config_port_reads_dotted_keys() {
        let port = StaticConfigPort::from_config(&RuntimeConfig::default());
        assert_eq!(
            port.get("event_bus.replay_buffer_size"),
            Some(Value::from(4096))
        );
        assert_eq!(port.get("event_bus.missing"), None);
        assert_eq!(port.get("missing_top_level"), None);
    }
}
