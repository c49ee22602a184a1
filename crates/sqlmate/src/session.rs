use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::errors::SessionError;
use crate::models::tool::Tool;
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ServerInfo, METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_INITIALIZED,
    METHOD_LIST_TOOLS, PROTOCOL_VERSION,
};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// How to launch the tool provider process
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl SessionParams {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

struct Channel {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl Channel {
    async fn send(&mut self, request: &JsonRpcRequest) -> Result<(), SessionError> {
        let stdin = self.stdin.as_mut().ok_or(SessionError::Closed)?;
        let mut line = serde_json::to_string(request)
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&JsonRpcRequest::new(id, method, params)).await?;

        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| SessionError::Transport(e.to_string()))?
                .ok_or(SessionError::Closed)?;

            let response = match JsonRpcResponse::from_line(&line) {
                Some(response) => response,
                None => {
                    tracing::debug!(line = %line, "skipping non-protocol output");
                    continue;
                }
            };
            if response.id != Some(id) {
                tracing::debug!(expected = id, got = ?response.id, "skipping unmatched response");
                continue;
            }

            if let Some(error) = response.error {
                return Err(SessionError::Remote {
                    code: error.code,
                    message: error.message,
                });
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    async fn shutdown(&mut self) {
        // Closing stdin lets a well-behaved provider exit on its own
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            tracing::debug!("tool provider already gone: {}", e);
        }
    }
}

/// A live connection to the tool provider process.
///
/// Requests are serialized through an async mutex so one session can be shared by
/// many conversations. The child is killed when the session is dropped, so the
/// process never outlives its owner even when [`ToolSession::teardown`] is skipped.
pub struct ToolSession {
    id: Uuid,
    span: Span,
    server_info: ServerInfo,
    channel: Mutex<Channel>,
}

impl ToolSession {
    /// Launch the provider and complete the handshake within `params.timeout`
    pub async fn initialize(params: SessionParams) -> Result<Self, SessionError> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("tool_session", session = %id);

        let mut channel = Self::spawn(&params).instrument(span.clone()).await?;

        let handshake = tokio::time::timeout(params.timeout, Self::handshake(&mut channel))
            .instrument(span.clone())
            .await;

        let server_info = match handshake {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                channel.shutdown().await;
                return Err(match e {
                    SessionError::Handshake(message) => SessionError::Handshake(message),
                    other => SessionError::Handshake(other.to_string()),
                });
            }
            Err(_) => {
                span.in_scope(|| {
                    tracing::error!(timeout = ?params.timeout, "tool provider handshake timed out")
                });
                channel.shutdown().await;
                return Err(SessionError::Timeout(params.timeout));
            }
        };

        span.in_scope(|| {
            tracing::info!(
                server = %server_info.name,
                version = %server_info.version,
                "tool provider ready"
            )
        });

        Ok(Self {
            id,
            span,
            server_info,
            channel: Mutex::new(channel),
        })
    }

    async fn spawn(params: &SessionParams) -> Result<Channel, SessionError> {
        tracing::debug!(command = %params.command, args = ?params.args, "starting tool provider");

        let mut child = Command::new(&params.command)
            .args(&params.args)
            .envs(params.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SessionError::Spawn {
                command: params.command.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Transport("tool provider has no stdout".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let span = Span::current();
            tokio::spawn(
                async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        tracing::debug!(target: "sqlmate::tools", "{}", line);
                    }
                }
                .instrument(span),
            );
        }

        Ok(Channel {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
        })
    }

    async fn handshake(channel: &mut Channel) -> Result<ServerInfo, SessionError> {
        let result = channel
            .request(
                METHOD_INITIALIZE,
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "sqlmate",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                })),
            )
            .await?;

        let init: InitializeResult = decode(result)
            .map_err(|e| SessionError::Handshake(format!("invalid initialize result: {}", e)))?;
        if init.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                server = %init.protocol_version,
                client = PROTOCOL_VERSION,
                "protocol version mismatch"
            );
        }

        channel
            .send(&JsonRpcRequest::notification(METHOD_INITIALIZED))
            .await?;
        Ok(init.server_info)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, SessionError> {
        let result = self
            .channel
            .lock()
            .await
            .request(METHOD_LIST_TOOLS, None)
            .instrument(self.span.clone())
            .await?;
        let list: ListToolsResult = decode(result)?;
        Ok(list.tools)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, SessionError> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let params =
            serde_json::to_value(params).map_err(|e| SessionError::Transport(e.to_string()))?;

        let span = tracing::info_span!(parent: &self.span, "tool_call", tool = %name);
        let result = self
            .channel
            .lock()
            .await
            .request(METHOD_CALL_TOOL, Some(params))
            .instrument(span)
            .await?;
        decode(result)
    }

    /// Close the channel and terminate the provider. Safe to call more than once.
    pub async fn teardown(&self) {
        let mut channel = self.channel.lock().await;
        channel.shutdown().instrument(self.span.clone()).await;
        self.span
            .in_scope(|| tracing::info!("tool provider stopped"));
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, SessionError> {
    serde_json::from_value(value).map_err(|e| SessionError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_params_builder() {
        let params = SessionParams::new("sqlmate-tools")
            .with_args(["--verbose"])
            .with_env("SQLMATE_DATABASE", "/tmp/app.db")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(params.command, "sqlmate-tools");
        assert_eq!(params.args, vec!["--verbose".to_string()]);
        assert_eq!(
            params.env,
            vec![("SQLMATE_DATABASE".to_string(), "/tmp/app.db".to_string())]
        );
        assert_eq!(params.timeout, Duration::from_secs(3));
        assert_eq!(SessionParams::new("x").timeout, DEFAULT_HANDSHAKE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let params = SessionParams::new("/definitely/not/a/real/sqlmate-tools");
        let err = ToolSession::initialize(params).await.err();
        assert!(matches!(err, Some(SessionError::Spawn { .. })));
    }
}
