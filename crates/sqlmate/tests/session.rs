#![cfg(unix)]

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlmate::errors::{AgentError, SessionError};
use sqlmate::models::tool::ToolCall;
use sqlmate::session::{SessionParams, ToolSession};
use sqlmate::systems::{StdioSystem, System};

/// A tool provider written in shell that answers a fixed script of requests
const FAKE_PROVIDER: &str = r#"
read -r init
echo 'fake provider starting up'
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"fake-sqlite","version":"0.1.0"}}}'
read -r initialized
read -r list
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}'
read -r call
echo '{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Unknown tool: drop_everything"}}'
read -r call
echo '{"jsonrpc":"2.0","id":99,"result":{}}'
echo '{"jsonrpc":"2.0","id":4,"result":{"content":[{"type":"text","text":"SQL Error: no such table: nope"}],"isError":true}}'
read -r never
"#;

fn shell(script: &str) -> SessionParams {
    SessionParams::new("sh").with_args(["-c", script])
}

#[tokio::test]
async fn test_handshake_timeout() {
    let params = shell("sleep 30").with_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let err = ToolSession::initialize(params).await.err();

    assert!(matches!(err, Some(SessionError::Timeout(t)) if t == Duration::from_millis(300)));
    assert!(err.map(|e| e.is_timeout()).unwrap_or(false));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_provider_exits_during_handshake() {
    let err = ToolSession::initialize(shell("exit 0")).await.err();
    assert!(matches!(err, Some(SessionError::Handshake(_))));
}

#[tokio::test]
async fn test_provider_answers_garbage() {
    let script = r#"read -r init; echo '{"jsonrpc":"2.0","id":1,"result":{"unexpected":true}}'; read -r x"#;
    let err = ToolSession::initialize(shell(script).with_timeout(Duration::from_secs(5)))
        .await
        .err();
    match err {
        Some(SessionError::Handshake(message)) => {
            assert!(message.contains("invalid initialize result"))
        }
        other => panic!("expected handshake failure, got {:?}", other.map(|e| e.to_string())),
    }
}

#[tokio::test]
async fn test_session_lifecycle() -> Result<()> {
    let session = Arc::new(ToolSession::initialize(shell(FAKE_PROVIDER)).await?);
    assert_eq!(session.server_info().name, "fake-sqlite");

    // An empty catalog is a degraded mode, not an error
    let system = StdioSystem::connect(session.clone()).await?;
    assert!(system.tools().is_empty());
    assert_eq!(system.name(), "fake-sqlite");

    let err = system
        .call(ToolCall::new("drop_everything", json!({})))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AgentError::ExecutionError("Unknown tool: drop_everything".to_string())
    );

    // The unmatched id 99 is skipped
    let err = system
        .call(ToolCall::new("query_data", json!({"sql": "SELECT * FROM nope"})))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AgentError::ExecutionError("SQL Error: no such table: nope".to_string())
    );

    session.teardown().await;
    session.teardown().await;

    let after = session.call_tool("get_schema", json!({})).await;
    assert!(matches!(after, Err(SessionError::Closed)));
    Ok(())
}
