use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use sqlmate::agent::{Agent, AgentConfig};
use sqlmate::executor::ToolExecutor;
use sqlmate::providers::base::Provider;

pub type SharedAgent = Arc<Mutex<Agent>>;

/// Chats untouched for this long are dropped
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

struct ChatSession {
    agent: SharedAgent,
    last_used: Instant,
}

/// Shared application state: one provider and one tool executor for every chat,
/// and one Agent per chat session
#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn Provider>,
    executor: ToolExecutor,
    config: AgentConfig,
    idle_ttl: Duration,
    sessions: Arc<Mutex<HashMap<Uuid, ChatSession>>>,
}

impl AppState {
    pub fn new(provider: Arc<dyn Provider>, executor: ToolExecutor, config: AgentConfig) -> Self {
        Self {
            provider,
            executor,
            config,
            idle_ttl: DEFAULT_IDLE_TTL,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    /// The agent for `id`, or a fresh one under a new id when `id` is missing or unknown
    pub async fn agent_for(&self, id: Option<Uuid>) -> Result<(Uuid, SharedAgent)> {
        let mut sessions = self.sessions.lock().await;
        self.evict_idle(&mut sessions);

        if let Some(id) = id {
            if let Some(session) = sessions.get_mut(&id) {
                session.last_used = Instant::now();
                return Ok((id, session.agent.clone()));
            }
        }

        let agent = Agent::new(
            self.provider.clone(),
            self.executor.clone(),
            self.config.clone(),
        )?;
        let id = Uuid::new_v4();
        tracing::info!(chat = %id, agent = %agent.id(), "new chat session");
        let agent = Arc::new(Mutex::new(agent));
        sessions.insert(
            id,
            ChatSession {
                agent: agent.clone(),
                last_used: Instant::now(),
            },
        );
        Ok((id, agent))
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedAgent> {
        let mut sessions = self.sessions.lock().await;
        self.evict_idle(&mut sessions);

        let session = sessions.get_mut(id)?;
        session.last_used = Instant::now();
        Some(session.agent.clone())
    }

    // A chat in the middle of a request holds its lock and is never evicted
    fn evict_idle(&self, sessions: &mut HashMap<Uuid, ChatSession>) {
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.last_used.elapsed() < self.idle_ttl || session.agent.try_lock().is_err()
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "dropped idle chat sessions");
        }
    }
}
