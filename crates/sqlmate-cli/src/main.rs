use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sqlmate::agent::Agent;
use sqlmate::configuration::Settings;
use sqlmate::executor::ToolExecutor;
use sqlmate::memory::MessageStore;
use sqlmate::providers::base::Provider;
use sqlmate::providers::factory;
use sqlmate::session::ToolSession;
use sqlmate::systems::StdioSystem;

mod prompt;
mod session;
mod session_file;

use prompt::rustyline::RustylinePrompt;
use session::Session;
use session_file::{default_session_name, ensure_session_dir, session_path};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Name of the session to record to (resumed when it already exists)
    #[arg(short, long, global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question and print the answer
    Ask {
        /// The question, in plain language
        question: String,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("❌").red(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::new()?;
    let config = settings.agent.to_config()?;
    let provider: Arc<dyn Provider> = factory::get_provider(settings.provider.into_config()?)?.into();

    let session_dir = ensure_session_dir()?;
    let name = cli.session.unwrap_or_else(default_session_name);
    let session_file = session_path(&session_dir, &name)?;

    let tool_session = Arc::new(
        ToolSession::initialize(settings.tools.session_params())
            .await
            .with_context(|| format!("could not start {}", settings.tools.command))?,
    );

    let result: Result<bool> = async {
        let system = StdioSystem::connect(tool_session.clone()).await?;
        let executor = ToolExecutor::new(Arc::new(system));
        let agent = build_agent(provider, executor, config, &session_file)?;
        let mut session = Session::new(agent, Box::new(RustylinePrompt::new()?), session_file);

        match cli.command {
            Some(Command::Ask { question }) => {
                let answer = session.headless(&question).await;
                println!("{}", answer);
                Ok(!answer.starts_with("❌"))
            }
            None => session.start().await.map(|_| true),
        }
    }
    .await;

    tool_session.teardown().await;
    if !result? {
        // The answer already carries the error text
        std::process::exit(2);
    }
    Ok(())
}

fn build_agent(
    provider: Arc<dyn Provider>,
    executor: ToolExecutor,
    config: sqlmate::agent::AgentConfig,
    session_file: &Path,
) -> Result<Agent> {
    if session_file.exists() {
        let store = MessageStore::load(session_file)?;
        println!(
            "{}",
            style(format!(
                "Resuming {} ({} messages)",
                session_file.display(),
                store.len()
            ))
            .dim()
        );
        return Agent::resume(provider, executor, config, store);
    }
    Agent::new(provider, executor, config)
}
