//! Interactive terminal chat against a hosted agent.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_chat_core::prelude::*;
use agent_chat_core::{
    DeliveryMode, EnvTokenProvider, JsonlTranscriptSink, StaticAgentRegistry, StaticTokenProvider,
    init_observability,
};
use anyhow::{Context as _, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};

#[derive(Debug, Parser)]
#[command(name = "agent-chat", about = "Chat with a hosted agent from the terminal")]
struct Args {
    /// Agent execution endpoint.
    #[arg(long, env = "AGENT_CHAT_ENDPOINT")]
    endpoint: String,
    /// Agent display name or id.
    #[arg(long, env = "AGENT_CHAT_AGENT", default_value = "assistant")]
    agent: String,
    /// Display name mappings, e.g. `support=agt_1,sales=agt_2`.
    #[arg(long, env = "AGENT_CHAT_AGENTS")]
    agents: Option<String>,
    /// Bearer token. Read from the environment on every request when omitted.
    #[arg(long, env = "AGENT_CHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Append finalized replies to this JSON Lines file.
    #[arg(long)]
    transcript: Option<PathBuf>,
    /// Template variable sent with every request (`key=value`, repeatable).
    #[arg(long = "var", value_parser = parse_variable)]
    variables: Vec<(String, String)>,
    /// Agent configuration overrides as a JSON object.
    #[arg(long)]
    config: Option<String>,
    /// Treat each response fragment as the full body received so far.
    #[arg(long)]
    cumulative: bool,
    #[arg(long, env = "AGENT_CHAT_CONNECT_TIMEOUT_MS", default_value_t = 15_000)]
    connect_timeout_ms: u64,
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

enum Command {
    Send(String),
    Cancel,
    Retry,
    New,
    Quit,
    Nothing,
}

fn parse_command(line: &str) -> Command {
    match line.trim() {
        "" => Command::Nothing,
        "/quit" | "/exit" => Command::Quit,
        "/cancel" => Command::Cancel,
        "/retry" => Command::Retry,
        "/new" => Command::New,
        text => Command::Send(text.to_string()),
    }
}

fn build_session(args: &Args) -> Result<ChatSession> {
    let mut config = ClientConfig::new(args.endpoint.clone())
        .connect_timeout(Duration::from_millis(args.connect_timeout_ms));
    if args.cumulative {
        config = config.delivery(DeliveryMode::Cumulative);
    }

    let auth: Arc<dyn AuthProvider> = match &args.token {
        Some(token) => Arc::new(StaticTokenProvider::new(token.clone())),
        None => Arc::new(EnvTokenProvider::default()),
    };
    let mut builder = ChatClient::builder(config).auth(auth);
    if let Some(path) = &args.transcript {
        let sink = JsonlTranscriptSink::open(path)
            .with_context(|| format!("opening transcript {}", path.display()))?;
        builder = builder.sink(Arc::new(sink));
    }
    if let Some(mappings) = &args.agents {
        builder = builder.registry(Arc::new(StaticAgentRegistry::parse(mappings)?));
    }
    let client = builder.build()?;

    let mut session = client.session_for(&args.agent)?;
    for (key, value) in &args.variables {
        session.set_variable(key.clone(), value.clone());
    }
    if let Some(raw) = &args.config {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("--config must be valid JSON")?;
        if !value.is_object() {
            bail!("--config must be a JSON object");
        }
        session.set_config_override(Some(value));
    }
    Ok(session)
}

/// Prints whatever the in-flight reply gained since the last call.
#[derive(Default)]
struct ReplyPrinter {
    message_id: Option<uuid::Uuid>,
    printed: String,
    status: Option<String>,
}

impl ReplyPrinter {
    async fn render(&mut self, session: &ChatSession, transition: &Transition) -> Result<()> {
        let Some(reply) = session.messages().last() else {
            return Ok(());
        };
        if self.message_id != Some(reply.id) {
            self.message_id = Some(reply.id);
            self.printed.clear();
            self.status = None;
        }

        let mut out = tokio::io::stdout();
        let status = session.state().status_text().map(str::to_owned);
        if let Some(text) = &status
            && status != self.status
        {
            out.write_all(format!("\n[{text}]\n").as_bytes()).await?;
            self.status = status;
        }

        match transition {
            Transition::Ignored => {}
            Transition::Updated => {
                if let Some(rest) = reply.content.strip_prefix(self.printed.as_str()) {
                    out.write_all(rest.as_bytes()).await?;
                    self.printed = reply.content.clone();
                }
            }
            Transition::Finalized(message) if message.status == MessageStatus::Error => {
                out.write_all(format!("\n! {}\n", message.content).as_bytes())
                    .await?;
            }
            Transition::Finalized(message) => {
                // A final payload may rewrite what the chunks said.
                match message.content.strip_prefix(self.printed.as_str()) {
                    Some(rest) => out.write_all(rest.as_bytes()).await?,
                    None => {
                        out.write_all(format!("\n{}", message.content).as_bytes())
                            .await?
                    }
                }
                out.write_all(b"\n").await?;
                self.printed = message.content.clone();
            }
        }
        out.flush().await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_observability("warn");

    let args = Args::parse();
    let mut session = build_session(&args)?;
    tracing::info!(conversation_id = %session.conversation_id(), agent_id = %session.agent_id(), "session ready");
    eprintln!(
        "Chatting with {}. Commands: /cancel /retry /new /quit",
        session.agent_id()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printer = ReplyPrinter::default();
    loop {
        let busy = session.status().is_busy();
        tokio::select! {
            update = session.next_update(), if busy => {
                if let Some(transition) = update {
                    printer.render(&session, &transition).await?;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Command::Nothing => {}
                    Command::Quit => break,
                    Command::Cancel => {
                        if session.cancel().is_some() {
                            eprintln!("[cancelled]");
                        }
                    }
                    Command::Retry => {
                        if let Err(err) = session.retry() {
                            eprintln!("{err}");
                        }
                    }
                    Command::New => {
                        session.new_session();
                        eprintln!("[new conversation {}]", session.conversation_id());
                    }
                    Command::Send(text) => {
                        if let Err(err) = session.send(text) {
                            eprintln!("{err}");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if session.cancel().is_some() {
                    eprintln!("\n[cancelled]");
                } else {
                    break;
                }
            }
        }
    }
    session.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_must_have_a_key() {
        assert_eq!(
            parse_variable("locale=en=GB"),
            Ok(("locale".to_string(), "en=GB".to_string()))
        );
        assert!(parse_variable("=x").is_err());
        assert!(parse_variable("novalue").is_err());
    }

    #[test]
    fn slash_commands_are_recognized() {
        assert!(matches!(parse_command(" /quit "), Command::Quit));
        assert!(matches!(parse_command("/new"), Command::New));
        assert!(matches!(parse_command(""), Command::Nothing));
        assert!(matches!(parse_command("hello"), Command::Send(t) if t == "hello"));
    }
}
