use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::debug;

use crate::agent::{Agent, AgentEvent};
use crate::error::Result;

/// Interactive console on stdin/stdout.
pub async fn run(agent: Arc<Agent>) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    run_with(agent, stdin, &mut stdout).await
}

/// Read-eval-print loop over arbitrary streams.
///
/// Ends on EOF or an exit word. Transport errors are printed and the loop
/// keeps going with the same session.
pub async fn run_with<R, W>(agent: Arc<Agent>, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut events = agent.subscribe();
    let mut session = agent.session(format!("console-{}", uuid::Uuid::new_v4()));
    let mut lines = input.lines();

    let banner = format!(
        "{} ready (model {}, workspace {}). Type '{}' to leave.\n",
        agent.config.agent_name,
        agent.llm.model(),
        agent.ctx.workspace.root().display(),
        agent.config.exit_words.first().map(String::as_str).unwrap_or("exit"),
    );
    out.write_all(banner.as_bytes()).await?;

    loop {
        out.write_all(b"You: ").await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await? else {
            out.write_all(b"\n").await?;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if agent.config.is_exit_word(line) {
            out.write_all(b"Goodbye!\n").await?;
            break;
        }

        let session_id = session.id().to_string();
        let session_id = session_id.as_str();
        let outcome = {
            let turn = session.submit(line);
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    result = &mut turn => break result,
                    Ok(event) = events.recv() => print_event(out, session_id, &event).await?,
                }
            }
        };

        // Events sent right before the turn finished.
        loop {
            match events.try_recv() {
                Ok(event) => print_event(out, session_id, &event).await?,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    debug!(skipped = n, "console lagged behind agent events");
                }
                Err(_) => break,
            }
        }

        let text = match outcome {
            Ok(turn) => format!("Assistant: {}\n", turn.reply),
            Err(e) => format!("Error: {e}\n"),
        };
        out.write_all(text.as_bytes()).await?;
    }

    Ok(())
}

async fn print_event<W: AsyncWrite + Unpin>(
    out: &mut W,
    current: &str,
    event: &AgentEvent,
) -> Result<()> {
    let line = match event {
        AgentEvent::ToolStart {
            session_id,
            tool,
            arguments,
            ..
        } if session_id == current => format!("  [{tool}] {arguments}\n"),
        AgentEvent::ToolResult {
            session_id,
            tool,
            success,
            output_preview,
            ..
        } if session_id == current => {
            if *success {
                format!("  [{tool}] ok\n")
            } else {
                format!("  [{tool}] failed: {output_preview}\n")
            }
        }
        AgentEvent::AssistantText { session_id, text } if session_id == current => {
            format!("Assistant: {text}\n")
        }
        _ => return Ok(()),
    };
    out.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::scripted::{ScriptedBackend, Step, calls, reply};
    use crate::tools;

    fn agent_with(dir: &std::path::Path, steps: Vec<Step>) -> Arc<Agent> {
        let mut config = Config::default();
        config.workspace.root = dir.to_string_lossy().into_owned();
        let tools = tools::build_registry(&config).unwrap();
        Arc::new(Agent::new(config, tools, Arc::new(ScriptedBackend::new(steps))).unwrap())
    }

    async fn transcript(agent: Arc<Agent>, input: &str) -> String {
        let mut out = Vec::new();
        run_with(agent, input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn replies_and_exits_on_exit_word() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent_with(dir.path(), vec![reply("Hi there")]);

        let out = transcript(agent, "hello\n\nSALIR\nnever read\n").await;
        assert!(out.contains("Assistant: Hi there\n"));
        assert!(out.ends_with("Goodbye!\n"));
        assert_eq!(out.matches("You: ").count(), 3);
    }

    #[tokio::test]
    async fn prints_tool_progress() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let agent = agent_with(
            dir.path(),
            vec![
                calls(&[("c1", "read_file", serde_json::json!({"path": "notes.txt"}))]),
                reply("It says x."),
            ],
        );

        let out = transcript(agent, "what's in notes?\n").await;
        assert!(out.contains("  [read_file] {\"path\":\"notes.txt\"}\n"));
        assert!(out.contains("  [read_file] ok\n"));
        assert!(out.contains("Assistant: It says x.\n"));
    }

    #[tokio::test]
    async fn transport_error_keeps_repl_alive() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent_with(
            dir.path(),
            vec![Step::Fail("503 Service Unavailable".into()), reply("recovered")],
        );

        let out = transcript(agent, "one\ntwo\n").await;
        assert!(out.contains("Error: "));
        assert!(out.contains("503 Service Unavailable"));
        assert!(out.contains("Assistant: recovered\n"));
    }
}
