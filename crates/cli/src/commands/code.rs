//! `oxpilot code` — goal-directed agent mode.
//!
//! Each task the agent proposes ends at an accept/reject prompt; rejected
//! tasks are rolled back from their pre-modification snapshots.

use anyhow::Context;
use async_trait::async_trait;
use oxpilot_config::AppConfig;
use oxpilot_session::{AgentLoop, Operator, Session};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Reads operator commands from stdin.
struct StdinOperator {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinOperator {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

#[async_trait]
impl Operator for StdinOperator {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.next_line().await.ok().flatten()
    }
}

pub async fn run(goal: &str, workspace: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    let workspace = match workspace {
        Some(path) => {
            let path = PathBuf::from(path);
            anyhow::ensure!(path.is_dir(), "workspace is not a directory: {}", path.display());
            path
        }
        None => std::env::current_dir().context("Failed to resolve working directory")?,
    };

    if !oxpilot_tools::git::is_git_repository(&workspace).await {
        eprintln!(
            "Warning: {} is not a git repository; diff, commit, and rollback will not work.",
            workspace.display()
        );
    }

    let session = Session::new(&config, workspace).context("Failed to create session")?;
    let agent_loop = AgentLoop::new(&session);

    let mut operator = StdinOperator::new();
    agent_loop
        .run(goal, &mut operator, &mut |chunk: &str| {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        })
        .await
        .context("Agent loop failed")?;

    println!();
    Ok(())
}
