//! `oxpilot chat` — interactive or single-message chat mode.

use anyhow::Context;
use oxpilot_config::AppConfig;
use oxpilot_session::Session;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(message: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let workspace = std::env::current_dir().context("Failed to resolve working directory")?;
    let session = Session::new(&config, workspace).context("Failed to create session")?;

    if let Some(message) = message {
        let mut rx = session.process_prompt(message);
        while let Some(chunk) = rx.recv().await {
            print!("{chunk}");
            std::io::stdout().flush()?;
        }
        println!();
        return Ok(());
    }

    let (provider, model) = session.provider_info().await;
    println!("Welcome to the oxpilot assistant");
    println!("Connected to {provider} model: {model}");
    println!("Type 'exit' or 'quit' to end the session.");
    println!("Type '/help' to see available commands.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "exit" | "quit" => {
                println!("Goodbye!");
                break;
            }
            "/help" => {
                println!("\nAvailable commands:");
                println!("  /help  - Show this help message");
                println!("  /reset - Reset the conversation");
                println!("  exit or quit - End the session");
                continue;
            }
            "/reset" => {
                session.reset_conversation().await;
                println!("\nConversation has been reset.");
                continue;
            }
            _ => {}
        }

        println!("\nYou: {input}");
        print!("\nAI: ");
        std::io::stdout().flush()?;

        let mut rx = session.process_prompt(input);
        while let Some(chunk) = rx.recv().await {
            print!("{chunk}");
            std::io::stdout().flush()?;
        }
        println!("\n");
    }

    Ok(())
}
