use std::io::Write;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::context::AppContext;
use crate::error::Result;
use crate::orchestrator::Orchestrator;

use super::output::OutputFormat;

/// Inputs that end an interactive session
pub const STOP_TERMS: [&str; 4] = ["exit", "quit", "end", "cancel"];

pub fn is_stop_term(input: &str) -> bool {
    let input = input.trim();
    STOP_TERMS.iter().any(|t| t.eq_ignore_ascii_case(input))
}

#[derive(Parser)]
pub struct ChatCommand {
    #[clap(long, short, help = "User id whose memory the session reads and writes")]
    pub user: String,
}

#[derive(Parser)]
pub struct AskCommand {
    #[clap(long, short, help = "User id whose memory the turn reads and writes")]
    pub user: String,

    #[clap(help = "Message to answer")]
    pub message: String,
}

/// Build the pipeline and make sure the user has a memory document
async fn start_session(ctx: &AppContext, user: &str) -> Result<Orchestrator> {
    let orchestrator = ctx.orchestrator().await?;
    orchestrator.memory().create_user(user).await?;
    Ok(orchestrator)
}

impl ChatCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let orchestrator = start_session(ctx, &self.user).await?;

        println!(
            "Chatting as '{}'. Type {} to leave.",
            self.user,
            STOP_TERMS.join(", ")
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("you> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                println!();
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if is_stop_term(line) {
                break;
            }

            match orchestrator.gen_answer(&self.user, line).await {
                Ok(answer) => println!("mise> {answer}\n"),
                Err(e) => {
                    tracing::error!("Turn failed: {e}");
                    eprintln!("Error: {e}\n");
                }
            }
        }

        Ok(())
    }
}

impl AskCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let orchestrator = start_session(ctx, &self.user).await?;
        let answer = orchestrator.gen_answer(&self.user, &self.message).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "user_id": &self.user,
                    "message": &self.message,
                    "answer": answer,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => println!("{answer}"),
        }

        Ok(())
    }
}
