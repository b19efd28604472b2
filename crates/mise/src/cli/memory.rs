use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::error::Result;
use crate::memory::{MemoryStore, UserMemory};

use super::output::{OutputFormat, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "Create an empty memory document for a user")]
    Seed(UserArgs),

    #[clap(about = "Show a user's chat history and facts")]
    Show(UserArgs),

    #[clap(about = "Reset a user's chat history and facts")]
    Clear(UserArgs),

    #[clap(about = "List users with a memory document")]
    List,
}

#[derive(Parser)]
pub struct UserArgs {
    #[clap(long, short, help = "User id")]
    pub user: String,
}

impl MemoryCommand {
    pub async fn execute(&self, store: &dyn MemoryStore, format: OutputFormat) -> Result<()> {
        match &self.command {
            MemorySubcommand::Seed(args) => Self::seed(store, args, format).await,
            MemorySubcommand::Show(args) => Self::show(store, args, format).await,
            MemorySubcommand::Clear(args) => Self::clear(store, args, format).await,
            MemorySubcommand::List => Self::list(store, format).await,
        }
    }

    async fn seed(store: &dyn MemoryStore, args: &UserArgs, format: OutputFormat) -> Result<()> {
        store.create_user(&args.user).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "user_id": &args.user, "seeded": true });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => println!("Seeded memory for '{}'", args.user),
        }
        Ok(())
    }

    async fn show(store: &dyn MemoryStore, args: &UserArgs, format: OutputFormat) -> Result<()> {
        let memory = store.fetch(&args.user).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&memory)?),
            OutputFormat::Table => println!("{}", memory_table(&memory, store.max_messages())),
        }
        Ok(())
    }

    async fn clear(store: &dyn MemoryStore, args: &UserArgs, format: OutputFormat) -> Result<()> {
        store.clear(&args.user).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "user_id": &args.user, "cleared": true });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => println!("Cleared memory for '{}'", args.user),
        }
        Ok(())
    }

    async fn list(store: &dyn MemoryStore, format: OutputFormat) -> Result<()> {
        let users = store.list_users().await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&users)?),
            OutputFormat::Table => {
                if users.is_empty() {
                    println!("No users found.");
                    return Ok(());
                }
                for user in &users {
                    println!("{user}");
                }
                println!("\nTotal: {} users", users.len());
            }
        }
        Ok(())
    }
}

fn memory_table(memory: &UserMemory, max_messages: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Property", "Value"]);

    table.add_row(["User", memory.user_id.as_str()]);
    table.add_row([
        "History".to_string(),
        format!("{}/{}", memory.recent_chat_history.len(), max_messages),
    ]);
    for (i, message) in memory.recent_chat_history.iter().enumerate() {
        table.add_row([format!("  {}", i + 1), truncate_string(message, 80)]);
    }
    table.add_row([
        "Relevant info".to_string(),
        memory.relevant_info.len().to_string(),
    ]);
    for fact in &memory.relevant_info {
        table.add_row(["  -".to_string(), truncate_string(fact, 80)]);
    }
    table
}
