//! Command-line interface for the `mise` binary

pub mod chat;
pub mod index;
pub mod memory;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use chat::{AskCommand, ChatCommand};
pub use index::IndexCommand;
pub use memory::MemoryCommand;
pub use output::OutputFormat;

/// Mise - a recipe assistant that remembers you
#[derive(Parser)]
#[command(name = "mise")]
#[command(about = "A memory-grounded recipe assistant")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Keep user memory in process only; nothing is written to disk
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Output in JSON format
    #[arg(long, short, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Interactive chat session
    Chat(ChatCommand),

    /// Answer a single message
    Ask(AskCommand),

    /// User memory management
    Memory(MemoryCommand),

    /// Chunk index management
    Index(IndexCommand),
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Table
        }
    }
}
