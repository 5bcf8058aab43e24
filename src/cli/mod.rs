// src/cli/mod.rs — CLI definition (clap derive)

pub mod chat;
pub mod session;
pub mod status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Terminal chat assistant with a spend cap and an offline mode",
    version
)]
pub struct Cli {
    /// Model to use: gpt-3.5-turbo, gpt-4o or local-llm (skips the picker)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Suppress cost lines after each reply
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive chat session (default)
    Chat,
    /// Show model, credential, spend and transcript status
    Status,
    /// Send a single prompt and print the reply
    Ask {
        /// Prompt text
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
}
