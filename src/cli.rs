use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chatlog", about = "Shared chat log with live subscriptions")]
pub struct Cli {
    /// Path to config file (default: ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Accept chat clients over TCP
    Serve {
        /// Address to listen on, overriding [server].bind_addr
        #[arg(long)]
        bind: Option<String>,
        /// Keep messages in memory only, ignoring the config file
        #[arg(long)]
        ephemeral: bool,
    },
    /// Print the journaled history
    History {
        /// Show only the most recent N messages
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Label this sender's messages as "You"
        #[arg(long, default_value = "")]
        viewer: String,
    },
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            bind: None,
            ephemeral: false,
        })
    }
}
