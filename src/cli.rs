use clap::Parser;

use crate::protocol::RoleAssignment;

#[derive(Parser)]
#[command(name = "colosseum")]
#[command(version = "1.0.0")]
#[command(about = "A real-time client for LLM debate arenas")]
pub struct Args {
    /// Debate topic
    #[arg(default_value = "Is open-source AI safer than closed-source AI?")]
    pub topic: String,

    /// WebSocket endpoint of the arena server
    #[arg(long, default_value = "ws://localhost:8000/ws/arena")]
    pub url: String,

    /// HTTP base URL for the model catalog
    #[arg(long, default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Model id for combatant A
    #[arg(long, default_value = "llama3:latest")]
    pub combatant_a: String,

    /// Model id for combatant B
    #[arg(long, default_value = "qwen3:latest")]
    pub combatant_b: String,

    /// Model id for the judge
    #[arg(long, default_value = "gemma3:latest")]
    pub judge: String,

    /// Maximum reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    pub max_reconnects: u32,

    /// Delay between reconnect attempts, milliseconds
    #[arg(long, default_value = "3000")]
    pub reconnect_delay_ms: u64,

    /// List the models the server offers and exit
    #[arg(long)]
    pub list_models: bool,
}

impl Args {
    pub fn role_assignment(&self) -> RoleAssignment {
        RoleAssignment {
            combatant_a: self.combatant_a.clone(),
            combatant_b: self.combatant_b.clone(),
            judge: self.judge.clone(),
        }
    }
}
