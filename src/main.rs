use std::io::Write;
use std::time::Duration;

use clap::Parser;
use colored::*;

use colosseum::catalog;
use colosseum::cli::Args;
use colosseum::connection::ConnectionConfig;
use colosseum::session::{Lifecycle, Session};
use colosseum::{ArenaClient, ConnectionStatus, Role};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.list_models {
        list_models(&args.api_url).await;
        return;
    }

    run_debate(args).await;
}

async fn list_models(api_url: &str) {
    match catalog::fetch_models(api_url).await {
        Ok(models) => {
            println!("{}", "Available models".bold());
            for model in models {
                let size = model.size.as_deref().unwrap_or("-");
                println!("  {:<28} {:<24} {}", model.name.bright_cyan(), model.model_id, size);
            }
        }
        Err(e) => {
            eprintln!("{} {}", "Failed to fetch models:".bright_red(), e);
            std::process::exit(1);
        }
    }
}

async fn run_debate(args: Args) {
    let mut config = ConnectionConfig::new(args.url.clone());
    config.max_reconnect_attempts = args.max_reconnects;
    config.reconnect_delay = Duration::from_millis(args.reconnect_delay_ms);

    let client = ArenaClient::new(config);
    client.connect();

    // Wait for the socket before issuing the start command.
    loop {
        match client.connection_status() {
            ConnectionStatus::Connected => break,
            ConnectionStatus::Failed => {
                let cause = client
                    .connection_error()
                    .unwrap_or_else(|| "reconnect budget exhausted".to_string());
                eprintln!("{} {}", "Could not reach the arena:".bright_red(), cause);
                std::process::exit(1);
            }
            _ => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }

    let roles = args.role_assignment();
    println!("{}", "⚔ LLM Colosseum".bold());
    println!("  topic: {}", args.topic.bright_white());
    println!(
        "  {} vs {} — judged by {}\n",
        roles.combatant_a.bright_blue(),
        roles.combatant_b.bright_yellow(),
        roles.judge.bright_magenta()
    );

    if let Err(e) = client.start_debate(&args.topic, roles) {
        eprintln!("{} {}", "Could not start the debate:".bright_red(), e);
        std::process::exit(1);
    }

    render_until_done(&client).await;
    client.stop().await;
}

/// Poll snapshots and print newly streamed text until the session leaves
/// Active. The store is the single source of truth; this loop only reads.
async fn render_until_done(client: &ArenaClient) {
    let mut printed: [String; 3] = Default::default(); // per-role, indexed by role
    let mut last_speaker: Option<Role> = None;
    let mut seen_active = false;

    loop {
        let snap = client.snapshot();

        if snap.lifecycle == Lifecycle::Active {
            seen_active = true;
        }

        if let Some(role) = snap.active_speaker {
            if last_speaker != Some(role) {
                print_turn_header(&snap, role);
                last_speaker = Some(role);
                // A turn for this role always restarts its buffer.
                printed[role_index(role)].clear();
            }
            let fresh = unprinted(&snap.stream(role).text, &mut printed[role_index(role)]);
            if !fresh.is_empty() {
                print!("{}", colorize(role, fresh));
                let _ = std::io::stdout().flush();
            }
        }

        match snap.lifecycle {
            Lifecycle::Completed => {
                print_summary(&snap);
                return;
            }
            Lifecycle::Idle if seen_active => {
                let reason = snap.last_error.unwrap_or_else(|| "session ended".to_string());
                eprintln!("\n{} {}", "Debate interrupted:".bright_red(), reason);
                return;
            }
            _ => {}
        }

        if client.connection_status() == ConnectionStatus::Failed && !seen_active {
            eprintln!("{}", "Connection failed before the debate began.".bright_red());
            return;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn print_turn_header(snap: &Session, role: Role) {
    let model = snap
        .roles
        .as_ref()
        .map(|r| r.model_for(role).to_string())
        .unwrap_or_default();
    println!("\n\n{}", format!("── {} ({}) ──", role, model).bold());
}

fn print_summary(snap: &Session) {
    println!("\n\n{}", "── debate complete ──".bold());
    if let Some(summary) = &snap.summary {
        println!("  turns: {}  state: {}", summary.turns, summary.state);
    }
    for role in Role::ALL {
        if let Some(metrics) = &snap.stream(role).metrics {
            println!(
                "  {:<12} {:>6.1} tok/s  {:>5} tokens",
                role.to_string(),
                metrics.tps,
                metrics.total_tokens
            );
        }
    }
}

/// The not-yet-printed suffix of `text`, tracked against what was already
/// printed for the role. A buffer that no longer extends the printed prefix
/// means the role started a new turn between two polls; printing restarts
/// from the top of the new buffer instead of slicing at a stale offset.
fn unprinted<'a>(text: &'a str, printed: &mut String) -> &'a str {
    if !text.starts_with(printed.as_str()) {
        printed.clear();
    }
    let fresh = &text[printed.len()..];
    printed.push_str(fresh);
    fresh
}

fn role_index(role: Role) -> usize {
    match role {
        Role::CombatantA => 0,
        Role::CombatantB => 1,
        Role::Judge => 2,
    }
}

fn colorize(role: Role, text: &str) -> ColoredString {
    match role {
        Role::CombatantA => text.bright_blue(),
        Role::CombatantB => text.bright_yellow(),
        Role::Judge => text.bright_magenta(),
    }
}
