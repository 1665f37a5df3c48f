//! Rock-paper-scissors in the terminal.
//!
//! ```text
//! cargo run --example terminal_duel -- --name Ada --mode cpu
//! cargo run --example terminal_duel -- --name Ada --mode friend
//! cargo run --example terminal_duel -- --name Ada --mode online --bind 0.0.0.0:7000
//! cargo run --example terminal_duel -- --name Bo --mode online --join 192.168.1.20:7000
//! ```
//!
//! Type `r`, `p` or `s` to play, `ok` to hand the device over in friend mode, `n` for the next
//! round, `reset` to clear the score and `q` to quit. Online matches end on reset.

#![allow(clippy::print_stdout)]

use clap::{Parser, ValueEnum};
use rps_arena::prelude::*;
use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use web_time::Duration;

const TICK: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Cpu,
    Friend,
    Online,
}

impl From<ModeArg> for PlayMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Cpu => PlayMode::Automated,
            ModeArg::Friend => PlayMode::Hotseat,
            ModeArg::Online => PlayMode::Networked,
        }
    }
}

#[derive(Parser)]
struct Opt {
    #[arg(short, long)]
    name: String,
    #[arg(short, long, value_enum, default_value = "cpu")]
    mode: ModeArg,
    /// Room id (host:port) to join instead of hosting.
    #[arg(short, long)]
    join: Option<String>,
    /// Address to listen on when hosting.
    #[arg(short, long)]
    bind: Option<SocketAddr>,
    /// Seed for the computer opponent.
    #[arg(short, long)]
    seed: Option<u64>,
}

/// Announces rounds like a ringside commentator.
struct Announcer;

impl CommentaryService for Announcer {
    fn request_commentary(&mut self, request: &CommentaryRequest) -> Result<String, CommentaryError> {
        let line = match request.winner_name() {
            Some(winner) => format!(
                "{} vs {}! {winner} walks away with it.",
                request.local_action, request.remote_action
            ),
            None => format!("Both went {}. Nobody blinks.", request.local_action),
        };
        Ok(line)
    }
}

fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_event(ctx: &MatchContext, event: &MatchEvent) {
    match event {
        MatchEvent::PhaseChanged { to, .. } => match to {
            MatchPhase::ActiveRound { turn: Side::A } => {
                println!(
                    "Round {} - {}, choose [r]ock, [p]aper or [s]cissors",
                    ctx.display_round(),
                    ctx.local_name()
                );
            },
            MatchPhase::ActiveRound { turn: Side::B } => {
                println!("{}, your turn: [r]ock, [p]aper or [s]cissors", ctx.opponent_name());
            },
            MatchPhase::Transition => {
                println!("Pass the device to {} and type ok", ctx.opponent_name());
            },
            _ => {},
        },
        MatchEvent::ListeningOn { endpoint } => println!("Hosting. Room id: {endpoint}"),
        MatchEvent::HandshakeCompleted { remote_name } => println!("{remote_name} joined."),
        MatchEvent::OpponentCommitted => println!("{} has chosen.", ctx.opponent_name()),
        MatchEvent::RoundResolved {
            local_action,
            remote_action,
            outcome,
            score,
            ..
        } => {
            let verdict = match outcome.winner() {
                Some(Side::A) => format!("{} wins", ctx.local_name()),
                Some(Side::B) => format!("{} wins", ctx.opponent_name()),
                None => "Draw".to_owned(),
            };
            println!(
                "{} {local_action} - {remote_action} {} : {verdict} ({} - {})",
                ctx.local_name(),
                ctx.opponent_name(),
                score.side_a,
                score.side_b
            );
            println!("Type n for the next round.");
        },
        MatchEvent::CommentaryUpdated { text, .. } => println!("  \"{text}\""),
        MatchEvent::OpponentReady => println!("{} wants a rematch.", ctx.opponent_name()),
        MatchEvent::Disconnected { reason } => println!("Disconnected: {reason}"),
        MatchEvent::Error { message } => println!("Error: {message}"),
        _ => {},
    }
}

fn parse_action(input: &str) -> Option<Action> {
    match input {
        "r" | "rock" => Some(Action::Rock),
        "p" | "paper" => Some(Action::Paper),
        "s" | "scissors" => Some(Action::Scissors),
        _ => None,
    }
}

fn handle_line(ctx: &mut MatchContext, mode: PlayMode, line: &str) -> ArenaResult<bool> {
    let input = line.trim().to_lowercase();
    if let Some(action) = parse_action(&input) {
        ctx.commit_action(action)?;
        return Ok(true);
    }
    match input.as_str() {
        "q" | "quit" => return Ok(false),
        "ok" => ctx.confirm_handoff()?,
        "n" | "next" => {
            ctx.play_again()?;
            if ctx.is_waiting_for_rematch() {
                println!("Waiting for {}...", ctx.opponent_name());
            }
        },
        "reset" => {
            ctx.reset()?;
            if mode != PlayMode::Networked {
                ctx.select_mode(mode)?;
            }
        },
        "" => {},
        other => println!("Unknown command: {other}"),
    }
    Ok(true)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(tracing::Level::INFO)
            .finish(),
    )?;

    let opt = Opt::parse();

    let config = MatchConfig {
        opponent_seed: opt.seed,
        ..MatchConfig::default()
    };
    let transport = match opt.bind {
        Some(addr) => TcpTransport::bind_to(addr),
        None => TcpTransport::new(),
    };
    let mut ctx = MatchBuilder::new()
        .with_config(config)
        .with_transport(transport)
        .build()?;

    ctx.submit_display_name(&opt.name)?;
    let mode = PlayMode::from(opt.mode);
    ctx.select_mode(mode)?;
    if mode == PlayMode::Networked {
        match &opt.join {
            Some(room) => ctx.join_match(room)?,
            None => {
                ctx.host_match()?;
            },
        }
    }

    let lines = stdin_lines();
    let mut announcer = Announcer;
    loop {
        ctx.poll();

        for request in ctx.take_requests() {
            if let MatchRequest::Commentary(request) = request {
                ctx.apply_commentary(fulfill(&mut announcer, &request));
            }
        }

        let events: Vec<MatchEvent> = ctx.events().collect();
        for event in &events {
            print_event(&ctx, event);
        }

        if ctx.phase() == MatchPhase::Menu {
            println!("Match over.");
            break;
        }

        match lines.try_recv() {
            Ok(line) => match handle_line(&mut ctx, mode, &line) {
                Ok(true) => {},
                Ok(false) => break,
                Err(err) => println!("{err}"),
            },
            Err(TryRecvError::Empty) => thread::sleep(TICK),
            Err(TryRecvError::Disconnected) => break,
        }
    }

    Ok(())
}
