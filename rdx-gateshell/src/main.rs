use anyhow::Result;
use colored::Colorize;
use gateclock::format::{
    format_hours_minutes, format_minutes_seconds, reminder_message, START_MESSAGE,
};
use gateclock::engine::ListenerKind;
use gateclock::prelude::*;
use gateclock::schedule::cycle_progress;
use gateclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROGRESS_WIDTH: usize = 20;

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", format!("  {} :: 00 / 20 / 40", ENGINE_NAME).cyan().bold());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-".repeat(64).dimmed());
}

/// Whether the bell rings for an edge. With a reminder set, the reminder is
/// the alert and the gate start itself stays silent.
fn rings_for(kind: ListenerKind, is_reminder_enabled: bool) -> bool {
    match kind {
        ListenerKind::Remind => true,
        ListenerKind::GateStart => !is_reminder_enabled,
    }
}

/// Renders the cycle progress as a fixed-width bar.
fn progress_bar(time_until_ms: i64) -> String {
    let filled = (cycle_progress(time_until_ms) * PROGRESS_WIDTH as f64).round() as usize;
    format!(
        "[{}{}]",
        "#".repeat(filled).yellow(),
        "-".repeat(PROGRESS_WIDTH - filled).dimmed()
    )
}

fn print_status(snapshot: &GateSnapshot<chrono_tz::Tz>) {
    println!(
        "--> Next gate {} in {} {}",
        format_hours_minutes(&snapshot.next_gates[0]).cyan().bold(),
        format_minutes_seconds(snapshot.time_until_ms).bold(),
        progress_bar(snapshot.time_until_ms)
    );
    if snapshot.remind_in_minutes > 0 {
        let state = if snapshot.reminder_fired { "sent" } else { "armed" };
        println!(
            "    Reminder {} minutes ahead ({}).",
            snapshot.remind_in_minutes, state
        );
    } else {
        println!("    Reminder off.");
    }
}

/// Spawns tasks that print gate events and, when enabled, a live countdown.
fn spawn_event_listeners(engine: &GateClockEngine, is_watching: Arc<AtomicBool>) {
    let mut gate_rx = engine.subscribe_gate_events();
    tokio::spawn(async move {
        while let Ok(event) = gate_rx.recv().await {
            match event {
                GateEvent::ReminderDue {
                    remind_in_minutes, ..
                } => println!("\n<-- [REMIND] {}\n>> ", reminder_message(remind_in_minutes)),
                GateEvent::GateStarted { gate, .. } => println!(
                    "\n<-- [GATE] {} ({})\n>> ",
                    START_MESSAGE.green().bold(),
                    format_hours_minutes(&gate)
                ),
            }
        }
    });

    let watcher = engine.clone();
    let mut tick_rx = engine.subscribe_tick_events();
    tokio::spawn(async move {
        while tick_rx.recv().await.is_ok() {
            if is_watching.load(Ordering::Relaxed) {
                let snapshot = watcher.snapshot().await;
                println!(
                    "<-- [COUNTDOWN] {} {}",
                    format_minutes_seconds(snapshot.time_until_ms),
                    progress_bar(snapshot.time_until_ms)
                );
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let config = GateClockConfig::load(None)?;
    let is_reminder_enabled = Arc::new(AtomicBool::new(config.remind_in_minutes.is_enabled()));
    let engine = GateClockEngine::new(config)?;

    let is_watching = Arc::new(AtomicBool::new(false));
    let is_sound_enabled = Arc::new(AtomicBool::new(false));
    spawn_event_listeners(&engine, is_watching.clone());

    // The terminal bell stands in for a notification sound.
    for kind in [ListenerKind::GateStart, ListenerKind::Remind] {
        let sound = is_sound_enabled.clone();
        let reminder = is_reminder_enabled.clone();
        let ring = move || {
            if sound.load(Ordering::Relaxed) && rings_for(kind, reminder.load(Ordering::Relaxed)) {
                print!("\x07");
            }
        };
        match kind {
            ListenerKind::Remind => engine.on_remind(ring).await,
            ListenerKind::GateStart => engine.on_gate_start(ring).await,
        };
    }

    info!("Spawning {} in the background...", ENGINE_NAME);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = engine.clone();
    let engine_task = tokio::spawn(async move { runner.run_until(shutdown_rx).await });

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );
    print_status(&engine.snapshot().await);

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                match args.first().copied().unwrap_or("") {
                    "status" => print_status(&engine.snapshot().await),
                    "gates" => {
                        let snapshot = engine.snapshot().await;
                        println!("Upcoming gates:");
                        for (index, gate) in snapshot.next_gates.iter().enumerate() {
                            println!("  #{}  {}", index, format_hours_minutes(gate));
                        }
                    }
                    "remind" => match args.get(1) {
                        Some(&"off") => {
                            engine.set_remind_in_minutes(0).await?;
                            is_reminder_enabled.store(false, Ordering::Relaxed);
                            println!("--> Reminder disabled.");
                        }
                        Some(minutes_str) => match minutes_str.parse::<u32>() {
                            Ok(minutes) => match engine.set_remind_in_minutes(minutes).await {
                                Ok(()) => {
                                    is_reminder_enabled.store(minutes > 0, Ordering::Relaxed);
                                    println!("--> Reminder set to {} minutes ahead.", minutes)
                                }
                                Err(e) => println!("Error: {}", e),
                            },
                            Err(_) => {
                                println!("Error: '{}' is not a valid number of minutes.", minutes_str)
                            }
                        },
                        None => println!("Usage: remind <MINUTES|off>"),
                    },
                    "sound" => match args.get(1) {
                        Some(&"on") => {
                            is_sound_enabled.store(true, Ordering::Relaxed);
                            println!("--> Bell enabled.");
                        }
                        Some(&"off") => {
                            is_sound_enabled.store(false, Ordering::Relaxed);
                            println!("--> Bell disabled.");
                        }
                        _ => println!("Usage: sound <on|off>"),
                    },
                    "watch" => match args.get(1) {
                        Some(&"on") => {
                            is_watching.store(true, Ordering::Relaxed);
                            println!("--> Started printing the countdown every tick.");
                        }
                        Some(&"off") => {
                            is_watching.store(false, Ordering::Relaxed);
                            println!("--> Stopped printing the countdown.");
                        }
                        _ => println!("Usage: watch <on|off>"),
                    },
                    "help" => {
                        println!("Available commands:");
                        println!("  status                - Shows the countdown to the next gate.");
                        println!("  gates                 - Lists the upcoming gates.");
                        println!("  remind <M|off>        - Reminds M minutes before each gate (0-19).");
                        println!("  sound <on|off>        - Rings the terminal bell on reminders and gates.");
                        println!("  watch <on|off>        - Prints the countdown on every tick.");
                        println!("  exit                  - Quits the shell.");
                    }
                    "exit" => break,
                    "" => {}
                    _ => println!("Unknown command: '{}'. Type 'help'.", line),
                }
            }
            Err(_) => break,
        }
    }

    println!("Exiting gateshell...");
    shutdown_tx.send(()).ok();
    engine_task.await?;
    Ok(())
}
