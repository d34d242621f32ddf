use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

use clover::config::CloverConfig;
use clover::persona::{AgentId, Persona};
use clover::runtime::SessionRuntime;
use clover::session::{SessionEngine, SessionError, SessionEvent, SubmitOutcome};
use clover::webhook::WebhookLogger;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,clover=debug")),
        )
        .init();

    let config = CloverConfig::load();
    if config.llm_api_key.as_deref().unwrap_or("").trim().is_empty() {
        tracing::warn!(
            "No generation API key configured; set GEMINI_API_KEY or llm_api_key in clover_config.toml"
        );
    }

    let runtime = SessionRuntime::bootstrap(config).context("failed to bootstrap session runtime")?;

    let rt = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    rt.block_on(run(runtime))
}

async fn run(runtime: SessionRuntime) -> Result<()> {
    let SessionRuntime {
        engine,
        store,
        logger,
        events,
        ..
    } = runtime;

    let today = Local::now().date_naive();
    if engine.check_login(today).await {
        tracing::info!("Streak reset after a gap in logins");
    }

    // Once-per-day nudge while missions are still open.
    let state = engine.snapshot().await;
    if !state.all_missions_complete() {
        let already_reminded = store
            .load_reminder_date()
            .unwrap_or(None)
            .map(|date| date == today)
            .unwrap_or(false);
        if !already_reminded {
            println!(
                "⚡ {} of 4 missions cleared on day {} — your handlers are waiting.",
                state.completed_count(),
                state.day
            );
            if let Err(e) = store.save_reminder_date(today) {
                tracing::warn!("Failed to stamp reminder date: {:#}", e);
            }
        }
    }

    // Session notifications render between prompts.
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            match event {
                SessionEvent::MissionCompleted { agent_id, day, title } => {
                    println!(
                        "\n★ Mission logged — day {}, {}: {}",
                        day,
                        Persona::get(agent_id).name,
                        title
                    );
                }
                SessionEvent::DayCleared { day } => {
                    println!(
                        "\n═══ DAY {} CLEARED ═══\nAll four handlers report success. Type /next when you're ready for the next day.",
                        day
                    );
                }
                SessionEvent::Reset => {
                    println!("\nAll data wiped. Starting over from day 1.");
                }
            }
        }
    });

    let state = engine.snapshot().await;
    println!(
        "Day {:02} · streak {} · talking to {}. Type /help for commands.",
        state.day,
        state.stats.streak,
        Persona::get(state.current_agent_id).name
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if !handle_command(command, &engine, &logger, &mut lines).await? {
                break;
            }
            continue;
        }

        submit(&engine, &logger, input.to_string()).await;
    }

    Ok(())
}

/// Dispatch one slash command. Returns `false` when the loop should exit.
async fn handle_command(
    command: &str,
    engine: &Arc<SessionEngine>,
    logger: &WebhookLogger,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<bool> {
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "quit" | "exit" => return Ok(false),
        "help" => {
            println!(
                "Commands:\n  /agent <jack|hal|saki|ren>  switch handler\n  /mission                    ask for today's mission\n  /stats                      show skill scores and streak\n  /log                        show the mission archive\n  /delete <id>                remove an archive entry\n  /next                       start the next day after a clear\n  /reset                      wipe all data (asks first)\n  /quit                       leave"
            );
        }
        "agent" => match AgentId::parse(arg) {
            Some(agent_id) => {
                engine.set_current_agent(agent_id).await;
                println!("Now talking to {}.", Persona::get(agent_id).name);
            }
            None => println!("Unknown agent '{}'. Pick jack, hal, saki or ren.", arg),
        },
        "mission" => {
            let state = engine.snapshot().await;
            let agent_id = state.current_agent_id;
            let done = state.daily_progress.get(&agent_id).copied().unwrap_or(false);
            let prompt = if done {
                "Today's quota is already cleared — anything else?"
            } else {
                "Give me today's mission."
            };
            submit(engine, logger, prompt.to_string()).await;
        }
        "stats" => {
            let state = engine.snapshot().await;
            let stats = &state.stats;
            println!(
                "Day {:02} · {}/4 cleared · streak {}\n  kindness     {:>3}\n  fun          {:>3}\n  memory       {:>3}\n  articulation {:>3}",
                state.day,
                state.completed_count(),
                stats.streak,
                stats.kindness,
                stats.fun,
                stats.memory,
                stats.articulation
            );
        }
        "log" => {
            let state = engine.snapshot().await;
            if state.mission_logs.is_empty() {
                println!("No missions archived yet.");
            } else {
                let mut entries = state.mission_logs.clone();
                entries.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
                for entry in entries {
                    println!(
                        "  day {:>2} · {:<4} · {} ({})  [{}]",
                        entry.day,
                        Persona::get(entry.agent_id).name,
                        entry.title,
                        entry.completed_at.format("%Y-%m-%d %H:%M"),
                        entry.id
                    );
                }
            }
        }
        "delete" => {
            if arg.is_empty() {
                println!("Usage: /delete <id> (ids are shown by /log)");
            } else if engine.delete_log_entry(arg).await {
                println!("Archive entry removed.");
            } else {
                println!("No archive entry with that id.");
            }
        }
        "next" => match engine.advance_day().await {
            Ok(day) => println!("Day {:02} begins. All handlers are back on duty.", day),
            Err(SessionError::DayNotCleared) => {
                println!("The day isn't cleared yet — finish all four missions first.")
            }
            Err(e) => println!("{}", e),
        },
        "reset" => {
            println!("WARNING: this wipes every stat, transcript and archive entry. Type 'y' to confirm.");
            let confirmed = matches!(
                lines.next_line().await?.as_deref().map(str::trim),
                Some("y") | Some("yes")
            );
            if confirmed {
                engine.reset_all().await.context("reset failed")?;
            } else {
                println!("Reset cancelled.");
            }
        }
        _ => println!("Unknown command '/{}'. Type /help.", name),
    }

    Ok(true)
}

async fn submit(engine: &Arc<SessionEngine>, logger: &WebhookLogger, text: String) {
    let state = engine.snapshot().await;
    let agent_id = state.current_agent_id;
    let day = state.day;
    logger.spawn_log("INFO", format!("chat send: {} day {}", agent_id, day));

    match engine.submit_message(agent_id, &text).await {
        Ok(SubmitOutcome::Reply { message, .. }) => {
            println!("{}> {}", Persona::get(agent_id).name, message.text.trim());
        }
        Ok(SubmitOutcome::Busy) => {
            println!("Still decoding the previous transmission — hold on.");
        }
        Ok(SubmitOutcome::Ignored) => {}
        Err(SessionError::Provider(e)) => {
            tracing::warn!("Reply generation failed: {:#}", e);
            logger.spawn_log("ERROR", format!("chat error: {} day {}: {}", agent_id, day, e));
            println!("Network glitch — the line dropped. Send that again.");
        }
        Err(e) => {
            tracing::error!("Submit failed: {}", e);
            println!("{}", e);
        }
    }
}
