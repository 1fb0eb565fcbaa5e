//! `embody` – runs the agent core against a simulated avatar.
//!
//! The binary:
//!
//! 1. Loads `~/.embody/config.toml` (writing defaults on first run) and
//!    applies `EMBODY_*` environment overrides.
//! 2. Wires a simulated body, the model driver, and every pipeline to one
//!    world event bus, then starts the idle behavior loop.
//! 3. Drops the operator into a small REPL (`/goto`, `/wander`, `/say`, ...).
//! 4. Intercepts **Ctrl-C** to stop the loop and release all movement
//!    signals before exiting.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use embody_hal::{LoggingOutput, OutputChannel, SimActuator};
use embody_kernel::ActivityLock;
use embody_middleware::EventBus;
use embody_runtime::telemetry::init_tracing;
use embody_runtime::{
    BehaviorLoop, EventRouter, LlmDriver, MessagePipeline, ModelClient, NavigationController,
    VoiceConversationPipeline,
};
use embody_types::{Event, EventPayload};

use crate::config::Config;

fn main() {
    // Hold the guard until exit so pending spans are flushed.
    let _telemetry = init_tracing("embody");

    print_banner();

    let mut cfg = match config::load() {
        Ok(Some(c)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            c
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    debug!(config = ?cfg, "effective configuration");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg));
}

async fn run(cfg: Config) {
    let bus = Arc::new(EventBus::default());
    let body = SimActuator::new("avatar");
    let navigation = Arc::new(NavigationController::new(
        Box::new(body.clone()),
        cfg.navigation_config(),
    ));
    let lock = Arc::new(ActivityLock::with_max_duration(cfg.max_lock_duration()));

    let model: Arc<dyn ModelClient> = Arc::new(
        LlmDriver::new(&cfg.model_url, &cfg.active_model)
            .with_api_key(&cfg.api_key)
            .with_audio_models(&cfg.transcription_model, &cfg.speech_model, &cfg.speech_voice),
    );
    let output: Arc<dyn OutputChannel> = Arc::new(LoggingOutput);

    let messages = Arc::new(MessagePipeline::new(
        &cfg.agent_name,
        model.clone(),
        output.clone(),
        lock.clone(),
    ));
    let conversation = Arc::new(
        VoiceConversationPipeline::new(&cfg.agent_name, model.clone(), output.clone(), lock.clone())
            .with_navigation(navigation.clone()),
    );
    let voice = conversation.aggregator(cfg.voice_config());
    let behavior_config = cfg.behavior_config();
    let wander = behavior_config.wander.clone();
    let behavior = Arc::new(BehaviorLoop::new(
        &cfg.agent_name,
        behavior_config,
        model,
        output,
        lock.clone(),
        navigation.clone(),
    ));

    // The simulated body moves one clock tick at a time.
    let tick = navigation.config().tick_interval;
    let router = EventRouter::new(messages, voice)
        .on_tick({
            let body = body.clone();
            let dt = tick.as_secs_f32();
            move |_| body.step(dt)
        })
        .spawn(&bus);
    let clock = tokio::spawn(run_clock(bus.clone(), tick));
    let idle = behavior.start();

    println!();
    println!(
        "  {} is online, talking to {} at {}.",
        cfg.agent_name.bold(),
        cfg.active_model.bold(),
        cfg.model_url.dimmed()
    );
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
            shutdown.notify_one();
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; use /quit to exit");
        }
    }

    // ── Operator shell ────────────────────────────────────────────────────
    let shell = repl::Shell {
        runtime: tokio::runtime::Handle::current(),
        bus: bus.clone(),
        navigation: navigation.clone(),
        behavior: behavior.clone(),
        conversation,
        lock,
        wander,
        shutdown: shutdown.clone(),
    };
    if let Err(e) = std::thread::Builder::new()
        .name("embody-repl".into())
        .spawn(move || repl::run(shell))
    {
        warn!(error = %e, "operator shell unavailable; Ctrl-C to exit");
    }

    shutdown.notified().await;

    behavior.stop();
    navigation.stop_random_walk();
    navigation.stop_navigation("shutdown");
    clock.abort();
    router.abort();
    if let Some(idle) = idle {
        idle.abort();
    }
    info!("embody stopped");
    println!("{}", "  ✓ All movement released. Goodbye.".green());
}

/// Publish a [`EventPayload::Tick`] every `period` until the bus closes.
async fn run_clock(bus: Arc<EventBus>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut sequence = 0u64;
    loop {
        ticker.tick().await;
        sequence += 1;
        if let Err(e) = bus.publish(Event::new("clock", EventPayload::Tick { sequence })) {
            debug!(error = %e, "tick not delivered");
        }
    }
}

fn first_run() -> Config {
    let cfg = Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} No configuration found; defaults saved to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"   ____          __            __    "#.bold().cyan());
    println!("{}", r#"  / __/_ _  ___ / /  ___  ___/ /_ __"#.bold().cyan());
    println!("{}", r#" / _//  ' \/ _ \ _ \/ _ \/ _  / // /"#.bold().cyan());
    println!("{}", r#"/___/_/_/_/_.__/_.__/\___/\_,_/\_, / "#.bold().cyan());
    println!("{}", r#"                              /___/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Embody".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Embodied conversational agent core");
    println!();
}
