//! REPL – operator shell for a running agent.
//!
//! Supported slash-commands:
//!   /help          – show this list
//!   /goto <x> <z>  – walk the avatar to a ground-plane point
//!   /wander        – start a random walk with the configured parameters
//!   /stop          – stop walking and any navigation
//!   /say <text>    – speak `text` out loud
//!   /status        – position, movement, and activity state
//!   /quit | /exit  – shut down
//!
//! Any other line is published to the world as a chat message from
//! `operator`.

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::warn;

use embody_kernel::ActivityLock;
use embody_middleware::EventBus;
use embody_runtime::{BehaviorLoop, NavigationController, VoiceConversationPipeline, WanderConfig};
use embody_types::{Event, EventPayload};

/// Sender name for lines typed at the prompt.
pub const OPERATOR: &str = "operator";

/// One parsed prompt line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Goto { x: f32, z: f32 },
    Wander,
    Stop,
    Say(String),
    Status,
    Quit,
    Chat(String),
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Chat(line.to_string());
    }
    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default();
    match head {
        "/help" => Command::Help,
        "/goto" => {
            let coords: Vec<f32> = parts.filter_map(|p| p.parse().ok()).collect();
            match coords.as_slice() {
                [x, z] if x.is_finite() && z.is_finite() => Command::Goto { x: *x, z: *z },
                _ => Command::Invalid("usage: /goto <x> <z>".to_string()),
            }
        }
        "/wander" => Command::Wander,
        "/stop" => Command::Stop,
        "/say" => {
            let text = line[head.len()..].trim();
            if text.is_empty() {
                Command::Invalid("usage: /say <text>".to_string())
            } else {
                Command::Say(text.to_string())
            }
        }
        "/status" => Command::Status,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command '{other}'")),
    }
}

/// Everything the shell can drive.
pub struct Shell {
    pub runtime: Handle,
    pub bus: Arc<EventBus>,
    pub navigation: Arc<NavigationController>,
    pub behavior: Arc<BehaviorLoop>,
    pub conversation: Arc<VoiceConversationPipeline>,
    pub lock: Arc<ActivityLock>,
    pub wander: WanderConfig,
    pub shutdown: Arc<Notify>,
}

/// Read lines from stdin until EOF or `/quit`.  Blocks; run it on its own
/// thread.
pub fn run(shell: Shell) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", "embody>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        if !shell.execute(parse_command(&line)) {
            break;
        }
    }
}

impl Shell {
    /// Carry out `command`.  Returns `false` once the shell should exit.
    fn execute(&self, command: Command) -> bool {
        match command {
            Command::Empty => {}
            Command::Help => cmd_help(),
            Command::Goto { x, z } => {
                let _rt = self.runtime.enter();
                let walk = self.navigation.spawn_goto(x, z);
                self.runtime.spawn(async move {
                    if let Ok(outcome) = walk.await {
                        tracing::info!(?outcome, "goto finished");
                    }
                });
                println!("  Walking to ({x:.1}, {z:.1}).");
            }
            Command::Wander => {
                let _rt = self.runtime.enter();
                self.navigation.spawn_random_walk(
                    self.wander.interval,
                    self.wander.max_distance,
                    self.wander.duration,
                );
                println!("  Wandering for {:?}.", self.wander.duration);
            }
            Command::Stop => {
                self.navigation.stop_random_walk();
                self.navigation.stop_navigation("operator stop");
                println!("  Stopped.");
            }
            Command::Say(text) => {
                let conversation = Arc::clone(&self.conversation);
                self.runtime.spawn(async move {
                    match conversation.speak(&text).await {
                        Ok(true) => {}
                        Ok(false) => println!("  {}", "Voice busy; not spoken.".yellow()),
                        Err(e) => warn!(error = %e, "speech failed"),
                    }
                });
            }
            Command::Status => self.cmd_status(),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                self.shutdown.notify_one();
                return false;
            }
            Command::Chat(text) => {
                let event = Event::new(
                    OPERATOR,
                    EventPayload::ChatMessage {
                        sender: OPERATOR.to_string(),
                        text,
                    },
                );
                if let Err(e) = self.bus.publish(event) {
                    println!("{}: {}", "Chat not delivered".red(), e);
                }
            }
            Command::Invalid(msg) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "Error:".red(),
                    msg.yellow(),
                    "/help".bold()
                );
            }
        }
        true
    }

    fn cmd_status(&self) {
        let p = self.navigation.position();
        let target = self
            .navigation
            .target()
            .map(|t| format!("({:.1}, {:.1})", t.x, t.z))
            .unwrap_or_else(|| "none".to_string());
        println!();
        println!("  Position    : ({:.2}, {:.2}, {:.2})", p.x, p.y, p.z);
        println!("  Target      : {}", target);
        println!("  Navigating  : {}", yes_no(self.navigation.is_navigating()));
        println!("  Wandering   : {}", yes_no(self.navigation.is_walking_randomly()));
        println!("  In activity : {}", yes_no(self.lock.is_active()));
        println!("  Voice busy  : {}", yes_no(self.conversation.flag().is_set()));
        println!("  Idle loop   : {}", yes_no(self.behavior.is_running()));
        println!();
    }
}

fn yes_no(flag: bool) -> colored::ColoredString {
    if flag { "yes".green() } else { "no".dimmed() }
}

fn cmd_help() {
    println!();
    println!("{}", "Embody Commands".bold().underline());
    println!("  {} – walk to a point",            "/goto <x> <z>".bold().cyan());
    println!("  {}        – start a random walk", "/wander".bold().cyan());
    println!("  {}          – stop moving",       "/stop".bold().cyan());
    println!("  {}   – speak out loud",           "/say <text>".bold().cyan());
    println!("  {}        – show agent state",    "/status".bold().cyan());
    println!("  {}   – exit",                     "/quit  /exit".bold().cyan());
    println!("  Anything else is sent as chat from '{OPERATOR}'.");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_chat() {
        assert_eq!(parse_command("  hello there "), Command::Chat("hello there".into()));
        assert_eq!(parse_command("   "), Command::Empty);
    }

    #[test]
    fn goto_needs_two_finite_numbers() {
        assert_eq!(parse_command("/goto 3 -4.5"), Command::Goto { x: 3.0, z: -4.5 });
        assert!(matches!(parse_command("/goto 3"), Command::Invalid(_)));
        assert!(matches!(parse_command("/goto a b"), Command::Invalid(_)));
        assert!(matches!(parse_command("/goto NaN 1"), Command::Invalid(_)));
    }

    #[test]
    fn say_keeps_the_rest_of_the_line() {
        assert_eq!(parse_command("/say  good   morning"), Command::Say("good   morning".into()));
        assert!(matches!(parse_command("/say"), Command::Invalid(_)));
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("/help"), Command::Help);
        assert_eq!(parse_command("/wander"), Command::Wander);
        assert_eq!(parse_command("/stop"), Command::Stop);
        assert_eq!(parse_command("/status"), Command::Status);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/exit"), Command::Quit);
        assert!(matches!(parse_command("/dance"), Command::Invalid(_)));
    }
}
