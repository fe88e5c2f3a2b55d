mod commands;
mod config;
mod render;

use std::io::Write;

use crate::commands::UserCommand;
use crate::config::{Config, INPUT_CHUNK_SIZE, OUTPUT_BUFFER_MS, OUTPUT_CHUNK_SIZE};
use anyhow::{Context, Result};
use clap::Parser;
use companion_core::{
    Companion, InputMode, SessionConfig, SessionDriver, SessionError, SessionEvent, SessionHandle,
};
use companion_native_utils::{Microphone, Speaker};
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Talk to the companion agent from a terminal")]
struct Cli {
    /// The user to start the session as (overrides COMPANION_USER_ID)
    user_id: Option<String>,
    /// WebSocket endpoint of the agent (overrides COMPANION_URL)
    #[arg(long)]
    url: Option<String>,
    /// Start in text input mode
    #[arg(long)]
    text: bool,
    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    if args.list_devices {
        println!(
            "Input devices:\n{}",
            companion_native_utils::device::get_available_inputs()?
        );
        println!(
            "Output devices:\n{}",
            companion_native_utils::device::get_available_outputs()?
        );
        return Ok(());
    }

    // --- 4. Build the Session ---
    let url = args.url.unwrap_or_else(|| config.url.clone());
    let transport = companion_realtime::Client::new(
        companion_realtime::Config::builder()
            .with_url(&url)
            .with_connect_timeout(config.connect_timeout)
            .build(),
    );
    let microphone = Microphone::new(config.input_device.clone(), INPUT_CHUNK_SIZE);
    let speaker = Speaker::new(config.output_device.clone(), OUTPUT_CHUNK_SIZE, OUTPUT_BUFFER_MS);

    let mut session_config = SessionConfig::default();
    if let Some(greeting) = &config.greeting {
        session_config = session_config.with_greeting(greeting);
    }
    let input_mode = if args.text {
        InputMode::Text
    } else {
        InputMode::Audio
    };
    let companion = Companion::new(transport, microphone, speaker, session_config)
        .with_input_mode(input_mode);
    let (driver, handle) = SessionDriver::new(companion);

    tracing::info!("Companion client starting against {}", url);

    // --- 5. Run ---
    let printer = tokio::spawn(print_events(handle.subscribe()));
    let user_id = args.user_id.or(config.user_id).unwrap_or_default();
    let ui = tokio::spawn(run_terminal(handle, user_id));

    // The driver owns the audio streams, which stay on this task. It returns
    // once the terminal task has dropped its handle.
    let interrupted = tokio::select! {
        _ = driver.run() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    printer.abort();
    println!();

    if interrupted {
        tracing::info!("Received Ctrl-C, shutting down");
        // A pending stdin read cannot be cancelled and would hold up runtime shutdown.
        std::process::exit(0);
    }
    ui.await.context("Terminal task failed")?
}

/// Starts the session and forwards terminal lines to it until /quit or EOF.
async fn run_terminal(handle: SessionHandle, user_id: String) -> Result<()> {
    match handle.initialize(&user_id).await {
        Ok(()) => {}
        Err(SessionError::NotAuthenticated) => {
            anyhow::bail!("No user id; pass one on the command line or set COMPANION_USER_ID")
        }
        Err(e) => {
            handle.end().await;
            return Err(e).context("Failed to start the session");
        }
    }
    println!("{}", commands::HELP);

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        match command {
            UserCommand::Talk => {
                if !handle.start_recording().await {
                    println!("[microphone unavailable; type your message instead]");
                }
            }
            UserCommand::Stop => handle.stop_recording().await,
            UserCommand::Interrupt => handle.interrupt().await,
            UserCommand::Mode(mode) => handle.set_input_mode(mode).await,
            UserCommand::Summary => handle.request_summary().await,
            UserCommand::Help => println!("{}", commands::HELP),
            UserCommand::Quit => break,
            UserCommand::Say(text) => {
                if !handle.send_text_message(&text).await {
                    println!("[not connected yet]");
                }
            }
        }
    }

    handle.end().await;
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    let mut renderer = render::Renderer::new();
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(text) = renderer.render(&event) {
                    print!("{}", text);
                    if let Err(e) = std::io::stdout().flush() {
                        tracing::warn!("Failed to flush stdout: {}", e);
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("Terminal fell behind; {} session events skipped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
