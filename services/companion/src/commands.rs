use anyhow::Result;
use companion_core::InputMode;

pub const HELP: &str = "\
Type a message and press enter to send it.
  /talk            start recording from the microphone
  /stop            stop recording
  /interrupt       cut the assistant off
  /mode text|audio switch input mode
  /summary         ask the agent to save a session summary
  /help            show this help
  /quit            end the session and exit";

/// A line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Talk,
    Stop,
    Interrupt,
    Mode(InputMode),
    Summary,
    Help,
    Quit,
    Say(String),
}

/// Parses one line; blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<UserCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(UserCommand::Say(line.to_string())));
    };
    let mut words = command.split_whitespace();
    let command = match (words.next(), words.next()) {
        (Some("talk"), None) => UserCommand::Talk,
        (Some("stop"), None) => UserCommand::Stop,
        (Some("interrupt"), None) => UserCommand::Interrupt,
        (Some("mode"), Some(mode)) => UserCommand::Mode(
            mode.parse()
                .map_err(|_| anyhow::anyhow!("unknown input mode {:?}; use text or audio", mode))?,
        ),
        (Some("summary"), None) => UserCommand::Summary,
        (Some("help"), None) => UserCommand::Help,
        (Some("quit") | Some("exit"), None) => UserCommand::Quit,
        _ => anyhow::bail!("unknown command {:?}; type /help", line),
    };
    Ok(Some(command))
}
