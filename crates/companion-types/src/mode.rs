use std::fmt;

/// Which input the user is currently using to talk to the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Audio,
    Text,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Audio => write!(f, "audio"),
            InputMode::Text => write!(f, "text"),
        }
    }
}

impl std::str::FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" | "voice" => Ok(InputMode::Audio),
            "text" => Ok(InputMode::Text),
            other => Err(format!("unknown input mode: {other}")),
        }
    }
}
