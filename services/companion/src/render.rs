use companion_core::SessionEvent;

/// Turns session events into terminal output, streaming replies in place.
#[derive(Default)]
pub struct Renderer {
    // Index and printed length of the message currently on the last line.
    current: Option<(usize, usize)>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The text to print for `event`, if any. Output never ends in a newline
    /// so that a growing reply can continue on the same line.
    pub fn render(&mut self, event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::MessageAppended { index, message } => {
                self.current = Some((*index, message.text.len()));
                Some(format!("\n{}: {}", message.sender, message.text))
            }
            SessionEvent::MessageUpdated { index, message } => match self.current {
                Some((current, printed)) if current == *index => {
                    let suffix = message.text.get(printed..)?;
                    self.current = Some((current, message.text.len()));
                    Some(suffix.to_string())
                }
                _ => {
                    self.current = Some((*index, message.text.len()));
                    Some(format!("\n{}: {}", message.sender, message.text))
                }
            },
            _ => {
                let status = match event {
                    SessionEvent::Ready => "[ready]".to_string(),
                    SessionEvent::Interrupted => "[interrupted]".to_string(),
                    SessionEvent::Error(message) => format!("[error: {}]", message),
                    SessionEvent::InputModeChanged(mode) => format!("[input mode: {}]", mode),
                    SessionEvent::SummarySaved(result) => format!("[summary saved: {}]", result),
                    SessionEvent::Closed(_) => "[connection closed]".to_string(),
                    SessionEvent::Ended => "[session ended]".to_string(),
                    _ => return None,
                };
                self.current = None;
                Some(format!("\n{}", status))
            }
        }
    }
}
