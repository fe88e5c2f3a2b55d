/// The fixed texts a session shows the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Seeds the transcript when the agent reports ready.
    pub greeting: String,
    /// Shown as a user message while the microphone is open.
    pub listening_placeholder: String,
    /// Appended when the agent reports an error.
    pub error_fallback: String,
    /// Appended when the connection cannot be established.
    pub connection_fallback: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting: "Hello! I'm CureZ, your AI mentor. I'm here to listen and support you. What's on your mind today?".to_string(),
            listening_placeholder: "Listening...".to_string(),
            error_fallback: "Sorry, I encountered an error. Please try again.".to_string(),
            connection_fallback: "Sorry, I'm having trouble connecting. Please try again later."
                .to_string(),
        }
    }
}

impl SessionConfig {
    pub fn with_greeting(mut self, greeting: &str) -> Self {
        self.greeting = greeting.to_string();
        self
    }
}
