pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod turn;

#[cfg(test)]
mod test_support;

pub use companion_types as types;
pub use companion_types::InputMode;
pub use config::SessionConfig;
pub use error::SessionError;
pub use events::{SessionEvent, SessionSnapshot};
pub use message::{Message, Sender, Transcript};
pub use runtime::{SessionDriver, SessionHandle};
pub use session::Companion;
pub use turn::{Command, TurnMachine, TurnState};
