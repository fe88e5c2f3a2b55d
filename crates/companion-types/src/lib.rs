//now people using the types library can use these types
pub mod audio;
pub mod events;
mod mode;

//re-export types for easier access
pub use audio::Base64EncodedAudioBytes;
pub use events::{ClientEvent, ServerEvent};
pub use mode::InputMode;
