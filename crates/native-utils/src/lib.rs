pub mod audio;
pub mod capture;
pub mod device;
pub mod playback;

pub use capture::Microphone;
pub use playback::Speaker;
