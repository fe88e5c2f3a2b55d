use crate::error::SessionError;
#[cfg(test)]
use mockall::automock;

/// Where a capture device delivers mono PCM16 frames at `CAPTURE_SAMPLE_RATE`.
pub type CaptureSink = tokio::sync::mpsc::Sender<Vec<i16>>;

/// A microphone the session can open and close.
#[cfg_attr(test, automock)]
pub trait AudioCapture {
    /// Acquires the input device and starts delivering frames to `sink`.
    ///
    /// Returns `DeviceUnavailable` when permission is denied or no device
    /// can be opened. Calling it while already capturing is a no-op.
    fn start(&mut self, sink: CaptureSink) -> Result<(), SessionError>;

    /// Stops delivering frames. Safe to call when not capturing.
    fn stop(&mut self);
}

/// A speaker for the assistant's voice.
#[cfg_attr(test, automock)]
pub trait AudioPlayback {
    /// Queues mono PCM16 samples at `PLAYBACK_SAMPLE_RATE` behind whatever is
    /// already queued.
    fn play(&mut self, pcm16: Vec<i16>);

    /// Stops immediately and discards everything queued.
    fn stop(&mut self);
}
