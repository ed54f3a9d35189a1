//! Media capture collaborators
//!
//! The signal core never opens devices itself. It receives tracks from a
//! [`MediaDevices`] implementation and wraps each one in a [`StreamGuard`],
//! which owns the track exclusively and stops it exactly once: on explicit
//! release or when the guard is dropped.

use log::{debug, warn};
use std::collections::VecDeque;

use crate::error::AssessmentError;
use crate::spectrum::SpectrumAnalyzer;
use crate::visual::Frame;

/// A live device track that can be stopped
pub trait MediaTrack {
    fn label(&self) -> &str {
        "track"
    }

    /// Stop the track and free the device
    fn stop(&mut self);
}

/// Microphone track yielding one energy reading (0-255 scale) per call
pub trait AudioSource: MediaTrack {
    fn read_energy(&mut self) -> Result<f64, AssessmentError>;
}

/// Camera track yielding one downsampled frame per call
pub trait VideoSource: MediaTrack {
    fn capture(&mut self) -> Result<Frame, AssessmentError>;
}

impl<T: MediaTrack + ?Sized> MediaTrack for Box<T> {
    fn label(&self) -> &str {
        (**self).label()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

impl<T: AudioSource + ?Sized> AudioSource for Box<T> {
    fn read_energy(&mut self) -> Result<f64, AssessmentError> {
        (**self).read_energy()
    }
}

impl<T: VideoSource + ?Sized> VideoSource for Box<T> {
    fn capture(&mut self) -> Result<Frame, AssessmentError> {
        (**self).capture()
    }
}

/// Device access behind a permission prompt
pub trait MediaDevices {
    fn microphone(&mut self) -> Result<Box<dyn AudioSource>, AssessmentError>;
    fn camera(&mut self) -> Result<Box<dyn VideoSource>, AssessmentError>;
}

/// Exclusive owner of one media track
pub struct StreamGuard<T: MediaTrack> {
    track: T,
    released: bool,
}

impl<T: MediaTrack> StreamGuard<T> {
    pub fn new(track: T) -> Self {
        debug!("acquired {}", track.label());
        Self {
            track,
            released: false,
        }
    }

    /// Access the live track; fails once the stream has been released
    pub fn track_mut(&mut self) -> Result<&mut T, AssessmentError> {
        if self.released {
            return Err(AssessmentError::StreamInterrupted(format!(
                "{} already released",
                self.track.label()
            )));
        }
        Ok(&mut self.track)
    }

    /// Stop the track. Returns `false` if it was already stopped.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.track.stop();
        debug!("released {}", self.track.label());
        true
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl<T: MediaTrack> Drop for StreamGuard<T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Audio track replaying pre-recorded energy readings
#[derive(Debug, Clone, Default)]
pub struct ReplayAudio {
    energies: VecDeque<f64>,
    stopped: bool,
}

impl ReplayAudio {
    pub fn new(energies: impl IntoIterator<Item = f64>) -> Self {
        Self {
            energies: energies.into_iter().collect(),
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl MediaTrack for ReplayAudio {
    fn label(&self) -> &str {
        "replay microphone"
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

impl AudioSource for ReplayAudio {
    fn read_energy(&mut self) -> Result<f64, AssessmentError> {
        self.energies
            .pop_front()
            .ok_or_else(|| AssessmentError::StreamInterrupted("audio replay exhausted".to_string()))
    }
}

/// Audio track turning raw PCM frames into energy through a spectrum analyzer
pub struct PcmAudio<I> {
    frames: I,
    analyzer: SpectrumAnalyzer,
}

impl<I: Iterator<Item = Vec<f32>>> PcmAudio<I> {
    pub fn new(frames: I, analyzer: SpectrumAnalyzer) -> Self {
        Self { frames, analyzer }
    }
}

impl<I> MediaTrack for PcmAudio<I> {
    fn label(&self) -> &str {
        "pcm microphone"
    }

    fn stop(&mut self) {
        self.analyzer.reset();
    }
}

impl<I: Iterator<Item = Vec<f32>>> AudioSource for PcmAudio<I> {
    fn read_energy(&mut self) -> Result<f64, AssessmentError> {
        let frame = self
            .frames
            .next()
            .ok_or_else(|| AssessmentError::StreamInterrupted("pcm stream ended".to_string()))?;
        Ok(self.analyzer.energy(&frame))
    }
}

/// Video track replaying pre-captured frames
#[derive(Debug, Clone, Default)]
pub struct ReplayVideo {
    frames: VecDeque<Frame>,
    stopped: bool,
}

impl ReplayVideo {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl MediaTrack for ReplayVideo {
    fn label(&self) -> &str {
        "replay camera"
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

impl VideoSource for ReplayVideo {
    fn capture(&mut self) -> Result<Frame, AssessmentError> {
        self.frames
            .pop_front()
            .ok_or_else(|| AssessmentError::StreamInterrupted("video replay exhausted".to_string()))
    }
}

/// Devices backed by recordings; a missing recording behaves like a denied permission
#[derive(Debug, Clone, Default)]
pub struct ReplayDevices {
    pub audio: Option<Vec<f64>>,
    pub video: Option<Vec<Frame>>,
}

impl MediaDevices for ReplayDevices {
    fn microphone(&mut self) -> Result<Box<dyn AudioSource>, AssessmentError> {
        match self.audio.take() {
            Some(energies) => Ok(Box::new(ReplayAudio::new(energies))),
            None => {
                warn!("microphone requested but no audio recording is available");
                Err(AssessmentError::DevicePermission(
                    "no microphone available".to_string(),
                ))
            }
        }
    }

    fn camera(&mut self) -> Result<Box<dyn VideoSource>, AssessmentError> {
        match self.video.take() {
            Some(frames) => Ok(Box::new(ReplayVideo::new(frames))),
            None => {
                warn!("camera requested but no video recording is available");
                Err(AssessmentError::DevicePermission(
                    "no camera available".to_string(),
                ))
            }
        }
    }
}
