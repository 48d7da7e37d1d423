//! Echo control
//!
//! The pause/resume recording pair must bracket every TTS playback, TTS
//! failure included. [`EchoGuard`] publishes the pause on acquisition and
//! guarantees the resume on drop, after the configured cooldown, so no
//! exit path can leave the microphone muted.

use std::time::Duration;

use edgekit_core::{AudioControlAction, Event, EventBus, EventPayload};

/// Scoped "playback active" flag with guaranteed release.
pub struct EchoGuard {
    bus: EventBus,
    cooldown: Duration,
    released: bool,
}

impl EchoGuard {
    /// Emits `audio_control_pause_recording` immediately.
    pub fn acquire(bus: EventBus, cooldown: Duration) -> Self {
        bus.publish(Event::new(EventPayload::AudioControl {
            action: AudioControlAction::PauseRecording,
        }));
        tracing::debug!("Echo control: recording paused");
        Self {
            bus,
            cooldown,
            released: false,
        }
    }

    /// Release explicitly and wait out the cooldown before the resume is
    /// published. Dropping without calling this still resumes.
    pub async fn release(mut self) {
        self.released = true;
        tokio::time::sleep(self.cooldown).await;
        self.bus.publish(Event::new(EventPayload::AudioControl {
            action: AudioControlAction::ResumeRecording,
        }));
        tracing::debug!("Echo control: recording resumed");
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Failure path: schedule the resume after the cooldown.
        let bus = self.bus.clone();
        let cooldown = self.cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            bus.publish(Event::new(EventPayload::AudioControl {
                action: AudioControlAction::ResumeRecording,
            }));
            tracing::debug!("Echo control: recording resumed (guard dropped)");
        });
    }
}
