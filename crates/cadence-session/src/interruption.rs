//! Mid-sentence interruption and transition narration.
//!
//! The coordinator mediates between shared session state and the voice
//! device. Ordering matters throughout: the pause flag is published before
//! the device is told to stop, so a concurrently speaking worker sees the
//! request even if the stop call races it, and the device is stopped twice
//! with a settle delay in between because a first stop can race sentence
//! start on some devices.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use cadence_core::capability::VoiceOutput;
use cadence_core::config::VoiceConfig;
use cadence_core::error::Result;
use cadence_core::types::{
    Category, ClassificationResult, InterruptedPosition, SessionId, SpeechPhase, Timestamp,
};

use crate::state::SessionStateStore;

/// Coordinates pausing, interrupting, and resuming narrated speech.
pub struct InterruptionCoordinator {
    store: Arc<dyn SessionStateStore>,
    voice: Arc<dyn VoiceOutput>,
    config: VoiceConfig,
}

impl InterruptionCoordinator {
    pub fn new(
        store: Arc<dyn SessionStateStore>,
        voice: Arc<dyn VoiceOutput>,
        config: VoiceConfig,
    ) -> Self {
        Self {
            store,
            voice,
            config,
        }
    }

    /// Interrupt in-flight narration, capturing where it stopped so the
    /// sentence can be resumed later. Idempotent: a second interrupt keeps
    /// the originally captured position.
    pub async fn interrupt_mid_sentence(&self, session: SessionId) -> Result<()> {
        let now = Timestamp::now();
        let mut state = self.store.load(session).await?;
        state.phase = SpeechPhase::Interrupting;

        let already_captured = state
            .interrupted
            .as_ref()
            .map(|p| !p.is_expired(now))
            .unwrap_or(false);
        if !already_captured {
            if let Some(sentence) = state.current_sentence.clone() {
                let offset = self.voice.playback_position().unwrap_or(0);
                state.interrupted = Some(InterruptedPosition {
                    sentence,
                    offset,
                    expires_at: Timestamp(
                        now.0 + self.config.interrupted_position_ttl_secs as i64,
                    ),
                });
                info!(offset, "Captured interrupted playback position");
            }
        }
        self.store.publish(session, state).await?;

        self.pause_current(session).await
    }

    /// Request a pause and silence the device. The pause flag is published
    /// first; the stop happens twice with a settle delay in between.
    pub async fn pause_current(&self, session: SessionId) -> Result<()> {
        let mut state = self.store.load(session).await?;
        state.pause_requested = true;
        state.pause_requested_at = Some(Timestamp::now());
        self.store.publish(session, state).await?;

        self.voice.stop().await;
        sleep(Duration::from_millis(self.config.stop_settle_ms)).await;
        self.voice.stop().await;

        let mut state = self.store.load(session).await?;
        state.is_speaking = false;
        state.phase = SpeechPhase::Paused;
        self.store.publish(session, state).await?;
        Ok(())
    }

    /// Resume a previously interrupted sentence from its captured offset.
    /// Returns the position that was resumed, or `None` when nothing was
    /// captured or the capture has expired.
    pub async fn resume_interrupted(&self, session: SessionId) -> Result<Option<InterruptedPosition>> {
        let now = Timestamp::now();
        let mut state = self.store.load(session).await?;
        let position = match state.interrupted.take() {
            Some(p) if !p.is_expired(now) => p,
            Some(_) => {
                debug!("Interrupted position expired, not resuming");
                self.store.publish(session, state).await?;
                return Ok(None);
            }
            None => return Ok(None),
        };

        let remainder: String = position.sentence.chars().skip(position.offset as usize).collect();
        state.phase = SpeechPhase::Speaking;
        state.is_speaking = true;
        state.current_sentence = Some(position.sentence.clone());
        state.pause_requested = false;
        state.pause_requested_at = None;
        self.store.publish(session, state.clone()).await?;

        if let Err(e) = self.voice.speak(&remainder).await {
            warn!("Resume playback failed: {}", e);
        }

        state.phase = SpeechPhase::Idle;
        state.is_speaking = false;
        self.store.publish(session, state).await?;
        Ok(Some(position))
    }

    /// Narrate a classification's transition phrase, padded with silence on
    /// both sides. Openings carry no transition and are skipped.
    pub async fn handle_transition(
        &self,
        session: SessionId,
        classification: &ClassificationResult,
    ) -> Result<()> {
        if classification.category == Category::Opening
            || classification.transition_phrase.is_empty()
        {
            return Ok(());
        }

        let mut state = self.store.load(session).await?;
        state.phase = SpeechPhase::Transitioning;
        self.store.publish(session, state).await?;

        sleep(Duration::from_millis(self.config.pre_pause_ms)).await;
        if let Err(e) = self.voice.speak(&classification.transition_phrase).await {
            if e.is_quota() {
                debug!("Voice quota exhausted, transition skipped");
            } else {
                warn!("Transition playback failed: {}", e);
            }
        }
        sleep(Duration::from_millis(self.config.post_pause_ms)).await;

        let mut state = self.store.load(session).await?;
        state.last_transition = Some(classification.transition_phrase.clone());
        state.phase = SpeechPhase::Idle;
        self.store.publish(session, state).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
