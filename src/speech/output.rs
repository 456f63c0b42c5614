use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Text-to-speech engine
///
/// `speak` begins an utterance and returns without waiting for playback.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    /// Stop any in-flight utterance
    async fn cancel(&self) -> Result<()>;

    fn name(&self) -> &str;
}

/// Mute-gated speech output with at most one active utterance
///
/// `speak` and `set_muted` run under `gate`, so an utterance can never start
/// after a mute has taken effect.
pub struct SpeechOutput {
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    muted: AtomicBool,
    gate: Mutex<()>,
}

impl SpeechOutput {
    pub fn new(synthesizer: Box<dyn SpeechSynthesizer>) -> Self {
        Self {
            synthesizer: Some(synthesizer),
            muted: AtomicBool::new(false),
            gate: Mutex::new(()),
        }
    }

    /// Output for hosts without text-to-speech; every call is a no-op
    pub fn unavailable() -> Self {
        Self {
            synthesizer: None,
            muted: AtomicBool::new(false),
            gate: Mutex::new(()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Speak `text`, pre-empting whatever is playing. No-op when muted.
    pub async fn speak(&self, text: &str) {
        let Some(synth) = &self.synthesizer else {
            return;
        };
        let _gate = self.gate.lock().await;
        if self.is_muted() || text.is_empty() {
            return;
        }

        if let Err(e) = synth.cancel().await {
            warn!("Failed to cancel speech on {}: {}", synth.name(), e);
        }
        if let Err(e) = synth.speak(text).await {
            warn!("Failed to speak on {}: {}", synth.name(), e);
        }
    }

    /// Set the mute flag; muting cuts off the current utterance
    pub async fn set_muted(&self, muted: bool) {
        let _gate = self.gate.lock().await;
        let was_muted = self.muted.swap(muted, Ordering::SeqCst);
        debug!("Speech output muted={}", muted);
        if muted && !was_muted {
            self.cancel_synthesizer().await;
        }
    }

    pub async fn cancel_all(&self) {
        let _gate = self.gate.lock().await;
        self.cancel_synthesizer().await;
    }

    async fn cancel_synthesizer(&self) {
        if let Some(synth) = &self.synthesizer {
            if let Err(e) = synth.cancel().await {
                warn!("Failed to cancel speech on {}: {}", synth.name(), e);
            }
        }
    }
}

impl std::fmt::Debug for SpeechOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechOutput")
            .field("synthesizer", &self.synthesizer.as_ref().map(|s| s.name()))
            .field("muted", &self.is_muted())
            .finish()
    }
}
