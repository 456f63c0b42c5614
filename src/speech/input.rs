use anyhow::Result;
use tokio::sync::mpsc;

/// Event emitted by a speech input backend while capturing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Provisional text, replaced by the next interim or final segment
    Interim(String),
    /// Committed text
    Final(String),
    /// Capture terminated (explicit stop, timeout or error)
    Ended,
}

/// Speech-to-text capture backend
///
/// A closed event channel is treated the same as [`SpeechEvent::Ended`].
#[async_trait::async_trait]
pub trait SpeechInput: Send + Sync {
    /// Begin continuous capture
    async fn start(&mut self) -> Result<mpsc::Receiver<SpeechEvent>>;

    /// End capture
    async fn stop(&mut self) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Result of probing the host for speech input
pub enum SpeechInputCapability {
    Available(Box<dyn SpeechInput>),
    Unavailable,
}

impl SpeechInputCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl std::fmt::Debug for SpeechInputCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(input) => write!(f, "Available({})", input.name()),
            Self::Unavailable => write!(f, "Unavailable"),
        }
    }
}

/// Builds the live input value from speech events
///
/// The value is every committed final segment followed by the current
/// interim segment.
#[derive(Debug, Default, Clone)]
pub struct TranscriptAssembler {
    committed: String,
    interim: String,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event, returning the new input value if it changed
    pub fn apply(&mut self, event: &SpeechEvent) -> Option<String> {
        match event {
            SpeechEvent::Interim(text) => {
                self.interim = text.clone();
            }
            SpeechEvent::Final(text) => {
                self.committed.push_str(text);
                self.interim.clear();
            }
            SpeechEvent::Ended => return None,
        }
        Some(self.value())
    }

    pub fn value(&self) -> String {
        format!("{}{}", self.committed, self.interim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interim_is_replaced_not_appended() {
        let mut asm = TranscriptAssembler::new();
        assert_eq!(asm.apply(&SpeechEvent::Interim("hel".into())).unwrap(), "hel");
        assert_eq!(asm.apply(&SpeechEvent::Interim("hello".into())).unwrap(), "hello");
    }

    #[test]
    fn finals_accumulate_and_clear_interim() {
        let mut asm = TranscriptAssembler::new();
        asm.apply(&SpeechEvent::Interim("hel".into()));
        asm.apply(&SpeechEvent::Final("hello ".into()));
        assert_eq!(asm.value(), "hello ");

        let value = asm.apply(&SpeechEvent::Interim("wor".into())).unwrap();
        assert_eq!(value, "hello wor");

        asm.apply(&SpeechEvent::Final("world".into()));
        assert_eq!(asm.value(), "hello world");
    }

    #[test]
    fn end_does_not_change_value() {
        let mut asm = TranscriptAssembler::new();
        asm.apply(&SpeechEvent::Final("done".into()));
        assert_eq!(asm.apply(&SpeechEvent::Ended), None);
        assert_eq!(asm.value(), "done");
    }
}
