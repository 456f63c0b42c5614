//! Speech adapters
//!
//! Speech input turns a speech-to-text capability into interim/final
//! transcript events. Speech output speaks completed replies, gated by a
//! mute flag. Both are optional on a given host and are modelled with an
//! explicit unavailable variant.

pub mod command;
pub mod input;
pub mod nats_input;
pub mod output;

pub use command::CommandSynthesizer;
pub use input::{SpeechEvent, SpeechInput, SpeechInputCapability, TranscriptAssembler};
pub use nats_input::NatsSpeechInput;
pub use output::{SpeechOutput, SpeechSynthesizer};
