pub mod chat;
pub mod config;
pub mod history;
pub mod http;
pub mod nats;
pub mod remote;
pub mod speech;

pub use chat::{
    ChatController, ChatEvent, ChatServices, ChatStatus, ChatTurn, InteractionState,
    ListenOutcome, Role, SubmitOutcome, Transcript,
};
pub use config::Config;
pub use history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
pub use http::{create_router, AppState};
pub use nats::{NatsClient, TranscriptMessage};
pub use remote::{ChatBackend, ChatSession, GeminiBackend, TextStream};
pub use speech::{
    CommandSynthesizer, NatsSpeechInput, SpeechEvent, SpeechInput, SpeechInputCapability,
    SpeechOutput, SpeechSynthesizer,
};
