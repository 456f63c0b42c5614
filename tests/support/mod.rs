// Test doubles for the chat controller's collaborators
//
// Every fake writes to a shared journal so tests can assert the order in
// which the controller touched them.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use futures::stream;
use loqa_assistant::chat::{ChatServices, InteractionState};
use loqa_assistant::{
    ChatController, ChatSession, ChatTurn, HistoryStore, MemoryHistoryStore, SpeechEvent,
    SpeechInput, SpeechInputCapability, SpeechOutput, SpeechSynthesizer, TextStream,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

pub fn position(journal: &Journal, prefix: &str) -> Option<usize> {
    entries(journal).iter().position(|e| e.starts_with(prefix))
}

// ============================================================================
// Remote session
// ============================================================================

/// How the scripted session answers one message
pub enum Reply {
    /// Yield these increments; `Err` items fail the stream
    Items(Vec<Result<String, String>>),
    /// Yield whatever the test pushes, ending when the sender is dropped
    Live(mpsc::UnboundedReceiver<Result<String, String>>),
    /// Fail before any increment
    Refuse,
}

pub fn ok_reply(parts: &[&str]) -> Reply {
    Reply::Items(parts.iter().map(|p| Ok(p.to_string())).collect())
}

pub struct ScriptedSession {
    replies: Mutex<VecDeque<Reply>>,
    journal: Journal,
}

impl ScriptedSession {
    pub fn new(replies: Vec<Reply>, journal: Journal) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            journal,
        }
    }
}

#[async_trait::async_trait]
impl ChatSession for ScriptedSession {
    async fn send_stream(&self, message: &str) -> Result<TextStream> {
        self.journal.lock().unwrap().push(format!("send:{}", message));
        let reply = self.replies.lock().unwrap().pop_front();

        match reply {
            None => Ok(Box::pin(stream::empty::<Result<String>>())),
            Some(Reply::Refuse) => Err(anyhow!("service unavailable")),
            Some(Reply::Items(items)) => Ok(Box::pin(stream::iter(
                items.into_iter().map(|i| i.map_err(|e| anyhow!(e))),
            ))),
            Some(Reply::Live(rx)) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                let item = rx.recv().await?;
                Some((item.map_err(|e| anyhow!(e)), rx))
            }))),
        }
    }
}

// ============================================================================
// Speech input
// ============================================================================

/// Speech input driven by the test through `FakeMicrophone::say`
pub struct FakeSpeechInput {
    sender: Arc<Mutex<Option<mpsc::Sender<SpeechEvent>>>>,
    journal: Journal,
}

#[derive(Clone)]
pub struct FakeMicrophone {
    sender: Arc<Mutex<Option<mpsc::Sender<SpeechEvent>>>>,
}

impl FakeMicrophone {
    pub async fn say(&self, event: SpeechEvent) {
        let sender = self.sender.lock().unwrap().clone();
        sender
            .expect("capture is not running")
            .send(event)
            .await
            .expect("listener dropped");
    }

    /// Simulate the platform ending capture on its own
    pub fn hang_up(&self) {
        self.sender.lock().unwrap().take();
    }

    pub fn is_capturing(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }
}

pub fn fake_speech_input(journal: Journal) -> (FakeSpeechInput, FakeMicrophone) {
    let sender = Arc::new(Mutex::new(None));
    (
        FakeSpeechInput {
            sender: Arc::clone(&sender),
            journal,
        },
        FakeMicrophone { sender },
    )
}

#[async_trait::async_trait]
impl SpeechInput for FakeSpeechInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<SpeechEvent>> {
        self.journal.lock().unwrap().push("listen:start".into());
        let (tx, rx) = mpsc::channel(16);
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.journal.lock().unwrap().push("listen:stop".into());
        self.sender.lock().unwrap().take();
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Speech output
// ============================================================================

pub struct RecordingSynthesizer {
    journal: Journal,
}

impl RecordingSynthesizer {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for RecordingSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        self.journal.lock().unwrap().push(format!("speak:{}", text));
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        self.journal.lock().unwrap().push("cancel".into());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn spoken(journal: &Journal) -> Vec<String> {
    entries(journal)
        .into_iter()
        .filter_map(|e| e.strip_prefix("speak:").map(str::to_string))
        .collect()
}

// ============================================================================
// History
// ============================================================================

/// Memory store that journals each save
pub struct JournalStore {
    inner: MemoryHistoryStore,
    journal: Journal,
}

impl JournalStore {
    pub fn new(turns: Vec<ChatTurn>, journal: Journal) -> Self {
        Self {
            inner: MemoryHistoryStore::with_turns(turns),
            journal,
        }
    }
}

#[async_trait::async_trait]
impl HistoryStore for JournalStore {
    async fn load(&self) -> Result<Vec<ChatTurn>> {
        self.inner.load().await
    }

    async fn save(&self, turns: &[ChatTurn]) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("save:{}", turns.len()));
        self.inner.save(turns).await
    }
}

/// Store whose every operation fails
pub struct BrokenStore;

#[async_trait::async_trait]
impl HistoryStore for BrokenStore {
    async fn load(&self) -> Result<Vec<ChatTurn>> {
        Err(anyhow!("disk on fire"))
    }

    async fn save(&self, _turns: &[ChatTurn]) -> Result<()> {
        Err(anyhow!("disk on fire"))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub chat: Arc<ChatController>,
    pub journal: Journal,
    pub store: Arc<JournalStore>,
    pub microphone: Option<FakeMicrophone>,
}

pub struct HarnessBuilder {
    replies: Vec<Reply>,
    stored: Vec<ChatTurn>,
    speech_input: bool,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            replies: Vec::new(),
            stored: Vec::new(),
            speech_input: true,
        }
    }

    pub fn reply(mut self, reply: Reply) -> Self {
        self.replies.push(reply);
        self
    }

    pub fn stored(mut self, turns: Vec<ChatTurn>) -> Self {
        self.stored = turns;
        self
    }

    pub fn without_speech_input(mut self) -> Self {
        self.speech_input = false;
        self
    }

    pub async fn build(self) -> Harness {
        let journal = journal();
        let store = Arc::new(JournalStore::new(self.stored, Arc::clone(&journal)));

        let (speech_input, microphone) = if self.speech_input {
            let (input, mic) = fake_speech_input(Arc::clone(&journal));
            (SpeechInputCapability::Available(Box::new(input)), Some(mic))
        } else {
            (SpeechInputCapability::Unavailable, None)
        };

        let services = ChatServices {
            history: store.clone(),
            speech_input,
            speech_output: SpeechOutput::new(Box::new(RecordingSynthesizer::new(Arc::clone(
                &journal,
            )))),
        };

        let session = ScriptedSession::new(self.replies, Arc::clone(&journal));
        let chat = ChatController::with_session("chat-test".into(), Box::new(session), services)
            .await;

        Harness {
            chat: Arc::new(chat),
            journal,
            store,
            microphone,
        }
    }
}

/// Poll until `check` holds, failing the test after about two seconds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub async fn wait_for_state(chat: &ChatController, state: InteractionState) {
    eventually(&format!("{:?}", state), || async move { chat.state().await == state }).await;
}

pub async fn wait_for_last_text(chat: &ChatController, text: &str) {
    eventually(&format!("last turn {:?}", text), || async move {
        chat.transcript()
            .await
            .last()
            .map(|t| t.text == text)
            .unwrap_or(false)
    })
    .await;
}
