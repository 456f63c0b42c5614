use super::state::{ChatStatus, IgnoreReason, InteractionState, ListenOutcome, SubmitOutcome};
use super::turn::{ChatTurn, Transcript};
use crate::history::HistoryStore;
use crate::remote::{ChatBackend, ChatSession};
use crate::speech::{SpeechEvent, SpeechInputCapability, SpeechOutput, TranscriptAssembler};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Shown in place of a reply that failed, and spoken aloud
pub const STREAM_ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// Raised when speech input is requested on a host without it
pub const SPEECH_UNSUPPORTED_NOTICE: &str = "Speech recognition is not supported on this host.";

/// Raised when the speech input backend refuses to start
pub const SPEECH_START_FAILED_NOTICE: &str = "Speech recognition could not be started.";

/// Change notifications for renderers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A turn was appended or its text replaced
    TurnUpdated { index: usize, turn: ChatTurn },
    StateChanged(InteractionState),
    InputChanged(String),
    MuteChanged(bool),
    Notice(String),
}

/// Fresh identifier for a chat, also used to tag speech results
pub fn new_session_id() -> String {
    format!("chat-{}", uuid::Uuid::new_v4())
}

/// Collaborators handed to the controller at construction
pub struct ChatServices {
    pub history: Arc<dyn HistoryStore>,
    pub speech_input: SpeechInputCapability,
    pub speech_output: SpeechOutput,
}

struct ChatInner {
    transcript: Transcript,
    state: InteractionState,
    input: String,
    notice: Option<String>,
    /// Bumped whenever a capture starts or is abandoned; events from older
    /// captures are dropped.
    capture_epoch: u64,
}

/// State reachable from the speech listener task
struct Shared {
    inner: RwLock<ChatInner>,
    events: broadcast::Sender<ChatEvent>,
}

impl Shared {
    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Drives one chat: transcript, interaction state and the collaborators
///
/// All transitions go through `inner`'s lock, so at most one reply streams
/// at a time and only the last turn ever changes.
pub struct ChatController {
    session_id: String,
    started_at: DateTime<Utc>,
    session: Box<dyn ChatSession>,
    history: Arc<dyn HistoryStore>,
    speech_input: Mutex<SpeechInputCapability>,
    speech_input_available: bool,
    speech_output: SpeechOutput,
    shared: Arc<Shared>,
    save_lock: Mutex<()>,
}

impl ChatController {
    /// Restore the transcript and open a fresh remote session
    ///
    /// The remote session does not see restored turns; history is display
    /// data only.
    pub async fn start(
        backend: &dyn ChatBackend,
        system_instruction: &str,
        session_id: String,
        services: ChatServices,
    ) -> Result<Self> {
        let session = backend
            .create_session(system_instruction)
            .context("Failed to create remote chat session")?;

        Ok(Self::with_session(session_id, session, services).await)
    }

    /// Build around an existing remote session
    pub async fn with_session(
        session_id: String,
        session: Box<dyn ChatSession>,
        services: ChatServices,
    ) -> Self {
        let stored = match services.history.load().await {
            Ok(turns) => turns,
            Err(e) => {
                warn!("Failed to load chat history, starting empty: {:#}", e);
                Vec::new()
            }
        };
        let transcript = Transcript::restore(stored);

        info!(
            "Chat {} ready with {} turns (speech input: {:?}, speech output: {})",
            session_id,
            transcript.turns().len(),
            services.speech_input,
            services.speech_output.is_available()
        );

        let (events, _) = broadcast::channel(256);
        let speech_input_available = services.speech_input.is_available();

        Self {
            session_id,
            started_at: Utc::now(),
            session,
            history: services.history,
            speech_input: Mutex::new(services.speech_input),
            speech_input_available,
            speech_output: services.speech_output,
            shared: Arc::new(Shared {
                inner: RwLock::new(ChatInner {
                    transcript,
                    state: InteractionState::Idle,
                    input: String::new(),
                    notice: None,
                    capture_epoch: 0,
                }),
                events,
            }),
            save_lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    pub async fn transcript(&self) -> Vec<ChatTurn> {
        self.shared.inner.read().await.transcript.turns().to_vec()
    }

    pub async fn state(&self) -> InteractionState {
        self.shared.inner.read().await.state
    }

    pub async fn input(&self) -> String {
        self.shared.inner.read().await.input.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.speech_output.is_muted()
    }

    pub async fn status(&self) -> ChatStatus {
        let inner = self.shared.inner.read().await;
        ChatStatus {
            session_id: self.session_id.clone(),
            state: inner.state,
            muted: self.is_muted(),
            input: inner.input.clone(),
            speech_input_available: self.speech_input_available,
            notice: inner.notice.clone(),
            turns: inner.transcript.turns().len(),
            started_at: self.started_at,
        }
    }

    /// Replace the input field. Refused while a reply is streaming.
    pub async fn set_input(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        {
            let mut inner = self.shared.inner.write().await;
            if inner.state == InteractionState::Sending {
                return false;
            }
            inner.input = text.clone();
        }
        self.shared.emit(ChatEvent::InputChanged(text));
        true
    }

    // ========================================================================
    // Submit
    // ========================================================================

    /// Send the input field and stream the reply to completion
    pub async fn submit(&self) -> SubmitOutcome {
        self.run_exchange(None).await
    }

    /// Replace the input field with `text` and send it in one step
    pub async fn submit_text(&self, text: impl Into<String>) -> SubmitOutcome {
        self.run_exchange(Some(text.into())).await
    }

    async fn run_exchange(&self, text: Option<String>) -> SubmitOutcome {
        match self.begin_exchange(text).await {
            Ok(message) => self.stream_reply(message).await,
            Err(reason) => SubmitOutcome::Ignored(reason),
        }
    }

    /// Claim the `Sending` state and record the user turn
    ///
    /// `text`, when given, replaces the input field under the same lock that
    /// claims `Sending`. Stops capture, silences playback, appends the user
    /// turn and an empty model turn, and clears the input. Returns the
    /// message to send.
    pub(crate) async fn begin_exchange(
        &self,
        text: Option<String>,
    ) -> std::result::Result<String, IgnoreReason> {
        let (message, was_listening) = {
            let mut inner = self.shared.inner.write().await;
            if inner.state == InteractionState::Sending {
                debug!("Submit ignored: reply still streaming");
                return Err(IgnoreReason::Busy);
            }
            if let Some(text) = text {
                inner.input = text.clone();
                self.shared.emit(ChatEvent::InputChanged(text));
            }
            if inner.input.trim().is_empty() {
                return Err(IgnoreReason::Blank);
            }

            let was_listening = inner.state == InteractionState::Listening;
            inner.capture_epoch += 1;
            inner.state = InteractionState::Sending;
            (inner.input.clone(), was_listening)
        };

        if was_listening {
            self.stop_capture().await;
        }
        self.speech_output.cancel_all().await;

        {
            let mut inner = self.shared.inner.write().await;
            inner.transcript.push(ChatTurn::user(message.clone()));
            let user_index = inner.transcript.turns().len() - 1;
            inner.transcript.push(ChatTurn::model(String::new()));
            inner.input.clear();

            self.shared.emit(ChatEvent::TurnUpdated {
                index: user_index,
                turn: ChatTurn::user(message.clone()),
            });
            self.shared.emit(ChatEvent::TurnUpdated {
                index: user_index + 1,
                turn: ChatTurn::model(String::new()),
            });
            self.shared.emit(ChatEvent::InputChanged(String::new()));
            self.shared.emit(ChatEvent::StateChanged(InteractionState::Sending));
        }

        self.persist().await;
        Ok(message)
    }

    /// Consume the remote stream into the open model turn and finalise it
    pub(crate) async fn stream_reply(&self, message: String) -> SubmitOutcome {
        let mut stream = match self.session.send_stream(&message).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Chat error: {:#}", e);
                return self.fail_reply().await;
            }
        };

        let mut reply = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(text) => {
                    reply.push_str(&text);
                    self.replace_reply(reply.clone()).await;
                }
                Err(e) => {
                    error!("Chat error after {} chars: {:#}", reply.len(), e);
                    return self.fail_reply().await;
                }
            }
        }

        self.finish_reply(&reply).await;
        info!("Reply complete ({} chars)", reply.len());
        self.speech_output.speak(&reply).await;
        self.persist().await;
        SubmitOutcome::Completed
    }

    async fn fail_reply(&self) -> SubmitOutcome {
        self.finish_reply(STREAM_ERROR_MESSAGE).await;
        self.speech_output.speak(STREAM_ERROR_MESSAGE).await;
        self.persist().await;
        SubmitOutcome::Failed
    }

    async fn replace_reply(&self, text: String) {
        {
            let mut inner = self.shared.inner.write().await;
            if let Some(index) = inner.transcript.replace_last(text.clone()) {
                self.shared.emit(ChatEvent::TurnUpdated {
                    index,
                    turn: ChatTurn::model(text),
                });
            }
        }
        self.persist().await;
    }

    /// Freeze the model turn with its final text and return to `Idle`
    async fn finish_reply(&self, text: &str) {
        let mut inner = self.shared.inner.write().await;
        if let Some(index) = inner.transcript.replace_last(text.to_string()) {
            self.shared.emit(ChatEvent::TurnUpdated {
                index,
                turn: ChatTurn::model(text),
            });
        }
        inner.state = InteractionState::Idle;
        self.shared
            .emit(ChatEvent::StateChanged(InteractionState::Idle));
    }

    /// Save the current transcript; failures are logged and swallowed
    async fn persist(&self) {
        let _guard = self.save_lock.lock().await;
        let turns = self.transcript().await;
        if let Err(e) = self.history.save(&turns).await {
            error!("Failed to save chat history: {:#}", e);
        }
    }

    // ========================================================================
    // Speech input
    // ========================================================================

    /// Start or stop speech capture
    pub async fn toggle_listen(&self) -> ListenOutcome {
        let mut capability = self.speech_input.lock().await;

        let current = self.state().await;
        match current {
            InteractionState::Sending => return ListenOutcome::Busy,
            InteractionState::Listening => {
                {
                    let mut inner = self.shared.inner.write().await;
                    inner.capture_epoch += 1;
                    inner.state = InteractionState::Idle;
                }
                self.shared
                    .emit(ChatEvent::StateChanged(InteractionState::Idle));
                if let SpeechInputCapability::Available(input) = &mut *capability {
                    if let Err(e) = input.stop().await {
                        warn!("Failed to stop speech input {}: {:#}", input.name(), e);
                    }
                }
                return ListenOutcome::Stopped;
            }
            InteractionState::Idle => {}
        }

        let input = match &mut *capability {
            SpeechInputCapability::Available(input) => input,
            SpeechInputCapability::Unavailable => {
                self.raise_notice(SPEECH_UNSUPPORTED_NOTICE).await;
                return ListenOutcome::Unavailable;
            }
        };

        let rx = match input.start().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Failed to start speech input {}: {:#}", input.name(), e);
                self.raise_notice(SPEECH_START_FAILED_NOTICE).await;
                return ListenOutcome::Failed;
            }
        };

        let epoch = {
            let mut inner = self.shared.inner.write().await;
            if inner.state != InteractionState::Idle {
                // A submit claimed the chat while capture was starting.
                drop(inner);
                if let Err(e) = input.stop().await {
                    warn!("Failed to stop speech input {}: {:#}", input.name(), e);
                }
                return ListenOutcome::Busy;
            }
            inner.capture_epoch += 1;
            inner.state = InteractionState::Listening;
            inner.capture_epoch
        };

        info!("Listening via {}", input.name());
        self.shared
            .emit(ChatEvent::StateChanged(InteractionState::Listening));
        tokio::spawn(run_listener(Arc::clone(&self.shared), rx, epoch));
        ListenOutcome::Started
    }

    async fn stop_capture(&self) {
        let mut capability = self.speech_input.lock().await;
        if let SpeechInputCapability::Available(input) = &mut *capability {
            if let Err(e) = input.stop().await {
                warn!("Failed to stop speech input {}: {:#}", input.name(), e);
            }
        }
    }

    async fn raise_notice(&self, notice: &str) {
        warn!("{}", notice);
        self.shared.inner.write().await.notice = Some(notice.to_string());
        self.shared.emit(ChatEvent::Notice(notice.to_string()));
    }

    // ========================================================================
    // Speech output
    // ========================================================================

    /// Flip the mute flag, returning the new value
    pub async fn toggle_mute(&self) -> bool {
        let muted = !self.is_muted();
        self.set_muted(muted).await;
        muted
    }

    pub async fn set_muted(&self, muted: bool) {
        self.speech_output.set_muted(muted).await;
        self.shared.emit(ChatEvent::MuteChanged(muted));
    }

    /// Silence playback and release the microphone
    pub async fn shutdown(&self) {
        info!("Shutting down chat {}", self.session_id);
        self.speech_output.cancel_all().await;

        let was_listening = {
            let mut inner = self.shared.inner.write().await;
            inner.capture_epoch += 1;
            let was_listening = inner.state == InteractionState::Listening;
            if was_listening {
                inner.state = InteractionState::Idle;
            }
            was_listening
        };
        if was_listening {
            self.shared
                .emit(ChatEvent::StateChanged(InteractionState::Idle));
            self.stop_capture().await;
        }
    }
}

/// Apply speech events to the input field until capture ends
async fn run_listener(shared: Arc<Shared>, mut rx: mpsc::Receiver<SpeechEvent>, epoch: u64) {
    let mut assembler = TranscriptAssembler::new();

    while let Some(event) = rx.recv().await {
        if event == SpeechEvent::Ended {
            break;
        }
        let Some(value) = assembler.apply(&event) else {
            continue;
        };

        let mut inner = shared.inner.write().await;
        if inner.capture_epoch != epoch {
            return;
        }
        inner.input = value.clone();
        shared.emit(ChatEvent::InputChanged(value));
    }

    let mut inner = shared.inner.write().await;
    if inner.capture_epoch == epoch && inner.state == InteractionState::Listening {
        debug!("Speech capture ended");
        inner.state = InteractionState::Idle;
        shared.emit(ChatEvent::StateChanged(InteractionState::Idle));
    }
}
