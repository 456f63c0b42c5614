use super::input::{SpeechEvent, SpeechInput};
use crate::nats::{CaptureAction, NatsClient, TranscriptMessage};
use anyhow::{Context, Result};
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Speech input fed by an STT service over NATS
///
/// Results for every session arrive on `stt.text.>`; only the ones tagged
/// with this chat's session id are forwarded.
pub struct NatsSpeechInput {
    client: Arc<NatsClient>,
    task: Option<JoinHandle<()>>,
}

impl NatsSpeechInput {
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        let client = NatsClient::connect(url, session_id)
            .await
            .context("Failed to create NATS speech input")?;
        Ok(Self::new(Arc::new(client)))
    }

    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client, task: None }
    }
}

/// Map a transcript message to a speech event if it belongs to `session_id`
pub fn to_speech_event(msg: TranscriptMessage, session_id: &str) -> Option<SpeechEvent> {
    if msg.session_id != session_id {
        return None;
    }
    if msg.partial {
        Some(SpeechEvent::Interim(msg.text))
    } else {
        Some(SpeechEvent::Final(msg.text))
    }
}

#[async_trait::async_trait]
impl SpeechInput for NatsSpeechInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<SpeechEvent>> {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let mut subscriber = self.client.subscribe_transcripts().await?;
        self.client.publish_capture(CaptureAction::Start).await?;

        let (tx, rx) = mpsc::channel(64);
        let session_id = self.client.session_id().to_string();

        let task = tokio::spawn(async move {
            info!("Speech transcript task started");

            while let Some(msg) = subscriber.next().await {
                let transcript = match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                        continue;
                    }
                };

                let Some(event) = to_speech_event(transcript, &session_id) else {
                    continue;
                };

                if tx.send(event).await.is_err() {
                    break;
                }
            }

            let _ = tx.send(SpeechEvent::Ended).await;
            info!("Speech transcript task stopped");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        // Dropping the task closes the event channel, which reads as Ended.
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.client.publish_capture(CaptureAction::Stop).await
    }

    fn name(&self) -> &str {
        "nats"
    }
}
