use super::output::SpeechSynthesizer;
use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::debug;

/// Speaks by running an external TTS program (`espeak`, `say`, ...)
///
/// The text is passed as the last argument. Cancelling kills the running
/// process.
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    current: Mutex<Option<Child>>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current: Mutex::new(None),
        }
    }

    /// Build from a `[program, args...]` list
    pub fn from_command_line(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("Synthesizer command is empty")?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }
}

async fn kill_if_running(child: &mut Child) -> Result<()> {
    if child.try_wait()?.is_none() {
        child.kill().await.context("Failed to kill TTS process")?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        let mut current = self.current.lock().await;
        if let Some(mut child) = current.take() {
            kill_if_running(&mut child).await?;
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        debug!("Speaking {} chars with {}", text.len(), self.program);
        *current = Some(child);
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        match current.take() {
            Some(mut child) => kill_if_running(&mut child).await,
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}
