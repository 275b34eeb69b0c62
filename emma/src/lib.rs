//! Emma: a spoken conversation with a local language model.
//!
//! Each reply is streamed from the model into a [`SpeechPipeline`], so Emma
//! starts talking after the first sentence instead of the whole answer.

mod config;
mod ear;
mod logging;

pub use config::{Cli, DeviceFactory};
pub use ear::{Ear, HearingError, TypedEar};
pub use logging::init_logging;

use futures::StreamExt;
use lingproc::{ChatContext, ChatStream, Chatter, Message};
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tts::{PipelineError, SpeechPipeline};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Emma. Be playful and helpful. Avoid using emojis or writing actions in parentheses as I cannot hear them.";

/// Spoken before the session ends.
pub const GOODBYE: &str = "Goodbye, darling! It was lovely chatting with you!";

const EXIT_PHRASES: [&str; 3] = ["exit", "quit", "bye"];

/// Whether `text` contains an exit word on its own.
///
/// ```
/// assert!(emma::is_exit_phrase("OK, bye!"));
/// assert!(!emma::is_exit_phrase("goodbye yellow brick road"));
/// ```
pub fn is_exit_phrase(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| EXIT_PHRASES.iter().any(|p| word.eq_ignore_ascii_case(p)))
}

/// What one pass through the conversation loop did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Nothing usable was heard.
    Idle,
    Replied,
    Interrupted,
    Exit,
}

/// Listen, reply, remember.
pub struct Conversation {
    chatter: Box<dyn Chatter>,
    ear: Box<dyn Ear>,
    pipeline: SpeechPipeline,
    system_prompt: String,
    listen_timeout: Duration,
    history: Vec<Message>,
}

impl Conversation {
    pub fn new(
        chatter: Box<dyn Chatter>,
        ear: Box<dyn Ear>,
        pipeline: SpeechPipeline,
        system_prompt: impl Into<String>,
        listen_timeout: Duration,
    ) -> Self {
        Self {
            chatter,
            ear,
            pipeline,
            system_prompt: system_prompt.into(),
            listen_timeout,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Give the pipeline back, e.g. to shut it down.
    pub fn into_pipeline(self) -> SpeechPipeline {
        self.pipeline
    }

    /// Run until the user says goodbye, input closes or `interrupt` fires.
    pub async fn run<I>(&mut self, interrupt: I) -> anyhow::Result<()>
    where
        I: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        loop {
            match self.step(&mut interrupt).await? {
                Step::Exit | Step::Interrupted => return Ok(()),
                Step::Idle | Step::Replied => {}
            }
        }
    }

    /// Listen for one utterance and answer it.
    pub async fn step<I>(&mut self, interrupt: I) -> anyhow::Result<Step>
    where
        I: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let heard = tokio::select! {
            biased;
            _ = &mut interrupt => return Ok(Step::Interrupted),
            heard = self.ear.listen(self.listen_timeout) => heard,
        };
        let heard = match heard {
            Ok(text) if text.is_empty() => return Ok(Step::Idle),
            Ok(text) => text,
            Err(HearingError::NoSpeechDetected) => {
                debug!("no speech detected");
                return Ok(Step::Idle);
            }
            Err(HearingError::Recognition(e)) => {
                warn!(error = %e, "could not understand the user");
                return Ok(Step::Idle);
            }
            Err(HearingError::Closed) => {
                info!("input closed");
                return Ok(Step::Exit);
            }
        };

        if is_exit_phrase(&heard) {
            info!(%heard, "exit phrase");
            let farewell: ChatStream = Box::pin(futures::stream::iter([Ok(GOODBYE.to_string())]));
            match self.pipeline.speak_stream(farewell, &mut interrupt).await {
                Ok(_) => {}
                Err(PipelineError::Interrupted) => debug!("goodbye cut short"),
                Err(e) => return Err(e.into()),
            }
            return Ok(Step::Exit);
        }

        self.history.push(Message::user(heard));
        let ctx = ChatContext {
            system_prompt: &self.system_prompt,
            history: &self.history,
        };
        let stream = match self.chatter.chat(ctx).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "could not reach the language model");
                return Ok(Step::Replied);
            }
        };
        let result = self.pipeline.speak_stream(echo(stream), &mut interrupt).await;
        println!();

        let reply = self.pipeline.transcript().trim();
        if !reply.is_empty() {
            self.history.push(Message::assistant(reply));
        }
        match result {
            Ok(report) => {
                debug!(?report, "reply spoken");
                Ok(Step::Replied)
            }
            Err(PipelineError::Interrupted) => Ok(Step::Interrupted),
            Err(PipelineError::Upstream(e)) => {
                error!(error = %e, "reply cut short");
                Ok(Step::Replied)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Print each delta to stdout as it passes through.
fn echo(stream: ChatStream) -> ChatStream {
    Box::pin(stream.inspect(|delta| {
        if let Ok(text) = delta {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
    }))
}
