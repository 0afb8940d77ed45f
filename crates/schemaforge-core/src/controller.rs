//! Conversation controller
//!
//! Sole owner of the conversation state: transcript, quick-reply options,
//! the latest artifacts, the pending flag and panel visibility. Views read it
//! through accessors and change it only through the operations below.
//!
//! A remote turn runs in two phases so that a view can keep its event loop
//! running while the agent works: [`Conversation::begin_turn`] hands out a
//! [`PendingTurn`], the caller performs the network call however it likes,
//! and [`Conversation::finish_turn`] consumes the token and applies the
//! outcome. Only one token can exist at a time.

use tracing::{debug, info, warn};

use crate::agent::{AgentClient, AgentReply};
use crate::error::AgentError;
use crate::state::{
    ArtifactSnapshot, ChatMessage, DiagramArtifact, MermaidArtifact, SchemaArtifact,
};

pub const WELCOME_MESSAGE: &str = "👋 Welcome to SchemaForge!\n\n\
I help you design database schemas through conversation.\n\n\
Tell me what system you want to build:\n\
• A school management system\n\
• An e-commerce database\n\
• A library management system";

pub const CLEARED_MESSAGE: &str =
    "💬 Chat cleared. Your schema is still preserved.\n\nWhat else would you like to do?";

pub const CONNECTION_ERROR_MESSAGE: &str =
    "❌ Error connecting to server. Make sure the backend is running.";

pub const MODIFY_PROMPT: &str = "What would you like to modify?\n\n\
• Add or remove an entity\n\
• Add or remove attributes\n\
• Change a relationship";

/// Quick reply handled locally instead of being sent to the agent.
pub const MODIFY_KEYWORD: &str = "modify";

/// Proof that a remote turn is in flight. Must be handed back to
/// [`Conversation::finish_turn`].
#[derive(Debug)]
#[must_use = "a pending turn must be finished or the conversation stays locked"]
pub struct PendingTurn {
    message: String,
    epoch: u64,
}

impl PendingTurn {
    /// The text to send to the agent.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// What choosing a quick reply did.
#[derive(Debug)]
pub enum OptionOutcome {
    /// Answered locally, nothing to send.
    Local,
    /// Needs a round trip to the agent.
    Remote(PendingTurn),
    /// A turn is already in flight.
    Ignored,
}

#[derive(Debug)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    options: Vec<String>,
    diagram: Option<DiagramArtifact>,
    schema: Option<SchemaArtifact>,
    mermaid: Option<MermaidArtifact>,
    schema_proposed: bool,
    pending: bool,
    show_diagram: bool,
    // Bumped by reset so replies to earlier turns can be recognised.
    epoch: u64,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::assistant(WELCOME_MESSAGE)],
            options: Vec::new(),
            diagram: None,
            schema: None,
            mermaid: None,
            schema_proposed: false,
            pending: false,
            show_diagram: true,
            epoch: 0,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn diagram(&self) -> Option<&DiagramArtifact> {
        self.diagram.as_ref()
    }

    pub fn schema(&self) -> Option<&SchemaArtifact> {
        self.schema.as_ref()
    }

    pub fn mermaid(&self) -> Option<&MermaidArtifact> {
        self.mermaid.as_ref()
    }

    /// Whether the latest reply put a complete schema up for review.
    pub fn schema_proposed(&self) -> bool {
        self.schema_proposed
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn show_diagram(&self) -> bool {
        self.show_diagram
    }

    pub fn set_show_diagram(&mut self, visible: bool) {
        self.show_diagram = visible;
    }

    /// Start a remote turn for typed input. Returns `None` when the input is
    /// blank or another turn is still in flight.
    pub fn begin_turn(&mut self, text: &str) -> Option<PendingTurn> {
        if text.trim().is_empty() {
            return None;
        }
        self.start_remote_turn(text)
    }

    /// Choose a quick reply. "Modify" (any case) is answered locally; anything
    /// else goes to the agent exactly as typed.
    pub fn select_option(&mut self, option: &str) -> OptionOutcome {
        if self.pending {
            debug!(option, "option ignored while a turn is pending");
            return OptionOutcome::Ignored;
        }

        if option.to_lowercase() == MODIFY_KEYWORD {
            self.messages.push(ChatMessage::user(option));
            self.messages.push(ChatMessage::assistant(MODIFY_PROMPT));
            self.options.clear();
            return OptionOutcome::Local;
        }

        match self.start_remote_turn(option) {
            Some(turn) => OptionOutcome::Remote(turn),
            None => OptionOutcome::Ignored,
        }
    }

    fn start_remote_turn(&mut self, text: &str) -> Option<PendingTurn> {
        if self.pending {
            debug!("submission rejected while a turn is pending");
            return None;
        }

        self.messages.push(ChatMessage::user(text));
        self.options.clear();
        self.pending = true;
        debug!(epoch = self.epoch, "turn started");

        Some(PendingTurn {
            message: text.to_string(),
            epoch: self.epoch,
        })
    }

    /// Apply the outcome of a remote turn and release the pending flag.
    pub fn finish_turn(&mut self, turn: PendingTurn, outcome: Result<AgentReply, AgentError>) {
        self.pending = false;

        if turn.epoch != self.epoch {
            debug!(turn_epoch = turn.epoch, epoch = self.epoch, "dropping stale reply");
            return;
        }

        match outcome {
            Ok(reply) => {
                debug!(options = reply.options.len(), "turn finished");
                self.messages.push(ChatMessage::assistant(reply.reply));
                self.options = reply.options;
                self.schema_proposed = reply.schema_proposed;
                self.apply_artifacts(reply.artifacts);
            }
            Err(err) => {
                warn!(error = %err, "agent call failed");
                self.messages
                    .push(ChatMessage::assistant(CONNECTION_ERROR_MESSAGE));
                self.options.clear();
                self.schema_proposed = false;
            }
        }
    }

    /// Replace whichever artifacts are present; absent ones stay as they are.
    pub fn sync_artifacts(&mut self, snapshot: ArtifactSnapshot) {
        self.apply_artifacts(snapshot);
    }

    fn apply_artifacts(&mut self, snapshot: ArtifactSnapshot) {
        if let Some(diagram) = snapshot.diagram {
            self.diagram = Some(diagram);
        }
        if let Some(schema) = snapshot.schema {
            info!(schema = schema.schema_name().unwrap_or("unnamed"), "schema updated");
            self.schema = Some(schema);
        }
        if let Some(mermaid) = snapshot.mermaid {
            self.mermaid = Some(mermaid);
        }
    }

    /// Local half of a reset: back to the welcome state with no artifacts.
    /// A turn still in flight will have its reply discarded.
    pub fn reset_local(&mut self) {
        self.messages = vec![ChatMessage::assistant(WELCOME_MESSAGE)];
        self.options.clear();
        self.diagram = None;
        self.schema = None;
        self.mermaid = None;
        self.schema_proposed = false;
        self.epoch += 1;
    }

    /// Drop the transcript but keep the designed schema.
    pub fn clear(&mut self) {
        self.messages = vec![ChatMessage::assistant(CLEARED_MESSAGE)];
        self.options.clear();
        self.schema_proposed = false;
    }

    pub fn toggle_panel(&mut self) {
        self.show_diagram = !self.show_diagram;
    }

    /// Submit typed input and wait for the agent. Returns whether a turn ran.
    pub async fn submit<C>(&mut self, client: &C, text: &str) -> bool
    where
        C: AgentClient + ?Sized,
    {
        match self.begin_turn(text) {
            Some(turn) => {
                let outcome = client.chat(turn.message()).await;
                self.finish_turn(turn, outcome);
                true
            }
            None => false,
        }
    }

    /// Choose a quick reply, contacting the agent only when needed.
    pub async fn choose_option<C>(&mut self, client: &C, option: &str)
    where
        C: AgentClient + ?Sized,
    {
        if let OptionOutcome::Remote(turn) = self.select_option(option) {
            let outcome = client.chat(turn.message()).await;
            self.finish_turn(turn, outcome);
        }
    }

    /// Reset both sides. The remote reset is best effort.
    pub async fn reset<C>(&mut self, client: &C)
    where
        C: AgentClient + ?Sized,
    {
        if let Err(err) = client.reset().await {
            warn!(error = %err, "remote reset failed, resetting locally anyway");
        }
        self.reset_local();
    }
}
