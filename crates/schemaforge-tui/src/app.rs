use std::sync::Arc;

use ratatui::layout::Rect;
use schemaforge_core::{
    AgentClient, AgentError, AgentReply, ArtifactSnapshot, Conversation, ExportError,
    ExportedFile, Exporter, OptionOutcome, PendingTurn,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// One-line feedback shown in the footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Error(String),
}

/// A turn whose agent call is running in the background.
pub struct InFlightTurn {
    turn: PendingTurn,
    task: JoinHandle<Result<AgentReply, AgentError>>,
}

type SyncTask = JoinHandle<Result<Option<ArtifactSnapshot>, AgentError>>;

/// Rows a line occupies when word-wrapped at `width` columns.
fn wrapped_rows(line: &str, width: usize) -> usize {
    if width == 0 || line.is_empty() {
        return 1;
    }

    let mut rows = 1;
    let mut col = 0;
    let mut row_start = true;
    for word in line.split(' ') {
        let len = word.chars().count();
        let needed = if row_start { len } else { col + 1 + len };
        if needed <= width {
            col = needed;
            row_start = false;
            continue;
        }

        // Word moves to a fresh row, and is broken up if it still does not fit
        if !row_start {
            rows += 1;
        }
        if len > width {
            rows += (len - 1) / width;
            col = (len - 1) % width + 1;
        } else {
            col = len;
        }
        row_start = false;
    }
    rows
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub conversation: Conversation,

    // Collaborators
    pub agent: Arc<dyn AgentClient>,
    pub exporter: Exporter,
    pub server_url: String,
    notifier: UnboundedSender<AppEvent>,
    in_flight: Option<InFlightTurn>,
    sync_task: Option<SyncTask>,

    // Input line
    pub input: String,
    pub input_cursor: usize, // cursor position in chars, not bytes

    // Quick replies
    pub selected_option: usize,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16, // Inner height of chat area for scroll calculations
    pub chat_width: u16,  // Inner width of chat area for wrap calculations
    pub schema_scroll: u16,

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub schema_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub status: Option<Status>,
}

impl App {
    pub fn new(
        agent: Arc<dyn AgentClient>,
        exporter: Exporter,
        server_url: String,
        notifier: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            conversation: Conversation::new(),

            agent,
            exporter,
            server_url,
            notifier,
            in_flight: None,
            sync_task: None,

            input: String::new(),
            input_cursor: 0,

            selected_option: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            schema_scroll: 0,

            chat_area: None,
            schema_area: None,

            animation_frame: 0,

            status: None,
        }
    }

    /// Send the input line. The line is only cleared when a turn actually starts.
    pub fn submit_input(&mut self) {
        if let Some(turn) = self.conversation.begin_turn(&self.input) {
            self.input.clear();
            self.input_cursor = 0;
            self.input_mode = InputMode::Normal;
            self.spawn_turn(turn);
        }
    }

    /// Choose the quick reply at `index` (0-based).
    pub fn choose_option(&mut self, index: usize) {
        let Some(option) = self.conversation.options().get(index).cloned() else {
            return;
        };

        match self.conversation.select_option(&option) {
            OptionOutcome::Remote(turn) => self.spawn_turn(turn),
            OptionOutcome::Local => self.scroll_chat_to_bottom(),
            OptionOutcome::Ignored => {}
        }
        self.selected_option = 0;
    }

    pub fn choose_selected_option(&mut self) {
        self.choose_option(self.selected_option);
    }

    fn spawn_turn(&mut self, turn: PendingTurn) {
        let agent = self.agent.clone();
        let message = turn.message().to_string();
        let notifier = self.notifier.clone();

        let task = tokio::spawn(async move {
            let outcome = agent.chat(&message).await;
            let _ = notifier.send(AppEvent::TurnDone);
            outcome
        });

        self.in_flight = Some(InFlightTurn { turn, task });
        self.status = None;
        self.scroll_chat_to_bottom();
    }

    /// Apply the agent's answer if the background call has finished.
    pub async fn poll_turn(&mut self) {
        let finished = self
            .in_flight
            .as_ref()
            .map(|in_flight| in_flight.task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(in_flight) = self.in_flight.take() {
            self.settle(in_flight).await;
        }
    }

    async fn settle(&mut self, in_flight: InFlightTurn) {
        let InFlightTurn { turn, task } = in_flight;
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(AgentError::Unreachable(format!("agent task failed: {}", err))),
        };
        self.conversation.finish_turn(turn, outcome);
        self.selected_option = 0;
        self.scroll_chat_to_bottom();
    }

    /// Reset locally right away and tell the server in the background. The
    /// remote reset is best effort, so its outcome is only logged.
    pub fn reset(&mut self) {
        if let Some(task) = self.sync_task.take() {
            task.abort();
        }
        self.conversation.reset_local();
        self.reset_view();
        self.status = Some(Status::Info("Conversation and schema reset".to_string()));

        let agent = self.agent.clone();
        tokio::spawn(async move {
            if let Err(err) = agent.reset().await {
                tracing::warn!(error = %err, "remote reset failed, local state already reset");
            }
        });
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
        self.reset_view();
        self.status = Some(Status::Info("Chat cleared, schema kept".to_string()));
    }

    fn reset_view(&mut self) {
        self.selected_option = 0;
        self.chat_scroll = 0;
        self.schema_scroll = 0;
    }

    /// Fetch the server's current artifacts in the background. The result
    /// is applied by [`App::poll_sync`].
    pub fn sync_schema(&mut self) {
        if self.sync_task.is_some() {
            return;
        }

        let agent = self.agent.clone();
        let notifier = self.notifier.clone();
        self.sync_task = Some(tokio::spawn(async move {
            let outcome = agent.current_schema().await;
            let _ = notifier.send(AppEvent::SyncDone);
            outcome
        }));
        self.status = Some(Status::Info("Syncing schema...".to_string()));
    }

    pub async fn poll_sync(&mut self) {
        let finished = self
            .sync_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(task) = self.sync_task.take() {
            self.apply_sync(task).await;
        }
    }

    async fn apply_sync(&mut self, task: SyncTask) {
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(AgentError::Unreachable(format!("sync task failed: {}", err))),
        };

        match outcome {
            Ok(Some(snapshot)) => {
                self.conversation.sync_artifacts(snapshot);
                self.status = Some(Status::Info("Schema synced from server".to_string()));
            }
            Ok(None) => {
                self.status = Some(Status::Info("Server has no schema yet".to_string()));
            }
            Err(err) => {
                tracing::warn!(error = %err, "schema sync failed");
                self.status = Some(Status::Error("Could not reach the schema server".to_string()));
            }
        }
    }

    pub fn export_diagram(&mut self) {
        let result = self
            .exporter
            .export_diagram(self.conversation.diagram(), self.conversation.schema());
        self.report_export(result);
    }

    pub fn export_schema(&mut self) {
        let result = self.exporter.export_schema(self.conversation.schema());
        self.report_export(result);
    }

    pub fn export_mermaid(&mut self) {
        let result = self
            .exporter
            .export_mermaid(self.conversation.mermaid(), self.conversation.schema());
        self.report_export(result);
    }

    fn report_export(&mut self, result: Result<Option<ExportedFile>, ExportError>) {
        match result {
            Ok(Some(file)) => {
                self.status = Some(Status::Info(format!(
                    "Saved {} ({}, {} bytes)",
                    file.path.display(),
                    file.mime,
                    file.bytes
                )));
            }
            // Nothing to export yet
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "export failed");
                self.status = Some(Status::Error(format!("Export failed: {}", err)));
            }
        }
    }

    pub fn toggle_panel(&mut self) {
        self.conversation.toggle_panel();
    }

    // Quick reply selection
    pub fn option_next(&mut self) {
        let len = self.conversation.options().len();
        if len > 0 {
            self.selected_option = (self.selected_option + 1).min(len - 1);
        }
    }

    pub fn option_prev(&mut self) {
        self.selected_option = self.selected_option.saturating_sub(1);
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversation.is_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Rendered line count of the transcript at the current chat width.
    pub fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.conversation.messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.display_lines() {
                let wrapped = wrapped_rows(line, wrap_width);
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.conversation.is_pending() {
            total_lines = total_lines.saturating_add(2); // Role line + "Thinking..."
        }

        total_lines
    }

    fn max_chat_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    /// Scroll chat to bottom so the latest message (or "Thinking...") is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_chat_scroll());
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use schemaforge_core::{DiagramArtifact, SchemaArtifact};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Agent that answers every chat with the same reply.
    pub(crate) struct EchoAgent {
        pub sent: Mutex<Vec<String>>,
        pub reply: Result<AgentReply, AgentError>,
    }

    impl EchoAgent {
        pub(crate) fn ok(reply: AgentReply) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                reply: Ok(reply),
            }
        }
    }

    #[async_trait]
    impl AgentClient for EchoAgent {
        async fn chat(&self, message: &str) -> Result<AgentReply, AgentError> {
            self.sent.lock().unwrap().push(message.to_string());
            self.reply.clone()
        }

        async fn reset(&self) -> Result<(), AgentError> {
            Err(AgentError::ResetFailed("offline".to_string()))
        }

        async fn current_schema(&self) -> Result<Option<ArtifactSnapshot>, AgentError> {
            Ok(Some(ArtifactSnapshot {
                schema: SchemaArtifact::new(serde_json::json!({"schema_name": "synced"})),
                ..Default::default()
            }))
        }
    }

    pub(crate) fn school_reply() -> AgentReply {
        AgentReply {
            reply: "✅ Created schema: school".to_string(),
            options: vec!["Modify".to_string(), "Finalize".to_string()],
            artifacts: ArtifactSnapshot {
                diagram: DiagramArtifact::new("<html>school</html>"),
                schema: SchemaArtifact::new(serde_json::json!({
                    "schema_name": "school",
                    "entities": [{
                        "name": "Student",
                        "attributes": [{"name": "student_id", "type": "INT", "primary_key": true}]
                    }],
                    "relationships": []
                })),
                mermaid: None,
            },
            schema_proposed: true,
        }
    }

    impl App {
        pub(crate) fn has_turn_in_flight(&self) -> bool {
            self.in_flight.is_some()
        }

        pub(crate) fn is_syncing(&self) -> bool {
            self.sync_task.is_some()
        }

        /// Block until the in-flight turn settles.
        pub(crate) async fn wait_for_turn(&mut self) {
            if let Some(in_flight) = self.in_flight.take() {
                self.settle(in_flight).await;
            }
        }

        /// Block until the running schema sync is applied.
        pub(crate) async fn wait_for_sync(&mut self) {
            if let Some(task) = self.sync_task.take() {
                self.apply_sync(task).await;
            }
        }
    }

    pub(crate) fn test_app(agent: Arc<dyn AgentClient>, dir: &std::path::Path) -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(agent, Exporter::new(dir), "http://test".to_string(), tx)
    }

    #[tokio::test]
    async fn test_submit_input_runs_turn_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Arc::new(EchoAgent::ok(school_reply()));
        let mut app = test_app(agent.clone(), dir.path());

        app.input = "Build a school DB".to_string();
        app.input_cursor = app.input.chars().count();
        app.submit_input();

        assert!(app.input.is_empty());
        assert_eq!(app.input_cursor, 0);
        assert!(app.conversation.is_pending());
        assert!(app.has_turn_in_flight());

        app.wait_for_turn().await;
        assert!(!app.conversation.is_pending());
        assert_eq!(app.conversation.messages().len(), 3);
        assert_eq!(app.conversation.options(), &["Modify", "Finalize"]);
        assert_eq!(agent.sent.lock().unwrap().clone(), vec!["Build a school DB"]);
    }

    #[tokio::test]
    async fn test_rejected_submission_keeps_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());

        app.input = "first".to_string();
        app.submit_input();
        app.input = "second".to_string();
        app.submit_input();

        assert_eq!(app.input, "second");
        app.wait_for_turn().await;
        assert_eq!(app.conversation.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_poll_turn_applies_finished_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());

        app.input = "hi".to_string();
        app.submit_input();
        while app.has_turn_in_flight() {
            tokio::task::yield_now().await;
            app.poll_turn().await;
        }

        assert!(!app.conversation.is_pending());
        assert_eq!(app.conversation.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_modify_option_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Arc::new(EchoAgent::ok(school_reply()));
        let mut app = test_app(agent.clone(), dir.path());

        app.input = "Build a school DB".to_string();
        app.submit_input();
        app.wait_for_turn().await;

        app.choose_option(0);
        assert!(!app.has_turn_in_flight());
        assert_eq!(app.conversation.messages().len(), 5);
        assert_eq!(agent.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_swallows_remote_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());
        app.input = "Build a school DB".to_string();
        app.submit_input();
        app.wait_for_turn().await;

        app.reset();

        assert_eq!(app.conversation.messages().len(), 1);
        assert!(app.conversation.schema().is_none());
        assert!(matches!(app.status, Some(Status::Info(_))));
    }

    #[tokio::test]
    async fn test_exports_report_saved_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());

        app.export_schema();
        assert!(app.status.is_none());

        app.input = "Build a school DB".to_string();
        app.submit_input();
        app.wait_for_turn().await;

        app.export_diagram();
        assert!(dir.path().join("school_diagram.html").exists());
        app.export_schema();
        assert!(dir.path().join("school.json").exists());
        assert!(matches!(&app.status, Some(Status::Info(msg)) if msg.contains("school.json")));

        // No mermaid source yet: silent no-op
        app.status = None;
        app.export_mermaid();
        assert!(app.status.is_none());
    }

    #[tokio::test]
    async fn test_sync_schema() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());

        app.sync_schema();
        assert!(app.is_syncing());
        assert!(app.conversation.schema().is_none());

        app.wait_for_sync().await;
        assert!(!app.is_syncing());
        assert_eq!(
            app.conversation.schema().and_then(|s| s.schema_name()),
            Some("synced")
        );
    }

    #[tokio::test]
    async fn test_reset_drops_running_sync() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());

        app.sync_schema();
        app.reset();

        assert!(!app.is_syncing());
        app.poll_sync().await;
        assert!(app.conversation.schema().is_none());
    }

    #[test]
    fn test_wrapped_rows() {
        assert_eq!(wrapped_rows("", 10), 1);
        assert_eq!(wrapped_rows("short", 10), 1);
        assert_eq!(wrapped_rows("exactly 10", 10), 1);
        assert_eq!(wrapped_rows("some long words", 10), 2);
        // 15 chars, but "defghij" and "klm" each start a new row
        assert_eq!(wrapped_rows("abc defghij klm", 10), 3);
        // Words wider than the row are broken up
        assert_eq!(wrapped_rows("abcdefghijklmnopqrstuvwxyz", 10), 3);
        assert_eq!(wrapped_rows("añb✓", 2), 2);
    }

    #[test]
    fn test_total_chat_lines_wraps_by_words() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());
        app.chat_width = 10;
        app.conversation.clear();

        // "💬 Chat|cleared.|Your|schema is|still|preserved." -> 6 rows,
        // then "", "What else|would you|like to|do?" -> 4 rows
        assert_eq!(app.total_chat_lines(), 1 + 6 + 1 + 4 + 1);
    }
}
