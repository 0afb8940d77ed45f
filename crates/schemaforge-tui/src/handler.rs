use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, InputMode};
use crate::tui::AppEvent;

const MOUSE_SCROLL_LINES: u16 = 3;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_turn().await;
            app.poll_sync().await;
        }
        AppEvent::TurnDone => app.poll_turn().await,
        AppEvent::SyncDone => app.poll_sync().await,
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Half-page scroll
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_down(app.half_page());
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_up(app.half_page());
        }

        // Chat scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Quick replies
        KeyCode::Char(c @ '1'..='9') => {
            let index = c as usize - '1' as usize;
            app.choose_option(index);
        }
        KeyCode::Char('h') | KeyCode::Left => app.option_prev(),
        KeyCode::Char('l') | KeyCode::Right => app.option_next(),
        KeyCode::Enter => {
            if app.conversation.options().is_empty() {
                app.input_mode = InputMode::Editing;
            } else {
                app.choose_selected_option();
            }
        }

        KeyCode::Char('i') | KeyCode::Char('/') => app.input_mode = InputMode::Editing,

        // Conversation commands
        KeyCode::Char('R') => app.reset(),
        KeyCode::Char('c') => app.clear(),
        KeyCode::Char('d') => app.toggle_panel(),
        KeyCode::Char('S') => app.sync_schema(),

        // Exports
        KeyCode::Char('e') => app.export_diagram(),
        KeyCode::Char('s') => app.export_schema(),
        KeyCode::Char('m') => app.export_mermaid(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.submit_input();
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

/// Pasted text goes into the input line as a single line.
fn handle_paste(app: &mut App, text: &str) {
    if app.input_mode != InputMode::Editing {
        return;
    }

    let flattened: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
    app.input.insert_str(byte_pos, &flattened);
    app.input_cursor += flattened.chars().count();
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_schema = app.schema_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_chat {
                app.scroll_chat_down(MOUSE_SCROLL_LINES);
            } else if in_schema {
                app.schema_scroll = app.schema_scroll.saturating_add(MOUSE_SCROLL_LINES);
            }
        }
        MouseEventKind::ScrollUp => {
            if in_chat {
                app.scroll_chat_up(MOUSE_SCROLL_LINES);
            } else if in_schema {
                app.schema_scroll = app.schema_scroll.saturating_sub(MOUSE_SCROLL_LINES);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{school_reply, test_app, EchoAgent};
    use schemaforge_core::controller::WELCOME_MESSAGE;
    use schemaforge_core::{ChatMessage, HttpAgentClient};
    use std::sync::Arc;
    use std::time::Duration;

    /// Base URL of a server that accepts connections and never answers.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    async fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c))).await.unwrap();
        }
    }

    #[test]
    fn test_char_to_byte_index_multibyte() {
        let s = "añb✓";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 4), s.len());
    }

    #[tokio::test]
    async fn test_cursor_editing() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());
        assert_eq!(app.input_mode, InputMode::Editing);

        type_text(&mut app, "shp").await;
        handle_event(&mut app, key(KeyCode::Left)).await.unwrap();
        type_text(&mut app, "ó").await;
        assert_eq!(app.input, "shóp");

        handle_event(&mut app, key(KeyCode::Home)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Delete)).await.unwrap();
        handle_event(&mut app, key(KeyCode::End)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Backspace)).await.unwrap();
        assert_eq!(app.input, "hó");
        assert_eq!(app.input_cursor, 2);
    }

    #[tokio::test]
    async fn test_enter_submits_and_digit_picks_option() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Arc::new(EchoAgent::ok(school_reply()));
        let mut app = test_app(agent.clone(), dir.path());

        type_text(&mut app, "Build a school DB").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
        assert_eq!(app.input_mode, InputMode::Normal);
        app.wait_for_turn().await;
        assert_eq!(app.conversation.options(), &["Modify", "Finalize"]);

        // "1" is Modify, answered without a round trip
        handle_event(&mut app, key(KeyCode::Char('1'))).await.unwrap();
        assert_eq!(app.conversation.messages().len(), 5);
        assert!(!app.has_turn_in_flight());
        assert_eq!(agent.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_normal_mode_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());
        app.input = "Build a school DB".to_string();
        app.submit_input();
        app.wait_for_turn().await;

        handle_event(&mut app, key(KeyCode::Char('d'))).await.unwrap();
        assert!(!app.conversation.show_diagram());

        handle_event(&mut app, key(KeyCode::Char('s'))).await.unwrap();
        assert!(dir.path().join("school.json").exists());

        handle_event(&mut app, key(KeyCode::Char('c'))).await.unwrap();
        assert_eq!(app.conversation.messages().len(), 1);
        assert!(app.conversation.schema().is_some());

        handle_event(&mut app, key(KeyCode::Char('R'))).await.unwrap();
        assert!(app.conversation.schema().is_none());

        handle_event(&mut app, key(KeyCode::Char('q'))).await.unwrap();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_unresponsive_server_does_not_block_keys() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Arc::new(HttpAgentClient::new(&silent_server().await));
        let mut app = test_app(agent, dir.path());

        let handled = tokio::time::timeout(Duration::from_secs(3), async {
            type_text(&mut app, "Build a school DB").await;
            handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
            handle_event(&mut app, AppEvent::Tick).await.unwrap();

            handle_event(&mut app, key(KeyCode::Char('S'))).await.unwrap();
            handle_event(&mut app, AppEvent::Tick).await.unwrap();
            assert!(app.is_syncing());

            handle_event(&mut app, key(KeyCode::Char('R'))).await.unwrap();
            handle_event(&mut app, AppEvent::Tick).await.unwrap();

            handle_event(
                &mut app,
                AppEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            )
            .await
            .unwrap();
        })
        .await;

        assert!(handled.is_ok(), "a key handler waited on the server");
        assert_eq!(app.conversation.messages(), &[ChatMessage::assistant(WELCOME_MESSAGE)]);
        assert!(!app.is_syncing());
        // The chat request is still out; its reply will be dropped as stale
        assert!(app.conversation.is_pending());
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_paste_flattens_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(EchoAgent::ok(school_reply())), dir.path());

        handle_event(&mut app, AppEvent::Paste("a shop\nwith orders".to_string()))
            .await
            .unwrap();
        assert_eq!(app.input, "a shop with orders");
        assert_eq!(app.input_cursor, 18);
    }
}
