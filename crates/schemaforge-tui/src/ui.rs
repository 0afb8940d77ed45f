use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use schemaforge_core::{ChatRole, SchemaArtifact, SchemaSummary};

use crate::app::{App, InputMode, Status};

/// Turn `**bold**` runs into bold spans. Unbalanced markers stay literal.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();

    // An even number of parts means one ** has no partner
    if parts.len() % 2 == 0 {
        return Line::raw(text.to_string());
    }

    let spans: Vec<Span<'static>> = parts
        .iter()
        .enumerate()
        .filter(|(_, part)| !part.is_empty())
        .map(|(i, part)| {
            if i % 2 == 1 {
                Span::styled(part.to_string(), Style::default().add_modifier(Modifier::BOLD))
            } else {
                Span::raw(part.to_string())
            }
        })
        .collect();

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    if app.conversation.show_diagram() {
        let [chat_area, schema_area] = Layout::horizontal([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .areas(body_area);
        render_chat_column(app, frame, chat_area);
        render_schema_panel(app, frame, schema_area);
    } else {
        app.schema_area = None;
        render_chat_column(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let schema_indicator = app
        .conversation
        .schema()
        .and_then(SchemaArtifact::schema_name)
        .map(|name| format!(" [{}]", name))
        .unwrap_or_default();

    let mut spans = vec![
        Span::styled(" SchemaForge ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(schema_indicator, Style::default().fg(Color::White)),
    ];
    if app.conversation.schema_proposed() {
        spans.push(Span::styled(
            " ● proposal ready ",
            Style::default().fg(Color::Green).bold(),
        ));
    }
    spans.extend(vec![
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
        Span::raw("  "),
        Span::styled(app.server_url.clone(), Style::default().fg(Color::Gray)),
    ]);
    let title = Line::from(spans);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " CHAT ",
        InputMode::Editing => " INPUT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    // Exports with nothing to export are shown dimmed, like a disabled button
    let disabled_style = Style::default().bg(Color::Black).fg(Color::DarkGray);

    let mut spans = vec![Span::styled(mode_text, mode_style)];

    match app.input_mode {
        InputMode::Editing => {
            spans.extend(vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" commands ", label_style),
            ]);
        }
        InputMode::Normal => {
            if !app.conversation.options().is_empty() {
                spans.extend(vec![
                    Span::styled(" 1-9 ", key_style),
                    Span::styled(" reply ", label_style),
                ]);
            }
            let conversation = &app.conversation;
            let export_hint = |available: bool| if available { label_style } else { disabled_style };
            spans.extend(vec![
                Span::styled(" i ", key_style),
                Span::styled(" type ", label_style),
                Span::styled(" e ", key_style),
                Span::styled(" html ", export_hint(conversation.diagram().is_some())),
                Span::styled(" s ", key_style),
                Span::styled(" json ", export_hint(conversation.schema().is_some())),
                Span::styled(" m ", key_style),
                Span::styled(" mermaid ", export_hint(conversation.mermaid().is_some())),
                Span::styled(" d ", key_style),
                Span::styled(" panel ", label_style),
                Span::styled(" c ", key_style),
                Span::styled(" clear ", label_style),
                Span::styled(" R ", key_style),
                Span::styled(" reset ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ]);
        }
    }

    if let Some(status) = &app.status {
        let (text, color) = match status {
            Status::Info(text) => (text, Color::Green),
            Status::Error(text) => (text, Color::Red),
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(text.clone(), Style::default().fg(color)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_chat_column(app: &mut App, frame: &mut Frame, area: Rect) {
    let options_height = if app.conversation.options().is_empty() { 0 } else { 3 };

    let [chat_area, options_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(options_height),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area for mouse hit-testing and its inner size for scroll math
    app.chat_area = Some(chat_area);
    let previous_width = app.chat_width;
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);
    if previous_width != app.chat_width {
        app.scroll_chat_to_bottom();
    }

    render_transcript(app, frame, chat_area);
    if options_height > 0 {
        render_options(app, frame, options_area);
    }
    render_input(app, frame, input_area);
}

fn render_transcript(app: &App, frame: &mut Frame, area: Rect) {
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Chat ");

    let mut lines: Vec<Line> = Vec::new();

    for msg in app.conversation.messages() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.display_lines() {
                    lines.push(Line::raw(line.to_string()));
                }
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "SchemaForge:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in msg.display_lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
        }
        lines.push(Line::default());
    }

    if app.conversation.is_pending() {
        lines.push(Line::from(Span::styled(
            "SchemaForge:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_options(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" Quick replies ");

    let mut spans: Vec<Span> = Vec::new();
    for (i, option) in app.conversation.options().iter().enumerate() {
        let style = if i == app.selected_option && app.input_mode == InputMode::Normal {
            Style::default()
                .bg(Color::Magenta)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Magenta)
        };
        let label = if i < 9 {
            format!(" {} {} ", i + 1, option)
        } else {
            format!(" {} ", option)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if app.conversation.is_pending() {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };

    let title = if app.conversation.is_pending() {
        " Waiting for SchemaForge... "
    } else {
        " Describe your database "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    // Scroll horizontally to keep the cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_schema_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    app.schema_area = Some(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Schema Diagram ");

    let conversation = &app.conversation;
    let mut lines: Vec<Line> = Vec::new();

    match conversation.schema() {
        Some(schema) => match schema.summary() {
            Some(summary) => lines.extend(summary_lines(&summary)),
            // Not shaped like a schema: show the record itself
            None => {
                let pretty = format!("{:#}", schema.value());
                lines.extend(pretty.lines().map(|l| Line::raw(l.to_string())));
            }
        },
        None if conversation.diagram().is_none() => {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "Your schema diagram will appear here",
                Style::default().fg(Color::DarkGray),
            )));
        }
        None => {}
    }

    if let Some(diagram) = conversation.diagram() {
        lines.push(Line::default());
        lines.push(Line::from(vec![
            Span::styled("Diagram: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{} HTML document", format_size(diagram.len()))),
        ]));
        lines.push(Line::from(Span::styled(
            "Press e to save it and open it in a browser",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let panel = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.schema_scroll, 0));

    frame.render_widget(panel, area);
}

fn summary_lines(summary: &SchemaSummary) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    lines.push(Line::from(Span::styled(
        summary.schema_name.clone().unwrap_or_else(|| "Unnamed schema".to_string()),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        format!(
            "{} entities · {} relationships",
            summary.entities.len(),
            summary.relationships.len()
        ),
        Style::default().fg(Color::Gray),
    )));

    for entity in &summary.entities {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            entity.name.clone(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        for attr in &entity.attributes {
            let marker = attr.key_marker().unwrap_or("  ");
            let mut spans = vec![
                Span::styled(format!("  {} ", marker), Style::default().fg(Color::Magenta)),
                Span::raw(attr.name.clone()),
                Span::raw(" "),
                Span::styled(attr.data_type.clone(), Style::default().fg(Color::DarkGray)),
            ];
            if !attr.nullable && !attr.primary_key {
                spans.push(Span::styled(" NOT NULL", Style::default().fg(Color::DarkGray)));
            }
            lines.push(Line::from(spans));
        }
    }

    if !summary.relationships.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "Relationships",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        for rel in &summary.relationships {
            lines.push(Line::from(vec![
                Span::raw(format!("  {} → {} ", rel.from_entity, rel.to_entity)),
                Span::styled(format!("({})", rel.kind), Style::default().fg(Color::DarkGray)),
                Span::raw(format!(" {}", rel.name)),
            ]));
        }
    }

    lines
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}
