use std::io;
use ratatui::{
    widgets::{Block, Borders, List, ListItem, Paragraph},
    layout::{Layout, Constraint, Direction},
    style::{Style, Color, Modifier},
    Terminal, Frame,
    text::Line,
    prelude::{Span, Text},
};
use crossterm::{
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    execute,
    event::{DisableMouseCapture, EnableMouseCapture},
};

use crate::models::{MediaKind, Post};
use crate::sync::{ChannelState, SubscriptionManager};
use crate::views::widgets::StatefulList;

const SHOWN_COMMENTS: usize = 3;

pub const HELP: &str = "j/k move  l like  c comment  d uncomment  r refresh  x logout  q quit";

/// Everything the feed screen draws.
pub struct FeedScreen<'a> {
    pub list: &'a mut StatefulList<Post>,
    pub subscriptions: &'a SubscriptionManager,
    pub me: Option<&'a str>,
    pub title: &'a str,
    pub status: &'a str,
    pub input: Option<&'a str>,
}

pub fn setup_terminal() -> io::Result<Terminal<ratatui::backend::CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

pub fn restore_terminal(terminal: &mut Terminal<ratatui::backend::CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()
}

fn counts_line(post: &Post, screen: &FeedScreen) -> Line<'static> {
    let style = Style::default().fg(Color::Magenta);
    match screen.subscriptions.interactions(&post.id) {
        Some(interactions) => {
            let liked = screen.me.map_or(false, |me| interactions.is_liked_by(me));
            let live = match screen.subscriptions.state(&post.id) {
                ChannelState::Open => "",
                ChannelState::Subscribing => " (connecting)",
                ChannelState::Closed => " (offline)",
            };
            Line::from(Span::styled(
                format!(
                    "{} {} likes  {} comments{}",
                    if liked { "♥" } else { "♡" },
                    interactions.like_count(),
                    interactions.comment_count(),
                    live
                ),
                style,
            ))
        }
        None if screen.subscriptions.is_mounted(&post.id) => Line::from(Span::styled("loading...", style)),
        None => Line::from(""),
    }
}

fn post_item<'a>(post: &'a Post, screen: &FeedScreen, selected: bool) -> ListItem<'a> {
    // Create the header line with username and timestamp
    let header = Line::from(vec![
        Span::styled(
            format!("{} posted at {}", post.author(), post.datetime()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        )
    ]);

    let content = Text::raw(post.description.as_str());

    let mut all_lines = vec![header, Line::from("")];
    all_lines.extend(content.lines);
    if let Some(media) = &post.media {
        let kind = match post.media_kind {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        };
        all_lines.push(Line::from(Span::styled(
            format!("[{}] {}", kind, media),
            Style::default().fg(Color::DarkGray),
        )));
    }
    if !post.advance_settings.location.is_empty() {
        all_lines.push(Line::from(format!("at {}", post.advance_settings.location)));
    }
    all_lines.push(counts_line(post, screen));

    if selected {
        if let Some(interactions) = screen.subscriptions.interactions(&post.id) {
            let comments: Vec<_> = interactions.comments().collect();
            let skip = comments.len().saturating_sub(SHOWN_COMMENTS);
            for comment in comments.into_iter().skip(skip) {
                all_lines.push(Line::from(format!("  {}: {}", comment.user_id, comment.text)));
            }
        }
    }
    all_lines.push(Line::from(""));

    ListItem::new(all_lines).style(Style::default())
}

pub fn render_ui<B: ratatui::backend::Backend>(
    f: &mut Frame<B>,
    screen: FeedScreen,
) {
    let input_height = if screen.input.is_some() { 3 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(input_height),
            Constraint::Length(1),
        ].as_ref())
        .split(f.size());

    let selected = screen.list.selected_index();
    let items: Vec<ListItem> = screen.list.items
        .iter()
        .enumerate()
        .map(|(i, post)| post_item(post, &screen, Some(i) == selected))
        .collect();

    // Create a List from the items and highlight the currently selected one
    let list = List::new(items)
        .block(Block::default().title(screen.title).borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .bg(Color::Gray)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD)
        );

    // Render the list with its state
    f.render_stateful_widget(list, chunks[0], &mut screen.list.state);

    if let Some(input) = screen.input {
        let input = Paragraph::new(input)
            .block(Block::default().title("comment (Enter to send, Esc to cancel)").borders(Borders::ALL));
        f.render_widget(input, chunks[1]);
    }

    let status = Paragraph::new(screen.status).style(Style::default().fg(Color::Yellow));
    f.render_widget(status, chunks[2]);
}
