use std::collections::HashSet;
use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::Terminal;
use tokio::sync::mpsc;

use crate::controllers::Services;
use crate::error::{FeedError, Result};
use crate::models::row::Row;
use crate::models::{AuthState, Comment, Config, Like, Post, Route, SessionChange};
use crate::sync::{
    Action, DriftCheck, Outcome, PendingWrite, PostCollection, PostInteractions, SubscriptionManager, Ticket,
};
use crate::views::tui::{self, FeedScreen};
use crate::views::StatefulList;

const TICK: Duration = Duration::from_millis(50);

/// Completions reported back to the event loop by spawned work.
pub enum AppMessage {
    FeedLoaded(Result<Vec<Post>>),
    Baseline(Ticket, Result<PostInteractions>),
    Drift(DriftCheck, Result<Option<(Vec<Like>, Vec<Comment>)>>),
    WriteFinished(Ticket, PendingWrite, Result<Option<Row>>),
    SignedOut(Result<()>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Browse,
    Comment(String),
}

pub struct App {
    services: Services,
    config: Config,
    auth: AuthState,
    sessions: mpsc::UnboundedReceiver<SessionChange>,
    feed: PostCollection,
    list: StatefulList<Post>,
    subscriptions: SubscriptionManager,
    loading: HashSet<u64>,
    mode: Mode,
    status: String,
    tx: mpsc::UnboundedSender<AppMessage>,
    last_resync: Instant,
}

impl App {
    pub fn new(services: Services, config: Config, priority: Option<Post>, tx: mpsc::UnboundedSender<AppMessage>) -> Self {
        let sessions = services.identity.session_changes();
        let mut feed = PostCollection::new();
        feed.set_priority(priority);
        Self {
            services,
            config,
            auth: AuthState::default(),
            sessions,
            feed,
            list: StatefulList::with_items(vec![]),
            subscriptions: SubscriptionManager::new(),
            loading: HashSet::new(),
            mode: Mode::Browse,
            status: "Loading feed...".to_string(),
            tx,
            last_resync: Instant::now(),
        }
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.status = text.into();
    }

    fn fail(&mut self, e: &FeedError) {
        log::warn!("{}", e);
        self.notice(e.notice());
    }

    pub fn start(&mut self) {
        if let Err(e) = self.feed.watch(self.services.backend.as_ref()) {
            log::warn!("Not watching for new posts: {}", e);
        }
        self.spawn_feed_fetch();
    }

    fn spawn_feed_fetch(&self) {
        let backend = self.services.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = PostCollection::fetch(backend.as_ref()).await;
            let _ = tx.send(AppMessage::FeedLoaded(result));
        });
    }

    fn spawn_baseline(&mut self, ticket: Ticket) {
        if !self.loading.insert(ticket.generation) {
            return;
        }
        let backend = self.services.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = PostInteractions::initialize(backend.as_ref(), &ticket.post_id).await;
            let _ = tx.send(AppMessage::Baseline(ticket, result));
        });
    }

    fn spawn_write(&self, ticket: Ticket, pending: PendingWrite) {
        let backend = self.services.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = pending.write.execute(backend.as_ref()).await;
            let _ = tx.send(AppMessage::WriteFinished(ticket, pending, result));
        });
    }

    fn spawn_resync(&mut self) {
        self.last_resync = Instant::now();
        // Reopens channels that failed since the last pass.
        self.sync_mounts();
        for check in self.subscriptions.installed() {
            let backend = self.services.backend.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let result =
                    PostInteractions::fetch_if_drifted(backend.as_ref(), &check.ticket.post_id, check.counts).await;
                let _ = tx.send(AppMessage::Drift(check, result));
            });
        }
        for ticket in self.subscriptions.needs_baseline() {
            self.spawn_baseline(ticket);
        }
    }

    fn selected_id(&self) -> Option<String> {
        self.list.selected().map(|post| post.id.clone())
    }

    /// Keeps live subscriptions only for the posts around the selection.
    fn sync_mounts(&mut self) {
        if self.auth.session().is_none() {
            self.subscriptions.unmount_all();
            return;
        }
        let Some(selected) = self.list.selected_index() else {
            self.subscriptions.unmount_all();
            return;
        };
        let window = self.config.mount_window;
        let start = selected.saturating_sub(window);
        let visible: Vec<String> = self
            .list
            .items
            .iter()
            .skip(start)
            .take(window * 2 + 1)
            .map(|post| post.id.clone())
            .collect();
        self.subscriptions.retain_mounted(&visible);

        for post_id in visible {
            let mounted = self
                .subscriptions
                .mount(self.services.backend.as_ref(), self.auth.session(), &post_id);
            match mounted {
                Ok(Some(ticket)) => self.spawn_baseline(ticket),
                Ok(None) => {}
                Err(e) => {
                    self.fail(&e);
                    break;
                }
            }
        }
    }

    pub fn handle_message(&mut self, message: AppMessage) {
        match message {
            AppMessage::FeedLoaded(result) => match self.feed.apply_fetch(result) {
                Ok(()) => {
                    self.list.replace_items(self.feed.posts().to_vec(), |post| post.id.clone());
                    self.notice(tui::HELP);
                    self.sync_mounts();
                }
                Err(e) => self.fail(&e),
            },
            AppMessage::Baseline(ticket, result) => {
                self.loading.remove(&ticket.generation);
                match result {
                    Ok(interactions) => {
                        self.subscriptions.install(&ticket, interactions);
                    }
                    // Retried on the next resync.
                    Err(e) if self.subscriptions.is_current(&ticket) => self.fail(&e),
                    Err(_) => {}
                }
            }
            AppMessage::Drift(check, result) => match result {
                Ok(Some((likes, comments))) => {
                    self.subscriptions.rebase(&check, likes, comments);
                }
                Ok(None) => {}
                Err(e) => log::debug!("resync of {} failed: {}", check.ticket.post_id, e),
            },
            AppMessage::WriteFinished(ticket, pending, result) => {
                match self.subscriptions.complete(&ticket, pending, result) {
                    None => log::debug!("post {} unmounted before its write finished", ticket.post_id),
                    Some(Ok(outcome)) => self.report(outcome),
                    Some(Err(e)) => self.fail(&e),
                }
            }
            AppMessage::SignedOut(result) => match result {
                Ok(()) => self.notice("Signed out"),
                Err(e) => self.fail(&e),
            },
        }
    }

    fn report(&mut self, outcome: Outcome) {
        match outcome.action {
            Action::Comment => self.notice(format!("Comment posted ({} comments)", outcome.comment_count)),
            Action::Uncomment => self.notice("Your comments were removed"),
            Action::Like | Action::Unlike => {}
        }
    }

    fn apply_session_changes(&mut self) {
        let mut changed = false;
        while let Ok((event, session)) = self.sessions.try_recv() {
            self.auth.apply(event, session);
            changed = true;
        }
        if !changed {
            return;
        }
        match self.auth.route() {
            Route::Login => {
                self.subscriptions.unmount_all();
                self.notice("Not logged in, likes and comments are unavailable");
            }
            Route::CompleteProfile => {
                self.notice("Finish your profile with `feedsync profile`");
                self.sync_mounts();
            }
            Route::Feed => self.sync_mounts(),
            Route::Splash => {}
        }
    }

    /// Work done between key presses.
    pub fn tick(&mut self) {
        self.apply_session_changes();
        self.subscriptions.pump();
        if self.feed.poll_watch() {
            self.notice("New posts available, press r to refresh");
        }
        if self.last_resync.elapsed() >= Duration::from_secs(self.config.resync_secs) {
            self.spawn_resync();
        }
    }

    /// The selected post has no live mount, either because nobody is
    /// logged in or because its channels could not be opened.
    fn not_mounted(&mut self, what: &str) {
        if self.auth.session().is_none() {
            return self.fail(&FeedError::Unauthenticated(format!("Please login to {}", what)));
        }
        self.sync_mounts();
        self.notice("Live updates for this post are reconnecting, try again shortly");
    }

    fn toggle_like(&mut self) {
        let Some(post_id) = self.selected_id() else { return };
        let Some(ticket) = self.subscriptions.ticket(&post_id) else {
            return self.not_mounted("like this post");
        };
        let Some(interactions) = self.subscriptions.interactions_mut(&post_id) else {
            return self.notice("Still loading this post");
        };
        match interactions.begin_toggle_like(self.auth.session()) {
            Ok(pending) => self.spawn_write(ticket, pending),
            Err(e) => self.fail(&e),
        }
    }

    fn submit_comment(&mut self, text: String) {
        let Some(post_id) = self.selected_id() else { return };
        let Some(ticket) = self.subscriptions.ticket(&post_id) else {
            return self.not_mounted("comment on this post");
        };
        let Some(interactions) = self.subscriptions.interactions(&post_id) else {
            return self.notice("Still loading this post");
        };
        match interactions.prepare_comment(self.auth.session(), &text) {
            Ok(pending) => {
                self.notice("Posting comment...");
                self.spawn_write(ticket, pending);
            }
            Err(e) => self.fail(&e),
        }
    }

    fn uncomment(&mut self) {
        let Some(post_id) = self.selected_id() else { return };
        let Some(ticket) = self.subscriptions.ticket(&post_id) else {
            return self.not_mounted("remove your comments");
        };
        let Some(interactions) = self.subscriptions.interactions_mut(&post_id) else {
            return self.notice("Still loading this post");
        };
        match interactions.begin_uncomment(self.auth.session()) {
            Ok(pending) => self.spawn_write(ticket, pending),
            Err(e) => self.fail(&e),
        }
    }

    fn sign_out(&mut self) {
        let identity = self.services.identity.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = identity.sign_out().await;
            let _ = tx.send(AppMessage::SignedOut(result));
        });
    }

    /// Returns false when the app should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if let Mode::Comment(input) = &mut self.mode {
            match key.code {
                KeyCode::Esc => self.mode = Mode::Browse,
                KeyCode::Enter => {
                    // The field is cleared whatever the outcome.
                    let text = std::mem::take(input);
                    self.mode = Mode::Browse;
                    self.submit_comment(text);
                }
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char(c) => input.push(c),
                _ => {}
            }
            return true;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return false,
            KeyCode::Down | KeyCode::Char('j') => {
                self.list.next();
                self.sync_mounts();
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.list.previous();
                self.sync_mounts();
            }
            KeyCode::PageDown => {
                self.list.jump_down(5);
                self.sync_mounts();
            }
            KeyCode::PageUp => {
                self.list.jump_up(5);
                self.sync_mounts();
            }
            KeyCode::Char('g') => {
                self.list.first();
                self.sync_mounts();
            }
            KeyCode::Char('G') => {
                self.list.last();
                self.sync_mounts();
            }
            KeyCode::Char('l') => self.toggle_like(),
            KeyCode::Char('c') => self.mode = Mode::Comment(String::new()),
            KeyCode::Char('d') => self.uncomment(),
            KeyCode::Char('r') => {
                self.notice("Refreshing...");
                self.spawn_feed_fetch();
            }
            KeyCode::Char('x') => self.sign_out(),
            _ => {}
        }
        true
    }

    fn title(&self) -> String {
        let who = self
            .auth
            .session()
            .map(|s| {
                let name = &s.user.metadata.username;
                if name.is_empty() { s.user_id().to_string() } else { name.clone() }
            })
            .unwrap_or_else(|| "logged out".to_string());
        if self.feed.new_posts_available() {
            format!("Feed ({}) - new posts", who)
        } else {
            format!("Feed ({})", who)
        }
    }

    pub fn draw<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        let title = self.title();
        let me = self.auth.session().map(|s| s.user_id().to_string());
        let input = match &self.mode {
            Mode::Comment(text) => Some(text.as_str()),
            Mode::Browse => None,
        };
        let screen = FeedScreen {
            list: &mut self.list,
            subscriptions: &self.subscriptions,
            me: me.as_deref(),
            title: &title,
            status: &self.status,
            input,
        };
        terminal.draw(|f| tui::render_ui(f, screen))?;
        Ok(())
    }
}

pub async fn start_app(services: Services, config: Config, priority: Option<Post>) -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    let mut terminal = tui::setup_terminal()?;

    let (tx, rx) = mpsc::unbounded_channel();
    let mut app = App::new(services, config, priority, tx);
    app.start();

    // Run the app
    let res = run_app(&mut terminal, &mut app, rx).await;

    // Restore terminal
    tui::restore_terminal(&mut terminal)?;

    if let Err(err) = res {
        eprintln!("{:?}", err);
    }

    Ok(())
}

pub async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut rx: mpsc::UnboundedReceiver<AppMessage>,
) -> io::Result<()> {
    loop {
        app.tick();
        app.draw(terminal)?;

        // Lets spawned work and realtime delivery run between key polls.
        tokio::select! {
            Some(message) = rx.recv() => app.handle_message(message),
            _ = tokio::time::sleep(TICK) => {}
        }
        while let Ok(message) = rx.try_recv() {
            app.handle_message(message);
        }

        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if !app.handle_key(key) {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, Table};
    use crate::controllers::demo;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    async fn settle(app: &mut App, rx: &mut mpsc::UnboundedReceiver<AppMessage>) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
            while let Ok(message) = rx.try_recv() {
                app.handle_message(message);
            }
            app.tick();
        }
    }

    fn app(backend: &MemoryBackend) -> (App, mpsc::UnboundedReceiver<AppMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = App::new(Services::memory(backend.clone()), Config::default(), None, tx);
        app.start();
        (app, rx)
    }

    #[tokio::test]
    async fn liking_from_the_keyboard_round_trips() {
        let backend = demo::seeded_backend();
        let (mut app, mut rx) = app(&backend);
        settle(&mut app, &mut rx).await;

        let post_id = app.selected_id().unwrap();
        let before = app.subscriptions.interactions(&post_id).unwrap().like_count();
        app.handle_key(key('l'));
        assert_eq!(app.subscriptions.interactions(&post_id).unwrap().like_count(), before + 1);

        settle(&mut app, &mut rx).await;
        let interactions = app.subscriptions.interactions(&post_id).unwrap();
        assert_eq!(interactions.like_count(), before + 1);
        assert!(interactions.is_liked_by("u-you"));
        assert_eq!(backend.rows(Table::Likes).iter().filter(|r| r["user_id"] == "u-you").count(), 1);
    }

    #[tokio::test]
    async fn comment_input_is_cleared_on_submit() {
        let backend = demo::seeded_backend();
        let (mut app, mut rx) = app(&backend);
        settle(&mut app, &mut rx).await;

        app.handle_key(key('c'));
        for c in "nice".chars() {
            app.handle_key(key(c));
        }
        app.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert_eq!(app.mode, Mode::Browse);

        settle(&mut app, &mut rx).await;
        let post_id = app.selected_id().unwrap();
        let interactions = app.subscriptions.interactions(&post_id).unwrap();
        assert_eq!(interactions.comments().filter(|c| c.text == "nice").count(), 1);
    }

    #[tokio::test]
    async fn unmounted_post_is_remounted_when_logged_in() {
        let backend = demo::seeded_backend();
        let (mut app, mut rx) = app(&backend);
        settle(&mut app, &mut rx).await;
        let post_id = app.selected_id().unwrap();
        app.subscriptions.unmount(&post_id);

        app.handle_key(key('l'));
        assert_ne!(app.status, "Please log in first");
        assert!(app.subscriptions.is_mounted(&post_id));
    }

    #[tokio::test]
    async fn liking_while_logged_out_asks_to_log_in() {
        let backend = MemoryBackend::new();
        let post = crate::models::row::post_row(
            "u-ana",
            "memory://feed-media/u-ana/1.jpg",
            crate::models::MediaKind::Image,
            "quiet morning",
            &crate::models::AdvanceSettings::default(),
            chrono::Utc::now(),
        );
        backend.seed(Table::Posts, vec![post]);
        let (mut app, mut rx) = app(&backend);
        settle(&mut app, &mut rx).await;
        assert!(app.selected_id().is_some());

        app.handle_key(key('l'));
        assert_eq!(app.status, "Please log in first");
        assert_eq!(app.subscriptions.mounted().count(), 0);
    }

    #[tokio::test]
    async fn only_the_window_around_the_selection_is_mounted() {
        let backend = demo::seeded_backend();
        let (mut app, mut rx) = app(&backend);
        settle(&mut app, &mut rx).await;
        // Two posts below the first one.
        assert_eq!(backend.active_channels(), 3 * 2 + 1);

        for _ in 0..5 {
            app.handle_key(key('j'));
        }
        settle(&mut app, &mut rx).await;
        assert_eq!(app.subscriptions.mounted().count(), 3);
    }
}
