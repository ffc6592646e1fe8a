use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::cursor::MoveTo;
use crossterm::style::Print;
use crossterm::{queue, ExecutableCommand};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use tracing::debug;
use unicode_width::UnicodeWidthStr;

use crate::composer::{SubmissionOutcome, MAX_POST_CHARS};
use crate::data::WallService;
use crate::error::WallError;
use crate::feed::{CommentOutcome, CommentsToggle};
use crate::format;
use crate::model::{Comment, Post};
use crate::page::{NoticeLevel, Page, SidebarItem, NAV_ITEMS, SHORTCUTS, TRENDING_TOPICS};
use crate::preview::{self, KittyImage};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_WARNING: Color = Color::Rgb(249, 226, 175);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SIDEBAR_WIDTH: u16 = 28;
const COMPOSER_HEIGHT: u16 = 7;
const MENU_WIDTH: u16 = 16;
const COMMENT_INDENT: &str = "    ";
const TRENDING_WIDTH: u16 = 26;
const TRENDING_MIN_WIDTH: u16 = 120;

pub struct Options {
    pub page: Page,
    pub service: Arc<dyn WallService>,
    pub status_message: String,
    pub backend_label: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Focus {
    Feed,
    Sidebar,
    Composer,
    ImagePath,
    Comment(String),
    ConfirmDelete(String),
    Overlay,
}

enum AsyncResponse {
    Posts {
        result: Result<Vec<Post>, WallError>,
    },
    Comments {
        post_id: String,
        result: Result<Vec<Comment>, WallError>,
    },
    Posted {
        outcome: SubmissionOutcome,
    },
    Commented {
        outcome: CommentOutcome,
    },
    Deleted {
        post_id: String,
        result: Result<(), WallError>,
    },
    Photo {
        url: String,
        result: Result<KittyImage>,
    },
}

/// The photo shown by the full-size overlay.
enum OverlayPhoto {
    Loading { url: String },
    Ready { url: String, image: KittyImage },
    Unavailable { url: String, reason: String },
}

impl OverlayPhoto {
    fn url(&self) -> &str {
        match self {
            OverlayPhoto::Loading { url }
            | OverlayPhoto::Ready { url, .. }
            | OverlayPhoto::Unavailable { url, .. } => url,
        }
    }
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Model {
    page: Page,
    service: Arc<dyn WallService>,
    focus: Focus,
    selected_post: usize,
    selected_nav: usize,
    image_path_input: String,
    status_message: String,
    backend_label: String,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    posts_loading: bool,
    comments_loading: HashSet<String>,
    deleting: HashSet<String>,
    spinner: Spinner,
    menu_area: Cell<Option<Rect>>,
    overlay_image_area: Cell<Option<Rect>>,
    photo_rows: RefCell<Vec<(Rect, String)>>,
    photo: Option<OverlayPhoto>,
    pending_kitty_deletes: Vec<String>,
    needs_redraw: bool,
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

fn rect_contains(rect: Rect, x: u16, y: u16) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn avatar_style(name: Option<&str>) -> Style {
    let color = format::hex_rgb(format::avatar_color(name))
        .map(|(r, g, b)| Color::Rgb(r, g, b))
        .unwrap_or(COLOR_ACCENT);
    Style::default()
        .fg(Color::White)
        .bg(color)
        .add_modifier(Modifier::BOLD)
}

fn avatar_span(name: Option<&str>) -> Span<'static> {
    Span::styled(format!(" {} ", format::initials(name)), avatar_style(name))
}

fn notice_color(level: NoticeLevel) -> Color {
    match level {
        NoticeLevel::Info => COLOR_ACCENT,
        NoticeLevel::Success => COLOR_SUCCESS,
        NoticeLevel::Warning => COLOR_WARNING,
        NoticeLevel::Error => COLOR_ERROR,
    }
}

fn sidebar_entries() -> impl Iterator<Item = &'static SidebarItem> {
    NAV_ITEMS.iter().chain(SHORTCUTS.iter())
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            page: options.page,
            service: options.service,
            focus: Focus::Feed,
            selected_post: 0,
            selected_nav: 0,
            image_path_input: String::new(),
            status_message: options.status_message,
            backend_label: options.backend_label,
            response_tx,
            response_rx,
            posts_loading: false,
            comments_loading: HashSet::new(),
            deleting: HashSet::new(),
            spinner: Spinner::new(),
            menu_area: Cell::new(None),
            overlay_image_area: Cell::new(None),
            photo_rows: RefCell::new(Vec::new()),
            photo: None,
            pending_kitty_deletes: Vec::new(),
            needs_redraw: true,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        self.close_overlay();
        let _ = self.flush_photo(terminal.backend_mut());
        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            self.sync_feed();
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.flush_photo(terminal.backend_mut())?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key) {
                            break;
                        }
                        self.mark_dirty();
                    }
                    Event::Mouse(mouse) => {
                        self.handle_mouse(mouse);
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.posts_loading
            || matches!(self.photo, Some(OverlayPhoto::Loading { .. }))
            || self.page.composer().is_in_flight()
            || !self.comments_loading.is_empty()
            || !self.deleting.is_empty()
    }

    fn selected_post_id(&self) -> Option<String> {
        self.page
            .feed()
            .posts()
            .get(self.selected_post)
            .map(|post| post.id.clone())
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce(&dyn WallService) -> AsyncResponse + Send + 'static,
    {
        let service = self.service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let _ = tx.send(job(service.as_ref()));
        });
    }

    fn sync_feed(&mut self) {
        let key = self.page.refresh_key();
        if self.posts_loading || !self.page.feed().needs_refresh(key) {
            return;
        }
        self.page.feed_mut().mark_refresh(key);
        self.posts_loading = true;
        debug!(refresh_key = key, "fetching posts");
        self.spawn(|service| AsyncResponse::Posts {
            result: service.list_posts(),
        });
        self.mark_dirty();
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Posts { result } => {
                self.posts_loading = false;
                self.page.apply_posts(result);
                let count = self.page.feed().posts().len();
                if self.selected_post >= count {
                    self.selected_post = count.saturating_sub(1);
                }
            }
            AsyncResponse::Comments { post_id, result } => {
                self.comments_loading.remove(&post_id);
                self.page.apply_comments(&post_id, result);
            }
            AsyncResponse::Posted { outcome } => {
                if self.page.finish_post(outcome) {
                    self.image_path_input.clear();
                    self.focus = Focus::Feed;
                    self.selected_post = 0;
                }
            }
            AsyncResponse::Commented { outcome } => {
                self.page.finish_comment(outcome);
            }
            AsyncResponse::Deleted { post_id, result } => {
                self.deleting.remove(&post_id);
                if self.page.apply_delete(&post_id, result) {
                    let count = self.page.feed().posts().len();
                    if self.selected_post >= count {
                        self.selected_post = count.saturating_sub(1);
                    }
                }
            }
            AsyncResponse::Photo { url, result } => {
                // The overlay may have been closed or moved on meanwhile.
                if !matches!(&self.photo, Some(OverlayPhoto::Loading { url: pending }) if *pending == url)
                {
                    return;
                }
                self.photo = Some(match result {
                    Ok(image) => OverlayPhoto::Ready { url, image },
                    Err(err) => {
                        debug!(%url, error = %err, "photo preview unavailable");
                        OverlayPhoto::Unavailable {
                            url,
                            reason: format!("Could not load photo: {err}"),
                        }
                    }
                });
            }
        }
    }

    // Actions

    fn toggle_comments(&mut self, post_id: &str) {
        if let CommentsToggle::Expanded { needs_fetch: true } =
            self.page.feed_mut().toggle_comments(post_id)
        {
            self.fetch_comments(post_id);
        }
    }

    fn fetch_comments(&mut self, post_id: &str) {
        if !self.comments_loading.insert(post_id.to_string()) {
            return;
        }
        let post_id = post_id.to_string();
        self.spawn(move |service| AsyncResponse::Comments {
            result: service.list_comments(&post_id),
            post_id,
        });
    }

    fn start_reply(&mut self, post_id: String) {
        if !self.page.feed().is_expanded(&post_id) {
            self.toggle_comments(&post_id);
        }
        self.focus = Focus::Comment(post_id);
    }

    fn submit_comment(&mut self, post_id: &str) {
        if let Some(submission) = self.page.begin_comment(post_id) {
            self.spawn(move |service| AsyncResponse::Commented {
                outcome: submission.execute(service),
            });
        }
    }

    fn submit_post(&mut self) {
        if let Some(submission) = self.page.begin_post() {
            self.spawn(move |service| AsyncResponse::Posted {
                outcome: submission.execute(service),
            });
        }
    }

    fn attach_image_from_input(&mut self) {
        let raw = self.image_path_input.trim();
        if raw.is_empty() {
            self.focus = Focus::Composer;
            return;
        }
        let path = expand_home(raw);
        match self.page.composer_mut().attach_image_file(&path) {
            Ok(()) => {
                self.status_message = format!("Attached {}", path.display());
                self.focus = Focus::Composer;
            }
            Err(err) => {
                self.page
                    .notify(NoticeLevel::Error, "Error attaching image", Some(err.to_string()));
            }
        }
    }

    fn request_delete(&mut self, post_id: String) {
        if self.page.feed().can_delete(&post_id) {
            self.focus = Focus::ConfirmDelete(post_id);
        }
    }

    fn confirm_delete(&mut self, post_id: &str) {
        self.focus = Focus::Feed;
        self.page.feed_mut().close_menu();
        match self.page.feed().begin_delete(post_id, |_| true) {
            Ok(Some(id)) => {
                if !self.deleting.insert(id.clone()) {
                    return;
                }
                self.spawn(move |service| AsyncResponse::Deleted {
                    result: service.delete_post(&id),
                    post_id: id,
                });
            }
            Ok(None) => {}
            Err(err) => self.page.notify(
                NoticeLevel::Warning,
                "Error deleting post",
                Some(err.to_string()),
            ),
        }
    }

    fn open_selected_image(&mut self) {
        let Some(id) = self.selected_post_id() else {
            return;
        };
        if !self.open_photo(&id) {
            self.status_message = "This post has no photo.".to_string();
        }
    }

    fn open_photo(&mut self, post_id: &str) -> bool {
        if !self.page.feed_mut().open_image(post_id) {
            return false;
        }
        let Some(url) = self.page.feed().image_overlay().map(str::to_string) else {
            return false;
        };
        self.focus = Focus::Overlay;
        self.photo = Some(if !preview::is_kitty_terminal() {
            OverlayPhoto::Unavailable {
                url,
                reason: format!(
                    "Inline photos need a terminal with the Kitty graphics protocol (set {}=1 to force).",
                    preview::FORCE_KITTY_ENV
                ),
            }
        } else if !preview::is_fetchable(&url) {
            OverlayPhoto::Unavailable {
                url,
                reason: "This photo is only stored in memory.".to_string(),
            }
        } else {
            let (cols, rows) = overlay_photo_budget();
            let user_agent = format!("wall-tui/{}", crate::VERSION);
            let fetch_url = url.clone();
            self.spawn(move |_| AsyncResponse::Photo {
                result: preview::load(&fetch_url, &user_agent, cols, rows),
                url: fetch_url,
            });
            OverlayPhoto::Loading { url }
        });
        true
    }

    fn close_overlay(&mut self) {
        self.page.feed_mut().close_image();
        self.overlay_image_area.set(None);
        if let Some(OverlayPhoto::Ready { image, .. }) = self.photo.take() {
            self.pending_kitty_deletes.push(image.delete_sequence());
        }
        if self.focus == Focus::Overlay {
            self.focus = Focus::Feed;
        }
    }

    /// Sends queued deletes, then places the overlay photo over the cells
    /// `draw_overlay` left blank for it.
    fn flush_photo(&mut self, backend: &mut CrosstermBackend<Stdout>) -> io::Result<()> {
        for sequence in self.pending_kitty_deletes.drain(..) {
            queue!(backend, Print(sequence))?;
        }
        if self.focus == Focus::Overlay {
            if let (Some(OverlayPhoto::Ready { image, .. }), Some(area)) =
                (self.photo.as_mut(), self.overlay_image_area.get())
            {
                image.ensure_transmitted(backend)?;
                queue!(backend, MoveTo(area.x, area.y), Print(image.placement_sequence()))?;
            }
        }
        io::Write::flush(backend)
    }

    // Input

    /// Returns true when the application should quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }
        match self.focus.clone() {
            Focus::Feed => return self.handle_feed_key(key),
            Focus::Sidebar => self.handle_sidebar_key(key),
            Focus::Composer => self.handle_composer_key(key),
            Focus::ImagePath => self.handle_image_path_key(key),
            Focus::Comment(post_id) => self.handle_comment_key(&post_id, key),
            Focus::ConfirmDelete(post_id) => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.confirm_delete(&post_id),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.focus = Focus::Feed;
                }
                _ => {}
            },
            Focus::Overlay => match key.code {
                KeyCode::Esc | KeyCode::Char('x') | KeyCode::Char('q') | KeyCode::Char('v') => {
                    self.close_overlay();
                }
                KeyCode::Char('o') => {
                    if let Some(url) = self.page.feed().image_overlay().map(str::to_string) {
                        if let Err(err) = webbrowser::open(&url) {
                            self.status_message = format!("Could not open browser: {err}");
                        }
                    }
                }
                _ => {}
            },
        }
        false
    }

    fn handle_feed_key(&mut self, key: KeyEvent) -> bool {
        let count = self.page.feed().posts().len();
        if self.page.feed().open_menu().is_some() {
            match key.code {
                KeyCode::Char('d') | KeyCode::Enter => {
                    if let Some(id) = self.page.feed().open_menu().map(str::to_string) {
                        self.request_delete(id);
                    }
                    return false;
                }
                KeyCode::Esc | KeyCode::Char('m') => {
                    self.page.feed_mut().close_menu();
                    return false;
                }
                _ => self.page.feed_mut().close_menu(),
            }
        }
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected_post + 1 < count {
                    self.selected_post += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_post = self.selected_post.saturating_sub(1);
            }
            KeyCode::Char('g') | KeyCode::Home => self.selected_post = 0,
            KeyCode::Char('G') | KeyCode::End => self.selected_post = count.saturating_sub(1),
            KeyCode::Char('l') => {
                if let Some(id) = self.selected_post_id() {
                    self.page.feed_mut().toggle_like(&id);
                }
            }
            KeyCode::Char('c') | KeyCode::Enter => {
                if let Some(id) = self.selected_post_id() {
                    self.toggle_comments(&id);
                }
            }
            KeyCode::Char('r') => {
                if let Some(id) = self.selected_post_id() {
                    self.start_reply(id);
                }
            }
            KeyCode::Char('m') => {
                if let Some(id) = self.selected_post_id() {
                    if !self.page.feed_mut().toggle_menu(&id) && !self.page.feed().can_delete(&id)
                    {
                        self.status_message = "Only your own posts have actions.".to_string();
                    }
                }
            }
            KeyCode::Char('v') => self.open_selected_image(),
            KeyCode::Char('n') | KeyCode::Char('i') => self.focus = Focus::Composer,
            KeyCode::Char('s') | KeyCode::Tab => self.focus = Focus::Sidebar,
            KeyCode::Char('R') | KeyCode::Char('p') => self.page.request_refresh(),
            KeyCode::Esc => self.page.dismiss_notices(),
            _ => {}
        }
        false
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        let count = sidebar_entries().count();
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.selected_nav = (self.selected_nav + 1).min(count - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_nav = self.selected_nav.saturating_sub(1);
            }
            KeyCode::Enter => {
                if let Some(item) = sidebar_entries().nth(self.selected_nav) {
                    self.page.select_sidebar(item.label);
                }
            }
            KeyCode::Esc | KeyCode::Tab | KeyCode::Char('s') | KeyCode::Char('h') => {
                self.focus = Focus::Feed;
            }
            _ => {}
        }
    }

    fn handle_composer_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('s') if ctrl => self.submit_post(),
            KeyCode::Char('x') if ctrl => {
                if self.page.composer_mut().clear_image().is_some() {
                    self.status_message = "Photo removed.".to_string();
                }
            }
            KeyCode::Esc => self.focus = Focus::Feed,
            KeyCode::Tab => self.focus = Focus::ImagePath,
            _ if self.page.composer().is_in_flight() => {}
            KeyCode::Enter => self.push_composer_char('\n'),
            KeyCode::Backspace => {
                self.page.composer_mut().pop_char();
            }
            KeyCode::Char(ch) if !ctrl => self.push_composer_char(ch),
            _ => {}
        }
    }

    fn push_composer_char(&mut self, ch: char) {
        if !self.page.composer_mut().push_char(ch) {
            self.status_message = format!("Posts are limited to {MAX_POST_CHARS} characters.");
        }
    }

    fn handle_image_path_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => self.attach_image_from_input(),
            KeyCode::Esc | KeyCode::Tab => self.focus = Focus::Composer,
            KeyCode::Backspace => {
                self.image_path_input.pop();
            }
            KeyCode::Char(ch) => self.image_path_input.push(ch),
            _ => {}
        }
    }

    fn handle_comment_key(&mut self, post_id: &str, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => self.submit_comment(post_id),
            KeyCode::Esc => self.focus = Focus::Feed,
            _ if self.page.feed().is_comment_in_flight(post_id) => {}
            KeyCode::Backspace => {
                self.page.feed_mut().draft_mut(post_id).pop();
            }
            KeyCode::Char(ch) => self.page.feed_mut().draft_mut(post_id).push(ch),
            _ => {}
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent) {
        let MouseEventKind::Down(MouseButton::Left) = event.kind else {
            match event.kind {
                MouseEventKind::ScrollDown if self.focus == Focus::Feed => {
                    let count = self.page.feed().posts().len();
                    if self.selected_post + 1 < count {
                        self.selected_post += 1;
                        self.mark_dirty();
                    }
                }
                MouseEventKind::ScrollUp if self.focus == Focus::Feed => {
                    self.selected_post = self.selected_post.saturating_sub(1);
                    self.mark_dirty();
                }
                _ => {}
            }
            return;
        };
        let (x, y) = (event.column, event.row);

        if self.focus == Focus::Overlay {
            let inside = self
                .overlay_image_area
                .get()
                .is_some_and(|area| rect_contains(area, x, y));
            self.page.feed_mut().overlay_pointer_down(inside);
            if self.page.feed().image_overlay().is_none() {
                self.close_overlay();
            }
            self.mark_dirty();
            return;
        }

        if let Some(menu_id) = self.page.feed().open_menu().map(str::to_string) {
            let inside = self
                .menu_area
                .get()
                .is_some_and(|area| rect_contains(area, x, y));
            self.page.feed_mut().pointer_down(inside);
            if inside {
                self.request_delete(menu_id);
            }
            self.mark_dirty();
            return;
        }

        if matches!(self.focus, Focus::ConfirmDelete(_)) {
            return;
        }
        let clicked = self
            .photo_rows
            .borrow()
            .iter()
            .find(|(row, _)| rect_contains(*row, x, y))
            .map(|(_, id)| id.clone());
        if let Some(id) = clicked {
            if let Some(idx) = self.page.feed().posts().iter().position(|p| p.id == id) {
                self.selected_post = idx;
            }
            self.open_photo(&id);
            self.mark_dirty();
        }
    }

    // Drawing

    fn draw(&self, frame: &mut Frame) {
        let area = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(5),
                Constraint::Length(1),
            ])
            .split(area);
        self.draw_header(frame, rows[0]);

        let trending = shows_trending(area.width);
        let mut constraints = vec![Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)];
        if trending {
            constraints.push(Constraint::Length(TRENDING_WIDTH));
        }
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(rows[1]);
        self.draw_sidebar(frame, columns[0]);
        if trending {
            self.draw_trending(frame, columns[2]);
        }

        let main = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(COMPOSER_HEIGHT), Constraint::Min(3)])
            .split(columns[1]);
        self.draw_composer(frame, main[0]);
        self.draw_feed(frame, main[1]);
        self.draw_status(frame, rows[2]);

        match &self.focus {
            Focus::ConfirmDelete(_) => self.draw_confirm(frame, area),
            Focus::Overlay => self.draw_overlay(frame, area),
            _ => self.overlay_image_area.set(None),
        }
    }

    fn draw_header(&self, frame: &mut Frame, area: Rect) {
        let identity = self.page.identity();
        let line = Line::from(vec![
            Span::styled(
                " TheWall ",
                Style::default()
                    .fg(COLOR_BG)
                    .bg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            avatar_span(Some(identity.display_name())),
            Span::styled(
                format!(" {}", identity.display_name()),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            ),
            Span::styled(
                format!("  ·  {}", self.backend_label),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_sidebar(&self, frame: &mut Frame, area: Rect) {
        let focused = self.focus == Focus::Sidebar;
        let items: Vec<ListItem> = sidebar_entries()
            .enumerate()
            .map(|(idx, item)| {
                let mut style = Style::default().fg(COLOR_TEXT_PRIMARY);
                if item.active {
                    style = style.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD);
                }
                let mut lines = Vec::new();
                if idx == NAV_ITEMS.len() {
                    lines.push(Line::from(Span::styled(
                        "Your Shortcuts",
                        Style::default().fg(COLOR_TEXT_SECONDARY),
                    )));
                }
                lines.push(Line::from(Span::styled(
                    format!("{} {}", item.icon, item.label),
                    style,
                )));
                ListItem::new(lines)
            })
            .collect();
        let mut state = ListState::default();
        if focused {
            state.select(Some(self.selected_nav));
        }
        let list = List::new(items)
            .block(self.panel("Menu", focused))
            .highlight_style(Style::default().bg(COLOR_PANEL_SELECTED_BG));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_trending(&self, frame: &mut Frame, area: Rect) {
        let lines: Vec<Line> = TRENDING_TOPICS
            .iter()
            .map(|topic| {
                Line::from(Span::styled(
                    topic.to_string(),
                    Style::default().fg(COLOR_TEXT_SECONDARY),
                ))
            })
            .collect();
        frame.render_widget(
            Paragraph::new(lines).block(self.panel("Trending Topics", false)),
            area,
        );
    }

    fn panel<'a>(&self, title: impl Into<Line<'a>>, focused: bool) -> Block<'a> {
        let border = if focused {
            COLOR_BORDER_FOCUSED
        } else {
            COLOR_BORDER_IDLE
        };
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1))
    }

    fn draw_composer(&self, frame: &mut Frame, area: Rect) {
        let composer = self.page.composer();
        let identity = self.page.identity();
        let focused = matches!(self.focus, Focus::Composer | Focus::ImagePath);
        let title = Line::from(vec![
            avatar_span(Some(identity.display_name())),
            Span::raw(" "),
            Span::styled(
                format!("What's on your mind, {}?", identity.first_name()),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        ]);
        let block = self.panel(title, focused);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(inner);

        let mut text = composer.text().to_string();
        if self.focus == Focus::Composer && !composer.is_in_flight() {
            text.push('▏');
        }
        let body = if composer.text().is_empty() && self.focus != Focus::Composer {
            Paragraph::new(Span::styled(
                "Press n to write a post, Tab to add a photo.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))
        } else {
            Paragraph::new(text)
                .style(Style::default().fg(COLOR_TEXT_PRIMARY))
                .wrap(Wrap { trim: false })
        };
        frame.render_widget(body, parts[0]);

        let mut footer = Vec::new();
        if self.focus == Focus::ImagePath {
            footer.push(Span::styled(
                format!("Photo path: {}▏", self.image_path_input),
                Style::default().fg(COLOR_ACCENT),
            ));
        } else if let Some(image) = composer.image() {
            footer.push(Span::styled(
                format!("📎 {} ({} KB)  ", image.file_name, image.size_bytes() / 1024),
                Style::default().fg(COLOR_ACCENT),
            ));
        }
        let counter = composer.counter_label();
        let action = if composer.is_in_flight() {
            format!("{} Posting...", self.spinner.frame())
        } else if composer.can_submit() {
            "Ctrl+S Post".to_string()
        } else {
            "Post".to_string()
        };
        let used: usize = footer.iter().map(|span| span.content.width()).sum();
        let right = format!("{counter}  [{action}]");
        let pad = (parts[1].width as usize).saturating_sub(used + right.width());
        footer.push(Span::raw(" ".repeat(pad)));
        let action_style = if composer.can_submit() || composer.is_in_flight() {
            Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        footer.push(Span::styled(right, action_style));
        frame.render_widget(Paragraph::new(Line::from(footer)), parts[1]);
    }

    fn draw_feed(&self, frame: &mut Frame, area: Rect) {
        let feed = self.page.feed();
        let title = if self.posts_loading {
            format!("Wall {}", self.spinner.frame())
        } else {
            format!("Wall ({})", feed.posts().len())
        };
        let block = self.panel(title, self.focus == Focus::Feed);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.menu_area.set(None);
        self.photo_rows.borrow_mut().clear();

        if feed.posts().is_empty() {
            let message = if feed.is_loaded() {
                "No posts yet. Be the first to write something!"
            } else {
                "Loading posts..."
            };
            frame.render_widget(
                Paragraph::new(message)
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(COLOR_TEXT_SECONDARY)),
                inner,
            );
            return;
        }

        let width = inner.width.saturating_sub(1).max(10) as usize;
        let mut lines: Vec<Line> = Vec::new();
        let mut selected_range = (0usize, 0usize);
        let mut photo_lines: Vec<(usize, String)> = Vec::new();
        for (idx, post) in feed.posts().iter().enumerate() {
            let start = lines.len();
            if let Some(line) = self.post_lines(post, idx == self.selected_post, width, &mut lines) {
                photo_lines.push((line, post.id.clone()));
            }
            if idx == self.selected_post {
                selected_range = (start, lines.len());
            }
        }

        let height = inner.height as usize;
        let (sel_start, sel_end) = selected_range;
        let offset = if sel_end <= height {
            0
        } else if sel_end - sel_start > height {
            sel_start
        } else {
            sel_end - height
        };
        let paragraph = Paragraph::new(Text::from(lines)).scroll((offset as u16, 0));
        frame.render_widget(paragraph, inner);
        *self.photo_rows.borrow_mut() = visible_photo_rows(inner, offset, &photo_lines);

        if let Some(open) = feed.open_menu() {
            if self.selected_post_id().as_deref() == Some(open) {
                let row = sel_start.saturating_sub(offset) as u16;
                if (row as usize) < height {
                    let menu = Rect {
                        x: inner.x + inner.width.saturating_sub(MENU_WIDTH),
                        y: inner.y + row + 1,
                        width: MENU_WIDTH.min(inner.width),
                        height: 3,
                    }
                    .intersection(inner);
                    frame.render_widget(Clear, menu);
                    frame.render_widget(
                        Paragraph::new(Span::styled(
                            "Delete (d)",
                            Style::default().fg(COLOR_ERROR),
                        ))
                        .block(
                            Block::default()
                                .borders(Borders::ALL)
                                .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
                                .style(Style::default().bg(COLOR_PANEL_BG)),
                        ),
                        menu,
                    );
                    self.menu_area.set(Some(menu));
                }
            }
        }
    }

    /// Appends the rows for `post` and returns the index of its photo line.
    fn post_lines(
        &self,
        post: &Post,
        selected: bool,
        width: usize,
        lines: &mut Vec<Line<'static>>,
    ) -> Option<usize> {
        let feed = self.page.feed();
        let marker = if selected { "▌" } else { " " };
        let marker_style = Style::default().fg(COLOR_ACCENT);
        let mut header = vec![
            Span::styled(marker, marker_style),
            avatar_span(post.user_name.as_deref()),
            Span::styled(
                format!(" {}", post.author()),
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  {}", format::format_timestamp(&post.created_at)),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        ];
        if feed.can_delete(&post.id) {
            header.push(Span::styled("  ⋯", Style::default().fg(COLOR_TEXT_SECONDARY)));
        }
        if self.deleting.contains(&post.id) {
            header.push(Span::styled(
                format!("  {} deleting", self.spinner.frame()),
                Style::default().fg(COLOR_WARNING),
            ));
        }
        if selected {
            for span in &mut header {
                span.style = span.style.bg(COLOR_PANEL_SELECTED_BG);
            }
        }
        lines.push(Line::from(header));

        let mut photo_line = None;
        if let Some(url) = &post.photo_url {
            photo_line = Some(lines.len());
            lines.push(Line::from(vec![
                Span::styled(marker, marker_style),
                Span::styled(
                    format!(" 🖼  {url}  (v or click to view)"),
                    Style::default().fg(COLOR_ACCENT),
                ),
            ]));
        }

        for chunk in post.content.lines() {
            for wrapped in wrap(chunk, width.saturating_sub(2).max(1)) {
                lines.push(Line::from(vec![
                    Span::styled(marker, marker_style),
                    Span::styled(
                        format!(" {wrapped}"),
                        Style::default().fg(COLOR_TEXT_PRIMARY),
                    ),
                ]));
            }
        }

        let like_style = if post.is_liked {
            Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        lines.push(Line::from(vec![
            Span::styled(marker, marker_style),
            Span::styled(
                format!(" {} {} likes", if post.is_liked { "♥" } else { "♡" }, post.likes_count),
                like_style,
            ),
            Span::styled(
                format!("  ·  {} comments", post.comments_count),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        ]));

        if feed.is_expanded(&post.id) {
            self.comment_lines(post, width, lines);
        }
        lines.push(Line::from(""));
        photo_line
    }

    fn comment_lines(&self, post: &Post, width: usize, lines: &mut Vec<Line<'static>>) {
        let feed = self.page.feed();
        let identity = self.page.identity();
        let secondary = Style::default().fg(COLOR_TEXT_SECONDARY);

        let drafting = self.focus == Focus::Comment(post.id.clone());
        let mut draft = feed.draft(&post.id).to_string();
        if drafting && !feed.is_comment_in_flight(&post.id) {
            draft.push('▏');
        }
        let prompt = if draft.is_empty() {
            Span::styled("Write a comment... (r)", secondary)
        } else {
            Span::styled(draft, Style::default().fg(COLOR_TEXT_PRIMARY))
        };
        let mut draft_line = vec![
            Span::raw(COMMENT_INDENT),
            avatar_span(Some(identity.display_name())),
            Span::raw(" "),
            prompt,
        ];
        if feed.is_comment_in_flight(&post.id) {
            draft_line.push(Span::styled(
                format!("  {} sending", self.spinner.frame()),
                Style::default().fg(COLOR_WARNING),
            ));
        }
        lines.push(Line::from(draft_line));

        if self.comments_loading.contains(&post.id) && feed.comments(&post.id).is_none() {
            lines.push(Line::from(vec![
                Span::raw(COMMENT_INDENT),
                Span::styled(format!("{} Loading comments...", self.spinner.frame()), secondary),
            ]));
            return;
        }

        let Some(comments) = feed.comments(&post.id) else {
            return;
        };
        let body_width = width.saturating_sub(COMMENT_INDENT.len() + 6).max(1);
        for comment in comments {
            lines.push(Line::from(vec![
                Span::raw(COMMENT_INDENT),
                avatar_span(comment.user_name.as_deref()),
                Span::styled(
                    format!(" {}", comment.author()),
                    Style::default()
                        .fg(COLOR_TEXT_PRIMARY)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("  {}", format::format_timestamp(&comment.created_at)),
                    secondary,
                ),
            ]));
            for wrapped in wrap(&comment.content, body_width) {
                lines.push(Line::from(vec![
                    Span::raw(format!("{COMMENT_INDENT}     ")),
                    Span::styled(wrapped.to_string(), Style::default().fg(COLOR_TEXT_PRIMARY)),
                ]));
            }
        }
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let (text, color) = match self.page.latest_notice() {
            Some(notice) => (notice.message(), notice_color(notice.level)),
            None => (self.status_message.clone(), COLOR_TEXT_SECONDARY),
        };
        let hints = match self.focus {
            Focus::Feed => "j/k move · l like · c comments · r reply · m menu · v photo · n post · q quit",
            Focus::Sidebar => "j/k move · Enter open · Esc back",
            Focus::Composer => "Ctrl+S post · Tab photo · Ctrl+X drop photo · Esc back",
            Focus::ImagePath => "Enter attach · Esc back",
            Focus::Comment(_) => "Enter send · Esc back",
            Focus::ConfirmDelete(_) => "y delete · n keep",
            Focus::Overlay => "o open in browser · x close",
        };
        let line = Line::from(vec![
            Span::styled(format!(" {text}"), Style::default().fg(color)),
            Span::styled(format!("   {hints}"), Style::default().fg(COLOR_BORDER_IDLE)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_confirm(&self, frame: &mut Frame, area: Rect) {
        let popup = centered_rect(50, 20, area);
        frame.render_widget(Clear, popup);
        let text = Text::from(vec![
            Line::from("Are you sure you want to delete this post?"),
            Line::from(""),
            Line::from(Span::styled(
                "y: delete   n: cancel",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
        ]);
        frame.render_widget(
            Paragraph::new(text)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true })
                .block(self.panel("Delete post", true)),
            popup,
        );
    }

    fn draw_overlay(&self, frame: &mut Frame, area: Rect) {
        let Some(photo) = &self.photo else {
            self.overlay_image_area.set(None);
            return;
        };
        let dim = Block::default().style(Style::default().bg(Color::Black));
        frame.render_widget(dim, area);
        let popup = centered_rect(80, 60, area);
        frame.render_widget(Clear, popup);
        let block = self.panel("Photo  [x]", true);
        let inner = block.inner(popup);
        frame.render_widget(block, popup);

        let url_line = Line::from(Span::styled(
            photo.url().to_string(),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ));
        if let OverlayPhoto::Ready { image, .. } = photo {
            let image_area = photo_box(inner, image.cols, image.rows);
            let caption = Rect {
                y: image_area.y + image_area.height,
                height: 1,
                ..inner
            }
            .intersection(inner);
            frame.render_widget(
                Paragraph::new(url_line).alignment(Alignment::Center),
                caption,
            );
            self.overlay_image_area.set(Some(image_area));
            return;
        }

        let mut lines = vec![Line::from("")];
        match photo {
            OverlayPhoto::Loading { .. } => lines.push(Line::from(Span::styled(
                format!("{} Loading photo...", self.spinner.frame()),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            ))),
            OverlayPhoto::Unavailable { reason, .. } => lines.push(Line::from(Span::styled(
                reason.clone(),
                Style::default().fg(COLOR_WARNING),
            ))),
            OverlayPhoto::Ready { .. } => {}
        }
        lines.push(Line::from(""));
        lines.push(url_line);
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Press o to open in your browser",
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));
        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            inner,
        );
        self.overlay_image_area.set(Some(inner));
    }
}

fn shows_trending(width: u16) -> bool {
    width >= TRENDING_MIN_WIDTH
}

/// Cell budget for an overlay photo, leaving room for the border and caption.
fn overlay_photo_budget() -> (u16, u16) {
    match crossterm::terminal::size() {
        Ok((width, height)) => {
            let popup = centered_rect(80, 60, Rect::new(0, 0, width, height));
            (
                popup.width.saturating_sub(4).max(1),
                popup.height.saturating_sub(4).max(1),
            )
        }
        Err(_) => (60, 16),
    }
}

/// Centers a `cols`x`rows` box in `inner`, one row below its top edge.
fn photo_box(inner: Rect, cols: u16, rows: u16) -> Rect {
    let width = cols.min(inner.width);
    let height = rows.min(inner.height.saturating_sub(2));
    Rect {
        x: inner.x + (inner.width - width) / 2,
        y: inner.y + u16::from(inner.height > height + 1),
        width,
        height,
    }
}

/// Screen rows of the photo lines that survive scrolling by `offset`.
fn visible_photo_rows(
    inner: Rect,
    offset: usize,
    photo_lines: &[(usize, String)],
) -> Vec<(Rect, String)> {
    photo_lines
        .iter()
        .filter(|(line, _)| *line >= offset && *line - offset < inner.height as usize)
        .map(|(line, post_id)| {
            let row = Rect {
                y: inner.y + (line - offset) as u16,
                height: 1,
                ..inner
            };
            (row, post_id.clone())
        })
        .collect()
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
