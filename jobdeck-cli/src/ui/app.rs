use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use tokio::sync::mpsc;

use jobdeck_core::model::{JobId, JobRecord, JobState};
use jobdeck_core::session::SyncSession;
use jobdeck_core::transport::TransportEvent;
use jobdeck_core::view::ViewReceiver;

use super::theme::styles;

/// One visible line of the tree pane
struct Row {
    job_id: JobId,
    depth: usize,
    title: String,
    state: JobState,
    summary: Option<String>,
}

/// Interactive viewer for one job tree and its log tails
pub struct App {
    session: SyncSession,
    root: JobId,
    rows: Vec<Row>,
    list_state: ListState,
    dirty: bool,
}

impl App {
    pub fn new(session: SyncSession, root: impl Into<JobId>) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        Self {
            session,
            root: root.into(),
            rows: Vec::new(),
            list_state,
            dirty: true,
        }
    }

    /// Run the TUI until the user quits
    pub async fn run(
        mut self,
        mut inbound_rx: mpsc::UnboundedReceiver<TransportEvent>,
        mut view_rx: ViewReceiver,
    ) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        self.session.open_tree(&self.root);

        let result = self
            .event_loop(&mut terminal, &mut inbound_rx, &mut view_rx)
            .await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        inbound_rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
        view_rx: &mut ViewReceiver,
    ) -> io::Result<()> {
        let mut tick = tokio::time::interval(Duration::from_millis(120));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            if self.dirty {
                self.rebuild_rows();
                self.dirty = false;
            }
            terminal.draw(|f| self.draw(f))?;

            tokio::select! {
                _ = tick.tick() => {
                    while event::poll(Duration::from_millis(0))? {
                        if let CEvent::Key(key) = event::read()? {
                            if self.on_key(key) {
                                return Ok(());
                            }
                        }
                    }
                }

                maybe_event = inbound_rx.recv() => {
                    let Some(event) = maybe_event else { return Ok(()) };
                    self.session.handle_event(event);
                    self.dirty = true;
                }

                maybe_view = view_rx.recv() => {
                    if maybe_view.is_none() {
                        return Ok(());
                    }
                    // view events only signal freshness; state is read back
                    // from the session, so coalesce the burst
                    while view_rx.try_recv().is_ok() {}
                    self.dirty = true;
                }
            }
        }
    }

    /// Returns true when the app should quit
    fn on_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return true;
            }
            KeyCode::Up | KeyCode::Char('k') => self.select_prev(),
            KeyCode::Down | KeyCode::Char('j') => self.select_next(),
            KeyCode::Enter | KeyCode::Char('l') => {
                if let Some(job_id) = self.selected_job() {
                    self.session.open_log(&job_id);
                    self.dirty = true;
                }
            }
            KeyCode::Char(' ') => {
                if let Some(job_id) = self.selected_job() {
                    if self.session.log_active(&job_id) {
                        self.session.close_log(&job_id);
                    } else {
                        self.session.open_log(&job_id);
                    }
                    self.dirty = true;
                }
            }
            _ => {}
        }
        false
    }

    fn selected_job(&self) -> Option<JobId> {
        self.list_state
            .selected()
            .and_then(|i| self.rows.get(i))
            .map(|row| row.job_id.clone())
    }

    fn select_prev(&mut self) {
        let current = self.list_state.selected().unwrap_or(0);
        self.list_state.select(Some(current.saturating_sub(1)));
    }

    fn select_next(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0);
        self.list_state
            .select(Some((current + 1).min(self.rows.len() - 1)));
    }

    fn rebuild_rows(&mut self) {
        self.rows.clear();
        if let Some(tree) = self.session.tree(&self.root) {
            Self::flatten(&tree, 0, &mut self.rows);
        }
        if let Some(selected) = self.list_state.selected() {
            if selected >= self.rows.len() && !self.rows.is_empty() {
                self.list_state.select(Some(self.rows.len() - 1));
            }
        }
    }

    fn flatten(record: &JobRecord, depth: usize, rows: &mut Vec<Row>) {
        rows.push(Row {
            job_id: record.job_id.clone(),
            depth,
            title: record.title.clone(),
            state: record.state,
            summary: record.summary.clone(),
        });
        for child in &record.children {
            Self::flatten(child, depth + 1, rows);
        }
    }

    fn draw(&mut self, f: &mut Frame) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(f.area());

        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(outer[0]);

        self.draw_tree(f, panes[0]);
        self.draw_log(f, panes[1]);
        self.draw_footer(f, outer[1]);
    }

    fn draw_tree(&mut self, f: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.rows.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "waiting for snapshot...",
                styles::text_muted(),
            )))]
        } else {
            self.rows
                .iter()
                .map(|row| {
                    let mut spans = vec![
                        Span::raw("  ".repeat(row.depth)),
                        Span::styled(row.state.icon(), styles::state(row.state)),
                        Span::raw(" "),
                        Span::styled(row.title.clone(), styles::text()),
                        Span::raw(" "),
                        Span::styled(row.state.label(), styles::text_dim()),
                    ];
                    if let Some(summary) = &row.summary {
                        spans.push(Span::raw(" "));
                        spans.push(Span::styled(
                            format!("({})", summary),
                            styles::text_muted(),
                        ));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(styles::border_focused())
                    .title(Span::styled(format!(" {} ", self.root), styles::title())),
            )
            .highlight_style(styles::selection());

        f.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn draw_log(&self, f: &mut Frame, area: Rect) {
        let (title, body) = match self.selected_job() {
            Some(job_id) => {
                let tail_state = if self.session.log_active(&job_id) {
                    "live"
                } else if self.session.log_known(&job_id) {
                    "paused"
                } else {
                    "off"
                };
                let title = format!(
                    " log: {} [{}] @{} ",
                    job_id,
                    tail_state,
                    self.session.log_position(&job_id)
                );

                let lines = self.session.log_lines(&job_id);
                let body: Vec<Line> = if !self.session.log_known(&job_id) {
                    vec![Line::from(Span::styled(
                        "press enter to tail this job's log",
                        styles::text_muted(),
                    ))]
                } else if lines.is_empty() && self.session.log_confirmed_empty(&job_id) {
                    vec![Line::from(Span::styled("no entries", styles::text_dim()))]
                } else if lines.is_empty() {
                    vec![Line::from(Span::styled("loading...", styles::text_muted()))]
                } else {
                    let visible = area.height.saturating_sub(2) as usize;
                    lines
                        .iter()
                        .flat_map(|segment| segment.lines())
                        .collect::<Vec<_>>()
                        .into_iter()
                        .rev()
                        .take(visible)
                        .rev()
                        .map(|l| Line::from(Span::styled(l.to_string(), styles::text())))
                        .collect()
                };
                (title, body)
            }
            None => (
                " log ".to_string(),
                vec![Line::from(Span::styled("no job selected", styles::text_muted()))],
            ),
        };

        let paragraph = Paragraph::new(body)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(styles::border_subtle())
                    .title(Span::styled(title, styles::title())),
            );
        f.render_widget(paragraph, area);
    }

    fn draw_footer(&self, f: &mut Frame, area: Rect) {
        let mut spans = vec![
            Span::styled("q", styles::key_hint()),
            Span::styled(" quit  ", styles::text_dim()),
            Span::styled("↑/↓", styles::key_hint()),
            Span::styled(" select  ", styles::text_dim()),
            Span::styled("enter", styles::key_hint()),
            Span::styled(" tail  ", styles::text_dim()),
            Span::styled("space", styles::key_hint()),
            Span::styled(" pause/resume", styles::text_dim()),
        ];
        let dropped = self.session.frames_dropped();
        if dropped > 0 {
            spans.push(Span::styled(
                format!("  dropped: {}", dropped),
                styles::text_muted(),
            ));
        }
        f.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}
