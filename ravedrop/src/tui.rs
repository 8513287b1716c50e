// src/tui.rs

use std::io::{stdout, Stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    cursor,
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEventKind,
    },
    execute, queue,
    terminal::{self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use stem_modules::job::{JobId, JobRequest, StemFile, TrackMeta};
use stem_modules::observers::{CompletedRecord, QueueSnapshot};
use stem_modules::service::StemService;
use stem_modules::session::SessionState;
use stem_modules::waveform::StemDeck;
use stem_modules::StemClient;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::stems::{save_stem, StemLoader};

const FRAME: Duration = Duration::from_millis(50);
const ROWS_PER_STEM: usize = 3;
const QUEUE_LINES: usize = 5;
const ARCHIVE_LINES: usize = 6;
const HELP: &str = "[tab] focus  [↑/↓] select  [enter] preview archived job  [space] play/pause  [←/→] seek 5s  click: seek  [s] save  [x] drop selected queued  [r] reset  [q] quit";

enum Action {
    Continue,
    Quit,
}

/// Which panel ↑/↓ and enter act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Deck,
    Queue,
    Archive,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Deck => Focus::Queue,
            Focus::Queue => Focus::Archive,
            Focus::Archive => Focus::Deck,
        }
    }
}

struct Screen<S: StemService> {
    client: Arc<StemClient<S>>,
    deck: StemDeck,
    loader: StemLoader<S>,
    out_dir: PathBuf,
    notice: Option<String>,
    notices_tx: UnboundedSender<String>,
    notices_rx: UnboundedReceiver<String>,
    focus: Focus,
    queue_selected: usize,
    archive_selected: usize,
    /// What the deck is showing.
    previewing: Option<String>,
    /// Row where the deck starts, as of the last draw.
    deck_top: u16,
}

/// Submit `request` and run the interactive session screen until `q`.
pub async fn run<S: StemService>(
    client: StemClient<S>,
    request: JobRequest,
    out_dir: PathBuf,
) -> anyhow::Result<()> {
    let client = Arc::new(client);
    let _observers = client.start_observers();

    let submitter = Arc::clone(&client);
    tokio::spawn(async move {
        if let Err(e) = submitter.submit(request).await {
            log::warn!("Submission did not start: {e}");
        }
    });

    let (notices_tx, notices_rx) = unbounded_channel();
    let buckets = client.config().peak_buckets;
    let mut screen = Screen {
        loader: StemLoader::new(Arc::clone(client.service()), buckets),
        client,
        deck: StemDeck::new(buckets, ROWS_PER_STEM),
        out_dir,
        notice: None,
        notices_tx,
        notices_rx,
        focus: Focus::Deck,
        queue_selected: 0,
        archive_selected: 0,
        previewing: None,
        deck_top: 0,
    };

    let mut out = stdout();
    enable_raw_mode()?;
    execute!(out, EnterAlternateScreen, EnableMouseCapture, cursor::Hide)?;

    let result = screen.event_loop(&mut out).await;

    screen.deck.registry().pause_all();
    execute!(out, DisableMouseCapture, LeaveAlternateScreen, cursor::Show)?;
    disable_raw_mode()?;
    result
}

impl<S: StemService> Screen<S> {
    async fn event_loop(&mut self, out: &mut Stdout) -> anyhow::Result<()> {
        loop {
            // 1. Input (never blocks; the runtime needs the thread back)
            while event::poll(Duration::ZERO)? {
                if let Action::Quit = self.handle(event::read()?)? {
                    return Ok(());
                }
            }

            // 2. Background results
            while let Ok(notice) = self.notices_rx.try_recv() {
                self.notice = Some(notice);
            }
            if let Some(reveal) = self.client.session().take_reveal() {
                self.preview(&reveal.job_id, &reveal.files, reveal.track_name);
            }
            self.loader.drain_into(&mut self.deck);

            // 3. Draw
            let state = self.client.session().snapshot();
            self.deck.sync();
            self.draw(out, &state)?;
            tokio::time::sleep(FRAME).await;
        }
    }

    /// Swap the deck over to `job_id`'s stems.
    fn preview(&mut self, job_id: &JobId, files: &[StemFile], label: String) {
        if self.loader.current() == Some(job_id) {
            return;
        }
        self.deck.registry().pause_all();
        self.deck.clear();
        self.loader.reset();
        self.loader.request(job_id, files);
        self.previewing = Some(label);
        self.focus = Focus::Deck;
    }

    fn handle(&mut self, ev: Event) -> anyhow::Result<Action> {
        match ev {
            Event::Key(key) if key.kind == KeyEventKind::Press => return Ok(self.handle_key(key)),
            Event::Mouse(m) if m.kind == MouseEventKind::Down(MouseButton::Left) => {
                if m.row >= self.deck_top {
                    let columns = deck_columns()?;
                    self.deck.click(m.column, m.row - self.deck_top, columns);
                }
            }
            _ => {}
        }
        Ok(Action::Continue)
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Action::Quit;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::Enter if self.focus == Focus::Archive => self.preview_selected_archive(),
            KeyCode::Char(' ') => self.deck.toggle_selected(),
            KeyCode::Left => self.deck.seek_selected(-5.0),
            KeyCode::Right => self.deck.seek_selected(5.0),
            KeyCode::Char('s') => self.save_selected(),
            KeyCode::Char('x') => self.remove_selected_queued(),
            KeyCode::Char('r') => {
                self.client.reset();
                self.deck.clear();
                self.loader.reset();
                self.previewing = None;
                self.notice = Some("Reset.".to_string());
            }
            _ => {}
        }
        Action::Continue
    }

    fn move_selection(&mut self, delta: isize) {
        let (queue_len, archive_len) =
            self.client.session().with(|s| (s.queue.entries.len(), s.completed.len()));
        match (self.focus, delta < 0) {
            (Focus::Deck, true) => self.deck.select_prev(),
            (Focus::Deck, false) => self.deck.select_next(),
            (Focus::Queue, _) => self.queue_selected = step(self.queue_selected, delta, queue_len),
            (Focus::Archive, _) => self.archive_selected = step(self.archive_selected, delta, archive_len),
        }
    }

    fn preview_selected_archive(&mut self) {
        let selected = self.archive_selected;
        let record = self
            .client
            .session()
            .with(|s| s.completed.get(clamp(selected, s.completed.len())).cloned());
        let Some(record) = record else {
            return;
        };
        self.notice = Some(format!("Loading archived {}...", record.song_name));
        self.preview(&record.job_id, &record.sorted_stems(), format!("{} (archive)", record.song_name));
    }

    fn save_selected(&mut self) {
        let Some(name) = self.deck.engines().get(self.deck.selected()).map(|e| e.name().to_string()) else {
            return;
        };
        let Some(bytes) = self.loader.bytes_for(&name) else {
            return;
        };
        let dir = self.out_dir.clone();
        let tx = self.notices_tx.clone();
        tokio::spawn(async move {
            let notice = match save_stem(&dir, &name, bytes).await {
                Ok(path) => format!("Saved {}", path.display()),
                Err(e) => format!("Save failed: {e:#}"),
            };
            let _ = tx.send(notice);
        });
    }

    fn remove_selected_queued(&mut self) {
        let selected = self.queue_selected;
        let entry = self
            .client
            .session()
            .with(|s| s.queue.entries.get(clamp(selected, s.queue.entries.len())).cloned());
        if let Some(entry) = entry {
            self.notice = Some(format!("Removing {} from the queue...", entry.display_name));
            self.client.remove_queued(entry.job_id);
        }
    }

    fn draw(&mut self, out: &mut Stdout, state: &SessionState) -> anyhow::Result<()> {
        let columns = deck_columns()?;
        let mut lines = header_lines(self.client.config().base_url.as_str(), state);
        if let Some(notice) = &self.notice {
            lines.push(notice.clone());
        }
        lines.push(String::new());
        lines.push(match (&self.previewing, self.deck.is_empty()) {
            (Some(label), false) => format!("Stems: {label}"),
            (Some(label), true) => format!("Stems: {label} (loading)"),
            (None, _) => "Stems: none yet".to_string(),
        });
        self.deck_top = lines.len() as u16;
        lines.extend(self.deck.lines(columns));

        let queue_sel = (self.focus == Focus::Queue).then_some(self.queue_selected);
        let archive_sel = (self.focus == Focus::Archive).then_some(self.archive_selected);
        lines.push(String::new());
        lines.extend(queue_lines(&state.queue, queue_sel));
        lines.push(String::new());
        lines.extend(archive_lines(&state.completed, archive_sel));
        lines.push(String::new());
        lines.push(HELP.to_string());

        queue!(out, cursor::MoveTo(0, 0), Clear(ClearType::All))?;
        for (i, line) in lines.iter().enumerate() {
            queue!(out, cursor::MoveTo(0, i as u16))?;
            write!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }
}

fn deck_columns() -> anyhow::Result<usize> {
    let (cols, _) = terminal::size()?;
    Ok(cols.saturating_sub(2).max(10) as usize)
}

fn clamp(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

fn step(index: usize, delta: isize, len: usize) -> usize {
    clamp(clamp(index, len).saturating_add_signed(delta), len)
}

/// First visible row of a `window`-high list keeping `selected` in view.
fn scroll_start(selected: usize, len: usize, window: usize) -> usize {
    if len <= window {
        0
    } else {
        clamp(selected, len).saturating_sub(window - 1)
    }
}

fn marker(selected: Option<usize>, index: usize) -> &'static str {
    if selected == Some(index) { ">" } else { " " }
}

/// "128 BPM, A minor", if anything is known.
pub fn meta_summary(meta: &TrackMeta) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(tempo) = &meta.tempo {
        parts.push(format!("{tempo} BPM"));
    }
    if let Some(key) = &meta.key {
        parts.push(key.clone());
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Server, job status and metadata.
fn header_lines(server: &str, state: &SessionState) -> Vec<String> {
    let mut lines = vec![format!("ravedrop @ {server}")];

    let status = state.status_text();
    match (&state.job, status.is_empty()) {
        (Some(job), false) => lines.push(format!("{}: {status}", job.track_name)),
        (None, false) => lines.push(status),
        (_, true) => lines.push("Idle".to_string()),
    }
    if let Some(error) = state.error() {
        lines.push(format!("Error: {error}"));
    }
    if let Some(summary) = state.job.as_ref().and_then(|j| j.meta()).and_then(meta_summary) {
        lines.push(summary);
    }
    if let Some(files) = state.revealed_results() {
        lines.push(format!("{} result file(s)", files.len()));
    }
    lines
}

/// The server queue; `selected` is marked when the panel has focus.
fn queue_lines(queue: &QueueSnapshot, selected: Option<usize>) -> Vec<String> {
    let mut lines = vec![match &queue.current {
        Some(current) => format!("Queue (now processing: {})", current.display_name),
        None => "Queue (server idle)".to_string(),
    }];
    let len = queue.entries.len();
    let start = scroll_start(selected.unwrap_or(0), len, QUEUE_LINES);
    for (i, entry) in queue.entries.iter().enumerate().skip(start).take(QUEUE_LINES) {
        lines.push(format!("{} {}. {}", marker(selected.map(|s| clamp(s, len)), i), i + 1, entry.display_name));
    }
    if len > start + QUEUE_LINES {
        lines.push(format!("  ... {} more", len - start - QUEUE_LINES));
    }
    lines
}

/// Finished jobs. The selected record also lists its source and stems.
fn archive_lines(records: &[CompletedRecord], selected: Option<usize>) -> Vec<String> {
    let mut lines = vec![format!("Completed ({})", records.len())];
    let len = records.len();
    let selected = selected.map(|s| clamp(s, len));
    let start = scroll_start(selected.unwrap_or(0), len, ARCHIVE_LINES);
    for (i, record) in records.iter().enumerate().skip(start).take(ARCHIVE_LINES) {
        let mut line = format!("{} {} ({} stems)", marker(selected, i), record.song_name, record.stems.len());
        if let Some(summary) = meta_summary(&record.meta) {
            line.push_str(&format!(" [{summary}]"));
        }
        lines.push(line);

        if selected == Some(i) {
            if let Some(url) = &record.source_url {
                lines.push(format!("    source: {url}"));
            }
            for stem in record.sorted_stems() {
                lines.push(format!("    {}", stem.display_name));
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use stem_modules::job::{Job, JobMode, JobPhase, Stage};
    use stem_modules::observers::QueueEntry;

    fn state_with(phase: JobPhase) -> SessionState {
        let mut state = SessionState::default();
        state.job = Some(Job {
            id: JobId::from("j1"),
            track_name: "Song".into(),
            source_url: "https://example.com".into(),
            mode: JobMode::StemSplit,
            output_location: None,
            phase,
        });
        state.busy = true;
        state
    }

    fn entry(id: &str, name: &str) -> QueueEntry {
        QueueEntry { job_id: JobId::from(id), display_name: name.into() }
    }

    fn record(song: &str, tempo: Option<&str>) -> CompletedRecord {
        let stem = |name: &str| StemFile { url: format!("/download/{song}/{name}"), display_name: name.into() };
        CompletedRecord {
            job_id: JobId::from(song),
            song_name: song.into(),
            source_url: Some(format!("https://www.youtube.com/watch?v={song}")),
            meta: TrackMeta { tempo: tempo.map(str::to_string), key: Some("C major".into()) },
            stems: vec![stem("vocals.mp3"), stem(&format!("{song}[full].mp3")), stem("bass.mp3")],
        }
    }

    #[test]
    fn header_shows_stage_of_running_job() {
        let mut state = state_with(JobPhase::Active(Stage::Separating));
        state.queue.current = Some(entry("j1", "Song"));

        let lines = header_lines("http://localhost:8000", &state);
        assert_eq!(lines[1], "Song: Splitting (Song)");
    }

    #[test]
    fn header_shows_failure_message() {
        let state = state_with(JobPhase::Failed { message: "Download failed".into() });
        let lines = header_lines("http://localhost:8000", &state);
        assert!(lines.contains(&"Error: Download failed".to_string()));
    }

    #[test]
    fn queue_marks_selected_row_only_with_focus() {
        let queue = QueueSnapshot { entries: vec![entry("a", "One"), entry("b", "Two")], current: None };

        let focused = queue_lines(&queue, Some(1));
        assert_eq!(focused[0], "Queue (server idle)");
        assert_eq!(focused[1], "  1. One");
        assert_eq!(focused[2], "> 2. Two");

        let unfocused = queue_lines(&queue, None);
        assert!(unfocused.iter().all(|l| !l.starts_with('>')));
    }

    #[test]
    fn queue_scrolls_to_keep_selection_visible() {
        let entries = (0..9).map(|i| entry(&i.to_string(), &format!("Job {i}"))).collect();
        let queue = QueueSnapshot { entries, current: Some(entry("x", "Busy")) };

        let lines = queue_lines(&queue, Some(7));
        assert_eq!(lines[0], "Queue (now processing: Busy)");
        assert!(lines.contains(&"> 8. Job 7".to_string()));
        assert!(!lines.iter().any(|l| l.ends_with("Job 0")));
        assert_eq!(lines.last().map(String::as_str), Some("  ... 1 more"));
    }

    #[test]
    fn archive_expands_selected_record() {
        let records = vec![record("Alpha", Some("128")), record("Beta", None)];

        let lines = archive_lines(&records, Some(0));
        assert_eq!(lines[0], "Completed (2)");
        assert_eq!(lines[1], "> Alpha (3 stems) [128 BPM, C major]");
        assert_eq!(lines[2], "    source: https://www.youtube.com/watch?v=Alpha");
        assert_eq!(&lines[3..6], ["    Alpha[full].mp3", "    bass.mp3", "    vocals.mp3"]);
        assert_eq!(lines[6], "  Beta (3 stems) [C major]");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn stale_selection_is_clamped() {
        let records = vec![record("Alpha", None)];
        let lines = archive_lines(&records, Some(5));
        assert!(lines[1].starts_with("> Alpha"));
        assert_eq!(step(4, 1, 3), 2);
        assert_eq!(step(0, -1, 3), 0);
        assert_eq!(step(0, 1, 0), 0);
    }
}
