// src/main.rs

use crossterm::{
    cursor,
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
        MouseButton, MouseEventKind,
    },
    execute, queue,
    terminal::{self, disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use std::io::{stdout, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stem_modules::config::ClientConfig;
use stem_modules::waveform::{deck::audible_or_silent, profile, StemDeck};

const ROWS_PER_STEM: usize = 3;
const HEADER_LINES: u16 = 2;

fn load_deck(paths: &[String], buckets: usize) -> Result<StemDeck, anyhow::Error> {
    let mut deck = StemDeck::new(buckets, ROWS_PER_STEM);
    for path in paths {
        let bytes: Arc<[u8]> = Arc::from(std::fs::read(path)?);
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path.as_str())
            .to_string();
        let peaks = profile(Arc::clone(&bytes), &name, buckets);
        let decoded_secs = peaks.as_ref().map(|p| p.duration_secs).unwrap_or(0.0);
        let transport = audible_or_silent(&name, bytes, decoded_secs);
        deck.push(&name, transport, peaks);
    }
    Ok(deck)
}

fn draw(deck: &StemDeck) -> Result<(), anyhow::Error> {
    let (cols, _) = terminal::size()?;
    let columns = cols.saturating_sub(2).max(10) as usize;
    let mut out = stdout();
    queue!(out, cursor::MoveTo(0, 0), Clear(ClearType::All))?;
    queue!(out, cursor::MoveTo(0, 0))?;
    write!(out, "[SPACE] Play/Pause | [←/→] Seek 5s | [↑/↓] Select | click to seek | [Q] Quit")?;
    for (i, line) in deck.lines(columns).iter().enumerate() {
        queue!(out, cursor::MoveTo(0, HEADER_LINES + i as u16))?;
        write!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: stem_player <stem file>...");
        std::process::exit(2);
    }

    let config = ClientConfig::from_env();
    let mut deck = load_deck(&paths, config.peak_buckets)?;

    enable_raw_mode()?;
    execute!(stdout(), EnableMouseCapture, cursor::Hide)?;

    // Target 20 FPS (50ms per frame)
    let target_frame_duration = Duration::from_millis(50);
    let result = run(&mut deck, target_frame_duration);

    execute!(stdout(), DisableMouseCapture, cursor::Show)?;
    disable_raw_mode()?;
    println!("\n🛑 Exiting player.");
    result
}

fn run(deck: &mut StemDeck, frame: Duration) -> Result<(), anyhow::Error> {
    loop {
        // 1. Process input
        if event::poll(frame)? {
            match event::read()? {
                Event::Key(ev) if ev.kind == KeyEventKind::Press => {
                    if ev.code == KeyCode::Char('c') && ev.modifiers.contains(KeyModifiers::CONTROL) {
                        break;
                    }
                    match ev.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char(' ') => deck.toggle_selected(),
                        KeyCode::Left => deck.seek_selected(-5.0),
                        KeyCode::Right => deck.seek_selected(5.0),
                        KeyCode::Up => deck.select_prev(),
                        KeyCode::Down => deck.select_next(),
                        _ => {}
                    }
                }
                Event::Mouse(m) if m.kind == MouseEventKind::Down(MouseButton::Left) => {
                    if m.row >= HEADER_LINES {
                        let columns = terminal::size()?.0.saturating_sub(2).max(10) as usize;
                        deck.click(m.column, m.row - HEADER_LINES, columns);
                    }
                }
                _ => {}
            }
        }

        // 2. Update and redraw
        deck.sync();
        draw(deck)?;
    }
    deck.registry().pause_all();
    Ok(())
}
