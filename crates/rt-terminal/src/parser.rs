//! Incremental control-sequence parser driving the screen

use std::time::{Duration, Instant};

use rt_core::TerminalSize;
use vte::{Params, Parser, Perform};

use crate::probe::{ProbePolicy, ProbeQuery};
use crate::screen::{Attrs, Color, Screen, ScreenSnapshot};

/// What one `feed` call produced besides screen changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedOutcome {
    /// Replies to send back to the remote end, in query order
    pub responses: Vec<Vec<u8>>,
    /// Queries that were answered
    pub answered: Vec<ProbeQuery>,
    /// Queries seen outside the window, left for the display layer
    pub passthrough: Vec<ProbeQuery>,
}

impl FeedOutcome {
    /// All replies concatenated
    pub fn response_bytes(&self) -> Vec<u8> {
        self.responses.concat()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty() && self.passthrough.is_empty()
    }
}

/// Terminal state model: a screen plus the parser state feeding it.
///
/// Bytes are parsed exactly once, so feeding a stream in any chunking leaves
/// the same screen.
pub struct Terminal {
    parser: Parser,
    screen: Screen,
    policy: ProbePolicy,
    revision: u64,
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("screen", &self.screen)
            .field("policy", &self.policy)
            .field("revision", &self.revision)
            .finish()
    }
}

impl Terminal {
    pub fn new(size: TerminalSize, probe_window: Duration) -> Self {
        Self {
            parser: Parser::new(),
            screen: Screen::new(size),
            policy: ProbePolicy::new(probe_window),
            revision: 0,
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn size(&self) -> TerminalSize {
        self.screen.size()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        self.screen.snapshot(self.revision)
    }

    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    /// Start answering probes for one window from `now`
    pub fn open_probe_window(&mut self, now: Instant) {
        self.policy.open(now);
    }

    pub fn close_probe_window(&mut self) {
        self.policy.close();
    }

    /// Parse `bytes` into the screen.
    ///
    /// Probes are answered iff the window is open at `now`; the whole
    /// chunk is judged against the same instant.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) -> FeedOutcome {
        let mut performer = Performer {
            screen: &mut self.screen,
            answer: self.policy.is_open(now),
            outcome: FeedOutcome::default(),
        };
        for &byte in bytes {
            self.parser.advance(&mut performer, byte);
        }
        let outcome = performer.outcome;

        if !bytes.is_empty() {
            self.revision += 1;
        }
        for query in &outcome.answered {
            tracing::debug!("Auto-answered terminal probe {:?}", query);
        }
        for query in &outcome.passthrough {
            tracing::trace!("Probe {:?} outside the answer window", query);
        }
        outcome
    }

    /// Resize the screen
    pub fn resize(&mut self, size: TerminalSize) {
        if size != self.screen.size() {
            self.screen.resize(size);
            self.revision += 1;
        }
    }

    /// Blank the screen for a fresh connection and drop any half-parsed
    /// sequence
    pub fn reset(&mut self) {
        self.parser = Parser::new();
        self.screen.reset();
        self.screen.clear();
        self.revision += 1;
    }
}

struct Performer<'a> {
    screen: &'a mut Screen,
    answer: bool,
    outcome: FeedOutcome,
}

impl Performer<'_> {
    fn probe(&mut self, query: ProbeQuery) {
        if self.answer {
            let reply = query.response(self.screen.cursor());
            self.outcome.responses.push(reply);
            self.outcome.answered.push(query);
        } else {
            self.outcome.passthrough.push(query);
        }
    }

    fn private_mode(&mut self, mode: u16, on: bool) {
        match mode {
            7 => self.screen.set_autowrap(on),
            25 => self.screen.set_cursor_visible(on),
            1049 | 1047 | 47 => {
                if on {
                    if mode == 1049 {
                        self.screen.save_cursor();
                    }
                    self.screen.enter_alternate();
                } else {
                    self.screen.leave_alternate();
                    if mode == 1049 {
                        self.screen.restore_cursor();
                    }
                }
            }
            _ => {}
        }
    }
}

/// First value of each parameter group
fn first_values(params: &Params) -> Vec<u16> {
    params
        .iter()
        .map(|group| group.first().copied().unwrap_or(0))
        .collect()
}

/// Parameter `i`, with 0 or a missing value meaning `default`
fn arg(args: &[u16], i: usize, default: usize) -> usize {
    match args.get(i) {
        None | Some(0) => default,
        Some(&v) => v as usize,
    }
}

fn extended_color(args: &[u16]) -> (Option<Color>, usize) {
    match args.first() {
        Some(5) => match args.get(1) {
            Some(&idx) => (Some(Color::Indexed(idx.min(255) as u8)), 2),
            None => (None, 1),
        },
        Some(2) => {
            if args.len() >= 4 {
                let c = |v: u16| v.min(255) as u8;
                (Some(Color::Rgb(c(args[1]), c(args[2]), c(args[3]))), 4)
            } else {
                (None, args.len())
            }
        }
        _ => (None, 0),
    }
}

fn apply_sgr(pen: &mut Attrs, params: &Params) {
    let groups: Vec<&[u16]> = params.iter().collect();
    if groups.is_empty() {
        *pen = Attrs::default();
        return;
    }

    let mut i = 0;
    while i < groups.len() {
        let group = groups[i];
        let code = group.first().copied().unwrap_or(0);
        match code {
            0 => *pen = Attrs::default(),
            1 => pen.bold = true,
            4 => pen.underline = true,
            7 => pen.inverse = true,
            22 => pen.bold = false,
            24 => pen.underline = false,
            27 => pen.inverse = false,
            30..=37 => pen.fg = Color::Indexed((code - 30) as u8),
            39 => pen.fg = Color::Default,
            40..=47 => pen.bg = Color::Indexed((code - 40) as u8),
            49 => pen.bg = Color::Default,
            90..=97 => pen.fg = Color::Indexed((code - 90 + 8) as u8),
            100..=107 => pen.bg = Color::Indexed((code - 100 + 8) as u8),
            38 | 48 => {
                let color = if group.len() > 1 {
                    // Colon form: 38:5:n or 38:2:[cs]:r:g:b
                    let sub = &group[1..];
                    if sub.first() == Some(&2) && sub.len() >= 5 {
                        extended_color(&[2, sub[2], sub[3], sub[4]]).0
                    } else {
                        extended_color(sub).0
                    }
                } else {
                    let rest: Vec<u16> = groups[i + 1..]
                        .iter()
                        .map(|g| g.first().copied().unwrap_or(0))
                        .collect();
                    let (color, consumed) = extended_color(&rest);
                    i += consumed;
                    color
                };
                if let Some(color) = color {
                    if code == 38 {
                        pen.fg = color;
                    } else {
                        pen.bg = color;
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
}

impl Perform for Performer<'_> {
    fn print(&mut self, c: char) {
        self.screen.print(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x08 => self.screen.backspace(),
            0x09 => self.screen.tab(),
            0x0a..=0x0c => self.screen.linefeed(),
            0x0d => self.screen.carriage_return(),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            return;
        }
        let args = first_values(params);
        let rows = self.screen.size().rows as usize;

        match (intermediates, action) {
            ([], 'A') => self.screen.move_up(arg(&args, 0, 1)),
            ([], 'B') => self.screen.move_down(arg(&args, 0, 1)),
            ([], 'C') => self.screen.move_forward(arg(&args, 0, 1)),
            ([], 'D') => self.screen.move_back(arg(&args, 0, 1)),
            ([], 'E') => {
                self.screen.move_down(arg(&args, 0, 1));
                self.screen.carriage_return();
            }
            ([], 'F') => {
                self.screen.move_up(arg(&args, 0, 1));
                self.screen.carriage_return();
            }
            ([], 'G') => self.screen.set_col(arg(&args, 0, 1) - 1),
            ([], 'H') | ([], 'f') => self
                .screen
                .goto(arg(&args, 0, 1) - 1, arg(&args, 1, 1) - 1),
            ([], 'd') => self.screen.set_row(arg(&args, 0, 1) - 1),
            ([], 'J') => self.screen.erase_display(args.first().copied().unwrap_or(0)),
            ([], 'K') => self.screen.erase_line(args.first().copied().unwrap_or(0)),
            ([], 'L') => self.screen.insert_lines(arg(&args, 0, 1)),
            ([], 'M') => self.screen.delete_lines(arg(&args, 0, 1)),
            ([], 'P') => self.screen.delete_chars(arg(&args, 0, 1)),
            ([], '@') => self.screen.insert_chars(arg(&args, 0, 1)),
            ([], 'X') => self.screen.erase_chars(arg(&args, 0, 1)),
            ([], 'S') => self.screen.scroll_up(arg(&args, 0, 1)),
            ([], 'T') => self.screen.scroll_down(arg(&args, 0, 1)),
            ([], 'r') => self
                .screen
                .set_scroll_region(arg(&args, 0, 1) - 1, arg(&args, 1, rows) - 1),
            ([], 'm') => apply_sgr(self.screen.pen_mut(), params),
            ([], 's') => self.screen.save_cursor(),
            ([], 'u') => self.screen.restore_cursor(),
            ([], 'c') if args.first().copied().unwrap_or(0) == 0 => {
                self.probe(ProbeQuery::PrimaryAttributes)
            }
            ([b'>'], 'c') => self.probe(ProbeQuery::SecondaryAttributes),
            ([], 'n') => match args.first() {
                Some(5) => self.probe(ProbeQuery::DeviceStatus),
                Some(6) => self.probe(ProbeQuery::CursorPosition),
                _ => {}
            },
            ([b'?'], 'h') => {
                for mode in args {
                    self.private_mode(mode, true);
                }
            }
            ([b'?'], 'l') => {
                for mode in args {
                    self.private_mode(mode, false);
                }
            }
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        if ignore || !intermediates.is_empty() {
            return;
        }
        match byte {
            b'7' => self.screen.save_cursor(),
            b'8' => self.screen.restore_cursor(),
            b'D' => self.screen.linefeed(),
            b'E' => {
                self.screen.carriage_return();
                self.screen.linefeed();
            }
            b'M' => self.screen.reverse_index(),
            b'c' => self.screen.reset(),
            b'Z' => self.probe(ProbeQuery::TerminalId),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::CursorPos;

    fn term(cols: u16, rows: u16) -> Terminal {
        Terminal::new(TerminalSize::new(cols, rows), Duration::from_secs(5))
    }

    #[test]
    fn test_plain_text_and_crlf() {
        let mut t = term(10, 3);
        t.feed(b"hello\r\nworld", Instant::now());
        assert_eq!(t.screen().contents(), "hello\nworld");
        assert_eq!(t.screen().cursor(), CursorPos { row: 1, col: 5 });
    }

    #[test]
    fn test_cursor_positioning() {
        let mut t = term(10, 5);
        t.feed(b"\x1b[3;4HX\x1b[2AY\x1b[10CZ\x1b[1GW", Instant::now());
        let s = t.screen();
        assert_eq!(s.cell(2, 3).unwrap().ch, 'X');
        assert_eq!(s.cell(0, 4).unwrap().ch, 'Y');
        assert_eq!(s.cell(0, 9).unwrap().ch, 'Z');
        assert_eq!(s.cell(0, 0).unwrap().ch, 'W');
    }

    #[test]
    fn test_erase_display_from_cursor() {
        let mut t = term(5, 3);
        t.feed(b"aaaaa\r\nbbbbb\r\nccccc\x1b[2;3H\x1b[J", Instant::now());
        assert_eq!(t.screen().contents(), "aaaaa\nbb");
    }

    #[test]
    fn test_sgr_basic_and_bright_colors() {
        let mut t = term(10, 1);
        t.feed(b"\x1b[1;31mA\x1b[0;94;103mB\x1b[mC", Instant::now());
        let s = t.screen();
        let a = s.cell(0, 0).unwrap().attrs;
        assert!(a.bold);
        assert_eq!(a.fg, Color::Indexed(1));
        let b = s.cell(0, 1).unwrap().attrs;
        assert!(!b.bold);
        assert_eq!(b.fg, Color::Indexed(12));
        assert_eq!(b.bg, Color::Indexed(11));
        assert_eq!(s.cell(0, 2).unwrap().attrs, Attrs::default());
    }

    #[test]
    fn test_sgr_extended_colors() {
        let mut t = term(10, 1);
        t.feed(
            b"\x1b[38;5;208mA\x1b[48;2;10;20;30mB\x1b[38:2::1:2:3mC\x1b[4;7mD\x1b[24;27;39;49mE",
            Instant::now(),
        );
        let s = t.screen();
        assert_eq!(s.cell(0, 0).unwrap().attrs.fg, Color::Indexed(208));
        assert_eq!(s.cell(0, 1).unwrap().attrs.bg, Color::Rgb(10, 20, 30));
        assert_eq!(s.cell(0, 2).unwrap().attrs.fg, Color::Rgb(1, 2, 3));
        let d = s.cell(0, 3).unwrap().attrs;
        assert!(d.underline && d.inverse);
        let e = s.cell(0, 4).unwrap().attrs;
        assert!(!e.underline && !e.inverse);
        assert_eq!(e.fg, Color::Default);
        assert_eq!(e.bg, Color::Default);
    }

    #[test]
    fn test_scroll_region_sequence() {
        let mut t = term(3, 4);
        t.feed(b"a\r\nb\r\nc\r\nd\x1b[2;3r\x1b[3;1H\n", Instant::now());
        assert_eq!(t.screen().contents(), "a\nc\n\nd");
    }

    #[test]
    fn test_alternate_screen_sequence() {
        let mut t = term(10, 2);
        t.feed(b"prompt$ \x1b[?1049h\x1b[Hfull-screen", Instant::now());
        assert!(t.screen().is_alternate());
        t.feed(b"\x1b[?1049l", Instant::now());
        assert!(!t.screen().is_alternate());
        assert_eq!(t.screen().contents(), "prompt$");
        assert_eq!(t.screen().cursor(), CursorPos { row: 0, col: 8 });
    }

    #[test]
    fn test_cursor_visibility_mode() {
        let mut t = term(10, 2);
        t.feed(b"\x1b[?25l", Instant::now());
        assert!(!t.screen().cursor_visible());
        t.feed(b"\x1b[?25h", Instant::now());
        assert!(t.screen().cursor_visible());
    }

    #[test]
    fn test_probes_answered_inside_window() {
        let start = Instant::now();
        let mut t = term(80, 24);
        t.open_probe_window(start);
        let out = t.feed(b"\x1b[c\x1b[>c\x1b[2;5H\x1b[6n\x1b[5n\x1bZ", start);
        assert_eq!(
            out.answered,
            vec![
                ProbeQuery::PrimaryAttributes,
                ProbeQuery::SecondaryAttributes,
                ProbeQuery::CursorPosition,
                ProbeQuery::DeviceStatus,
                ProbeQuery::TerminalId,
            ]
        );
        assert_eq!(
            out.response_bytes(),
            b"\x1b[?1;2c\x1b[>0;276;0c\x1b[2;5R\x1b[0n\x1b[?1;2c".to_vec()
        );
        assert!(out.passthrough.is_empty());
    }

    #[test]
    fn test_probes_pass_through_outside_window() {
        let start = Instant::now();
        let mut t = term(80, 24);
        t.open_probe_window(start);
        let out = t.feed(b"\x1b[0c", start + Duration::from_secs(5));
        assert!(out.responses.is_empty());
        assert_eq!(out.passthrough, vec![ProbeQuery::PrimaryAttributes]);
    }

    #[test]
    fn test_probe_never_opened_passes_through() {
        let mut t = term(80, 24);
        let out = t.feed(b"\x1b[6n", Instant::now());
        assert_eq!(out.passthrough, vec![ProbeQuery::CursorPosition]);
    }

    #[test]
    fn test_non_probe_csi_c_variants_ignored() {
        let start = Instant::now();
        let mut t = term(80, 24);
        t.open_probe_window(start);
        let out = t.feed(b"\x1b[1c\x1b[?6n", start);
        assert!(out.is_empty());
    }

    #[test]
    fn test_split_probe_is_answered_once() {
        let start = Instant::now();
        let mut t = term(80, 24);
        t.open_probe_window(start);
        let first = t.feed(b"\x1b[", start);
        let second = t.feed(b">c", start);
        assert!(first.is_empty());
        assert_eq!(second.answered, vec![ProbeQuery::SecondaryAttributes]);
    }

    #[test]
    fn test_resize_bumps_revision() {
        let mut t = term(80, 24);
        let before = t.revision();
        t.resize(TerminalSize::new(80, 24));
        assert_eq!(t.revision(), before);
        t.resize(TerminalSize::new(100, 30));
        assert_eq!(t.size(), TerminalSize::new(100, 30));
        assert!(t.revision() > before);
    }

    #[test]
    fn test_reset_clears_screen_and_partial_sequence() {
        let mut t = term(10, 2);
        t.feed(b"junk\x1b[3", Instant::now());
        t.reset();
        t.feed(b"1mX", Instant::now());
        assert_eq!(t.screen().contents(), "1mX");
        assert_eq!(t.screen().cell(0, 2).unwrap().attrs, Attrs::default());
    }

    #[test]
    fn test_utf8_characters() {
        let mut t = term(10, 1);
        t.feed("ação".as_bytes(), Instant::now());
        assert_eq!(t.screen().contents(), "ação");
    }
}
