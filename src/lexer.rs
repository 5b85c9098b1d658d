//! Runtime scanner embedded in every generated lexer.
//!
//! This file is both a normal module (so the scanner machinery is unit
//! tested in-crate) and the source template for generated programs: the
//! emitter splits it on the `[... PLACEHOLDER]` marker comments and
//! splices rule dispatch and DFA tables into the copy it writes out.
//! Everything after the SUFFIX marker stays in-crate.
//!
//! The runtime is std-only on purpose — generated programs must compile
//! with a bare `rustc`.

// [PREAMBLE PLACEHOLDER]
use std::io::{BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

/// Bitmask over zero-width assertion kinds, one mask per cursor position.
pub type Asserts = u64;

pub const A_START_TEXT: Asserts = 1 << 0;
pub const A_END_TEXT: Asserts = 1 << 1;
pub const A_START_LINE: Asserts = 1 << 2;
pub const A_END_LINE: Asserts = 1 << 3;
pub const A_WORD_BOUNDARY: Asserts = 1 << 4;
pub const A_NO_WORD_BOUNDARY: Asserts = 1 << 5;

/// Accept label of the end-of-scan sentinel frame.
pub const SENTINEL: i32 = -1;

/// Handoff record from the scanner to the caller: one matched token, or
/// the sentinel closing a scan.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Accept label of the matched rule; -1 for the sentinel.
    pub state: i32,
    /// The matched text.
    pub text: String,
    /// 0-based line of the match start.
    pub line: usize,
    /// 0-based column of the match start.
    pub column: usize,
}

impl Frame {
    fn sentinel(line: usize, column: usize) -> Frame {
        Frame {
            state: SENTINEL,
            text: String::new(),
            line,
            column,
        }
    }
}

/// One compiled DFA state. Rune transitions are probed singles first,
/// then ranges, then wild; assertion transitions match their subset mask
/// exactly. Missing transitions are explicit -1 entries, so the tables
/// are total.
#[derive(Debug, Clone, Default)]
pub struct DfaState {
    pub accept: i32,
    pub assert_mask: Asserts,
    pub assert_edges: Vec<(Asserts, i32)>,
    pub singles: Vec<(char, i32)>,
    pub ranges: Vec<(u32, u32, i32)>,
    pub wild: i32,
}

impl DfaState {
    fn rune_step(&self, r: char) -> i32 {
        if let Ok(i) = self.singles.binary_search_by_key(&r, |&(s, _)| s) {
            return self.singles[i].1;
        }
        let c = r as u32;
        for &(lo, hi, dst) in &self.ranges {
            if lo <= c && c <= hi {
                return dst;
            }
        }
        self.wild
    }

    fn assert_step(&self, a: Asserts) -> i32 {
        for &(mask, dst) in &self.assert_edges {
            if mask == a {
                return dst;
            }
        }
        -1
    }

    fn has_rune_steps(&self) -> bool {
        !self.singles.is_empty() || !self.ranges.is_empty() || self.wild >= 0
    }
}

/// A compiled DFA tree: one table per scope, nested tables keyed by the
/// accept label of the rule that owns them.
#[derive(Debug, Clone, Default)]
pub struct Dfa {
    pub states: Vec<DfaState>,
    pub nest: Vec<(i32, Dfa)>,
}

impl Dfa {
    fn nest_for(&self, accept: i32) -> Option<&Dfa> {
        self.nest
            .iter()
            .find(|(id, _)| *id == accept)
            .map(|(_, d)| d)
    }
}

const RUNE_ERROR: char = '\u{FFFD}';

/// Incremental UTF-8 decoder over the input stream. Invalid sequences
/// decode to U+FFFD; unexpected I/O errors abort the scanner thread.
struct RuneReader {
    input: Option<Box<dyn Read + Send>>,
    buf: [u8; 4],
    len: usize,
}

impl RuneReader {
    fn new(input: Box<dyn Read + Send>) -> RuneReader {
        RuneReader {
            input: Some(input),
            buf: [0; 4],
            len: 0,
        }
    }

    fn fill(&mut self) {
        while self.len < 4 {
            let Some(input) = self.input.as_mut() else {
                return;
            };
            let mut byte = [0u8; 1];
            match input.read(&mut byte) {
                Ok(0) => {
                    self.input = None;
                    return;
                }
                Ok(_) => {
                    self.buf[self.len] = byte[0];
                    self.len += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => panic!("lexer input: {}", e),
            }
        }
    }

    fn consume(&mut self, n: usize) {
        self.buf.copy_within(n..self.len, 0);
        self.len -= n;
    }

    fn next_rune(&mut self) -> Option<char> {
        self.fill();
        if self.len == 0 {
            return None;
        }
        match std::str::from_utf8(&self.buf[..self.len]) {
            Ok(s) => {
                let c = s.chars().next().expect("non-empty utf-8");
                self.consume(c.len_utf8());
                Some(c)
            }
            Err(e) if e.valid_up_to() > 0 => {
                let c = std::str::from_utf8(&self.buf[..e.valid_up_to()])
                    .expect("validated prefix")
                    .chars()
                    .next()
                    .expect("non-empty prefix");
                self.consume(c.len_utf8());
                Some(c)
            }
            Err(e) => {
                let bad = e.error_len().unwrap_or(self.len).max(1);
                self.consume(bad);
                Some(RUNE_ERROR)
            }
        }
    }
}

fn is_word(r: Option<char>) -> bool {
    matches!(r, Some(c) if c.is_ascii_alphanumeric() || c == '_')
}

/// One scan over one DFA. Nested scans borrow the parent's channel and
/// cancel flag and re-scan the matched runes with no reader.
struct Scanner<'a> {
    dfa: &'a Dfa,
    // None once EOF is reached, and always None for nested scans.
    reader: Option<RuneReader>,
    runes: Vec<char>,
    asserts: Vec<Asserts>,
    pos: usize,
    consumed_assert: bool,
    min_capture: usize,
    matched: Option<(usize, i32)>,
    line: usize,
    column: usize,
    ch: &'a SyncSender<Frame>,
    cancel: &'a AtomicBool,
}

impl<'a> Scanner<'a> {
    fn root(
        dfa: &'a Dfa,
        reader: RuneReader,
        ch: &'a SyncSender<Frame>,
        cancel: &'a AtomicBool,
    ) -> Scanner<'a> {
        Scanner {
            dfa,
            reader: Some(reader),
            runes: Vec::new(),
            asserts: Vec::new(),
            pos: 0,
            consumed_assert: false,
            min_capture: 0,
            matched: None,
            line: 0,
            column: 0,
            ch,
            cancel,
        }
    }

    fn nested(&self, dfa: &'a Dfa, runes: Vec<char>) -> Scanner<'a> {
        Scanner {
            dfa,
            reader: None,
            runes,
            asserts: Vec::new(),
            pos: 0,
            consumed_assert: false,
            min_capture: 0,
            matched: None,
            line: self.line,
            column: self.column,
            ch: self.ch,
            cancel: self.cancel,
        }
    }

    /// Load the rune and the assert mask for the cursor position, on
    /// demand. The assert buffer parallels the rune buffer and survives
    /// shifts, so each absolute position is computed exactly once.
    fn load_next(&mut self) {
        if self.pos >= self.runes.len() {
            if let Some(reader) = self.reader.as_mut() {
                match reader.next_rune() {
                    Some(r) => self.runes.push(r),
                    None => self.reader = None,
                }
            }
        }
        if self.pos < self.asserts.len() {
            return;
        }
        let mut a: Asserts = 0;
        let mut r1 = None;
        let mut r2 = None;
        if self.pos == 0 {
            a |= A_START_TEXT | A_START_LINE;
        } else {
            r1 = Some(self.runes[self.pos - 1]);
        }
        if self.pos == self.runes.len() {
            a |= A_END_TEXT | A_END_LINE;
        } else {
            r2 = Some(self.runes[self.pos]);
        }
        if r1 == Some('\n') {
            a |= A_START_LINE;
        }
        if r2 == Some('\n') {
            a |= A_END_LINE;
        }
        if is_word(r1) != is_word(r2) {
            a |= A_WORD_BOUNDARY;
        } else {
            a |= A_NO_WORD_BOUNDARY;
        }
        self.asserts.push(a);
    }

    fn consume_rune(&mut self) -> Option<char> {
        self.load_next();
        if self.pos == self.runes.len() {
            return None;
        }
        let r = self.runes[self.pos];
        self.pos += 1;
        self.consumed_assert = false;
        Some(r)
    }

    /// At most one assert application per cursor position.
    fn consume_asserts(&mut self, mask: Asserts) -> Asserts {
        self.load_next();
        if self.consumed_assert || self.pos == self.asserts.len() {
            return 0;
        }
        self.consumed_assert = true;
        self.asserts[self.pos] & mask
    }

    /// Strictly longer match wins; on equal length the lower rule id wins.
    fn check_accept(&mut self, st: i32) {
        if st < 0 {
            return;
        }
        let accept = self.dfa.states[st as usize].accept;
        if accept < 0 {
            return;
        }
        let better = match self.matched {
            None => true,
            Some((pos, best)) => self.pos > pos || accept < best,
        };
        if better {
            self.matched = Some((self.pos, accept));
        }
    }

    /// Shift `i` runes out of the buffer, advancing line/column. The
    /// assert entry at the new cursor is loaded first so it keeps the
    /// previous rune's context. A shift of zero runes arms `min_capture`
    /// so the next attempt must consume input before accepting.
    fn reset_buffer(&mut self, i: usize) {
        while self.pos <= i {
            if self.consume_rune().is_none() {
                break;
            }
        }
        for &r in &self.runes[..i] {
            if r == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.runes.drain(..i);
        self.asserts.drain(..i);
        self.pos = 0;
        self.consumed_assert = false;
        self.min_capture = if i == 0 { 1 } else { 0 };
    }

    fn send(&self, frame: Frame) -> bool {
        if self.ch.send(frame).is_err() {
            // Receiver gone: the caller stopped or dropped the lexer.
            self.cancel.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }

    fn scan(&mut self) {
        let dfa = self.dfa;
        while !dfa.states.is_empty() && !self.cancel.load(Ordering::Relaxed) {
            // Each attempt starts over at DFA state 0.
            let mut st: i32 = 0;
            self.matched = None;
            let mut made_progress = true;
            while made_progress && st >= 0 {
                made_progress = false;
                let state = &dfa.states[st as usize];
                if state.assert_mask != 0 {
                    let a = self.consume_asserts(state.assert_mask);
                    if a != 0 {
                        st = state.assert_step(a);
                        self.check_accept(st);
                        made_progress = true;
                    }
                }
                if st < 0 {
                    break;
                }
                let state = &dfa.states[st as usize];
                if state.has_rune_steps() {
                    if let Some(r) = self.consume_rune() {
                        st = state.rune_step(r);
                        self.check_accept(st);
                        made_progress = true;
                    }
                }
            }

            // The DFA is stuck. Emit the best match, or skip one rune.
            match self.matched {
                Some((len, accept)) if len >= self.min_capture => {
                    let text: String = self.runes[..len].iter().collect();
                    if !self.send(Frame {
                        state: accept,
                        text,
                        line: self.line,
                        column: self.column,
                    }) {
                        break;
                    }
                    if let Some(nest) = dfa.nest_for(accept) {
                        self.nested(nest, self.runes[..len].to_vec()).scan();
                    }
                    self.reset_buffer(len);
                }
                _ => {
                    if self.runes.is_empty() {
                        // Only possible at end of input.
                        break;
                    }
                    self.reset_buffer(1);
                }
            }
        }
        let _ = self.send(Frame::sentinel(self.line, self.column));
    }
}

/// The lexer handle owned by the caller. The scanner runs on its own
/// thread and hands frames over a rendezvous channel; the caller walks
/// them through `next`/`pop`. The nesting-level stack persists between
/// `lex` calls, simulating a coroutine so action code may return.
pub struct Lexer {
    ch: Option<Receiver<Frame>>,
    cancel: Arc<AtomicBool>,
    stack: Vec<Frame>,
    stale: bool,

    pub parse_result: Option<Box<dyn std::any::Any + Send>>,
    pub parse_error: Option<String>,
    // [NEX_END_OF_LEXER_STRUCT]
}

impl Lexer {
    /// Creates a new lexer reading from `input`.
    pub fn new(input: impl Read + Send + 'static) -> Lexer {
        Lexer::with_init(input, |_| {})
    }

    /// Creates a new lexer, runs `init` on it, then starts the scanner.
    pub fn with_init(input: impl Read + Send + 'static, init: impl FnOnce(&mut Lexer)) -> Lexer {
        Lexer::with_dfa(yy_program_dfa(), input, init)
    }

    /// Starts a scanner over an explicit DFA tree.
    pub fn with_dfa(
        dfa: Dfa,
        input: impl Read + Send + 'static,
        init: impl FnOnce(&mut Lexer),
    ) -> Lexer {
        let (tx, rx) = sync_channel(0);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut yylex = Lexer {
            ch: Some(rx),
            cancel: Arc::clone(&cancel),
            stack: Vec::new(),
            stale: false,
            parse_result: None,
            parse_error: None,
        };
        init(&mut yylex);
        let reader = RuneReader::new(Box::new(BufReader::new(input)));
        thread::spawn(move || {
            Scanner::root(&dfa, reader, &tx, &cancel).scan();
        });
        yylex
    }

    /// Cancels the background scanner.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.ch = None;
    }

    /// Returns the matched text.
    pub fn text(&self) -> String {
        match self.stack.last() {
            Some(frame) => frame.text.clone(),
            None => String::new(),
        }
    }

    /// Returns the current line number. The first line is 0.
    pub fn line(&self) -> usize {
        self.stack.last().map_or(0, |frame| frame.line)
    }

    /// Returns the current column number. The first column is 0.
    pub fn column(&self) -> usize {
        self.stack.last().map_or(0, |frame| frame.column)
    }

    /// Advances the nesting level `lvl` to its next frame. At the top of
    /// the stack this receives from the scanner; at an outer level it
    /// replays the cached frame and marks it stale.
    pub fn next(&mut self, lvl: usize) -> i32 {
        if lvl == self.stack.len() {
            let (line, column) = match lvl.checked_sub(1).and_then(|i| self.stack.get(i)) {
                Some(parent) => (parent.line, parent.column),
                None => (0, 0),
            };
            self.stack.push(Frame {
                state: 0,
                text: String::new(),
                line,
                column,
            });
        }
        if lvl == self.stack.len() - 1 {
            self.stack[lvl] = self.recv_frame();
            self.stale = false;
        } else {
            self.stale = true;
        }
        self.stack[lvl].state
    }

    /// Leaves a nesting level when its scope's dispatch loop ends.
    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// True when `next` replayed a cached frame instead of receiving.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn recv_frame(&mut self) -> Frame {
        let (line, column) = (self.line(), self.column());
        match self.ch.as_ref().map(|rx| rx.recv()) {
            Some(Ok(frame)) => frame,
            // Disconnected or stopped: the sentinel forever after.
            _ => Frame::sentinel(line, column),
        }
    }
}

impl Drop for Lexer {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

// [LEX METHOD PLACEHOLDER]

impl Lexer {
    /// Runs the lexer. Action code may return out of `lex`; a later call
    /// resumes at the same nesting level. Returns 0 at end of input.
    #[allow(unused_variables, unused_mut)]
    pub fn lex(&mut self, lval: &mut YySymType) -> i32 {
        let yylex = self;
        // [LEX IMPLEMENTATION PLACEHOLDER]
        0
    }
}

// [ERROR METHOD PLACEHOLDER]

impl Lexer {
    /// Default error sink: records the message with its position.
    pub fn error(&mut self, e: &str) {
        self.parse_error = Some(format!("{}:{} {}", self.line(), self.column(), e));
    }
}

// [SUFFIX PLACEHOLDER]

// Everything below stays in-crate: generated programs get their own
// YySymType and DFA tables spliced in by the emitter.

pub type YySymType = String;

fn yy_program_dfa() -> Dfa {
    Dfa::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_rune_dfa() -> Dfa {
        // Matches /a/ with accept label 1.
        Dfa {
            states: vec![
                DfaState {
                    accept: -1,
                    singles: vec![('a', 1)],
                    wild: -1,
                    ..Default::default()
                },
                DfaState {
                    accept: 1,
                    singles: vec![('a', -1)],
                    wild: -1,
                    ..Default::default()
                },
            ],
            nest: Vec::new(),
        }
    }

    fn collect(dfa: Dfa, input: &str) -> Vec<(i32, String, usize, usize)> {
        let cursor = std::io::Cursor::new(input.as_bytes().to_vec());
        let mut yylex = Lexer::with_dfa(dfa, cursor, |_| {});
        let mut out = Vec::new();
        loop {
            let st = yylex.next(0);
            let frame = yylex.stack.last().unwrap().clone();
            out.push((st, frame.text, frame.line, frame.column));
            if st == SENTINEL {
                break;
            }
        }
        out
    }

    #[test]
    fn test_scan_singles_and_skip() {
        let frames = collect(single_rune_dfa(), "aab");
        assert_eq!(
            frames,
            vec![
                (1, "a".to_string(), 0, 0),
                (1, "a".to_string(), 0, 1),
                (SENTINEL, String::new(), 0, 3),
            ]
        );
    }

    #[test]
    fn test_zero_width_anchor_fires_once() {
        // Matches /^/ with accept label 1.
        let dfa = Dfa {
            states: vec![
                DfaState {
                    assert_mask: A_START_TEXT,
                    assert_edges: vec![(A_START_TEXT, 1)],
                    accept: -1,
                    wild: -1,
                    ..Default::default()
                },
                DfaState {
                    accept: 1,
                    wild: -1,
                    ..Default::default()
                },
            ],
            nest: Vec::new(),
        };
        let frames = collect(dfa.clone(), "");
        assert_eq!(
            frames,
            vec![
                (1, String::new(), 0, 0),
                (SENTINEL, String::new(), 0, 0)
            ]
        );
        let frames = collect(dfa, "xy");
        assert_eq!(
            frames,
            vec![
                (1, String::new(), 0, 0),
                (SENTINEL, String::new(), 0, 2)
            ]
        );
    }

    #[test]
    fn test_rune_reader_decodes_and_replaces() {
        let mut r = RuneReader::new(Box::new(&b"a\xC3\xA9\xFFz"[..]));
        assert_eq!(r.next_rune(), Some('a'));
        assert_eq!(r.next_rune(), Some('é'));
        assert_eq!(r.next_rune(), Some(RUNE_ERROR));
        assert_eq!(r.next_rune(), Some('z'));
        assert_eq!(r.next_rune(), None);
    }

    #[test]
    fn test_stop_yields_sentinel() {
        let mut yylex = Lexer::with_dfa(single_rune_dfa(), &b"aaaa"[..], |_| {});
        yylex.stop();
        assert_eq!(yylex.next(0), SENTINEL);
    }
}
