//! Recursive-descent parser for the Perl-like rule pattern syntax.

use thiserror::Error;

use super::{negate_ranges, simplify_ranges, Assertion, Regex};
use crate::graph::RunePair;

/// Error raised while parsing one regex string. The offset is a rune
/// index into the pattern.
#[derive(Debug, Clone, Error)]
#[error("{message} at offset {offset}")]
pub struct RegexError {
    pub message: String,
    pub offset: usize,
}

/// Largest value allowed in `{n,m}` quantifiers.
const REPEAT_MAX: u32 = 1000;

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    fold_case: bool,
    multi_line: bool,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    flags: Flags,
}

/// Parse a pattern into the closed operator tree.
pub fn parse_regex(pattern: &str) -> Result<Regex, RegexError> {
    let mut p = Parser {
        chars: pattern.chars().collect(),
        pos: 0,
        flags: Flags::default(),
    };
    let re = p.parse_alternation()?;
    match p.peek() {
        None => Ok(re),
        Some(')') => Err(p.error("unmatched ')'", p.pos)),
        Some(_) => Err(p.error("unexpected character", p.pos)),
    }
}

enum Esc {
    Rune(char),
    Ranges(Vec<RunePair>),
    Assert(Assertion),
}

impl Parser {
    fn error(&self, message: &str, offset: usize) -> RegexError {
        RegexError {
            message: message.to_string(),
            offset,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn parse_alternation(&mut self) -> Result<Regex, RegexError> {
        let mut branches = vec![self.parse_concat()?];
        while self.peek() == Some('|') {
            self.pos += 1;
            branches.push(self.parse_concat()?);
        }
        if branches.len() == 1 {
            Ok(branches.pop().unwrap())
        } else {
            Ok(Regex::Alternate(branches))
        }
    }

    fn parse_concat(&mut self) -> Result<Regex, RegexError> {
        let mut items: Vec<Regex> = Vec::new();
        loop {
            match self.peek() {
                None | Some('|') | Some(')') => break,
                Some('*') | Some('+') | Some('?') => {
                    return Err(self.error("closure applies to nothing", self.pos));
                }
                Some(_) => {}
            }
            let Some(atom) = self.parse_atom()? else {
                // A bare flag group like (?i) contributes no node.
                continue;
            };
            items.push(self.parse_postfix(atom)?);
        }
        let mut merged = merge_literals(items);
        Ok(match merged.len() {
            0 => Regex::Empty,
            1 => merged.pop().unwrap(),
            _ => Regex::Concat(merged),
        })
    }

    fn parse_postfix(&mut self, atom: Regex) -> Result<Regex, RegexError> {
        let wrapped = match self.peek() {
            Some('*') => {
                self.pos += 1;
                Regex::Star(Box::new(atom))
            }
            Some('+') => {
                self.pos += 1;
                Regex::Plus(Box::new(atom))
            }
            Some('?') => {
                self.pos += 1;
                Regex::Quest(Box::new(atom))
            }
            Some('{') => match self.try_parse_repeat()? {
                Some((min, max)) => Regex::Repeat {
                    sub: Box::new(atom),
                    min,
                    max,
                },
                // Not a well-formed quantifier: the brace reads as a literal.
                None => return Ok(atom),
            },
            _ => return Ok(atom),
        };
        // Lazy markers parse but mean nothing under longest-match.
        if self.peek() == Some('?') {
            self.pos += 1;
        }
        Ok(wrapped)
    }

    /// At `{`: parse `{n}` / `{n,}` / `{n,m}`. Returns None (with the
    /// cursor rewound) when the braces do not form a quantifier.
    fn try_parse_repeat(&mut self) -> Result<Option<(u32, Option<u32>)>, RegexError> {
        let start = self.pos;
        self.pos += 1;
        let Some(min) = self.parse_number() else {
            self.pos = start;
            return Ok(None);
        };
        let max = match self.peek() {
            Some('}') => {
                self.pos += 1;
                Some(min)
            }
            Some(',') => {
                self.pos += 1;
                if self.peek() == Some('}') {
                    self.pos += 1;
                    None
                } else {
                    match self.parse_number() {
                        Some(m) if self.peek() == Some('}') => {
                            self.pos += 1;
                            Some(m)
                        }
                        _ => {
                            self.pos = start;
                            return Ok(None);
                        }
                    }
                }
            }
            _ => {
                self.pos = start;
                return Ok(None);
            }
        };
        if min > REPEAT_MAX || max.is_some_and(|m| m > REPEAT_MAX || min > m) {
            return Err(self.error("invalid repeat count", start));
        }
        Ok(Some((min, max)))
    }

    fn parse_number(&mut self) -> Option<u32> {
        let start = self.pos;
        let mut n: u32 = 0;
        while let Some(c) = self.peek() {
            let Some(d) = c.to_digit(10) else { break };
            n = n.saturating_mul(10).saturating_add(d);
            self.pos += 1;
        }
        (self.pos > start).then_some(n)
    }

    fn parse_atom(&mut self) -> Result<Option<Regex>, RegexError> {
        let start = self.pos;
        let c = self.advance().expect("caller checked for input");
        match c {
            '(' => self.parse_group(start),
            '[' => self.parse_class(start).map(Some),
            '.' => Ok(Some(Regex::AnyChar)),
            '^' => Ok(Some(Regex::Assert(if self.flags.multi_line {
                Assertion::StartLine
            } else {
                Assertion::StartText
            }))),
            '$' => Ok(Some(Regex::Assert(if self.flags.multi_line {
                Assertion::EndLine
            } else {
                Assertion::EndText
            }))),
            '\\' => match self.parse_escape(false)? {
                Esc::Rune(r) => Ok(Some(self.literal(r))),
                Esc::Ranges(rs) => Ok(Some(Regex::Class(simplify_ranges(rs)))),
                Esc::Assert(a) => Ok(Some(Regex::Assert(a))),
            },
            c => Ok(Some(self.literal(c))),
        }
    }

    fn literal(&self, c: char) -> Regex {
        // Folded literals are stored uppercase; the NFA adds the
        // lowercase edge.
        let r = if self.flags.fold_case && c.is_ascii_lowercase() {
            c.to_ascii_uppercase()
        } else {
            c
        };
        Regex::Literal {
            runes: vec![r],
            fold_case: self.flags.fold_case,
        }
    }

    fn expect_rparen(&mut self, start: usize) -> Result<(), RegexError> {
        if self.peek() == Some(')') {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error("unmatched '('", start))
        }
    }

    fn parse_group(&mut self, start: usize) -> Result<Option<Regex>, RegexError> {
        if self.peek() != Some('?') {
            let saved = self.flags;
            let inner = self.parse_alternation()?;
            self.expect_rparen(start)?;
            self.flags = saved;
            return Ok(Some(Regex::Capture(Box::new(inner))));
        }
        self.pos += 1;
        match self.peek() {
            Some(':') => {
                self.pos += 1;
                let saved = self.flags;
                let inner = self.parse_alternation()?;
                self.expect_rparen(start)?;
                self.flags = saved;
                Ok(Some(inner))
            }
            Some('=') | Some('!') | Some('<') => {
                Err(self.error("lookaround is not supported", start))
            }
            Some('P') => {
                // (?P<name>...) — the name is parsed and discarded.
                self.pos += 1;
                if self.advance() != Some('<') {
                    return Err(self.error("unsupported group syntax", start));
                }
                loop {
                    match self.advance() {
                        Some('>') => break,
                        Some(c) if c.is_alphanumeric() || c == '_' => {}
                        _ => return Err(self.error("bad capture group name", start)),
                    }
                }
                let saved = self.flags;
                let inner = self.parse_alternation()?;
                self.expect_rparen(start)?;
                self.flags = saved;
                Ok(Some(Regex::Capture(Box::new(inner))))
            }
            _ => self.parse_flags(start),
        }
    }

    fn parse_flags(&mut self, start: usize) -> Result<Option<Regex>, RegexError> {
        let saved = self.flags;
        let mut clear = false;
        loop {
            match self.peek() {
                Some('i') => {
                    self.flags.fold_case = !clear;
                    self.pos += 1;
                }
                Some('m') => {
                    self.flags.multi_line = !clear;
                    self.pos += 1;
                }
                // Dot already matches newline; (?s) is a no-op.
                Some('s') => {
                    self.pos += 1;
                }
                Some('-') => {
                    clear = true;
                    self.pos += 1;
                }
                Some(':') => {
                    self.pos += 1;
                    let inner = self.parse_alternation()?;
                    self.expect_rparen(start)?;
                    self.flags = saved;
                    return Ok(Some(inner));
                }
                Some(')') => {
                    // Bare (?flags): the flags persist to the end of the
                    // enclosing group.
                    self.pos += 1;
                    return Ok(None);
                }
                _ => return Err(self.error("unknown flag", self.pos)),
            }
        }
    }

    fn parse_class(&mut self, start: usize) -> Result<Regex, RegexError> {
        let mut negate = false;
        if self.peek() == Some('^') {
            negate = true;
            self.pos += 1;
        }
        let mut ranges: Vec<RunePair> = Vec::new();
        let mut first = true;
        loop {
            let Some(c) = self.advance() else {
                return Err(self.error("unmatched '['", start));
            };
            if c == ']' && !first {
                break;
            }
            first = false;
            let lo: u32 = match c {
                '\\' => match self.parse_escape(true)? {
                    Esc::Rune(r) => r as u32,
                    Esc::Ranges(rs) => {
                        ranges.extend(rs);
                        continue;
                    }
                    Esc::Assert(_) => unreachable!("assertions are rejected in classes"),
                },
                c => c as u32,
            };
            let is_range = self.peek() == Some('-')
                && self.chars.get(self.pos + 1).is_some_and(|&n| n != ']');
            if is_range {
                self.pos += 1;
                let hi: u32 = match self.advance() {
                    Some('\\') => match self.parse_escape(true)? {
                        Esc::Rune(r) => r as u32,
                        _ => return Err(self.error("bad range in character class", start)),
                    },
                    Some(h) => h as u32,
                    None => return Err(self.error("unmatched '['", start)),
                };
                if lo > hi {
                    return Err(self.error("bad range in character class", start));
                }
                ranges.push(RunePair { lo, hi });
            } else {
                ranges.push(RunePair { lo, hi: lo });
            }
        }
        if self.flags.fold_case {
            fold_ranges(&mut ranges);
        }
        let lim = simplify_ranges(ranges);
        Ok(Regex::Class(if negate { negate_ranges(&lim) } else { lim }))
    }

    fn parse_escape(&mut self, in_class: bool) -> Result<Esc, RegexError> {
        let at = self.pos.saturating_sub(1);
        let Some(c) = self.advance() else {
            return Err(self.error("trailing backslash", at));
        };
        match c {
            'a' => Ok(Esc::Rune('\x07')),
            'f' => Ok(Esc::Rune('\x0C')),
            'n' => Ok(Esc::Rune('\n')),
            'r' => Ok(Esc::Rune('\r')),
            't' => Ok(Esc::Rune('\t')),
            'v' => Ok(Esc::Rune('\x0B')),
            // Inside a class \b is backspace, outside it asserts.
            'b' if in_class => Ok(Esc::Rune('\x08')),
            'b' => Ok(Esc::Assert(Assertion::WordBoundary)),
            'B' if !in_class => Ok(Esc::Assert(Assertion::NoWordBoundary)),
            'A' if !in_class => Ok(Esc::Assert(Assertion::StartText)),
            'z' if !in_class => Ok(Esc::Assert(Assertion::EndText)),
            'd' => Ok(Esc::Ranges(digit_ranges())),
            'D' => Ok(Esc::Ranges(negate_ranges(&digit_ranges()))),
            's' => Ok(Esc::Ranges(space_ranges())),
            'S' => Ok(Esc::Ranges(negate_ranges(&space_ranges()))),
            'w' => Ok(Esc::Ranges(word_ranges())),
            'W' => Ok(Esc::Ranges(negate_ranges(&word_ranges()))),
            'x' => self.parse_hex(at).map(Esc::Rune),
            '0' => self.parse_octal(),
            '1'..='9' => Err(self.error("backreferences are not supported", at)),
            'p' | 'P' => Err(self.error("Unicode property classes are not supported", at)),
            c if c.is_ascii_punctuation() => Ok(Esc::Rune(c)),
            _ => Err(self.error("illegal backslash escape", at)),
        }
    }

    fn parse_hex(&mut self, at: usize) -> Result<char, RegexError> {
        if self.peek() == Some('{') {
            self.pos += 1;
            let mut v: u32 = 0;
            loop {
                match self.advance() {
                    Some('}') => break,
                    Some(c) => match c.to_digit(16) {
                        Some(d) if v <= super::RUNE_MAX => v = v * 16 + d,
                        _ => return Err(self.error("illegal hex escape", at)),
                    },
                    None => return Err(self.error("illegal hex escape", at)),
                }
            }
            char::from_u32(v).ok_or_else(|| self.error("illegal hex escape", at))
        } else {
            let mut v: u32 = 0;
            for _ in 0..2 {
                match self.advance().and_then(|c| c.to_digit(16)) {
                    Some(d) => v = v * 16 + d,
                    None => return Err(self.error("illegal hex escape", at)),
                }
            }
            char::from_u32(v).ok_or_else(|| self.error("illegal hex escape", at))
        }
    }

    fn parse_octal(&mut self) -> Result<Esc, RegexError> {
        let mut v: u32 = 0;
        for _ in 0..2 {
            match self.peek().and_then(|c| c.to_digit(8)) {
                Some(d) => {
                    v = v * 8 + d;
                    self.pos += 1;
                }
                None => break,
            }
        }
        Ok(Esc::Rune(char::from_u32(v).unwrap_or('\0')))
    }
}

fn digit_ranges() -> Vec<RunePair> {
    vec![RunePair {
        lo: '0' as u32,
        hi: '9' as u32,
    }]
}

fn space_ranges() -> Vec<RunePair> {
    vec![
        RunePair { lo: 9, hi: 10 },
        RunePair { lo: 12, hi: 13 },
        RunePair { lo: 32, hi: 32 },
    ]
}

fn word_ranges() -> Vec<RunePair> {
    vec![
        RunePair {
            lo: '0' as u32,
            hi: '9' as u32,
        },
        RunePair {
            lo: 'A' as u32,
            hi: 'Z' as u32,
        },
        RunePair {
            lo: '_' as u32,
            hi: '_' as u32,
        },
        RunePair {
            lo: 'a' as u32,
            hi: 'z' as u32,
        },
    ]
}

/// ASCII case folding for class ranges: mirror every cased span.
fn fold_ranges(ranges: &mut Vec<RunePair>) {
    let mut extra = Vec::new();
    for p in ranges.iter() {
        let lo = p.lo.max('a' as u32);
        let hi = p.hi.min('z' as u32);
        if lo <= hi {
            extra.push(RunePair {
                lo: lo - 32,
                hi: hi - 32,
            });
        }
        let lo = p.lo.max('A' as u32);
        let hi = p.hi.min('Z' as u32);
        if lo <= hi {
            extra.push(RunePair {
                lo: lo + 32,
                hi: hi + 32,
            });
        }
    }
    ranges.extend(extra);
}

fn merge_literals(items: Vec<Regex>) -> Vec<Regex> {
    let mut out: Vec<Regex> = Vec::with_capacity(items.len());
    for item in items {
        match (out.last_mut(), item) {
            (
                Some(Regex::Literal { runes, fold_case }),
                Regex::Literal {
                    runes: next,
                    fold_case: next_fold,
                },
            ) if *fold_case == next_fold => runes.extend(next),
            (_, item) => out.push(item),
        }
    }
    out
}
