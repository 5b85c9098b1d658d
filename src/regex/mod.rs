//! Regex front-end for rule patterns.
//!
//! Parses Perl-like regex strings into a small closed operator tree that
//! the NFA builder consumes. Supports:
//! - `.` matches any rune (including newline)
//! - `[...]` / `[^...]` character classes with ranges and Perl classes
//! - `|` alternation, `(...)` grouping, `(?:...)` non-capturing
//! - `?` `+` `*` and `{n}` `{n,}` `{n,m}` quantifiers (lazy markers accepted)
//! - escapes `\a \f \n \r \t \v \xHH \x{...}` and escaped punctuation
//! - `\d \D \s \S \w \W` Perl classes
//! - `^` `$` anchors, `\A` `\z` text anchors, `\b` `\B` word boundaries
//! - inline flags `(?i)` `(?m)` `(?s)`, group-scoped
//!
//! Lookaround, backreferences and `\p{...}` properties are rejected.

mod parser;

pub use parser::{parse_regex, RegexError};

use crate::graph::{Limits, RunePair};

/// Largest Unicode code point.
pub const RUNE_MAX: u32 = 0x10FFFF;

const SURROGATE_START: u32 = 0xD800;
const SURROGATE_END: u32 = 0xDFFF;

/// Zero-width assertion kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assertion {
    StartLine,
    EndLine,
    StartText,
    EndText,
    WordBoundary,
    NoWordBoundary,
}

/// A parsed regex. The operator set is closed; everything the surface
/// syntax offers is normalised into these nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Regex {
    /// Matches the empty string.
    Empty,
    /// A run of literal runes. With `fold_case`, ASCII letters are stored
    /// uppercase and match either case.
    Literal { runes: Vec<char>, fold_case: bool },
    /// Sorted, disjoint codepoint ranges.
    Class(Limits),
    /// Any rune.
    AnyChar,
    Assert(Assertion),
    /// Capturing group; captures are discarded, only grouping remains.
    Capture(Box<Regex>),
    /// One or more.
    Plus(Box<Regex>),
    /// Zero or more.
    Star(Box<Regex>),
    /// Zero or one.
    Quest(Box<Regex>),
    /// Counted repetition; `max == None` is unbounded.
    Repeat {
        sub: Box<Regex>,
        min: u32,
        max: Option<u32>,
    },
    Concat(Vec<Regex>),
    Alternate(Vec<Regex>),
}

/// Sort and merge possibly-overlapping ranges into canonical form.
pub fn simplify_ranges(mut ranges: Vec<RunePair>) -> Limits {
    if ranges.is_empty() {
        return ranges;
    }
    ranges.sort_by_key(|p| (p.lo, p.hi));
    let mut out: Limits = Vec::with_capacity(ranges.len());
    for p in ranges {
        match out.last_mut() {
            // Merge overlapping and adjacent ranges.
            Some(last) if p.lo <= last.hi.saturating_add(1) => {
                if p.hi > last.hi {
                    last.hi = p.hi;
                }
            }
            _ => out.push(p),
        }
    }
    out
}

/// Complement a canonical range list over the scalar-value space,
/// skipping the surrogate gap.
pub fn negate_ranges(lim: &[RunePair]) -> Limits {
    let mut out = Vec::new();
    let mut next = 0u32;
    for p in lim {
        if p.lo > next {
            push_minus_surrogates(&mut out, next, p.lo - 1);
        }
        next = p.hi.saturating_add(1);
    }
    if next <= RUNE_MAX {
        push_minus_surrogates(&mut out, next, RUNE_MAX);
    }
    out
}

fn push_minus_surrogates(out: &mut Limits, lo: u32, hi: u32) {
    if lo <= SURROGATE_END && hi >= SURROGATE_START {
        if lo < SURROGATE_START {
            out.push(RunePair {
                lo,
                hi: SURROGATE_START - 1,
            });
        }
        if hi > SURROGATE_END {
            out.push(RunePair {
                lo: SURROGATE_END + 1,
                hi,
            });
        }
    } else {
        out.push(RunePair { lo, hi });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Regex {
        Regex::Literal {
            runes: s.chars().collect(),
            fold_case: false,
        }
    }

    #[test]
    fn test_parse_literal_run() {
        assert_eq!(parse_regex("abc").unwrap(), lit("abc"));
    }

    #[test]
    fn test_parse_alternation() {
        let re = parse_regex("ab|c").unwrap();
        assert_eq!(re, Regex::Alternate(vec![lit("ab"), lit("c")]));
    }

    #[test]
    fn test_parse_postfix_binds_last_rune() {
        // ab* is a(b*), not (ab)*.
        let re = parse_regex("ab*").unwrap();
        assert_eq!(
            re,
            Regex::Concat(vec![lit("a"), Regex::Star(Box::new(lit("b")))])
        );
    }

    #[test]
    fn test_parse_class_merges_ranges() {
        let re = parse_regex("[abc]").unwrap();
        match re {
            Regex::Class(lim) => {
                assert_eq!(lim.len(), 1);
                assert_eq!(lim[0], RunePair { lo: 97, hi: 99 });
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_negated_class_matches_newline() {
        let re = parse_regex("[^a-z]").unwrap();
        match re {
            Regex::Class(lim) => {
                assert!(crate::graph::in_class(&lim, '\n' as u32));
                assert!(!crate::graph::in_class(&lim, 'm' as u32));
                assert!(crate::graph::in_class(&lim, '0' as u32));
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_class_hyphen_at_edges() {
        for pat in ["[a-z-]", "[-a-z]", "[^-a-df-m]"] {
            let re = parse_regex(pat).unwrap();
            match re {
                Regex::Class(lim) => {
                    let has_dash = crate::graph::in_class(&lim, '-' as u32);
                    assert_eq!(has_dash, !pat.starts_with("[^"), "{}", pat);
                }
                other => panic!("expected class for {}, got {:?}", pat, other),
            }
        }
    }

    #[test]
    fn test_parse_counted_repeats() {
        let re = parse_regex("x{2,5}").unwrap();
        assert_eq!(
            re,
            Regex::Repeat {
                sub: Box::new(lit("x")),
                min: 2,
                max: Some(5),
            }
        );
        let re = parse_regex("x{3,}").unwrap();
        assert_eq!(
            re,
            Regex::Repeat {
                sub: Box::new(lit("x")),
                min: 3,
                max: None,
            }
        );
        let re = parse_regex("x{3}").unwrap();
        assert_eq!(
            re,
            Regex::Repeat {
                sub: Box::new(lit("x")),
                min: 3,
                max: Some(3),
            }
        );
    }

    #[test]
    fn test_parse_brace_not_a_repeat_is_literal() {
        assert_eq!(parse_regex("a{b").unwrap(), lit("a{b"));
    }

    #[test]
    fn test_parse_fold_case_stores_uppercase() {
        let re = parse_regex("(?i)ab").unwrap();
        assert_eq!(
            re,
            Regex::Literal {
                runes: vec!['A', 'B'],
                fold_case: true,
            }
        );
    }

    #[test]
    fn test_parse_flag_group_is_scoped() {
        // Fold applies inside the group only.
        let re = parse_regex("(?i:a)b").unwrap();
        assert_eq!(
            re,
            Regex::Concat(vec![
                Regex::Literal {
                    runes: vec!['A'],
                    fold_case: true,
                },
                lit("b"),
            ])
        );
    }

    #[test]
    fn test_parse_anchors_and_word_boundaries() {
        assert_eq!(
            parse_regex("^").unwrap(),
            Regex::Assert(Assertion::StartText)
        );
        assert_eq!(parse_regex("$").unwrap(), Regex::Assert(Assertion::EndText));
        assert_eq!(
            parse_regex("(?m)^").unwrap(),
            Regex::Assert(Assertion::StartLine)
        );
        assert_eq!(
            parse_regex(r"\b").unwrap(),
            Regex::Assert(Assertion::WordBoundary)
        );
        assert_eq!(
            parse_regex(r"\B").unwrap(),
            Regex::Assert(Assertion::NoWordBoundary)
        );
    }

    #[test]
    fn test_parse_quantified_assertion() {
        // Anchors take quantifiers, as in (^*|^^).
        let re = parse_regex("^*").unwrap();
        assert_eq!(
            re,
            Regex::Star(Box::new(Regex::Assert(Assertion::StartText)))
        );
    }

    #[test]
    fn test_parse_empty_branches() {
        let re = parse_regex("a|").unwrap();
        assert_eq!(re, Regex::Alternate(vec![lit("a"), Regex::Empty]));
        assert_eq!(parse_regex("").unwrap(), Regex::Empty);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_regex("(a").is_err());
        assert!(parse_regex("a)").is_err());
        assert!(parse_regex("[a").is_err());
        assert!(parse_regex("[z-a]").is_err());
        assert!(parse_regex("*a").is_err());
        assert!(parse_regex(r"\q").is_err());
        assert!(parse_regex("x{5,2}").is_err());
    }

    #[test]
    fn test_parse_rejects_unsupported_operators() {
        assert!(parse_regex("(?=a)").is_err());
        assert!(parse_regex("(?!a)").is_err());
        assert!(parse_regex("(?<=a)").is_err());
        assert!(parse_regex(r"(a)\1").is_err());
        assert!(parse_regex(r"\p{L}").is_err());
    }

    #[test]
    fn test_parse_escaped_delimiter() {
        // The source parser leaves the backslash in front of an escaped
        // delimiter; it must read as the plain punctuation rune.
        assert_eq!(parse_regex(r"a\/").unwrap(), lit("a/"));
        assert_eq!(parse_regex(r"b\_").unwrap(), lit("b_"));
    }

    #[test]
    fn test_simplify_ranges_merges_overlap() {
        let out = simplify_ranges(vec![
            RunePair { lo: 97, hi: 99 },
            RunePair { lo: 98, hi: 100 },
        ]);
        assert_eq!(out, vec![RunePair { lo: 97, hi: 100 }]);
    }

    #[test]
    fn test_negate_ranges_skips_surrogates() {
        let out = negate_ranges(&[RunePair { lo: 97, hi: 122 }]);
        assert!(!out
            .iter()
            .any(|p| p.lo <= 0xDFFF && p.hi >= 0xD800));
        assert!(out.iter().any(|p| p.lo == 123));
    }
}
