//! Regex AST → ε-NFA construction.
//!
//! Every rule in a scope contributes one sub-NFA; a shared root state has
//! an ε-edge to each sub-NFA's start, and each sub-NFA's end carries the
//! rule's id as its accept label. We cannot make the alphabet all of
//! Unicode, so the DFA stage later partitions each scope's runes into
//! singles, fractured ranges and a wild element; this stage only records
//! runes, classes and wildcards on the edges.

use thiserror::Error;

use super::{
    Graph, Node, A_END_LINE, A_END_TEXT, A_NO_WORD_BOUNDARY, A_START_LINE, A_START_TEXT,
    A_WORD_BOUNDARY,
};
use crate::regex::{parse_regex, Assertion, Regex, RegexError};

/// One rule as the NFA builder sees it: a pattern and a stable id that
/// becomes the accept label.
pub trait Expression {
    fn regex(&self) -> &str;
    fn id(&self) -> i32;
}

/// A rule pattern that failed to parse. Carries the offending rule's id
/// so the caller can map the error back to a source position.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct NfaError {
    pub rule_id: i32,
    pub source: RegexError,
}

/// Build one scope's NFA from its rules. Node 0 of the result is the
/// shared start state; unreachable construction debris is compacted away.
pub fn build_nfa<E: Expression>(expressions: &[E]) -> Result<Vec<Node>, NfaError> {
    let mut b = NfaBuilder {
        graph: Graph::new(),
    };
    let root = b.graph.new_node();
    for x in expressions {
        let re = parse_regex(x.regex()).map_err(|source| NfaError {
            rule_id: x.id(),
            source,
        })?;
        let sub = b.build(&re);
        b.graph.nodes[sub.end as usize].accept = x.id();
        b.graph.new_nil_edge(root, sub.start);
    }
    Ok(b.graph.compact(root))
}

struct SubNfa {
    start: i32,
    end: i32,
}

struct NfaBuilder {
    graph: Graph,
}

impl NfaBuilder {
    fn new_sub_nfa(&mut self) -> SubNfa {
        SubNfa {
            start: self.graph.new_node(),
            end: self.graph.new_node(),
        }
    }

    fn build(&mut self, re: &Regex) -> SubNfa {
        match re {
            Regex::Empty => {
                let nfa = self.new_sub_nfa();
                self.graph.new_nil_edge(nfa.start, nfa.end);
                nfa
            }
            Regex::Literal { runes, fold_case } => {
                let start = self.graph.new_node();
                let mut cur_end = start;
                for &r in runes {
                    let n = self.graph.new_node();
                    self.graph.new_rune_edge(cur_end, n, r);
                    if *fold_case && r.is_ascii_uppercase() {
                        self.graph.new_rune_edge(cur_end, n, r.to_ascii_lowercase());
                    }
                    cur_end = n;
                }
                SubNfa {
                    start,
                    end: cur_end,
                }
            }
            Regex::Class(lim) => {
                let nfa = self.new_sub_nfa();
                self.graph.new_class_edge(nfa.start, nfa.end, lim.clone());
                nfa
            }
            Regex::AnyChar => {
                let nfa = self.new_sub_nfa();
                self.graph.new_wild_edge(nfa.start, nfa.end);
                nfa
            }
            Regex::Assert(a) => {
                let nfa = self.new_sub_nfa();
                let mask = match a {
                    Assertion::StartText => A_START_TEXT,
                    Assertion::EndText => A_END_TEXT,
                    Assertion::StartLine => A_START_LINE,
                    Assertion::EndLine => A_END_LINE,
                    Assertion::WordBoundary => A_WORD_BOUNDARY,
                    Assertion::NoWordBoundary => A_NO_WORD_BOUNDARY,
                };
                self.graph.new_assert_edge(nfa.start, nfa.end, mask);
                nfa
            }
            // Captures are discarded; only the grouping matters.
            Regex::Capture(sub) => self.build(sub),
            Regex::Plus(sub) => {
                let nfa = self.build(sub);
                self.graph.new_nil_edge(nfa.end, nfa.start);
                nfa
            }
            Regex::Star(sub) => self.build_star(sub),
            Regex::Quest(sub) => {
                let nfa = self.build(sub);
                self.graph.new_nil_edge(nfa.start, nfa.end);
                nfa
            }
            Regex::Repeat { sub, min, max } => {
                // A {0,} that escaped simplification is just a star.
                if *min == 0 && max.is_none() {
                    return self.build_star(sub);
                }
                let nfa = self.new_sub_nfa();
                let mut prev_end = nfa.start;
                let mut last_start = nfa.start;
                for _ in 0..*min {
                    let r = self.build(sub);
                    self.graph.new_nil_edge(prev_end, r.start);
                    last_start = r.start;
                    prev_end = r.end;
                }
                self.graph.new_nil_edge(prev_end, nfa.end);
                match max {
                    None => self.graph.new_nil_edge(prev_end, last_start),
                    Some(max) => {
                        for _ in 0..(max - min) {
                            let r = self.build(sub);
                            self.graph.new_nil_edge(prev_end, r.start);
                            self.graph.new_nil_edge(r.end, nfa.end);
                            prev_end = r.end;
                        }
                    }
                }
                nfa
            }
            Regex::Concat(subs) => {
                let start = self.graph.new_node();
                let mut cur = start;
                for s in subs {
                    let nfa = self.build(s);
                    self.graph.new_nil_edge(cur, nfa.start);
                    cur = nfa.end;
                }
                SubNfa { start, end: cur }
            }
            Regex::Alternate(subs) => {
                let nfa = self.new_sub_nfa();
                for s in subs {
                    let sub = self.build(s);
                    self.graph.new_nil_edge(nfa.start, sub.start);
                    self.graph.new_nil_edge(sub.end, nfa.end);
                }
                nfa
            }
        }
    }

    fn build_star(&mut self, sub: &Regex) -> SubNfa {
        let nfa = self.build(sub);
        self.graph.new_nil_edge(nfa.end, nfa.start);
        // Entering at the end node also matches the empty string.
        SubNfa {
            start: nfa.end,
            end: nfa.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{write_dot_graph, EdgeKind};

    struct Expr {
        regex: &'static str,
        id: i32,
    }

    impl Expression for Expr {
        fn regex(&self) -> &str {
            self.regex
        }
        fn id(&self) -> i32 {
            self.id
        }
    }

    #[test]
    fn test_literal_chain_dot() {
        let nodes = build_nfa(&[Expr {
            regex: "ab",
            id: 1,
        }])
        .unwrap();
        let mut dot = String::new();
        write_dot_graph(&mut dot, &nodes, "NFA_0");
        assert_eq!(
            dot,
            "digraph NFA_0 {\n  0[shape=box];\n  0 -> 1;\n  1 -> 2[label=\"a\"];\n  2 -> 3[label=\"b\"];\n  3[style=filled,color=green];\n}\n"
        );
    }

    #[test]
    fn test_one_accept_per_rule() {
        let exprs = [
            Expr {
                regex: "[a-z]+",
                id: 3,
            },
            Expr {
                regex: "foo|bar",
                id: 7,
            },
        ];
        let nodes = build_nfa(&exprs).unwrap();
        let mut accepts: Vec<i32> = nodes
            .iter()
            .filter(|n| n.accept >= 0)
            .map(|n| n.accept)
            .collect();
        accepts.sort_unstable();
        assert_eq!(accepts, vec![3, 7]);
        // The shared start has one ε-edge per rule.
        assert_eq!(nodes[0].edges.len(), 2);
        assert!(nodes[0]
            .edges
            .iter()
            .all(|e| e.kind == EdgeKind::Nil));
    }

    #[test]
    fn test_fold_case_adds_lowercase_edge() {
        let nodes = build_nfa(&[Expr {
            regex: "(?i)a",
            id: 1,
        }])
        .unwrap();
        let runes: Vec<char> = nodes
            .iter()
            .flat_map(|n| n.edges.iter())
            .filter_map(|e| match e.kind {
                EdgeKind::Rune(r) => Some(r),
                _ => None,
            })
            .collect();
        assert!(runes.contains(&'a') && runes.contains(&'A'));
    }

    #[test]
    fn test_star_matches_empty_at_entry() {
        // The star entry node is its own accept-reachable end.
        let nodes = build_nfa(&[Expr {
            regex: "a*",
            id: 1,
        }])
        .unwrap();
        // Root ε-edge leads directly to the accepting node.
        let first = &nodes[nodes[0].edges[0].dst as usize];
        assert_eq!(first.accept, 1);
    }

    #[test]
    fn test_bad_regex_propagates() {
        assert!(build_nfa(&[Expr {
            regex: "(a",
            id: 1,
        }])
        .is_err());
    }
}
