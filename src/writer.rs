//! Code emission.
//!
//! Two halves: `compile_dfa` lowers the graph DFAs into the runtime
//! tables the scanner drives, and `LexerBuilder` writes the generated
//! program — the runtime template (this crate's `lexer.rs`, split on its
//! marker comments, the way the original embeds its template), the rule
//! dispatch, the user code, and the tables as Rust literals.
//!
//! Prefix substitution (`-p`) rewrites `yy`/`Yy` in template and
//! scaffold text only; user code is always written verbatim.

use std::fmt::Write as _;

use crate::graph::{EdgeKind, Node};
use crate::lexer::{Dfa, DfaState};
use crate::parser::NexProgram;

const LEXER_TEMPLATE: &str = include_str!("lexer.rs");

const PREAMBLE_MARKER: &str = "// [PREAMBLE PLACEHOLDER]";
const LEX_METHOD_MARKER: &str = "// [LEX METHOD PLACEHOLDER]";
const LEX_IMPL_MARKER: &str = "// [LEX IMPLEMENTATION PLACEHOLDER]";
const ERROR_METHOD_MARKER: &str = "// [ERROR METHOD PLACEHOLDER]";
const SUFFIX_MARKER: &str = "// [SUFFIX PLACEHOLDER]";

/// The macro name standalone mode substitutes in user code.
pub const FUN_MACRO: &str = "NN_FUN";

struct TemplateParts {
    lexer_code: &'static str,
    lex_intro: &'static str,
    lex_outro: &'static str,
    error_method: &'static str,
}

fn template_parts() -> TemplateParts {
    fn between(s: &'static str, a: &str, b: &str) -> &'static str {
        let start = s.find(a).expect("template marker present") + a.len();
        let end = s.find(b).expect("template marker present");
        &s[start..end]
    }
    TemplateParts {
        lexer_code: between(LEXER_TEMPLATE, PREAMBLE_MARKER, LEX_METHOD_MARKER),
        lex_intro: between(LEXER_TEMPLATE, LEX_METHOD_MARKER, LEX_IMPL_MARKER),
        lex_outro: between(LEXER_TEMPLATE, LEX_IMPL_MARKER, ERROR_METHOD_MARKER),
        error_method: between(LEXER_TEMPLATE, ERROR_METHOD_MARKER, SUFFIX_MARKER),
    }
}

/// Lower one scope's graph DFA (and, recursively, the scopes of its
/// children) into the runtime's table form.
pub fn compile_dfa(node: &NexProgram) -> Dfa {
    Dfa {
        states: node.dfa.iter().map(compile_state).collect(),
        nest: node
            .children
            .iter()
            .filter(|c| !c.children.is_empty())
            .map(|c| (c.id, compile_dfa(c)))
            .collect(),
    }
}

fn compile_state(n: &Node) -> DfaState {
    let mut st = DfaState {
        accept: n.accept,
        wild: -1,
        ..Default::default()
    };
    for e in &n.edges {
        match &e.kind {
            EdgeKind::Rune(r) => st.singles.push((*r, e.dst)),
            EdgeKind::Class(lim) => {
                for p in lim {
                    st.ranges.push((p.lo, p.hi, e.dst));
                }
            }
            EdgeKind::Assert(a) => {
                st.assert_edges.push((*a, e.dst));
                st.assert_mask |= a;
            }
            EdgeKind::Wild => st.wild = e.dst,
            EdgeKind::Nil => {}
        }
    }
    // The runtime binary-searches singles.
    st.singles.sort_by_key(|&(r, _)| r);
    st
}

/// Writes a generated lexer program.
#[derive(Debug, Default)]
pub struct LexerBuilder {
    pub standalone: bool,
    pub custom_error: bool,
    pub custom_prefix: String,
}

impl LexerBuilder {
    /// Produce the complete generated source for a parsed program.
    pub fn dump_lexer(&self, program: &NexProgram) -> String {
        let parts = template_parts();
        let mut out = String::new();

        let args: Vec<String> = std::env::args().collect();
        let _ = writeln!(
            out,
            "// Code generated by {} --- DO NOT EDIT.",
            args.join(" ")
        );
        out.push_str(
            "#![allow(dead_code, unused_imports, unused_variables, unused_mut, unreachable_code)]\n",
        );
        out.push_str(&self.replace(parts.lexer_code));

        if !self.standalone {
            if !self.custom_error {
                out.push_str(&self.replace(parts.error_method));
            }
            out.push_str(&self.replace(parts.lex_intro));
            self.write_family(&mut out, program, 0);
            out.push_str(parts.lex_outro);
            out.push_str(&program.user_code);
        } else {
            let mut user = program.user_code.as_str();
            while let Some(i) = user.find(FUN_MACRO) {
                out.push_str(&user[..i]);
                self.write_nn_fun(&mut out, program);
                user = &user[i + FUN_MACRO.len()..];
            }
            out.push_str(user);
        }

        self.write_program_dfa(&mut out, program);
        out
    }

    fn replace(&self, s: &str) -> String {
        if self.custom_prefix.is_empty() {
            return s.to_string();
        }
        let mut upper = self.custom_prefix.clone();
        if let Some(first) = upper.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        s.replace("yy", &self.custom_prefix).replace("Yy", &upper)
    }

    fn scaffold(&self, out: &mut String, s: &str) {
        out.push_str(&self.replace(s));
    }

    /// One scope's dispatch: start code behind the stale guard, a
    /// labelled loop matching on rule ids, nested scopes one level
    /// deeper, then pop and end code. Scaffold text goes through the
    /// prefix replacer; action code never does.
    fn write_family(&self, out: &mut String, node: &NexProgram, lvl: usize) {
        if !node.start_code.is_empty() {
            self.scaffold(out, "if !yylex.is_stale() {\n");
            out.push_str(&node.start_code);
            self.scaffold(out, "}\n");
        }
        self.scaffold(out, &format!("'outer_{}_{}: loop {{\n", node.id, lvl));
        self.scaffold(out, &format!("    match yylex.next({}) {{\n", lvl));
        for child in &node.children {
            self.scaffold(out, &format!("    {} => {{\n", child.id));
            if !child.children.is_empty() {
                self.write_family(out, child, lvl + 1);
            } else {
                out.push_str(&child.start_code);
            }
            self.scaffold(out, "    }\n");
        }
        self.scaffold(out, &format!("    _ => break 'outer_{}_{},\n", node.id, lvl));
        self.scaffold(out, "    }\n}\n");
        self.scaffold(out, "yylex.pop();\n");
        out.push_str(&node.end_code);
        out.push('\n');
    }

    fn write_nn_fun(&self, out: &mut String, root: &NexProgram) {
        self.scaffold(out, "(|yylex: &mut Lexer| {\n");
        self.write_family(out, root, 0);
        self.scaffold(out, "})");
    }

    fn write_program_dfa(&self, out: &mut String, program: &NexProgram) {
        self.scaffold(out, "\nfn yy_program_dfa() -> Dfa {\n");
        out.push_str("    ");
        write_dfa_literal(out, &compile_dfa(program), program, 1);
        out.push_str("\n}\n");
    }
}

fn write_dfa_literal(out: &mut String, dfa: &Dfa, node: &NexProgram, indent: usize) {
    let pad = "    ".repeat(indent);
    out.push_str("Dfa {\n");
    let _ = writeln!(out, "{pad}    states: vec![");
    for st in &dfa.states {
        write_state_literal(out, st, &format!("{pad}        "));
    }
    let _ = writeln!(out, "{pad}    ],");
    if dfa.nest.is_empty() {
        let _ = writeln!(out, "{pad}    nest: vec![],");
    } else {
        let _ = writeln!(out, "{pad}    nest: vec![");
        for (id, sub) in &dfa.nest {
            let child = node
                .children
                .iter()
                .find(|c| c.id == *id)
                .expect("nested dfa belongs to a child rule");
            let _ = writeln!(out, "{pad}        // /{}/", child.regex);
            let _ = write!(out, "{pad}        ({}, ", id);
            write_dfa_literal(out, sub, child, indent + 2);
            out.push_str("),\n");
        }
        let _ = writeln!(out, "{pad}    ],");
    }
    let _ = write!(out, "{pad}}}");
}

fn write_state_literal(out: &mut String, st: &DfaState, pad: &str) {
    let _ = write!(
        out,
        "{pad}DfaState {{ accept: {}, assert_mask: {}, assert_edges: vec![",
        st.accept, st.assert_mask
    );
    for (m, d) in &st.assert_edges {
        let _ = write!(out, "({}, {}), ", m, d);
    }
    out.push_str("], singles: vec![");
    for (r, d) in &st.singles {
        let _ = write!(out, "({:?}, {}), ", r, d);
    }
    out.push_str("], ranges: vec![");
    for (lo, hi, d) in &st.ranges {
        let _ = write!(out, "({}, {}, {}), ", lo, hi, d);
    }
    let _ = writeln!(out, "], wild: {} }},", st.wild);
}
