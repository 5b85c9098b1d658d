//! Nex source parser.
//!
//! Grammar:
//!
//! ```text
//! ROOT:
//!     (1) EXP-LIST EMPTY-REGEXP USER-CODE
//!     (2) SUB-EXP USER-CODE
//!
//! EXP:      REGEXP CODE | REGEXP SUB-EXP
//! SUB-EXP:  '<' CODE EXP-LIST '>' CODE
//! REGEXP:   DELIM expression DELIM
//! CODE:     one line of code | '{' multi line code '}'
//! ```
//!
//! A regex is bracketed by its leading non-space rune; the same rune ends
//! it unless preceded by a backslash. An empty regex (`//`) at top level
//! ends the rules; the remainder of the file is user code. Parsing is
//! all-or-nothing: the first error aborts with its line:column.

use crate::graph::{build_dfa, build_nfa, write_dot_graph, Expression, Node};
use crate::{NexError, ParseErrorKind};

/// One node of the rule tree. The root (id 0) has no regex and owns the
/// top-level rules; leaf rules keep their action in `start_code`. A
/// node's `nfa`/`dfa` are the automata of its children's scope.
#[derive(Debug, Default)]
pub struct NexProgram {
    pub id: i32,
    pub regex: String,
    /// Source position of the regex's first rune; regexes cannot span
    /// lines, so an in-pattern offset added to `col` is an exact column.
    pub line: usize,
    pub col: usize,
    pub start_code: String,
    pub end_code: String,
    pub user_code: String,
    pub children: Vec<NexProgram>,
    pub nfa: Vec<Node>,
    pub dfa: Vec<Node>,
}

impl Expression for NexProgram {
    fn regex(&self) -> &str {
        &self.regex
    }
    fn id(&self) -> i32 {
        self.id
    }
}

impl NexProgram {
    /// Append the DOT form of every scope's NFA, named `NFA_<id>` after
    /// the owning rule (`NFA_0` is the root scope).
    pub fn write_nfa_dot(&self, out: &mut String) {
        if self.nfa.is_empty() {
            return;
        }
        write_dot_graph(out, &self.nfa, &format!("NFA_{}", self.id));
        for child in &self.children {
            child.write_nfa_dot(out);
        }
    }

    /// Append the DOT form of every scope's DFA, named `DFA_<id>`.
    pub fn write_dfa_dot(&self, out: &mut String) {
        if self.dfa.is_empty() {
            return;
        }
        write_dot_graph(out, &self.dfa, &format!("DFA_{}", self.id));
        for child in &self.children {
            child.write_dfa_dot(out);
        }
    }
}

/// Parse a Nex source file and compile every scope's NFA and DFA.
pub fn parse_nex(source: &str) -> Result<NexProgram, NexError> {
    let mut p = Parser::new(source);
    let mut program = p.parse_root()?;
    gen_graphs(&mut program)?;
    Ok(program)
}

fn gen_graphs(node: &mut NexProgram) -> Result<(), NexError> {
    if node.children.is_empty() {
        return Ok(());
    }
    // A bad pattern reports the file position of the offending rune: the
    // owning rule's recorded start plus the in-pattern offset.
    node.nfa = build_nfa(&node.children).map_err(|e| {
        let (line, col) = node
            .children
            .iter()
            .find(|c| c.id == e.rule_id)
            .map_or((0, 0), |c| (c.line, c.col + e.source.offset));
        NexError::Regex {
            line,
            col,
            source: e.source,
        }
    })?;
    node.dfa = build_dfa(&node.nfa);
    for kid in &mut node.children {
        gen_graphs(kid)?;
    }
    Ok(())
}

struct Parser {
    chars: Vec<char>,
    index: usize,
    line: usize,
    col: usize,
    char_count: usize,
    r: char,
    is_unread: bool,
}

fn is_space(r: char) -> bool {
    matches!(r, ' ' | '\n' | '\t' | '\r')
}

fn trim_spaces(buf: &[char]) -> &[char] {
    let mut s = 0;
    while s < buf.len() && is_space(buf[s]) {
        s += 1;
    }
    if s == buf.len() {
        return &[];
    }
    let mut e = buf.len() - 1;
    while e > s && is_space(buf[e]) {
        e -= 1;
    }
    &buf[s..=e]
}

impl Parser {
    fn new(source: &str) -> Parser {
        Parser {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            col: 0,
            char_count: 0,
            r: '\0',
            is_unread: false,
        }
    }

    fn err(&self, kind: ParseErrorKind) -> NexError {
        NexError::Parse {
            line: self.line,
            col: self.col,
            kind,
        }
    }

    /// Advance to the next rune; false at end of input.
    fn read(&mut self) -> bool {
        if self.is_unread {
            self.is_unread = false;
            return true;
        }
        let Some(&r) = self.chars.get(self.index) else {
            return false;
        };
        self.index += 1;
        self.r = r;
        self.char_count += 1;
        if r == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        true
    }

    fn unread(&mut self) {
        self.is_unread = true;
    }

    fn read_next_non_ws(&mut self) -> bool {
        while self.read() {
            if !is_space(self.r) {
                return true;
            }
        }
        false
    }

    fn must_read_next_non_ws(&mut self) -> Result<(), NexError> {
        if self.read_next_non_ws() {
            Ok(())
        } else {
            Err(self.err(ParseErrorKind::UnexpectedEof))
        }
    }

    fn read_remaining(&mut self) -> String {
        let mut buf = Vec::new();
        let mut ok = self.read_next_non_ws();
        while ok {
            buf.push(self.r);
            ok = self.read();
        }
        let mut out: String = trim_spaces(&buf).iter().collect();
        out.push('\n');
        out
    }

    /// One code block: either `{ ... }` with balanced braces (possibly
    /// spanning lines) or a single line. One outer brace pair is
    /// stripped; non-empty blocks come back newline-terminated.
    fn read_code(&mut self) -> Result<String, NexError> {
        let mut nesting = 0i32;
        let mut buf: Vec<char> = Vec::new();
        self.must_read_next_non_ws()?;
        let mut ok = true;
        while ok && (self.r != '\n' || nesting > 0) {
            buf.push(self.r);
            match self.r {
                '{' => nesting += 1,
                '}' => {
                    nesting -= 1;
                    if nesting < 0 {
                        return Err(self.err(ParseErrorKind::UnmatchedRBrace));
                    }
                }
                _ => {}
            }
            ok = self.read();
        }
        if nesting > 0 {
            return Err(self.err(ParseErrorKind::UnmatchedLBrace));
        }
        let mut trimmed = trim_spaces(&buf);
        if trimmed.is_empty() {
            return Ok(String::new());
        }
        if trimmed[0] == '{' && trimmed[trimmed.len() - 1] == '}' {
            trimmed = trim_spaces(&trimmed[1..trimmed.len() - 1]);
        }
        if trimmed.is_empty() {
            return Ok(String::new());
        }
        let mut out: String = trimmed.iter().collect();
        out.push('\n');
        Ok(out)
    }

    /// The regex between two `delim` runes. A backslash keeps the next
    /// rune (including the delimiter) in the pattern. End of input before
    /// the closing delimiter names the delimiter, not a generic EOF.
    fn read_regex(&mut self, delim: char) -> Result<NexProgram, NexError> {
        // The cursor sits on the opening delimiter.
        let line = self.line;
        let col = self.col + 1;
        let mut regex: Vec<char> = Vec::new();
        let mut is_escape = false;
        if !self.read() {
            return Err(self.err(ParseErrorKind::UnmatchedDelimiter));
        }
        while self.r != delim || is_escape {
            if self.r == '\n' {
                return Err(self.err(ParseErrorKind::UnexpectedNewline));
            }
            is_escape = self.r == '\\';
            regex.push(self.r);
            if !self.read() {
                return Err(self.err(ParseErrorKind::UnmatchedDelimiter));
            }
        }
        Ok(NexProgram {
            // The rune offset doubles as the rule id: stable, unique, and
            // strictly increasing in source order.
            id: self.char_count as i32,
            regex: regex.iter().collect(),
            line,
            col,
            ..Default::default()
        })
    }

    fn is_next_sub_exp(&mut self) -> Result<bool, NexError> {
        self.must_read_next_non_ws()?;
        if self.r == '<' {
            Ok(true)
        } else {
            self.unread();
            Ok(false)
        }
    }

    fn parse_root(&mut self) -> Result<NexProgram, NexError> {
        let mut node = NexProgram::default();
        if self.is_next_sub_exp()? {
            self.parse_sub_exp(&mut node)?;
        } else {
            node.children = self.parse_exp_list(false)?;
        }
        node.user_code = self.read_remaining();
        Ok(node)
    }

    fn parse_sub_exp(&mut self, node: &mut NexProgram) -> Result<(), NexError> {
        node.start_code = self.read_code()?;
        node.children = self.parse_exp_list(true)?;
        node.end_code = self.read_code()?;
        Ok(())
    }

    fn parse_exp_list(&mut self, is_sub_exp: bool) -> Result<Vec<NexProgram>, NexError> {
        let mut items = Vec::new();
        loop {
            if !self.read_next_non_ws() {
                // Inside a sub-scope the missing terminator is a '>'.
                return Err(self.err(if is_sub_exp {
                    ParseErrorKind::UnmatchedLAngle
                } else {
                    ParseErrorKind::UnexpectedEof
                }));
            }
            if is_sub_exp && self.r == '>' {
                break;
            }
            let child = self.read_regex(self.r)?;
            if !is_sub_exp && child.regex.is_empty() {
                break;
            }
            items.push(self.parse_exp(child)?);
        }
        Ok(items)
    }

    fn parse_exp(&mut self, mut child: NexProgram) -> Result<NexProgram, NexError> {
        if self.is_next_sub_exp()? {
            self.parse_sub_exp(&mut child)?;
        } else {
            child.start_code = self.read_code()?;
        }
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_rules() {
        let program = parse_nex("/abc/ { one() }\n/def/ two()\n//\nfn main() {}\n").unwrap();
        assert_eq!(program.id, 0);
        assert_eq!(program.children.len(), 2);
        assert_eq!(program.children[0].regex, "abc");
        assert_eq!(program.children[0].start_code, "one()\n");
        assert_eq!(program.children[1].regex, "def");
        assert_eq!(program.children[1].start_code, "two()\n");
        assert_eq!(program.user_code, "fn main() {}\n");
        assert!(!program.dfa.is_empty());
    }

    #[test]
    fn test_rule_ids_increase_in_source_order() {
        let program = parse_nex("/a/ x()\n/b/ y()\n/c/ z()\n//\nmain\n").unwrap();
        let ids: Vec<i32> = program.children.iter().map(|c| c.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids: {:?}", ids);
        assert!(ids[0] > program.id);
    }

    #[test]
    fn test_parse_nested_scope() {
        let src = "/a[bc]*/ < { enter() }\n  /b/ { b() }\n  /c/ { c() }\n> { leave() }\n//\nmain\n";
        let program = parse_nex(src).unwrap();
        assert_eq!(program.children.len(), 1);
        let outer = &program.children[0];
        assert_eq!(outer.regex, "a[bc]*");
        assert_eq!(outer.start_code, "enter()\n");
        assert_eq!(outer.end_code, "leave()\n");
        assert_eq!(outer.children.len(), 2);
        assert!(!outer.dfa.is_empty(), "nested scope must compile its DFA");
        assert!(outer.children[0].id > outer.id);
    }

    #[test]
    fn test_parse_root_scope() {
        let src = "< { setup() }\n  /x/ { x() }\n> { teardown() }\nmain\n";
        let program = parse_nex(src).unwrap();
        assert_eq!(program.start_code, "setup()\n");
        assert_eq!(program.end_code, "teardown()\n");
        assert_eq!(program.children.len(), 1);
        assert_eq!(program.user_code, "main\n");
    }

    #[test]
    fn test_code_block_brace_stripping() {
        let program = parse_nex("/a/ {\n  stmt1();\n  stmt2();\n}\n//\nmain\n").unwrap();
        assert_eq!(program.children[0].start_code, "stmt1();\n  stmt2();\n");
    }

    #[test]
    fn test_code_block_nested_braces_survive() {
        let program = parse_nex("/a/ { if x { y() } }\n//\nmain\n").unwrap();
        assert_eq!(program.children[0].start_code, "if x { y() }\n");
    }

    #[test]
    fn test_alternate_delimiters() {
        let program = parse_nex("_b\\__ { one() }\n\"x\" { two() }\n//\nmain\n").unwrap();
        assert_eq!(program.children[0].regex, "b\\_");
        assert_eq!(program.children[1].regex, "x");
    }

    #[test]
    fn test_escaped_delimiter_stays_in_regex() {
        let program = parse_nex("/a\\// { one() }\n//\nmain\n").unwrap();
        assert_eq!(program.children[0].regex, "a\\/");
    }

    #[test]
    fn test_newline_in_regex_is_fatal() {
        let err = parse_nex("/ab\ncd/ { one() }\n//\nmain\n").unwrap_err();
        assert!(matches!(
            err,
            NexError::Parse {
                kind: ParseErrorKind::UnexpectedNewline,
                ..
            }
        ));
    }

    #[test]
    fn test_unmatched_braces() {
        let err = parse_nex("/a/ { open(\n//\nmain\n").unwrap_err();
        assert!(matches!(
            err,
            NexError::Parse {
                kind: ParseErrorKind::UnmatchedLBrace,
                ..
            }
        ));
        let err = parse_nex("/a/ x() }\n//\nmain\n").unwrap_err();
        assert!(matches!(
            err,
            NexError::Parse {
                kind: ParseErrorKind::UnmatchedRBrace,
                ..
            }
        ));
    }

    #[test]
    fn test_eof_without_terminator() {
        let err = parse_nex("/a/ { one() }\n").unwrap_err();
        assert!(matches!(
            err,
            NexError::Parse {
                kind: ParseErrorKind::UnexpectedEof,
                ..
            }
        ));
    }

    #[test]
    fn test_error_carries_position() {
        let err = parse_nex("/a/ { one() }\n/b\nc/ x\n//\nmain\n").unwrap_err();
        let NexError::Parse { line, .. } = err else {
            panic!("expected parse error, got {:?}", err);
        };
        assert_eq!(line, 3);
    }

    #[test]
    fn test_bad_rule_regex_fails_compile_with_position() {
        // The '(' of the bad pattern sits at line 1, column 2.
        let err = parse_nex("/(a/ { one() }\n//\nmain\n").unwrap_err();
        let NexError::Regex { line, col, .. } = err else {
            panic!("expected regex error, got {:?}", err);
        };
        assert_eq!((line, col), (1, 2));

        // A later rule reports its own line, offset by the bad rune.
        let err = parse_nex("/x/ a()\n/[z-a]/ b()\n//\nmain\n").unwrap_err();
        assert!(err.to_string().starts_with("2:2: "), "{}", err);
        let NexError::Regex { line, col, source } = err else {
            panic!("expected regex error, got {:?}", err);
        };
        assert_eq!((line, col), (2, 2));
        assert!(source.message.contains("bad range"));
    }

    #[test]
    fn test_unterminated_scope_names_the_angle() {
        let err = parse_nex("/a[bc]*/ < { s() }\n  /b/ { b() }\n").unwrap_err();
        assert!(matches!(
            err,
            NexError::Parse {
                kind: ParseErrorKind::UnmatchedLAngle,
                ..
            }
        ));
    }

    #[test]
    fn test_unterminated_regex_names_the_delimiter() {
        let err = parse_nex("/abc").unwrap_err();
        assert!(matches!(
            err,
            NexError::Parse {
                kind: ParseErrorKind::UnmatchedDelimiter,
                ..
            }
        ));
        // A rule cut off right after its opening delimiter, same thing.
        let err = parse_nex("/ok/ a()\n/").unwrap_err();
        assert!(matches!(
            err,
            NexError::Parse {
                kind: ParseErrorKind::UnmatchedDelimiter,
                ..
            }
        ));
    }

    #[test]
    fn test_dot_output_names_scopes_by_rule_id() {
        let src = "/a[bc]*/ < { s() }\n  /b/ { b() }\n> { e() }\n//\nmain\n";
        let program = parse_nex(src).unwrap();
        let mut dot = String::new();
        program.write_nfa_dot(&mut dot);
        assert!(dot.contains("digraph NFA_0"));
        assert!(dot.contains(&format!("digraph NFA_{}", program.children[0].id)));
        let mut dot = String::new();
        program.write_dfa_dot(&mut dot);
        assert!(dot.starts_with("digraph DFA_0"));
    }
}
