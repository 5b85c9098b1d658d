//! NFA → DFA subset construction.
//!
//! A DFA state stands for a subset of NFA nodes. The subset key erases
//! "all-nil" NFA nodes (non-accepting, only ε out-edges) so that subsets
//! differing only in such nodes collapse to one canonical state. The
//! state's accept label is the minimum rule id among accepting members,
//! which is what enforces rule precedence on equal-length matches.
//!
//! Zero-width assertions ride along as extra transitions: for every
//! non-empty subset of the assertion masks reachable from a state, the
//! builder adds one assert-edge whose closure follows ε-edges and any
//! assert-edge intersecting that subset.
//!
//! The dead state has id -1 and is the target of every transition whose
//! closure is empty; the DFA is total by construction.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::{append_limits, in_class, Asserts, EdgeKind, Graph, Limits, Node};

const NOT_SET: u8 = 0;
const NOT_ACCEPTING: u8 = 1;
const ACCEPTING: u8 = 2;

/// Per-node membership flags for one candidate subset. The flag value
/// records whether the node may contribute its accept label: nodes a
/// state starts from before an assert transition do not, nodes reached
/// through closure do.
type FlagSet = Vec<u8>;

#[derive(Clone, PartialEq, Eq, Hash)]
struct StKey {
    bits: Vec<u64>,
    accept: i32,
}

/// Subset-construct the DFA for one scope's NFA. States are numbered in
/// registration order from 0 (the ε-closure of the NFA start).
pub fn build_dfa(nfa: &[Node]) -> Vec<Node> {
    let mut b = DfaBuilder {
        nfa,
        graph: Graph::new(),
        all_nil: Vec::new(),
        tab: FxHashMap::default(),
        todo: Vec::new(),
    };
    b.construct_all_nil_list();

    // The node of no return: empty subsets resolve to the dead state.
    let mut empty = b.new_empty_st();
    let dead_key = b.make_st_key(&mut empty);
    b.tab.insert(dead_key, -1);

    // The alphabet is computed once per scope: every rune literal and
    // class-range boundary anywhere in the NFA.
    let (alphabet, lim) = scope_alphabet(nfa);

    // State 0 is the nil-closure of the NFA start node.
    let mut start = b.set_to_st(&[0], ACCEPTING);
    b.get(&mut start);

    while let Some(v) = b.todo.pop() {
        let set = b.graph.nodes[v as usize].set.clone();
        let all_asserts = b.get_assert_subsets(&set);

        for a in all_asserts {
            let dst = b.get_assert_with_closure(&set, a);
            b.graph.new_assert_edge(v, dst, a);
        }

        for &r in &alphabet {
            let dst = b.get_matching(&set, |kind| match kind {
                EdgeKind::Rune(er) => *er == r,
                EdgeKind::Wild => true,
                EdgeKind::Class(lim) => in_class(lim, r as u32),
                _ => false,
            });
            b.graph.new_rune_edge(v, dst, r);
        }

        for p in &lim {
            // Ranges are disjoint, so membership of the low bound decides
            // the whole range.
            let lo = p.lo;
            let dst = b.get_matching(&set, |kind| match kind {
                EdgeKind::Wild => true,
                EdgeKind::Class(lim) => in_class(lim, lo),
                _ => false,
            });
            b.graph.new_class_edge(v, dst, vec![*p]);
        }

        let dst = b.get_matching(&set, |kind| matches!(kind, EdgeKind::Wild));
        b.graph.new_wild_edge(v, dst);
    }

    b.graph.nodes
}

struct DfaBuilder<'a> {
    nfa: &'a [Node],
    graph: Graph,
    all_nil: Vec<usize>,
    tab: FxHashMap<StKey, i32>,
    todo: Vec<i32>,
}

impl<'a> DfaBuilder<'a> {
    /// Non-accepting nodes with only ε out-edges; they never influence a
    /// state's behaviour, so the key erases them.
    fn construct_all_nil_list(&mut self) {
        for (i, n) in self.nfa.iter().enumerate() {
            if n.accept >= 0 {
                continue;
            }
            if n.edges.iter().all(|e| e.kind == EdgeKind::Nil) {
                self.all_nil.push(i);
            }
        }
    }

    fn new_empty_st(&self) -> FlagSet {
        vec![NOT_SET; self.nfa.len()]
    }

    fn set_to_st(&self, set: &[i32], value: u8) -> FlagSet {
        let mut st = self.new_empty_st();
        for &i in set {
            st[i as usize] = value;
        }
        st
    }

    fn make_st_key(&self, st: &mut FlagSet) -> StKey {
        for &i in &self.all_nil {
            st[i] = NOT_SET;
        }
        let mut bits = vec![0u64; st.len().div_ceil(64)];
        let mut accept = -1;
        for (i, &v) in st.iter().enumerate() {
            if v == NOT_SET {
                continue;
            }
            bits[i / 64] |= 1u64 << (i % 64);
            let node_acc = self.nfa[i].accept;
            if v == ACCEPTING && node_acc >= 0 && (accept < 0 || node_acc < accept) {
                accept = node_acc;
            }
        }
        StKey { bits, accept }
    }

    /// Extend `st` with everything reachable over ε-edges, plus edges the
    /// predicate admits. Worklist BFS; ε-cycles are fine.
    fn closure(&self, st: &mut FlagSet, pred: impl Fn(&EdgeKind) -> bool) {
        let mut bfs = st_to_set(st);
        let mut visited = vec![false; self.nfa.len()];
        while let Some(i) = bfs.pop() {
            let i = i as usize;
            if visited[i] {
                continue;
            }
            visited[i] = true;
            for e in &self.nfa[i].edges {
                if e.dst < 0 || visited[e.dst as usize] {
                    continue;
                }
                if e.kind == EdgeKind::Nil || pred(&e.kind) {
                    st[e.dst as usize] = ACCEPTING;
                    bfs.push(e.dst);
                }
            }
        }
    }

    fn nil_closure(&self, st: &mut FlagSet) {
        self.closure(st, |_| false);
    }

    /// Canonical DFA state for a subset, registering and queueing it when
    /// new. Returns -1 for the empty (dead) subset.
    fn get(&mut self, st: &mut FlagSet) -> i32 {
        self.nil_closure(st);
        let key = self.make_st_key(st);
        if let Some(&id) = self.tab.get(&key) {
            return id;
        }
        let id = self.graph.new_node();
        self.graph.nodes[id as usize].set = st_to_set(st);
        self.graph.nodes[id as usize].accept = key.accept;
        self.tab.insert(key, id);
        self.todo.push(id);
        id
    }

    fn get_matching(&mut self, set: &[i32], pred: impl Fn(&EdgeKind) -> bool) -> i32 {
        let mut st = self.new_empty_st();
        for &i in set {
            for e in &self.nfa[i as usize].edges {
                if e.dst >= 0 && st[e.dst as usize] != ACCEPTING && pred(&e.kind) {
                    st[e.dst as usize] = ACCEPTING;
                }
            }
        }
        self.get(&mut st)
    }

    fn get_assert_with_closure(&mut self, set: &[i32], a: Asserts) -> i32 {
        // Base nodes were already present before the assertion fired, so
        // they do not contribute an accept label here.
        let mut st = self.set_to_st(set, NOT_ACCEPTING);
        self.closure(&mut st, |kind| match kind {
            EdgeKind::Assert(mask) => mask & a != 0,
            _ => false,
        });
        self.get(&mut st)
    }

    /// Assert masks a state can exercise: direct assert-edges plus masks
    /// reachable through chained assertions (e.g. `^$`), expanded into
    /// every non-empty subset.
    fn get_assert_subsets(&self, set: &[i32]) -> SmallVec<[Asserts; 8]> {
        let mut asserts: Asserts = 0;
        for &i in set {
            for e in &self.nfa[i as usize].edges {
                if let EdgeKind::Assert(a) = e.kind {
                    asserts |= a;
                }
            }
        }
        let mut st = self.set_to_st(set, ACCEPTING);
        self.closure(&mut st, |kind| matches!(kind, EdgeKind::Assert(_)));
        for i in st_to_set(&st) {
            for e in &self.nfa[i as usize].edges {
                if let EdgeKind::Assert(a) = e.kind {
                    asserts |= a;
                }
            }
        }
        assert_subsets(asserts)
    }
}

/// Partition the scope's runes: singles are literal runes and singleton
/// class endpoints; ranges are the unique fracture of all class ranges;
/// everything else is the wild element.
fn scope_alphabet(nfa: &[Node]) -> (Vec<char>, Limits) {
    let mut singles: Vec<char> = Vec::new();
    let mut lim = Limits::new();
    for n in nfa {
        for e in &n.edges {
            match &e.kind {
                EdgeKind::Rune(r) => singles.push(*r),
                EdgeKind::Class(pairs) => {
                    for p in pairs {
                        if p.lo == p.hi {
                            if let Some(r) = char::from_u32(p.lo) {
                                singles.push(r);
                            }
                        } else {
                            append_limits(&mut lim, p.lo, p.hi);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    singles.sort_unstable();
    singles.dedup();
    (singles, lim)
}

fn st_to_set(st: &FlagSet) -> Vec<i32> {
    st.iter()
        .enumerate()
        .filter(|(_, &v)| v != NOT_SET)
        .map(|(i, _)| i as i32)
        .collect()
}

/// All non-empty subsets of the bits present in `a`.
fn assert_subsets(a: Asserts) -> SmallVec<[Asserts; 8]> {
    let mut options: SmallVec<[Asserts; 8]> = SmallVec::new();
    let mut rest = a;
    let mut i = 0;
    while rest != 0 {
        if rest & 1 != 0 {
            options.push(1 << i);
        }
        rest >>= 1;
        i += 1;
    }
    if options.len() <= 1 {
        return options;
    }
    let count = 1usize << options.len();
    let mut perm: SmallVec<[Asserts; 8]> = SmallVec::with_capacity(count - 1);
    for mask in 1..count {
        let mut set: Asserts = 0;
        for (j, &v) in options.iter().enumerate() {
            if mask & (1 << j) != 0 {
                set |= v;
            }
        }
        perm.push(set);
    }
    perm
}
