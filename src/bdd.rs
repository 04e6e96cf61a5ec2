//! Reduced ordered BDDs with complement edges.
//!
//! This is the decision procedure behind [`BddSolver`][crate::blast::BddSolver].
//! Node `0` is the single terminal; `one` is its positive reference and `zero`
//! its negation. High edges are always regular, so every boolean function has
//! exactly one reference. Variables are numbered from 1, smaller numbers
//! closer to the root.

use std::cell::RefCell;
use std::fmt::Debug;

use log::debug;

use crate::cache::Cache;
use crate::reference::Ref;
use crate::storage::Storage;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

pub struct Bdd {
    storage: RefCell<Storage<Node>>,
    cache: RefCell<Cache<(Ref, Ref, Ref), Ref>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new() -> Self {
        let mut storage = Storage::new();

        // Allocate the terminal node:
        let terminal = storage.put(Node {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        });
        assert_eq!(terminal, 0); // Make sure the terminal node is (0).
        let one = Ref::positive(terminal);
        let zero = -one;

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new()),
            zero,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new()
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.borrow();
        f.debug_struct("Bdd")
            .field("size", &self.num_nodes())
            .field("cache_hits", &cache.hits())
            .field("cache_misses", &cache.misses())
            .finish()
    }
}

impl Bdd {
    /// Number of nodes allocated so far, the terminal included.
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().size()
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.storage.borrow().value(index).variable
    }
    pub fn low(&self, index: u32) -> Ref {
        self.storage.borrow().value(index).low
    }
    pub fn high(&self, index: u32) -> Ref {
        self.storage.borrow().value(index).high
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    /// The constant function for `value`.
    pub fn constant(&self, value: bool) -> Ref {
        if value {
            self.one
        } else {
            self.zero
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        // Handle duplicates
        if low == high {
            return low;
        }

        let i = self.storage.borrow_mut().put(Node { variable: v, low, high });
        Ref::positive(i)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");
        self.mk_node(v, self.zero, self.one)
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index should not be zero");

        let i = node.index();
        if self.is_terminal(node) || v < self.variable(i) {
            return (node, node);
        }
        assert_eq!(v, self.variable(i));
        if node.is_negated() {
            (-self.low(i), -self.high(i))
        } else {
            (self.low(i), self.high(i))
        }
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        //   ite(F,1,~F) => 1
        //   ite(F,F,1) => 1
        //   ite(F,~F,0) => 0
        //   ite(F,0,F) => 0
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }
        if self.is_one(g) && h == -f {
            return self.one;
        }
        if g == f && self.is_one(h) {
            return self.one;
        }
        if g == -f && self.is_zero(h) {
            return self.zero;
        }
        if self.is_zero(g) && h == f {
            return self.zero;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let k = self.variable(h.index());

        // Equivalent pairs (choose the one with the lowest top variable):
        //   ite(F,1,H) == ite(H,1,F)
        //   ite(F,G,0) == ite(G,F,0)
        //   ite(F,G,1) == ite(~G,~F,1)
        //   ite(F,0,H) == ite(~H,0,~F)
        //   ite(F,G,~G) == ite(G,F,~F)
        if self.is_one(g) && k < i {
            return self.apply_ite(h, self.one, f);
        }
        if self.is_zero(h) && j < i {
            return self.apply_ite(g, f, self.zero);
        }
        if self.is_one(h) && j < i {
            return self.apply_ite(-g, -f, self.one);
        }
        if self.is_zero(g) && k < i {
            return self.apply_ite(-h, self.zero, -f);
        }
        if g == -h && j < i {
            return self.apply_ite(g, f, -f);
        }

        let (mut f, mut g, mut h) = (f, g, h);

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = (f, g, h);
        if let Some(res) = self.cache.borrow_mut().get(&key) {
            return if n { -res } else { res };
        }

        // Determine the top variable:
        let mut m = i;
        if j != 0 {
            m = m.min(j);
        }
        if k != 0 {
            m = m.min(k);
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);

        let res = self.mk_node(m, e, t);
        let res = self.cache.borrow_mut().insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.one;
        for node in nodes.into_iter() {
            res = self.apply_and(res, node);
            if self.is_zero(res) {
                break;
            }
        }
        res
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.zero;
        for node in nodes.into_iter() {
            res = self.apply_or(res, node);
            if self.is_one(res) {
                break;
            }
        }
        res
    }

    /// Finds one satisfying path of `f`, preferring low (false) edges.
    ///
    /// Returns the variables along the path with their values, or `None`
    /// if `f` is unsatisfiable. Variables not on the path are unconstrained.
    pub fn one_sat(&self, f: Ref) -> Option<Vec<(u32, bool)>> {
        if self.is_zero(f) {
            return None;
        }
        let mut path = Vec::new();
        let mut node = f;
        while !self.is_terminal(node) {
            let v = self.variable(node.index());
            let low = self.low_node(node);
            if self.is_zero(low) {
                path.push((v, true));
                node = self.high_node(node);
            } else {
                path.push((v, false));
                node = low;
            }
        }
        debug_assert!(self.is_one(node));
        debug!("one_sat({}) -> path of {} literals", f, path.len());
        Some(path)
    }

    pub fn to_bracket_string(&self, node: Ref) -> String {
        if self.is_zero(node) {
            return "(0)".to_string();
        } else if self.is_one(node) {
            return "(1)".to_string();
        }

        let v = self.variable(node.index());
        let low = self.low_node(node);
        let high = self.high_node(node);

        format!(
            "{}:(x{}, {}, {})",
            node,
            v,
            self.to_bracket_string(high),
            self.to_bracket_string(low)
        )
    }
}
