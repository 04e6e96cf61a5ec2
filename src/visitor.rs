//! Memoizing expression visitor.
//!
//! A [`Visitor`] supplies hooks that decide, node by node, whether to keep a
//! subtree, replace it, or descend into it. The [`Rewriter`] drives the
//! traversal, rebuilds parents whose children changed, and remembers the
//! rewrite of every non-constant node it has seen:
//!
//! ```text
//! visit(e):
//!   constant?          -> e
//!   cached?            -> cache[e]
//!   otherwise          -> cache[e] = visit_actual(e)
//!
//! visit_actual(e):
//!   visit_expr(e)      -> Skip: e | ChangeTo(x): x | DoChildren:
//!   visit_<kind>(e)    -> Skip: e | ChangeTo(x): x | DoChildren:
//!   kids' = kids.map(visit); rebuild if any changed (and re-visit if recursive)
//!   visit_expr_post(e') -> ChangeTo(x): x | otherwise: e'
//! ```

use log::debug;

use crate::cache::Cache;
use crate::expr::ExprManager;
use crate::node::Kind;
use crate::overflow;
use crate::reference::ExprRef;

/// What the traversal should do after a hook has looked at a node.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Action {
    /// Keep the node unchanged and do not descend.
    SkipChildren,
    /// Descend into the children.
    DoChildren,
    /// Replace the node with the given expression, without descending.
    ChangeTo(ExprRef),
}

/// Hooks invoked by a [`Rewriter`].
///
/// Every hook has a default, so a visitor only overrides what it cares
/// about. Replacements must have the width of the node they replace.
#[allow(unused_variables)]
pub trait Visitor {
    /// Called first for every non-constant node.
    fn visit_expr(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }

    /// Called after the children of a node were visited, with the rebuilt
    /// node. Only [`Action::ChangeTo`] has an effect.
    fn visit_expr_post(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::SkipChildren
    }

    fn visit_read(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_select(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_concat(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_extract(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_zext(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_sext(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }

    fn visit_add(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_sub(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_mul(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_udiv(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_sdiv(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_urem(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_srem(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }

    fn visit_not(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_and(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_or(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_xor(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_shl(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_lshr(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_ashr(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }

    fn visit_eq(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_ne(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_ult(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_ule(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_ugt(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_uge(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_slt(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_sle(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_sgt(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
    fn visit_sge(&mut self, mgr: &ExprManager, e: ExprRef) -> Action {
        Action::DoChildren
    }
}

/// A visitor that keeps every node.
#[derive(Debug, Default, Copy, Clone)]
pub struct Identity;

impl Visitor for Identity {}

/// Calls the hook for the kind of `e`.
///
/// # Panics
///
/// Panics on constants, which never reach per-kind dispatch.
fn dispatch<V: Visitor + ?Sized>(visitor: &mut V, mgr: &ExprManager, e: ExprRef, kind: Kind) -> Action {
    match kind {
        Kind::Constant => panic!("MalformedExpression: constant {} reached per-kind dispatch", e),
        Kind::Read => visitor.visit_read(mgr, e),
        Kind::Select => visitor.visit_select(mgr, e),
        Kind::Concat => visitor.visit_concat(mgr, e),
        Kind::Extract => visitor.visit_extract(mgr, e),
        Kind::ZExt => visitor.visit_zext(mgr, e),
        Kind::SExt => visitor.visit_sext(mgr, e),
        Kind::Add => visitor.visit_add(mgr, e),
        Kind::Sub => visitor.visit_sub(mgr, e),
        Kind::Mul => visitor.visit_mul(mgr, e),
        Kind::UDiv => visitor.visit_udiv(mgr, e),
        Kind::SDiv => visitor.visit_sdiv(mgr, e),
        Kind::URem => visitor.visit_urem(mgr, e),
        Kind::SRem => visitor.visit_srem(mgr, e),
        Kind::Not => visitor.visit_not(mgr, e),
        Kind::And => visitor.visit_and(mgr, e),
        Kind::Or => visitor.visit_or(mgr, e),
        Kind::Xor => visitor.visit_xor(mgr, e),
        Kind::Shl => visitor.visit_shl(mgr, e),
        Kind::LShr => visitor.visit_lshr(mgr, e),
        Kind::AShr => visitor.visit_ashr(mgr, e),
        Kind::Eq => visitor.visit_eq(mgr, e),
        Kind::Ne => visitor.visit_ne(mgr, e),
        Kind::Ult => visitor.visit_ult(mgr, e),
        Kind::Ule => visitor.visit_ule(mgr, e),
        Kind::Ugt => visitor.visit_ugt(mgr, e),
        Kind::Uge => visitor.visit_uge(mgr, e),
        Kind::Slt => visitor.visit_slt(mgr, e),
        Kind::Sle => visitor.visit_sle(mgr, e),
        Kind::Sgt => visitor.visit_sgt(mgr, e),
        Kind::Sge => visitor.visit_sge(mgr, e),
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RewriterConfig {
    /// Re-visit nodes rebuilt from changed children until nothing changes.
    pub recursive: bool,
    /// Memoize rewrites of visited nodes.
    pub use_cache: bool,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            use_cache: true,
        }
    }
}

/// Drives a [`Visitor`] over expressions of one manager.
///
/// The visited cache lives as long as the rewriter: visiting the same node
/// twice returns the first result without calling any hook.
pub struct Rewriter<'m, V> {
    mgr: &'m ExprManager,
    visitor: V,
    visited: Cache<ExprRef, ExprRef>,
    config: RewriterConfig,
}

impl<'m, V: Visitor> Rewriter<'m, V> {
    pub fn new(mgr: &'m ExprManager, visitor: V) -> Self {
        Self::with_config(mgr, visitor, RewriterConfig::default())
    }

    pub fn with_config(mgr: &'m ExprManager, visitor: V, config: RewriterConfig) -> Self {
        Self {
            mgr,
            visitor,
            visited: Cache::new(),
            config,
        }
    }

    pub fn manager(&self) -> &'m ExprManager {
        self.mgr
    }

    pub fn config(&self) -> RewriterConfig {
        self.config
    }

    pub fn visitor(&self) -> &V {
        &self.visitor
    }

    pub fn visitor_mut(&mut self) -> &mut V {
        &mut self.visitor
    }

    pub fn into_visitor(self) -> V {
        self.visitor
    }

    /// Number of memoized rewrites.
    pub fn cache_len(&self) -> usize {
        self.visited.len()
    }

    pub fn cache_hits(&self) -> usize {
        self.visited.hits()
    }

    pub fn cache_misses(&self) -> usize {
        self.visited.misses()
    }

    /// Returns the rewrite of `e`.
    pub fn visit(&mut self, e: ExprRef) -> ExprRef {
        if self.mgr.is_constant(e) {
            return e;
        }
        if !self.config.use_cache {
            return self.visit_actual(e);
        }
        if let Some(res) = self.visited.get(&e) {
            return res;
        }
        let res = self.visit_actual(e);
        self.visited.insert(e, res)
    }

    /// Rewrites `e` without consulting the cache for `e` itself.
    pub fn visit_actual(&mut self, e: ExprRef) -> ExprRef {
        let node = self.mgr.node(e);

        match self.visitor.visit_expr(self.mgr, e) {
            Action::DoChildren => {}
            Action::SkipChildren => return e,
            Action::ChangeTo(x) => return x,
        }

        match dispatch(&mut self.visitor, self.mgr, e, node.kind) {
            Action::DoChildren => {}
            Action::SkipChildren => return e,
            Action::ChangeTo(x) => return x,
        }

        let kids: Vec<ExprRef> = node.kids().iter().map(|&kid| self.visit(kid)).collect();
        let mut res = e;
        if kids.as_slice() != node.kids() {
            res = self.mgr.rebuild(e, &kids);
            debug!("rebuilt {} -> {}", e, res);
            if self.config.recursive {
                res = self.visit(res);
            }
        }

        if !self.mgr.is_constant(res) {
            if let Action::ChangeTo(x) = self.visitor.visit_expr_post(self.mgr, res) {
                res = x;
            }
        }
        res
    }

    /// Replaces an arithmetic node by the condition under which it
    /// overflows. Shallow and uncached: children are not visited.
    ///
    /// Nodes that cannot overflow, constants included, are returned as is.
    pub fn visit_outside_op(&self, e: ExprRef) -> ExprRef {
        if self.mgr.is_constant(e) {
            return e;
        }
        overflow::overflow_condition(self.mgr, e).unwrap_or(e)
    }
}
