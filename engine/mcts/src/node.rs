//! Search tree nodes.
//!
//! A node is reached by playing a move from its parent and is owned by that
//! parent's child table (the root is owned by the tree). All statistics are
//! atomics so simulation threads update them without locking. Values are
//! stored from the perspective of the player to move at the node.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

use engine_core::Loc;

/// `f64` with lock-free add, stored as raw bits.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    inner: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            inner: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.inner.load(ordering))
    }

    #[inline]
    pub fn store(&self, value: f64, ordering: Ordering) {
        self.inner.store(value.to_bits(), ordering);
    }

    /// Lock-free fetch-add using compare-and-swap.
    #[inline]
    pub fn fetch_add(&self, value: f64, ordering: Ordering) -> f64 {
        let mut current = self.inner.load(Ordering::Relaxed);
        loop {
            let new = (f64::from_bits(current) + value).to_bits();
            match self
                .inner
                .compare_exchange_weak(current, new, ordering, Ordering::Relaxed)
            {
                Ok(previous) => return f64::from_bits(previous),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Expansion lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    Unexpanded,
    /// One thread won the right to expand and is waiting on its evaluation.
    Expanding,
    Expanded,
}

const UNEXPANDED: u8 = 0;
const EXPANDING: u8 = 1;
const EXPANDED: u8 = 2;

/// Edge from a parent to one of its children.
#[derive(Debug)]
pub struct ChildEdge {
    pub loc: Loc,
    /// Policy prior, renormalized over legal moves.
    pub prior: f32,
    pub node: SearchNode,
}

impl ChildEdge {
    pub fn new(loc: Loc, prior: f32) -> Self {
        Self {
            loc,
            prior,
            node: SearchNode::new(),
        }
    }
}

/// Point-in-time averages for a node, in its own perspective.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeStats {
    pub visits: u64,
    pub win_loss: f64,
    pub score_mean: f64,
    pub score_stdev: f64,
    pub utility: f64,
    /// Empirical variance of the backed-up utilities.
    pub utility_variance: f64,
}

/// A node in the search tree.
#[derive(Debug, Default)]
pub struct SearchNode {
    visits: AtomicU64,
    virtual_losses: AtomicU32,

    win_loss_sum: AtomicF64,
    score_mean_sum: AtomicF64,
    /// Sum of `mean^2 + stdev^2`, the second moment of the score.
    score_sq_sum: AtomicF64,
    utility_sum: AtomicF64,
    utility_sq_sum: AtomicF64,

    expansion: AtomicU8,
    error: AtomicBool,

    /// Child table, written once on expansion. Creation order is preserved.
    children: OnceLock<Vec<ChildEdge>>,
    /// Network ownership at this node, side-to-move perspective.
    ownership: OnceLock<Vec<f32>>,
}

impl SearchNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed backups through this node.
    #[inline]
    pub fn visits(&self) -> u64 {
        self.visits.load(Ordering::Acquire)
    }

    #[inline]
    pub fn virtual_losses(&self) -> u32 {
        self.virtual_losses.load(Ordering::Acquire)
    }

    #[inline]
    pub fn add_virtual_loss(&self, amount: u32) {
        self.virtual_losses.fetch_add(amount, Ordering::AcqRel);
    }

    #[inline]
    pub fn remove_virtual_loss(&self, amount: u32) {
        self.virtual_losses.fetch_sub(amount, Ordering::AcqRel);
    }

    /// Sum of backed-up utilities, own perspective.
    #[inline]
    pub fn utility_sum(&self) -> f64 {
        self.utility_sum.load(Ordering::Acquire)
    }

    /// Add one evaluation, already converted to this node's perspective.
    pub fn record(&self, win_loss: f64, score_mean: f64, score_sq: f64, utility: f64) {
        self.win_loss_sum.fetch_add(win_loss, Ordering::AcqRel);
        self.score_mean_sum.fetch_add(score_mean, Ordering::AcqRel);
        self.score_sq_sum.fetch_add(score_sq, Ordering::AcqRel);
        self.utility_sum.fetch_add(utility, Ordering::AcqRel);
        self.utility_sq_sum.fetch_add(utility * utility, Ordering::AcqRel);
        self.visits.fetch_add(1, Ordering::AcqRel);
    }

    /// Averages over completed visits. All zero when unvisited.
    pub fn stats(&self) -> NodeStats {
        let visits = self.visits();
        if visits == 0 {
            return NodeStats::default();
        }
        let n = visits as f64;
        let win_loss = self.win_loss_sum.load(Ordering::Acquire) / n;
        let score_mean = self.score_mean_sum.load(Ordering::Acquire) / n;
        let score_sq = self.score_sq_sum.load(Ordering::Acquire) / n;
        let utility = self.utility_sum.load(Ordering::Acquire) / n;
        let utility_sq = self.utility_sq_sum.load(Ordering::Acquire) / n;
        NodeStats {
            visits,
            win_loss,
            score_mean,
            score_stdev: (score_sq - score_mean * score_mean).max(0.0).sqrt(),
            utility,
            utility_variance: (utility_sq - utility * utility).max(0.0),
        }
    }

    pub fn expansion(&self) -> Expansion {
        match self.expansion.load(Ordering::Acquire) {
            UNEXPANDED => Expansion::Unexpanded,
            EXPANDING => Expansion::Expanding,
            _ => Expansion::Expanded,
        }
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.expansion.load(Ordering::Acquire) == EXPANDED
    }

    /// Claim the right to expand. Exactly one caller wins.
    pub fn try_begin_expand(&self) -> bool {
        self.expansion
            .compare_exchange(UNEXPANDED, EXPANDING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Publish the child table. Only the thread that won
    /// [`try_begin_expand`](Self::try_begin_expand) may call this.
    pub fn finish_expand(&self, children: Vec<ChildEdge>, ownership: Vec<f32>) {
        let _ = self.children.set(children);
        if !ownership.is_empty() {
            let _ = self.ownership.set(ownership);
        }
        self.expansion.store(EXPANDED, Ordering::Release);
    }

    /// Give up an expansion claim, leaving the node unexpanded.
    pub fn abort_expand(&self) {
        let _ = self.expansion.compare_exchange(
            EXPANDING,
            UNEXPANDED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Children in creation order. Empty until expanded.
    pub fn children(&self) -> &[ChildEdge] {
        if self.is_expanded() {
            self.children.get().map(Vec::as_slice).unwrap_or(&[])
        } else {
            &[]
        }
    }

    pub fn child(&self, loc: Loc) -> Option<&ChildEdge> {
        self.children().iter().find(|edge| edge.loc == loc)
    }

    /// Detach the child table, leaving this node unexpanded.
    pub fn take_children(&mut self) -> Vec<ChildEdge> {
        *self.expansion.get_mut() = UNEXPANDED;
        self.children.take().unwrap_or_default()
    }

    pub fn ownership(&self) -> Option<&[f32]> {
        self.ownership.get().map(Vec::as_slice)
    }

    pub fn mark_error(&self) {
        self.error.store(true, Ordering::Release);
    }

    /// Nodes that failed to evaluate or replay are never selected again.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }
}
