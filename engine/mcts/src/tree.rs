//! Shared search tree.
//!
//! Many simulation threads descend the same tree concurrently. Selection
//! adds virtual loss along the path so that threads spread out, expansion is
//! claimed by a compare-and-swap on the node, and backup adds the leaf value
//! to every node on the path with perspective flipping at each ply. There is
//! no tree-wide lock.

use std::sync::{Arc, OnceLock};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Gamma};
use tracing::trace;

use engine_core::{encode_features, policy_index, Loc, Player, Position};

use crate::analysis::{AnalysisSnapshot, MoveInfo, RootValues};
use crate::config::SearchParams;
use crate::evaluator::{EvalInput, EvalOutput};
use crate::node::{ChildEdge, Expansion, NodeStats, SearchNode};
use crate::score_tables::ScoreTables;

/// Prior utility variance, in units of `max_utility^2`, blended into the
/// empirical variance for confidence bounds.
const LCB_PRIOR_VARIANCE: f64 = 0.25;
/// Weight of the prior variance, in visits.
const LCB_PRIOR_WEIGHT: f64 = 2.0;

/// Value of a leaf from the perspective of the player to move there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafValue {
    pub win_loss: f64,
    pub score_mean: f64,
    pub score_stdev: f64,
}

impl LeafValue {
    pub fn from_output(output: &EvalOutput) -> Self {
        Self {
            win_loss: (output.win_loss as f64).clamp(-1.0, 1.0),
            score_mean: output.score_mean as f64,
            score_stdev: (output.score_stdev as f64).max(0.0),
        }
    }

    /// Exact result of a finished game, for the player to move.
    pub fn terminal(position: &Position) -> Self {
        let score = position.final_score_white() as f64 * position.next_player().white_sign();
        let win_loss = if score > 0.0 {
            1.0
        } else if score < 0.0 {
            -1.0
        } else {
            0.0
        };
        Self {
            win_loss,
            score_mean: score,
            score_stdev: 0.0,
        }
    }
}

/// Outcome of one descent through the tree.
#[derive(Debug)]
pub enum Selection<'a> {
    /// `path` ends at a node this thread must evaluate and expand.
    Leaf {
        path: Vec<&'a SearchNode>,
        position: Position,
    },
    /// `path` ends at a finished game with a known value.
    Terminal {
        path: Vec<&'a SearchNode>,
        value: LeafValue,
    },
    /// Lost an expansion race or hit a bad node. Virtual loss already undone.
    Retry,
    /// The root has no selectable move.
    Exhausted,
}

/// Search tree rooted at one position.
#[derive(Debug)]
pub struct SearchTree {
    position: Position,
    root: SearchNode,
    /// Root priors after temperature and noise, parallel to the root's
    /// children. Child edges keep the raw priors.
    root_priors: OnceLock<Vec<f32>>,
    params: SearchParams,
    score_tables: Arc<ScoreTables>,
    max_len: usize,
}

impl SearchTree {
    pub fn new(position: Position, params: SearchParams, score_tables: Arc<ScoreTables>, max_len: usize) -> Self {
        Self {
            position,
            root: SearchNode::new(),
            root_priors: OnceLock::new(),
            params,
            score_tables,
            max_len,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn root(&self) -> &SearchNode {
        &self.root
    }

    pub fn root_player(&self) -> Player {
        self.position.next_player()
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    #[inline]
    pub fn root_visits(&self) -> u64 {
        self.root.visits()
    }

    fn reshape_root_priors(&mut self) {
        self.root_priors = OnceLock::new();
        if self.root.is_expanded() {
            let raw: Vec<f32> = self.root.children().iter().map(|edge| edge.prior).collect();
            let _ = self.root_priors.set(self.shape_root_priors(&raw));
        }
    }

    /// Utility of a value triple, in the same perspective as the value.
    pub fn utility(&self, value: &LeafValue) -> f64 {
        self.params.win_loss_utility_factor * value.win_loss
            + self.params.score_utility_factor * self.score_tables.score_value(value.score_mean, value.score_stdev)
    }

    /// Descend from the root to a leaf, adding virtual loss on the way.
    pub fn select_leaf(&self) -> Selection<'_> {
        let vloss = self.params.virtual_loss;
        let mut position = self.position.clone();
        let mut node = &self.root;
        let mut path = Vec::with_capacity(32);
        node.add_virtual_loss(vloss);
        path.push(node);

        loop {
            if position.is_game_over() {
                return Selection::Terminal {
                    path,
                    value: LeafValue::terminal(&position),
                };
            }

            match node.expansion() {
                Expansion::Unexpanded => {
                    if node.try_begin_expand() {
                        return Selection::Leaf { path, position };
                    }
                    self.undo_virtual_loss(&path);
                    return Selection::Retry;
                }
                Expansion::Expanding => {
                    self.undo_virtual_loss(&path);
                    return Selection::Retry;
                }
                Expansion::Expanded => {}
            }

            let is_root = path.len() == 1;
            let Some(edge) = self.select_child(node, is_root) else {
                self.undo_virtual_loss(&path);
                if is_root {
                    return Selection::Exhausted;
                }
                node.mark_error();
                return Selection::Retry;
            };

            if position.play_mut(edge.loc).is_err() {
                trace!(loc = ?edge.loc, "Replay failed, flagging node");
                edge.node.mark_error();
                self.undo_virtual_loss(&path);
                return Selection::Retry;
            }
            node = &edge.node;
            node.add_virtual_loss(vloss);
            path.push(node);
        }
    }

    /// PUCT choice among `node`'s children. Ties go to the earliest child.
    fn select_child<'a>(&self, node: &'a SearchNode, is_root: bool) -> Option<&'a ChildEdge> {
        let children = node.children();
        let root_priors = if is_root { self.root_priors.get() } else { None };
        let max_utility = self.params.max_utility();

        let parent_visits = node.visits();
        let parent_effective = (parent_visits + node.virtual_losses() as u64) as f64;
        let sqrt_parent = parent_effective.max(1.0).sqrt();
        let parent_utility = if parent_visits > 0 {
            node.utility_sum() / parent_visits as f64
        } else {
            0.0
        };

        let prior_of = |i: usize, edge: &ChildEdge| -> f64 {
            root_priors
                .and_then(|priors| priors.get(i).copied())
                .unwrap_or(edge.prior) as f64
        };

        let visited_policy_mass: f64 = children
            .iter()
            .enumerate()
            .filter(|(_, edge)| edge.node.visits() > 0)
            .map(|(i, edge)| prior_of(i, edge))
            .sum();
        let fpu_reduction = if is_root {
            self.params.root_fpu_reduction_max
        } else {
            self.params.fpu_reduction_max
        };
        let fpu_value = parent_utility - fpu_reduction * visited_policy_mass.sqrt();

        let mut best: Option<(f64, &ChildEdge)> = None;
        for (i, edge) in children.iter().enumerate() {
            if edge.node.is_error() {
                continue;
            }
            let child_visits = edge.node.visits();
            let child_vloss = edge.node.virtual_losses() as u64;
            let effective = child_visits + child_vloss;

            // Child sums are in the child's perspective; flip for the parent.
            // Pending visits count as losses.
            let q = if effective == 0 {
                fpu_value
            } else {
                (-edge.node.utility_sum() - child_vloss as f64 * max_utility) / effective as f64
            };
            let u = self.params.c_puct * prior_of(i, edge) * sqrt_parent / (1.0 + effective as f64);
            let score = q + u;
            if best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, edge));
            }
        }
        best.map(|(_, edge)| edge)
    }

    fn undo_virtual_loss(&self, path: &[&SearchNode]) {
        for node in path {
            node.remove_virtual_loss(self.params.virtual_loss);
        }
    }

    /// Give up on a selected path without recording a visit.
    pub fn abandon(&self, path: &[&SearchNode]) {
        if let Some(leaf) = path.last() {
            leaf.abort_expand();
        }
        self.undo_virtual_loss(path);
    }

    /// Network input for `position`, whose legal moves are `legal`.
    pub fn eval_input(&self, position: &Position, legal: &[Loc]) -> EvalInput {
        // PDA is given relative to the root player.
        let pda = if position.next_player() == self.root_player() {
            self.params.playout_doubling_advantage
        } else {
            -self.params.playout_doubling_advantage
        };
        EvalInput {
            features: encode_features(position, self.max_len, pda as f32),
            legal: legal.iter().map(|&loc| policy_index(loc, self.max_len)).collect(),
            max_len: self.max_len,
        }
    }

    /// Create `node`'s children from an evaluation. The caller must hold the
    /// expansion claim from [`select_leaf`](Self::select_leaf).
    pub fn expand(&self, node: &SearchNode, legal: &[Loc], output: &EvalOutput, is_root: bool) {
        let mut priors: Vec<f32> = legal
            .iter()
            .map(|&loc| {
                output
                    .policy
                    .get(policy_index(loc, self.max_len))
                    .copied()
                    .filter(|p| p.is_finite())
                    .unwrap_or(0.0)
                    .max(0.0)
            })
            .collect();
        normalize(&mut priors);

        if is_root {
            let _ = self.root_priors.set(self.shape_root_priors(&priors));
        }
        let children = legal
            .iter()
            .zip(priors)
            .map(|(&loc, prior)| ChildEdge::new(loc, prior))
            .collect();
        node.finish_expand(children, output.ownership.clone());
    }

    /// Apply the root temperature and optional Dirichlet noise.
    fn shape_root_priors(&self, raw: &[f32]) -> Vec<f32> {
        let mut priors = raw.to_vec();
        let temperature = self.params.root_policy_temperature;
        if temperature > 0.0 && (temperature - 1.0).abs() > 1e-9 {
            let inv = 1.0 / temperature;
            for p in &mut priors {
                *p = (*p as f64).powf(inv) as f32;
            }
            normalize(&mut priors);
        }

        if self.params.root_noise && priors.len() > 1 {
            let mut rng = if self.params.seed == 0 {
                ChaCha20Rng::from_entropy()
            } else {
                ChaCha20Rng::seed_from_u64(self.params.seed)
            };
            if let Some(noise) = dirichlet_noise(priors.len(), self.params.dirichlet_alpha, &mut rng) {
                let eps = self.params.dirichlet_epsilon as f32;
                for (p, n) in priors.iter_mut().zip(noise) {
                    *p = (1.0 - eps) * *p + eps * n;
                }
            }
        }
        priors
    }

    /// Add `value` (leaf perspective) to every node on `path` and release
    /// the path's virtual loss.
    pub fn backup(&self, path: &[&SearchNode], value: LeafValue) {
        let utility = self.utility(&value);
        let score_sq = value.score_mean * value.score_mean + value.score_stdev * value.score_stdev;
        let mut sign = 1.0;
        for node in path.iter().rev() {
            node.record(sign * value.win_loss, sign * value.score_mean, score_sq, sign * utility);
            node.remove_virtual_loss(self.params.virtual_loss);
            sign = -sign;
        }
    }

    /// Root values, `None` before the first visit.
    pub fn root_values(&self) -> Option<RootValues> {
        let stats = self.root.stats();
        (stats.visits > 0).then(|| RootValues {
            visits: stats.visits,
            win_loss: stats.win_loss,
            score_mean: stats.score_mean,
            score_stdev: stats.score_stdev,
            utility: stats.utility,
        })
    }

    /// Move to play: most visits, then highest utility, then earliest.
    /// Before any child has a visit, the highest prior wins. Pass when the
    /// root has no children.
    pub fn best_move(&self) -> Loc {
        if let Some(best) = self.ranked_children().first() {
            return best.0.loc;
        }
        let children = self.root.children();
        let mut best: Option<(f32, Loc)> = None;
        for (i, edge) in children.iter().enumerate() {
            let prior = self.root_prior(i, edge);
            if best.map_or(true, |(p, _)| prior > p) {
                best = Some((prior, edge.loc));
            }
        }
        best.map(|(_, loc)| loc).unwrap_or(Loc::Pass)
    }

    fn root_prior(&self, i: usize, edge: &ChildEdge) -> f32 {
        self.root_priors
            .get()
            .and_then(|priors| priors.get(i).copied())
            .unwrap_or(edge.prior)
    }

    /// Visited root children with their root-perspective stats, best first.
    fn ranked_children(&self) -> Vec<(&ChildEdge, usize, NodeStats)> {
        let mut ranked: Vec<(&ChildEdge, usize, NodeStats)> = self
            .root
            .children()
            .iter()
            .enumerate()
            .filter(|(_, edge)| !edge.node.is_error())
            .map(|(i, edge)| (edge, i, flip(edge.node.stats())))
            .filter(|(_, _, stats)| stats.visits > 0)
            .collect();
        ranked.sort_by(|a, b| {
            b.2.visits
                .cmp(&a.2.visits)
                .then_with(|| b.2.utility.partial_cmp(&a.2.utility).unwrap_or(std::cmp::Ordering::Equal))
        });
        ranked
    }

    /// Per-move analysis for every visited root child, best first.
    pub fn ranked_moves(&self, pv_len: usize) -> Vec<MoveInfo> {
        let max_utility = self.params.max_utility();
        self.ranked_children()
            .into_iter()
            .enumerate()
            .map(|(order, (edge, i, stats))| {
                let radius = self.lcb_radius(&stats, max_utility);
                MoveInfo {
                    loc: edge.loc,
                    visits: stats.visits,
                    utility: stats.utility,
                    win_loss: stats.win_loss,
                    score_mean: stats.score_mean,
                    score_stdev: stats.score_stdev,
                    prior: self.root_prior(i, edge) as f64,
                    lcb: 0.5 * (1.0 + stats.win_loss) - 0.5 * radius,
                    utility_lcb: stats.utility - radius,
                    order,
                    pv: principal_variation_from(edge, pv_len),
                }
            })
            .collect()
    }

    /// Standard-error radius of the utility confidence bound.
    fn lcb_radius(&self, stats: &NodeStats, max_utility: f64) -> f64 {
        let n = stats.visits as f64;
        let prior_variance = LCB_PRIOR_VARIANCE * max_utility * max_utility;
        let variance = (stats.utility_variance * n + prior_variance * LCB_PRIOR_WEIGHT) / (n + LCB_PRIOR_WEIGHT);
        self.params.lcb_stdevs * (variance / n).sqrt()
    }

    /// Most-visited line from the root, at most `max_moves` long.
    pub fn principal_variation(&self, max_moves: usize) -> Vec<Loc> {
        match self.ranked_children().first() {
            Some((edge, _, _)) => principal_variation_from(edge, max_moves),
            None => Vec::new(),
        }
    }

    /// Tree-averaged ownership per board point (row-major, unpadded), root
    /// player perspective.
    pub fn ownership(&self) -> Option<Vec<f64>> {
        let min_visits = self.params.ownership_min_visits;
        let padded = average_ownership(&self.root, min_visits.max(1))?;
        let board = self.position.board();
        let mut out = Vec::with_capacity(board.area());
        for y in 0..board.y_size() {
            for x in 0..board.x_size() {
                out.push(padded.get(y * self.max_len + x).copied().unwrap_or(0.0));
            }
        }
        Some(out)
    }

    pub fn snapshot(&self, pv_len: usize, include_ownership: bool) -> AnalysisSnapshot {
        AnalysisSnapshot {
            root_player: self.root_player(),
            root_visits: self.root_visits(),
            root_values: self.root_values(),
            moves: self.ranked_moves(pv_len),
            ownership: if include_ownership { self.ownership() } else { None },
        }
    }

    /// Reuse the subtree below `loc` for `position`, the root position with
    /// `loc` played. Falls back to an empty tree when nothing can be kept.
    pub fn into_subtree(mut self, loc: Loc, position: Position) -> SearchTree {
        let node = self
            .root
            .take_children()
            .into_iter()
            .find(|edge| edge.loc == loc)
            .map(|edge| edge.node)
            .filter(|node| !node.is_error() && node.virtual_losses() == 0)
            .unwrap_or_default();

        let mut tree = SearchTree {
            position,
            root: node,
            root_priors: OnceLock::new(),
            params: self.params,
            score_tables: self.score_tables,
            max_len: self.max_len,
        };
        tree.reshape_root_priors();
        tree
    }
}

/// Stats of a child seen from its parent.
fn flip(stats: NodeStats) -> NodeStats {
    NodeStats {
        win_loss: -stats.win_loss,
        score_mean: -stats.score_mean,
        utility: -stats.utility,
        ..stats
    }
}

fn principal_variation_from(edge: &ChildEdge, max_moves: usize) -> Vec<Loc> {
    let mut pv = Vec::new();
    let mut current = edge;
    while pv.len() < max_moves {
        pv.push(current.loc);
        let next = current
            .node
            .children()
            .iter()
            .filter(|child| child.node.visits() > 0)
            .fold(None::<&ChildEdge>, |best, child| match best {
                Some(b) if b.node.visits() >= child.node.visits() => Some(b),
                _ => Some(child),
            });
        match next {
            Some(child) => current = child,
            None => break,
        }
    }
    pv
}

/// Ownership of `node` in its own perspective, weighting the network output
/// once and each sufficiently visited child by its visits.
fn average_ownership(node: &SearchNode, min_visits: u64) -> Option<Vec<f64>> {
    let own = node.ownership()?;
    let mut sum: Vec<f64> = own.iter().map(|&v| v as f64).collect();
    let mut weight = 1.0;

    for edge in node.children() {
        let visits = edge.node.visits();
        if visits < min_visits {
            continue;
        }
        if let Some(child) = average_ownership(&edge.node, min_visits) {
            let w = visits as f64;
            for (s, c) in sum.iter_mut().zip(child) {
                *s -= c * w;
            }
            weight += w;
        }
    }
    for s in &mut sum {
        *s /= weight;
    }
    Some(sum)
}

fn normalize(priors: &mut [f32]) {
    let sum: f32 = priors.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        for p in priors.iter_mut() {
            *p /= sum;
        }
    } else if !priors.is_empty() {
        let uniform = 1.0 / priors.len() as f32;
        priors.iter_mut().for_each(|p| *p = uniform);
    }
}

/// Generate Dirichlet-distributed noise using Gamma variates.
fn dirichlet_noise(n: usize, alpha: f64, rng: &mut ChaCha20Rng) -> Option<Vec<f32>> {
    let gamma = Gamma::new(alpha, 1.0).ok()?;
    let samples: Vec<f64> = (0..n).map(|_| gamma.sample(rng)).collect();
    let sum: f64 = samples.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return None;
    }
    Some(samples.into_iter().map(|s| (s / sum) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{Evaluator, UniformEvaluator};
    use engine_core::{policy_len, Rules};

    fn tree_for(position: Position, params: SearchParams) -> SearchTree {
        let tables = Arc::new(ScoreTables::new(params.score_scale));
        SearchTree::new(position, params, tables, 9)
    }

    /// Run one simulation against the uniform evaluator, single threaded.
    fn simulate(tree: &SearchTree) {
        match tree.select_leaf() {
            Selection::Leaf { path, position } => {
                let legal = position.legal_moves();
                let input = tree.eval_input(&position, &legal);
                let output = UniformEvaluator.evaluate(&input).unwrap();
                let leaf = *path.last().unwrap();
                tree.expand(leaf, &legal, &output, path.len() == 1);
                tree.backup(&path, LeafValue::from_output(&output));
            }
            Selection::Terminal { path, value } => tree.backup(&path, value),
            other => panic!("unexpected selection {:?}", other),
        }
    }

    #[test]
    fn test_first_selection_claims_root() {
        let tree = tree_for(Position::empty(9, 9, Rules::chinese()).unwrap(), SearchParams::for_testing());
        let first = tree.select_leaf();
        assert!(matches!(&first, Selection::Leaf { path, .. } if path.len() == 1));
        // Root is being expanded, so a second thread must retry.
        assert!(matches!(tree.select_leaf(), Selection::Retry));
        assert_eq!(tree.root().virtual_losses(), 1);

        if let Selection::Leaf { path, .. } = first {
            tree.abandon(&path);
        }
        assert_eq!(tree.root().virtual_losses(), 0);
        assert_eq!(tree.root().expansion(), Expansion::Unexpanded);
    }

    #[test]
    fn test_visits_and_virtual_loss_balance() {
        let tree = tree_for(Position::empty(9, 9, Rules::chinese()).unwrap(), SearchParams::for_testing());
        for _ in 0..50 {
            simulate(&tree);
        }
        assert_eq!(tree.root_visits(), 50);
        let child_visits: u64 = tree.root().children().iter().map(|e| e.node.visits()).sum();
        assert_eq!(child_visits, 49);
        assert_eq!(tree.root().virtual_losses(), 0);
        assert!(tree.root().children().iter().all(|e| e.node.virtual_losses() == 0));
    }

    #[test]
    fn test_expand_renormalizes_over_legal_moves() {
        let position = Position::empty(9, 9, Rules::chinese()).unwrap();
        let tree = tree_for(position.clone(), SearchParams::for_testing());
        let legal = vec![Loc::point(0, 0), Loc::point(1, 0), Loc::Pass];
        let mut policy = vec![0.0; policy_len(9)];
        policy[policy_index(Loc::point(0, 0), 9)] = 0.3;
        policy[policy_index(Loc::point(1, 0), 9)] = 0.1;
        // Mass on an illegal point is dropped.
        policy[policy_index(Loc::point(5, 5), 9)] = 0.6;
        let output = EvalOutput {
            policy,
            win_loss: 0.0,
            score_mean: 0.0,
            score_stdev: 0.0,
            ownership: vec![0.0; 81],
        };

        assert!(tree.root().try_begin_expand());
        tree.expand(tree.root(), &legal, &output, true);
        let priors: Vec<f32> = tree.root().children().iter().map(|e| e.prior).collect();
        assert!((priors[0] - 0.75).abs() < 1e-6);
        assert!((priors[1] - 0.25).abs() < 1e-6);
        assert_eq!(priors[2], 0.0);
    }

    #[test]
    fn test_root_temperature_flattens_priors() {
        let params = SearchParams::for_testing().with_root_policy_temperature(2.0);
        let tree = tree_for(Position::empty(9, 9, Rules::chinese()).unwrap(), params);
        let shaped = tree.shape_root_priors(&[0.64, 0.36]);
        // sqrt: 0.8 / 0.6 -> 4/7, 3/7
        assert!((shaped[0] - 4.0 / 7.0).abs() < 1e-5);
        assert!((shaped[1] - 3.0 / 7.0).abs() < 1e-5);
    }

    #[test]
    fn test_root_noise_keeps_distribution() {
        let params = SearchParams::for_testing().with_root_noise(true);
        let tree = tree_for(Position::empty(9, 9, Rules::chinese()).unwrap(), params);
        let raw = vec![0.25f32; 4];
        let noisy = tree.shape_root_priors(&raw);
        let sum: f32 = noisy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert_ne!(noisy, raw);
    }

    #[test]
    fn test_backup_flips_perspective() {
        let tree = tree_for(Position::empty(9, 9, Rules::chinese()).unwrap(), SearchParams::for_testing());
        let parent = SearchNode::new();
        let child = SearchNode::new();
        let path = vec![&parent, &child];
        for node in &path {
            node.add_virtual_loss(1);
        }
        tree.backup(
            &path,
            LeafValue {
                win_loss: 0.5,
                score_mean: 4.0,
                score_stdev: 3.0,
            },
        );
        assert_eq!(child.stats().win_loss, 0.5);
        assert_eq!(parent.stats().win_loss, -0.5);
        assert_eq!(parent.stats().score_mean, -4.0);
        assert!((parent.stats().score_stdev - 3.0).abs() < 1e-9);
        assert!((child.stats().utility + parent.stats().utility).abs() < 1e-12);
        assert_eq!(parent.virtual_losses(), 0);
    }

    #[test]
    fn test_terminal_value_after_two_passes() {
        let position = Position::empty(5, 5, Rules::chinese())
            .unwrap()
            .play(Loc::Pass)
            .unwrap()
            .play(Loc::Pass)
            .unwrap();
        // Black to move, white wins by komi.
        let value = LeafValue::terminal(&position);
        assert_eq!(value.win_loss, -1.0);
        assert_eq!(value.score_mean, -7.5);

        let tree = tree_for(position, SearchParams::for_testing());
        assert!(matches!(tree.select_leaf(), Selection::Terminal { .. }));
    }

    #[test]
    fn test_ranked_moves_and_pv() {
        let tree = tree_for(Position::empty(5, 5, Rules::chinese()).unwrap(), SearchParams::for_testing());
        for _ in 0..120 {
            simulate(&tree);
        }
        let moves = tree.ranked_moves(5);
        assert!(!moves.is_empty());
        for pair in moves.windows(2) {
            assert!(pair[0].visits >= pair[1].visits);
        }
        for (i, info) in moves.iter().enumerate() {
            assert_eq!(info.order, i);
            assert_eq!(info.pv.first(), Some(&info.loc));
            assert!(info.pv.len() <= 5);
            assert!(info.utility_lcb <= info.utility);
        }
        assert_eq!(tree.best_move(), moves[0].loc);
        assert_eq!(tree.principal_variation(5), moves[0].pv);
    }

    #[test]
    fn test_best_move_without_child_visits() {
        let tree = tree_for(Position::empty(9, 9, Rules::chinese()).unwrap(), SearchParams::for_testing());
        assert_eq!(tree.best_move(), Loc::Pass);
        simulate(&tree);
        // Uniform priors: earliest board point wins the tie.
        assert_eq!(tree.best_move(), Loc::point(0, 0));
    }

    #[test]
    fn test_ownership_shape() {
        let tree = tree_for(Position::empty(5, 5, Rules::chinese()).unwrap(), SearchParams::for_testing());
        assert!(tree.ownership().is_none());
        for _ in 0..20 {
            simulate(&tree);
        }
        let ownership = tree.ownership().unwrap();
        assert_eq!(ownership.len(), 25);
        assert!(ownership.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn test_into_subtree_keeps_statistics() {
        let position = Position::empty(5, 5, Rules::chinese()).unwrap();
        let tree = tree_for(position.clone(), SearchParams::for_testing());
        for _ in 0..60 {
            simulate(&tree);
        }
        let best = tree.best_move();
        let kept_visits = tree.root().child(best).unwrap().node.visits();
        let next = position.play(best).unwrap();

        let reused = tree.into_subtree(best, next.clone());
        assert_eq!(reused.root_visits(), kept_visits);
        assert_eq!(reused.position().moves().len(), 1);

        // Unknown move starts from scratch.
        let fresh = reused.into_subtree(Loc::Pass, next.play(Loc::Pass).unwrap());
        assert!(fresh.root_visits() <= kept_visits);
    }
}
