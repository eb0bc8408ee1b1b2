// Orchestration of the hierarchical Pitman-Yor smoothing run: tying-group
// construction, the Gibbs loop over tk and concentration updates, burn-in,
// probability accumulation, and point queries.

use crate::conc::{ConcId, ConcRegistry, Concentration};
use crate::error::Error;
use crate::node::{NodeArena, NodeId};
use crate::prelude::Discount;
use crate::stirling::LogStirlingGenerator;

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

const DEFAULT_ITERATIONS: usize = 5000;
const DEFAULT_FREQUENCY_SAMPLING_C: usize = 5;
const DEFAULT_SEED: u64 = 3_071_980;

/// How concentration parameters are shared across tree nodes. The root
/// always keeps its own dedicated, never-resampled parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TyingStrategy {
    /// One concentration per node.
    None,
    /// One concentration per sibling group.
    SameParent,
    /// One concentration per tree depth.
    #[default]
    Level,
    /// One global concentration for all non-root nodes.
    Single,
}

/// A conditional probability table over one target variable given several
/// categorical covariates, smoothed under a hierarchical Pitman-Yor prior.
///
/// Arities are fixed at construction; the tree topology is sparse and
/// materializes as observations arrive. After `smooth()`, `query` walks the
/// covariate path and returns the averaged post-burn-in distribution of the
/// deepest node reached.
pub struct ProbabilityTree {
    arena: NodeArena,
    concs: ConcRegistry,
    stirling: Option<LogStirlingGenerator>,
    rng: Pcg64Mcg,
    iterations: usize,
    burn_in: usize,
    frequency_sampling_c: usize,
    tying: TyingStrategy,
    n_datapoints: usize,
    smoothed: bool,
    // Scratch reused by every window-sampling step.
    window: Vec<f64>,
}

impl ProbabilityTree {
    /// Tree with default settings: 5000 iterations, `Level` tying.
    pub fn new(n_outcomes: usize, arities: Vec<usize>) -> Self {
        Self::with_options(
            n_outcomes,
            arities,
            DEFAULT_ITERATIONS,
            TyingStrategy::default(),
            DEFAULT_FREQUENCY_SAMPLING_C,
        )
    }

    pub fn with_options(
        n_outcomes: usize,
        arities: Vec<usize>,
        iterations: usize,
        tying: TyingStrategy,
        frequency_sampling_c: usize,
    ) -> Self {
        assert!(n_outcomes >= 2, "target needs at least two outcomes");
        assert!(!arities.is_empty(), "at least one covariate is required");
        assert!(arities.iter().all(|&a| a >= 1), "arities must be positive");
        assert!(iterations >= 1, "at least one iteration is required");
        assert!(frequency_sampling_c >= 1);
        Self {
            arena: NodeArena::new(n_outcomes, arities),
            concs: ConcRegistry::new(),
            stirling: None,
            rng: Pcg64Mcg::seed_from_u64(DEFAULT_SEED),
            iterations,
            burn_in: 1000.min(iterations / 10),
            frequency_sampling_c,
            tying,
            n_datapoints: 0,
            smoothed: false,
            window: Vec::new(),
        }
    }

    /// Reseeds the sampler. Runs with the same seed, data, and configuration
    /// are reproducible.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = Pcg64Mcg::seed_from_u64(seed);
    }

    /// Replaces the log-Stirling generator, e.g. with one backed by a
    /// preallocated fixed store when bounds are known up front.
    pub fn set_stirling_generator(&mut self, generator: LogStirlingGenerator) {
        self.stirling = Some(generator);
    }

    pub fn n_datapoints(&self) -> usize {
        self.n_datapoints
    }

    pub fn n_concentrations(&self) -> usize {
        self.concs.len()
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Adds a whole dataset and smooths. Each row is the target outcome
    /// followed by the covariate values.
    pub fn add_dataset(&mut self, data: &[Vec<usize>]) -> Result<f64, Error> {
        if data.is_empty() {
            return Err(Error::EmptyDataset);
        }
        for row in data {
            self.add_observation(row)?;
        }
        self.smooth()
    }

    /// Inserts one observation; re-smoothing afterwards is a full batch
    /// re-run over the accumulated data.
    pub fn add_observation(&mut self, values: &[usize]) -> Result<(), Error> {
        self.validate_row(values)?;
        self.arena.add_observation(values);
        self.n_datapoints += 1;
        self.smoothed = false;
        Ok(())
    }

    fn validate_row(&self, values: &[usize]) -> Result<(), Error> {
        let expected = self.arena.n_covariates() + 1;
        if values.len() != expected {
            return Err(Error::RowLength {
                expected,
                got: values.len(),
            });
        }
        if values[0] >= self.arena.n_outcomes() {
            return Err(Error::ValueOutOfRange {
                variable: 0,
                value: values[0],
                arity: self.arena.n_outcomes(),
            });
        }
        for (covariate, &value) in values[1..].iter().enumerate() {
            let arity = self.arena.arity(covariate);
            if value >= arity {
                return Err(Error::ValueOutOfRange {
                    variable: covariate + 1,
                    value,
                    arity,
                });
            }
        }
        Ok(())
    }

    /// Runs the full Gibbs sampling schedule and returns the final log score
    /// of the tree.
    pub fn smooth(&mut self) -> Result<f64, Error> {
        if self.n_datapoints == 0 {
            return Err(Error::EmptyDataset);
        }
        let rebuild = self
            .stirling
            .as_ref()
            .map_or(true, |s| s.max_n() < self.n_datapoints);
        if rebuild {
            self.stirling = Some(LogStirlingGenerator::chunked(
                self.n_datapoints,
                Discount::new(0.0),
            ));
        }

        log::info!(
            "smoothing {} observations over {} nodes ({} iterations, burn-in {})",
            self.n_datapoints,
            self.arena.len(),
            self.iterations,
            self.burn_in
        );

        self.build_tying_groups();
        self.arena.reset_accumulation();
        self.arena.prepare_for_sampling(&self.concs);

        // The generator leaves `self` for the duration of the loop so the
        // arena, registry, and rng can be borrowed independently.
        let mut stirling = self.stirling.take().expect("generator was just built");
        let result = self.run_gibbs(&mut stirling);
        self.stirling = Some(stirling);
        let score = result?;

        self.smoothed = true;
        log::info!("smoothing finished, log score {:.4}", score);
        Ok(score)
    }

    fn run_gibbs(&mut self, stirling: &mut LogStirlingGenerator) -> Result<f64, Error> {
        let root = self.arena.root();
        let max_depth = self.arena.n_covariates();
        let ids_by_depth: Vec<Vec<NodeId>> = (0..=max_depth)
            .map(|d| self.arena.nodes_at_depth(root, d))
            .collect();

        for iter in 0..self.iterations {
            // Deepest nodes first: a node's update mutates its parent's nk,
            // so children are resolved before their parent within a sweep.
            for depth in (0..=max_depth).rev() {
                for &id in &ids_by_depth[depth] {
                    self.arena.sample_tks(
                        &mut self.concs,
                        stirling,
                        &mut self.rng,
                        id,
                        &mut self.window,
                    )?;
                }
            }

            if (iter + self.frequency_sampling_c / 2) % self.frequency_sampling_c == 0 {
                self.resample_concentrations();
            }

            if iter >= self.burn_in {
                self.arena.compute_probabilities(&self.concs, root);
                self.arena.record_probabilities(root);
            }
        }

        self.arena.average_accumulated(root);
        self.arena.log_score_subtree(&mut self.concs, stirling, root)
    }

    fn resample_concentrations(&mut self) {
        for cid in self.concs.resampled_ids() {
            let marginals: Vec<(usize, usize)> = self
                .concs
                .get(cid)
                .tied_nodes()
                .iter()
                .map(|&id| {
                    let node = self.arena.node(id);
                    (node.marginal_nk, node.marginal_tk)
                })
                .collect();
            self.concs.get_mut(cid).resample(&marginals, &mut self.rng);
        }
    }

    // One parameter per tying group, rebuilt from scratch for each run; the
    // root gets a dedicated parameter that is never resampled.
    fn build_tying_groups(&mut self) {
        self.concs.clear();
        let root = self.arena.root();
        let max_depth = self.arena.n_covariates();

        match self.tying {
            TyingStrategy::None => {
                for depth in (1..=max_depth).rev() {
                    for id in self.arena.nodes_at_depth(root, depth) {
                        let cid = self.concs.insert(Concentration::new(), true);
                        self.tie(cid, id);
                    }
                }
            }
            TyingStrategy::SameParent => {
                for depth in (0..max_depth).rev() {
                    for parent in self.arena.nodes_at_depth(root, depth) {
                        let cid = self.concs.insert(Concentration::new(), true);
                        for child in self.arena.nodes_at_depth(parent, 1) {
                            self.tie(cid, child);
                        }
                    }
                }
            }
            TyingStrategy::Level => {
                for depth in (1..=max_depth).rev() {
                    let cid = self.concs.insert(Concentration::new(), true);
                    for id in self.arena.nodes_at_depth(root, depth) {
                        self.tie(cid, id);
                    }
                }
            }
            TyingStrategy::Single => {
                let cid = self.concs.insert(Concentration::new(), true);
                for depth in (1..=max_depth).rev() {
                    for id in self.arena.nodes_at_depth(root, depth) {
                        self.tie(cid, id);
                    }
                }
            }
        }

        let root_cid = self.concs.insert(Concentration::new(), false);
        self.arena.node_mut(root).conc = Some(root_cid);
    }

    fn tie(&mut self, cid: ConcId, id: NodeId) {
        self.concs.get_mut(cid).add_node(id);
        self.arena.node_mut(id).conc = Some(cid);
    }

    /// Current log joint likelihood of the whole tree.
    pub fn log_score(&mut self) -> Result<f64, Error> {
        let mut stirling = match self.stirling.take() {
            Some(s) => s,
            None => return Err(Error::NotSmoothed),
        };
        let root = self.arena.root();
        let result = self
            .arena
            .log_score_subtree(&mut self.concs, &mut stirling, root);
        self.stirling = Some(stirling);
        result
    }

    /// Returns the smoothed distribution over target outcomes for a
    /// covariate path. The path may be shorter than the number of
    /// covariates; a value that was never observed in training stops the
    /// walk, backing off to the deepest node reached.
    pub fn query(&self, path: &[usize]) -> Result<&[f64], Error> {
        if !self.smoothed {
            return Err(Error::NotSmoothed);
        }
        if path.len() > self.arena.n_covariates() {
            return Err(Error::RowLength {
                expected: self.arena.n_covariates(),
                got: path.len(),
            });
        }
        let mut id = self.arena.root();
        for (covariate, &value) in path.iter().enumerate() {
            let arity = self.arena.arity(covariate);
            if value >= arity {
                return Err(Error::ValueOutOfRange {
                    variable: covariate + 1,
                    value,
                    arity,
                });
            }
            let node = self.arena.node(id);
            if node.children.is_empty() {
                break;
            }
            match node.children[value] {
                Some(child) => id = child,
                None => break,
            }
        }
        Ok(self.arena.node(id).accumulated())
    }

    /// Verifies the count/table-count invariant over the whole tree.
    pub fn check_invariants(&self) -> bool {
        self.arena.check_nk_sum_tks(self.arena.root())
    }

    /// Frees the sampling state, keeping only what queries need.
    pub fn clear_sampling_state(&mut self) {
        self.arena.clear_sampling_state();
        self.window = Vec::new();
        self.stirling = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn two_covariate_data() -> Vec<Vec<usize>> {
        let mut rng = Pcg64Mcg::seed_from_u64(99);
        let mut data = Vec::new();
        for _ in 0..500 {
            let x1 = rng.random_range(0..2usize);
            let x2 = rng.random_range(0..3usize);
            let y = if rng.random::<f64>() < 0.2 {
                rng.random_range(0..2usize)
            } else {
                usize::from(x1 == 1 || x2 == 2)
            };
            data.push(vec![y, x1, x2]);
        }
        data
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        let mut tree = ProbabilityTree::new(2, vec![2]);
        assert!(matches!(tree.add_dataset(&[]), Err(Error::EmptyDataset)));
        assert!(matches!(tree.smooth(), Err(Error::EmptyDataset)));
    }

    #[test]
    fn test_query_before_smoothing_fails() {
        let mut tree = ProbabilityTree::new(2, vec![2]);
        tree.add_observation(&[0, 1]).unwrap();
        assert!(matches!(tree.query(&[1]), Err(Error::NotSmoothed)));
    }

    #[test]
    fn test_row_validation() {
        let mut tree = ProbabilityTree::new(2, vec![2, 3]);
        assert!(matches!(
            tree.add_observation(&[0, 1]),
            Err(Error::RowLength { expected: 3, got: 2 })
        ));
        assert!(matches!(
            tree.add_observation(&[2, 0, 0]),
            Err(Error::ValueOutOfRange { variable: 0, .. })
        ));
        assert!(matches!(
            tree.add_observation(&[0, 0, 3]),
            Err(Error::ValueOutOfRange { variable: 2, .. })
        ));
    }

    #[test]
    fn test_tying_group_counts() {
        let data = two_covariate_data();
        let cases = [
            (TyingStrategy::Level, 2 + 1),
            (TyingStrategy::Single, 1 + 1),
        ];
        for (tying, expected) in cases {
            let mut tree = ProbabilityTree::with_options(2, vec![2, 3], 20, tying, 5);
            tree.add_dataset(&data).unwrap();
            assert_eq!(tree.n_concentrations(), expected, "{:?}", tying);
        }

        // NONE: one per non-root node, plus the root's own.
        let mut tree = ProbabilityTree::with_options(2, vec![2, 3], 20, TyingStrategy::None, 5);
        tree.add_dataset(&data).unwrap();
        let n_non_root = tree.arena().len() - 1;
        assert_eq!(tree.n_concentrations(), n_non_root + 1);

        // SAME_PARENT: one per node that has children, plus the root's own.
        let mut tree =
            ProbabilityTree::with_options(2, vec![2, 3], 20, TyingStrategy::SameParent, 5);
        tree.add_dataset(&data).unwrap();
        let arena = tree.arena();
        let n_parents = arena.nodes_at_depth(arena.root(), 0).len()
            + arena.nodes_at_depth(arena.root(), 1).len();
        assert_eq!(tree.n_concentrations(), n_parents + 1);
    }

    #[test]
    fn test_invariants_hold_after_smoothing() {
        let mut tree = ProbabilityTree::with_options(2, vec![2, 3], 50, TyingStrategy::Level, 5);
        tree.add_dataset(&two_covariate_data()).unwrap();
        assert!(tree.check_invariants());

        let arena = tree.arena();
        let root = arena.node(arena.root());
        for k in 0..2 {
            let expected = usize::from(root.nk()[k] > 0);
            assert_eq!(root.tk()[k], expected);
        }
        for id in 0..arena.len() {
            let node = arena.node(id);
            for k in 0..2 {
                assert!(node.tk()[k] <= node.nk()[k]);
            }
        }
    }

    #[test]
    fn test_averaged_probabilities_are_normalized() {
        let mut tree = ProbabilityTree::with_options(2, vec![2, 3], 50, TyingStrategy::Level, 5);
        tree.add_dataset(&two_covariate_data()).unwrap();
        let arena = tree.arena();
        for id in 0..arena.len() {
            let sum: f64 = arena.node(id).accumulated().iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "node {} sums to {}", id, sum);
        }
    }

    #[test]
    fn test_identical_seeds_give_identical_results() {
        let data = two_covariate_data();
        let run = || {
            let mut tree =
                ProbabilityTree::with_options(2, vec![2, 3], 100, TyingStrategy::Level, 5);
            tree.set_seed(1234);
            let score = tree.add_dataset(&data).unwrap();
            let p = tree.query(&[1, 2]).unwrap().to_vec();
            (score, p)
        };
        let (score_a, p_a) = run();
        let (score_b, p_b) = run();
        assert_eq!(score_a.to_bits(), score_b.to_bits());
        assert_eq!(p_a, p_b);
    }

    #[test]
    fn test_recovers_conditional_probabilities() {
        let _ = env_logger::builder().is_test(true).try_init();
        // One covariate, two outcomes, known generating table.
        let table = [0.9, 0.3, 0.5]; // P(y = 1 | x)
        let mut rng = Pcg64Mcg::seed_from_u64(2024);
        let mut data = Vec::with_capacity(10_000);
        for _ in 0..10_000 {
            let x = rng.random_range(0..3usize);
            let y = usize::from(rng.random::<f64>() < table[x]);
            data.push(vec![y, x]);
        }

        let mut tree = ProbabilityTree::with_options(2, vec![3], 5000, TyingStrategy::Level, 5);
        let score = tree.add_dataset(&data).unwrap();
        assert!(score.is_finite());
        for x in 0..3 {
            let p = tree.query(&[x]).unwrap();
            assert!(
                (p[1] - table[x]).abs() < 0.05,
                "x = {}: got {:.3}, want {:.3}",
                x,
                p[1],
                table[x]
            );
        }
    }

    #[test]
    fn test_unseen_combination_backs_off_to_ancestor() {
        let mut tree = ProbabilityTree::with_options(2, vec![2, 2], 200, TyingStrategy::Level, 5);
        let mut data = Vec::new();
        for _ in 0..100 {
            data.push(vec![1, 0, 0]);
            data.push(vec![0, 1, 1]);
        }
        tree.add_dataset(&data).unwrap();
        // (x1 = 0, x2 = 1) was never observed: the walk stops at the x1 = 0
        // node, whose distribution the shorter path also yields.
        let full = tree.query(&[0, 1]).unwrap().to_vec();
        let prefix = tree.query(&[0]).unwrap().to_vec();
        assert_eq!(full, prefix);
        assert!(full[1] > 0.5);
    }

    #[test]
    fn test_constant_covariate_collapses_with_bounded_mass() {
        let data: Vec<Vec<usize>> = (0..200).map(|_| vec![1, 0]).collect();
        let mut tree = ProbabilityTree::with_options(2, vec![2], 500, TyingStrategy::Level, 5);
        tree.add_dataset(&data).unwrap();
        let p = tree.query(&[0]).unwrap();
        // Nearly all mass on the observed outcome, but the prior keeps both
        // probabilities strictly inside (0, 1).
        assert!(p[1] > 0.9);
        assert!(p[1] < 1.0);
        assert!(p[0] > 0.0);
    }

    #[test]
    fn test_incremental_observations_then_smooth() {
        let mut tree = ProbabilityTree::with_options(2, vec![2], 100, TyingStrategy::Level, 5);
        for _ in 0..50 {
            tree.add_observation(&[1, 0]).unwrap();
            tree.add_observation(&[0, 1]).unwrap();
        }
        let score = tree.smooth().unwrap();
        assert!(score.is_finite());
        assert!(tree.query(&[0]).unwrap()[1] > 0.5);
        assert!(tree.query(&[1]).unwrap()[0] > 0.5);
    }

    #[test]
    fn test_clear_sampling_state_keeps_queries_working() {
        let mut tree = ProbabilityTree::with_options(2, vec![2, 3], 50, TyingStrategy::Level, 5);
        tree.add_dataset(&two_covariate_data()).unwrap();
        let before = tree.query(&[1, 2]).unwrap().to_vec();
        tree.clear_sampling_state();
        assert_eq!(tree.query(&[1, 2]).unwrap(), &before[..]);
        // With the latent counts dropped there is nothing left to violate.
        assert!(tree.check_invariants());
    }
}
