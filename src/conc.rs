// Concentration hyperparameters shared (tied) across groups of tree nodes.
//
// Nodes never own their concentration: a registry holds every parameter and
// each node carries a plain index into it. A parameter in turn holds the
// indices of its member nodes, so resampling can read their marginal counts
// through the arena without any cyclic ownership.

use crate::node::NodeId;

use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma};

pub type ConcId = usize;

const PRIOR_SHAPE: f64 = 2.0;

// Stability ceiling; larger values make the Beta/Gamma draws and the
// log-gamma-ratio recurrence ill-conditioned.
const MAX_CONCENTRATION: f64 = 4000.0;

// Batch margin when the log-gamma-ratio cache must grow.
const CACHE_EXTEND_MARGIN: usize = 50;

/// A shared concentration with a derived-value cache and a Gibbs resampling
/// rule (auxiliary-variable scheme of Escobar and West).
pub struct Concentration {
    value: f64,
    log_value: f64,
    prior_rate: f64,
    /// `cache[n]` holds log(Gamma(value + n) / Gamma(value)).
    cache: Vec<f64>,
    tied: Vec<NodeId>,
}

impl Concentration {
    pub fn new() -> Self {
        Self::with_value(2.0)
    }

    pub fn with_value(c: f64) -> Self {
        assert!(c > 0.0, "concentration must be positive");
        let value = c.min(MAX_CONCENTRATION);
        let mut out = Self {
            value,
            log_value: value.ln(),
            prior_rate: PRIOR_SHAPE / c,
            cache: vec![0.0],
            tied: Vec::new(),
        };
        out.extend_cache(10);
        out
    }

    /// Registers a non-owning tie; called once per member node.
    pub fn add_node(&mut self, node: NodeId) {
        self.tied.push(node);
    }

    pub fn tied_nodes(&self) -> &[NodeId] {
        &self.tied
    }

    pub fn concentration(&self) -> f64 {
        self.value
    }

    pub fn log_concentration(&self) -> f64 {
        self.log_value
    }

    /// Caps at the stability ceiling; rebuilds the derived cache only when
    /// the value actually changed.
    pub fn set_concentration(&mut self, c: f64) {
        let value = c.min(MAX_CONCENTRATION);
        if self.value == value {
            return;
        }
        self.value = value;
        self.log_value = value.ln();
        self.cache.clear();
        self.cache.push(0.0);
        self.extend_cache(10);
    }

    /// Returns log(Gamma(value + n) / Gamma(value)) from the cache, growing
    /// it by a margin on a miss.
    pub fn log_gamma_ratio(&mut self, n: usize) -> f64 {
        if n >= self.cache.len() {
            self.extend_cache(n + CACHE_EXTEND_MARGIN);
        }
        self.cache[n]
    }

    fn extend_cache(&mut self, up_to: usize) {
        for i in self.cache.len()..=up_to {
            let previous = self.cache[i - 1];
            self.cache.push(previous + ((i - 1) as f64 + self.value).ln());
        }
    }

    /// One Gibbs update given each tied node's (marginal_nk, marginal_tk).
    ///
    /// For every member a Beta(c, marginal_nk) auxiliary draw contributes
    /// log(1/q) to the rate; the new value is Gamma(sum of marginal_tk +
    /// prior shape, 1/rate).
    pub fn resample<T: Rng>(&mut self, marginals: &[(usize, usize)], rng: &mut T) {
        let mut rate = self.prior_rate;
        let mut sum_tk = 0usize;
        for &(marginal_nk, marginal_tk) in marginals {
            sum_tk += marginal_tk;
            if marginal_nk == 0 {
                continue;
            }
            let beta = Beta::new(self.value, marginal_nk as f64).unwrap();
            let q = beta.sample(rng).max(1e-75);
            rate += (1.0 / q).ln();
        }
        let gamma = Gamma::new(sum_tk as f64 + PRIOR_SHAPE, 1.0 / rate).unwrap();
        self.set_concentration(gamma.sample(rng));
    }
}

impl Default for Concentration {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of every concentration in a training run. The subset created by
/// the tying strategy is resampled; the root's dedicated parameter is not.
#[derive(Default)]
pub struct ConcRegistry {
    entries: Vec<Concentration>,
    resampled: Vec<ConcId>,
}

impl ConcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, conc: Concentration, resample: bool) -> ConcId {
        let id = self.entries.len();
        self.entries.push(conc);
        if resample {
            self.resampled.push(id);
        }
        id
    }

    pub fn get(&self, id: ConcId) -> &Concentration {
        &self.entries[id]
    }

    pub fn get_mut(&mut self, id: ConcId) -> &mut Concentration {
        &mut self.entries[id]
    }

    pub fn resampled_ids(&self) -> Vec<ConcId> {
        self.resampled.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.resampled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;
    use statrs::function::gamma::ln_gamma;

    #[test]
    fn test_log_gamma_ratio_matches_ln_gamma() {
        for &c in &[0.5, 2.0, 37.0] {
            let mut conc = Concentration::with_value(c);
            for n in [0usize, 1, 2, 9, 10, 11, 63, 200] {
                assert_relative_eq!(
                    conc.log_gamma_ratio(n),
                    ln_gamma(c + n as f64) - ln_gamma(c),
                    epsilon = 1e-8,
                    max_relative = 1e-8
                );
            }
        }
    }

    #[test]
    fn test_cache_extends_in_batches() {
        let mut conc = Concentration::new();
        let before = conc.cache.len();
        conc.log_gamma_ratio(before + 1);
        assert!(conc.cache.len() >= before + 1 + CACHE_EXTEND_MARGIN);
    }

    #[test]
    fn test_value_is_capped() {
        let mut conc = Concentration::new();
        conc.set_concentration(1e9);
        assert_eq!(conc.concentration(), MAX_CONCENTRATION);
        assert_relative_eq!(conc.log_concentration(), MAX_CONCENTRATION.ln());
    }

    #[test]
    fn test_set_same_value_keeps_cache() {
        let mut conc = Concentration::new();
        conc.log_gamma_ratio(500);
        let len = conc.cache.len();
        conc.set_concentration(conc.concentration());
        assert_eq!(conc.cache.len(), len);
        conc.set_concentration(3.0);
        assert!(conc.cache.len() < len);
    }

    #[test]
    fn test_resample_is_positive_and_deterministic() {
        let marginals = vec![(120usize, 7usize), (40, 3), (0, 0)];
        let mut a = Concentration::new();
        let mut b = Concentration::new();
        a.resample(&marginals, &mut Pcg64Mcg::seed_from_u64(7));
        b.resample(&marginals, &mut Pcg64Mcg::seed_from_u64(7));
        assert!(a.concentration() > 0.0);
        assert!(a.concentration() <= MAX_CONCENTRATION);
        assert_eq!(a.concentration(), b.concentration());
    }
}
