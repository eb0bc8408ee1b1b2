// Incremental computation of generalized log-Stirling numbers S(n, k) with a
// discount parameter (discount 0 gives the classic numbers).
//
// S(n, k) depends on S(n-1, k-1) and S(n-1, k), so extending the table by one
// row needs the previous row and extending by one column needs the previous
// column. Two 1-D frontier caches (the last completed row and the last
// completed column) keep those predecessors in double precision; completed
// values land in the backing store in single precision to bound memory.
//
// Extension requests go through the backing store, which may grant less
// (FixedStore caps at its construction bounds) or more (ChunkedStore rounds
// up to whole chunks) than asked. If a grant does not reach the queried
// index, the query fails with a capacity error instead of approximating.

use crate::error::Error;
use crate::math::log_add;
use crate::prelude::Discount;
use crate::store::{ChunkedStore, FixedStore, StirlingStore};

use statrs::function::gamma::ln_gamma;

// Growth factor applied to the current bound when a query overruns it.
const EXTEND_RATIO: f64 = 1.618;

pub struct LogStirlingGenerator {
    discount: f64,
    store: Box<dyn StirlingStore>,
    max_n: usize,
    /// Maximal k index; 0 means unbounded.
    max_k: usize,
    bound_n: usize,
    bound_k: usize,
    /// Last fully realized row, in double precision; `frontier_row[k - 1]`
    /// holds S(bound_n, k).
    frontier_row: Vec<f64>,
    /// Last fully realized column, in double precision; `frontier_col[n - 1]`
    /// holds S(n, bound_k).
    frontier_col: Vec<f64>,
}

impl LogStirlingGenerator {
    pub fn new(
        max_n: usize,
        max_k: usize,
        discount: Discount,
        store: Box<dyn StirlingStore>,
    ) -> Self {
        assert!(max_n >= 1, "max_n must be at least 1");
        Self {
            discount: discount.unwrap(),
            store,
            max_n,
            max_k,
            bound_n: 1,
            bound_k: 1,
            frontier_row: vec![0.0],
            frontier_col: vec![0.0],
        }
    }

    /// Generator over a preallocated store with both bounds known up front.
    pub fn fixed(max_n: usize, max_k: usize, discount: Discount) -> Self {
        assert!(max_k >= 1, "max_k must be at least 1 for a fixed store");
        Self::new(
            max_n,
            max_k,
            discount,
            Box::new(FixedStore::new(max_n, max_k)),
        )
    }

    /// Generator over a chunk-growing store, unbounded in k.
    pub fn chunked(max_n: usize, discount: Discount) -> Self {
        Self::new(max_n, 0, discount, Box::new(ChunkedStore::new()))
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn max_n(&self) -> usize {
        self.max_n
    }

    /// Returns log S(n, k), extending the caches as needed.
    pub fn query(&mut self, n: usize, k: usize) -> Result<f64, Error> {
        // Closed forms; n == k takes precedence over k == 0.
        if n == k {
            return Ok(0.0);
        }
        if k == 0 || n < k {
            return Ok(f64::NEG_INFINITY);
        }

        // Extend k first: any later growth over n then lays down longer rows
        // in one pass, which is cheaper than re-extending columns.
        if k > self.bound_k {
            let mut wanted = ((self.bound_k as f64 * EXTEND_RATIO) as usize).max(k);
            if self.max_k != 0 && wanted > self.max_k {
                wanted = self.max_k;
            }
            // Commit whatever was realized before reporting failure, so a
            // recovering caller sees a consistent frontier.
            let reached = self.extend_k(wanted);
            self.bound_k = reached;
            debug_assert_eq!(self.frontier_row.len(), self.bound_k);
            if k > reached {
                return Err(Error::StirlingCapacity {
                    dimension: 'k',
                    requested: k,
                    reached,
                });
            }
        }

        if n > self.bound_n {
            let wanted = ((self.bound_n as f64 * EXTEND_RATIO) as usize)
                .max(n)
                .min(self.max_n);
            let reached = self.extend_n(wanted);
            self.bound_n = reached;
            debug_assert_eq!(self.frontier_col.len(), self.bound_n);
            if n > reached {
                return Err(Error::StirlingCapacity {
                    dimension: 'n',
                    requested: n,
                    reached,
                });
            }
        }

        Ok(self.store.get(n, k) as f64)
    }

    // Realizes columns (bound_k, up_to] for all rows currently realized.
    // Returns the new maximal k index granted by the store.
    fn extend_k(&mut self, up_to: usize) -> usize {
        let mut up_to = self.store.extend_k(up_to);
        if self.max_k != 0 && up_to > self.max_k {
            up_to = self.max_k;
        }
        self.frontier_row.resize(up_to, 0.0);

        // Column by column: the frontier only carries the bottom row and the
        // last column, so rows cannot be appended here. Extensions over k are
        // small compared to extensions over n, so this is acceptable.
        for col in (self.bound_k + 1)..=up_to.min(self.bound_n) {
            // Implicit start at the diagonal S(col, col) = 0; `result` is the
            // vertical predecessor for the next row down.
            let mut result = 0.0;
            for row in (col + 1)..=self.bound_n {
                let diag = self.frontier_col[row - 2];
                let vert = result;
                result = log_add(
                    diag,
                    ((row - 1) as f64 - col as f64 * self.discount).ln() + vert,
                );
                self.store.set(row, col, result as f32);
                // Write back with a one-step lag so the next row still reads
                // the previous column's value.
                self.frontier_col[row - 2] = vert;
            }
            self.frontier_col[self.bound_n - 1] = result;
            self.frontier_row[col - 1] = result;
        }

        up_to
    }

    // Realizes rows (bound_n, up_to] across all currently realized columns.
    // Returns the new maximal n index granted by the store.
    fn extend_n(&mut self, up_to: usize) -> usize {
        let up_to = self.store.extend_n(up_to).min(self.max_n);
        self.frontier_col.resize(up_to, 0.0);

        for row in (self.bound_n + 1)..=up_to {
            // First cell of the row: S(row, 1) in closed form.
            let mut result = ln_gamma(row as f64 - self.discount) - ln_gamma(1.0 - self.discount);
            self.store.set(row, 1, result as f32);
            let last_col = self.bound_k.min(row - 1);
            for col in 2..=last_col {
                let diag = self.frontier_row[col - 2];
                // The vertical predecessor touches the diagonal exactly when
                // this is the last cell of the row.
                let vert = if row - 1 == col {
                    0.0
                } else {
                    self.frontier_row[col - 1]
                };
                // Lagged write, after the diagonal read above.
                self.frontier_row[col - 2] = result;
                result = log_add(
                    diag,
                    ((row - 1) as f64 - col as f64 * self.discount).ln() + vert,
                );
                self.store.set(row, col, result as f32);
            }
            self.frontier_row[last_col - 1] = result;
            self.frontier_col[row - 1] = result;
        }

        up_to
    }
}
