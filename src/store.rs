// Backing stores for the log-Stirling generator.
//
// Both stores hold single-precision values addressed by 1-based (n, k)
// coordinates with k <= n, and both expose the same extension contract: an
// extension request returns the maximal index actually available, which may
// be smaller (FixedStore caps at its construction bounds) or larger
// (ChunkedStore rounds up to whole chunks) than the request.

/// Raw 2-D storage capability required by [`crate::stirling::LogStirlingGenerator`].
pub trait StirlingStore {
    /// Writes at (n, k). Indices start at 1. Out of bounds is a caller bug.
    fn set(&mut self, n: usize, k: usize, value: f32);

    /// Reads at (n, k). Indices start at 1. Out of bounds is a caller bug.
    fn get(&self, n: usize, k: usize) -> f32;

    /// Requests capacity along k up to the given index; returns the maximal
    /// index actually available.
    fn extend_k(&mut self, k: usize) -> usize;

    /// Requests capacity along n up to the given index; returns the maximal
    /// index actually available.
    fn extend_n(&mut self, n: usize) -> usize;
}

/// One contiguous preallocated region sized from known upper bounds.
///
/// Because k <= n, rows with n < K only need n cells: the region is laid out
/// as a dense triangle for the first K rows followed by a dense K-wide
/// rectangle for the rest. With zero-based coordinates:
///
/// ```text
/// index(n, k) = n(n+1)/2 + k                          for n < K
/// index(n, k) = K(K+1)/2 + (n - K) * K + k            for n >= K
/// ```
#[derive(Debug)]
pub struct FixedStore {
    data: Vec<f32>,
    n_max: usize,
    k_max: usize,
    triangle_len: usize,
}

impl FixedStore {
    /// Allocates (and zeroes) the full region for `n_max` rows and `k_max`
    /// columns up front.
    pub fn new(n_max: usize, k_max: usize) -> Self {
        assert!(n_max >= 1 && k_max >= 1, "store bounds must be at least 1");
        let triangle_rows = k_max.min(n_max);
        let triangle_len = triangle_rows * (triangle_rows + 1) / 2;
        let rectangle_len = n_max.saturating_sub(k_max) * k_max;
        let size = triangle_len + rectangle_len;
        log::debug!(
            "allocating fixed Stirling store: {} x {} ({} cells)",
            n_max,
            k_max,
            size
        );
        Self {
            data: vec![0.0; size],
            n_max,
            k_max,
            triangle_len,
        }
    }

    // Zero-based coordinates.
    fn index(&self, n: usize, k: usize) -> usize {
        if n < self.k_max {
            n * (n + 1) / 2 + k
        } else {
            self.triangle_len + (n - self.k_max) * self.k_max + k
        }
    }
}

impl StirlingStore for FixedStore {
    fn set(&mut self, n: usize, k: usize, value: f32) {
        let idx = self.index(n - 1, k - 1);
        self.data[idx] = value;
    }

    fn get(&self, n: usize, k: usize) -> f32 {
        self.data[self.index(n - 1, k - 1)]
    }

    fn extend_k(&mut self, k: usize) -> usize {
        k.min(self.k_max)
    }

    fn extend_n(&mut self, n: usize) -> usize {
        n.min(self.n_max)
    }
}

/// A growable store: a dense triangular block for small n plus, beyond it, a
/// 2-D grid of fixed-size chunks allocated on demand. Extension requests
/// round up to whole chunks and always succeed.
#[derive(Debug)]
pub struct ChunkedStore {
    triangle: Vec<f32>,
    rows: Vec<Vec<Vec<f32>>>,
    triangle_rows: usize,
    chunk_len: usize,
    n_chunks: usize,
}

impl ChunkedStore {
    const TRIANGLE_ROWS: usize = 1024;
    const CHUNK_LEN: usize = 512;

    pub fn new() -> Self {
        Self::with_geometry(Self::TRIANGLE_ROWS, Self::CHUNK_LEN)
    }

    /// Builds a store with a custom triangular-head height and chunk width.
    pub fn with_geometry(triangle_rows: usize, chunk_len: usize) -> Self {
        assert!(triangle_rows >= 1 && chunk_len >= 1);
        Self {
            triangle: vec![0.0; triangle_rows * (triangle_rows + 1) / 2],
            rows: Vec::new(),
            triangle_rows,
            chunk_len,
            // Chunk rows must always cover at least the k range reachable
            // from within the triangular block.
            n_chunks: triangle_rows / chunk_len + 1,
        }
    }
}

impl Default for ChunkedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StirlingStore for ChunkedStore {
    fn set(&mut self, n: usize, k: usize, value: f32) {
        let (n, k) = (n - 1, k - 1);
        if n < self.triangle_rows {
            self.triangle[n * (n + 1) / 2 + k] = value;
        } else {
            self.rows[n - self.triangle_rows][k / self.chunk_len][k % self.chunk_len] = value;
        }
    }

    fn get(&self, n: usize, k: usize) -> f32 {
        let (n, k) = (n - 1, k - 1);
        if n < self.triangle_rows {
            self.triangle[n * (n + 1) / 2 + k]
        } else {
            self.rows[n - self.triangle_rows][k / self.chunk_len][k % self.chunk_len]
        }
    }

    fn extend_k(&mut self, k: usize) -> usize {
        if k >= self.triangle_rows {
            let wanted = k / self.chunk_len + 1;
            if wanted > self.n_chunks {
                log::debug!("extending chunked store to {} chunks per row", wanted);
                for row in self.rows.iter_mut() {
                    while row.len() < wanted {
                        row.push(vec![0.0; self.chunk_len]);
                    }
                }
                self.n_chunks = wanted;
            }
            self.n_chunks * self.chunk_len
        } else {
            k
        }
    }

    fn extend_n(&mut self, n: usize) -> usize {
        if n > self.triangle_rows {
            let wanted = n - self.triangle_rows;
            if wanted > self.rows.len() {
                log::debug!("extending chunked store to {} rows past the triangle", wanted);
                while self.rows.len() < wanted {
                    self.rows
                        .push((0..self.n_chunks).map(|_| vec![0.0; self.chunk_len]).collect());
                }
            }
        }
        n
    }
}
