//! Reed-Solomon over GF(2^6): RS(24,12,13) for P25 Phase 1 TDULC, and
//! RS(63,35)/RS(63,37) for P25 Phase 2 FACCH/SACCH.
//!
//! Codewords are arrays of GF(64) symbols in decreasing power-of-x order
//! (`codeword[0]` is the coefficient of `x^(n-1)`, the first transmitted
//! symbol). Two decode entry points are provided: [`ReedSolomon::decode_errors`]
//! (Berlekamp-Massey + Chien + Forney, for plain FEC with no known-bad
//! positions, used by TDULC) and [`ReedSolomon::decode_erasures`] (direct
//! linear solve against the known-erased positions, used by soft-decision
//! erasure marking. Erasure positions carry no implied error pattern, so up
//! to `n - k` of them are always recoverable).

use super::gf64 as gf;

#[derive(Debug, Clone)]
pub struct ReedSolomon {
    pub n: usize,
    pub k: usize,
    /// LFSR taps g_0..g_{n-k-1} of the generator polynomial (leading
    /// coefficient, always 1, is implicit).
    generator: Vec<u8>,
}

/// Outcome of an RS decode attempt, reported as data (not a crate error) per
/// the "transient decode error" / "soft-correctable error" taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RsOutcome {
    /// No errors detected; codeword accepted unmodified.
    Clean,
    /// Corrected `count` symbol errors (or recovered `count` erasures).
    Corrected { count: usize },
    /// More errors/erasures than the code's distance could guarantee; caller
    /// should treat the frame as a transient decode failure.
    Uncorrectable,
}

impl ReedSolomon {
    /// Builds the RS(n,k) codec over GF(64) with consecutive roots
    /// alpha^1..alpha^(n-k).
    pub fn new(n: usize, k: usize) -> Self {
        assert!(n <= gf::ORDER && k < n, "RS(n,k) out of range for GF(64)");
        let nk = n - k;
        let mut poly: Vec<u8> = vec![1];
        let mut root = gf::alpha();
        for _ in 0..nk {
            let mut next = vec![0u8; poly.len() + 1];
            for (i, &c) in poly.iter().enumerate() {
                next[i + 1] = gf::add(next[i + 1], c);
                next[i] = gf::add(next[i], gf::mul(c, root));
            }
            poly = next;
            root = gf::mul(root, gf::alpha());
        }
        debug_assert_eq!(poly.len(), nk + 1);
        debug_assert_eq!(poly[nk], 1);
        poly.truncate(nk);
        Self { n, k, generator: poly }
    }

    pub fn parity_len(&self) -> usize {
        self.n - self.k
    }

    /// Systematic encode: `message` has exactly `k` symbols, returns `n`
    /// symbols (message followed by parity).
    pub fn encode(&self, message: &[u8]) -> Vec<u8> {
        assert_eq!(message.len(), self.k);
        let nk = self.parity_len();
        let mut regs = vec![0u8; nk];
        for &m in message {
            let feedback = gf::add(m, regs[nk - 1]);
            for i in (1..nk).rev() {
                regs[i] = gf::add(regs[i - 1], gf::mul(feedback, self.generator[i]));
            }
            regs[0] = gf::mul(feedback, self.generator[0]);
        }
        let mut codeword = message.to_vec();
        codeword.extend(regs.into_iter().rev());
        codeword
    }

    fn syndromes(&self, received: &[u8]) -> Vec<u8> {
        let nk = self.parity_len();
        (0..nk)
            .map(|j| {
                let root = gf::pow(gf::alpha(), j as i64 + 1);
                gf::eval_poly_msb_first(received, root)
            })
            .collect()
    }

    /// Error-only decoding via Berlekamp-Massey, Chien search and Forney's
    /// formula. Corrects up to `floor((n-k)/2)` symbol errors.
    pub fn decode_errors(&self, received: &[u8]) -> (Vec<u8>, RsOutcome) {
        assert_eq!(received.len(), self.n);
        let nk = self.parity_len();
        let t = nk / 2;
        let synd = self.syndromes(received);
        if synd.iter().all(|&s| s == 0) {
            return (received.to_vec(), RsOutcome::Clean);
        }

        let lambda = berlekamp_massey(&synd);
        let errors = lambda.len() - 1;
        if errors == 0 || errors > t {
            return (received.to_vec(), RsOutcome::Uncorrectable);
        }

        let mut locations = Vec::with_capacity(errors);
        for loc in 0..self.n {
            let x_inv = gf::pow(gf::alpha(), -(loc as i64));
            if gf::eval_poly(&lambda, x_inv) == 0 {
                locations.push(loc);
            }
        }
        if locations.len() != errors {
            return (received.to_vec(), RsOutcome::Uncorrectable);
        }

        // Omega(x) = S(x) * Lambda(x) mod x^(n-k), with S(x) = S_1 + S_2 x + ...
        let omega = poly_mul_truncated(&synd, &lambda, nk);
        let lambda_deriv = formal_derivative(&lambda);

        let mut corrected = received.to_vec();
        for &loc in &locations {
            let x_inv = gf::pow(gf::alpha(), -(loc as i64));
            let num = gf::eval_poly(&omega, x_inv);
            let den = gf::eval_poly(&lambda_deriv, x_inv);
            if den == 0 {
                return (received.to_vec(), RsOutcome::Uncorrectable);
            }
            let magnitude = gf::div(num, den);
            let idx = self.n - 1 - loc;
            corrected[idx] = gf::add(corrected[idx], magnitude);
        }

        let check = self.syndromes(&corrected);
        if check.iter().all(|&s| s == 0) {
            (corrected, RsOutcome::Corrected { count: errors })
        } else {
            (received.to_vec(), RsOutcome::Uncorrectable)
        }
    }

    /// Pure erasure recovery: `erasures` are codeword indices (0-indexed from
    /// the front, same indexing as `received`) known to be unreliable; their
    /// content is ignored and solved for directly against the syndrome
    /// equations. Succeeds whenever `erasures.len() <= n - k` and the
    /// resulting linear system is non-singular (always true for distinct
    /// erasure positions under an MDS code).
    pub fn decode_erasures(&self, received: &[u8], erasures: &[usize]) -> (Vec<u8>, RsOutcome) {
        assert_eq!(received.len(), self.n);
        let nk = self.parity_len();
        if erasures.is_empty() {
            let synd = self.syndromes(received);
            return if synd.iter().all(|&s| s == 0) {
                (received.to_vec(), RsOutcome::Clean)
            } else {
                (received.to_vec(), RsOutcome::Uncorrectable)
            };
        }
        if erasures.len() > nk {
            return (received.to_vec(), RsOutcome::Uncorrectable);
        }

        let mut zeroed = received.to_vec();
        for &idx in erasures {
            zeroed[idx] = 0;
        }
        let synd = self.syndromes(&zeroed);

        // Powers of x (= n-1-idx) for each erased position.
        let powers: Vec<usize> = erasures.iter().map(|&idx| self.n - 1 - idx).collect();

        // Solve the m x m linear system (m = erasures.len()):
        //   sum_i e_i * alpha^{powers[i] * (j+1)} = S_j   for j = 0..m-1
        let m = erasures.len();
        let mut matrix: Vec<Vec<u8>> = (0..m)
            .map(|j| {
                powers
                    .iter()
                    .map(|&p| gf::pow(gf::alpha(), (p as i64) * (j as i64 + 1)))
                    .collect()
            })
            .collect();
        let mut rhs: Vec<u8> = synd[0..m].to_vec();

        if !gaussian_eliminate(&mut matrix, &mut rhs) {
            return (received.to_vec(), RsOutcome::Uncorrectable);
        }

        let mut corrected = received.to_vec();
        for (i, &idx) in erasures.iter().enumerate() {
            corrected[idx] = gf::add(corrected[idx], rhs[i]);
        }

        let check = self.syndromes(&corrected);
        if check.iter().all(|&s| s == 0) {
            (corrected, RsOutcome::Corrected { count: m })
        } else {
            (received.to_vec(), RsOutcome::Uncorrectable)
        }
    }
}

/// Berlekamp-Massey over GF(64). Returns Lambda(x), constant term 1, in
/// increasing-degree order.
fn berlekamp_massey(syndromes: &[u8]) -> Vec<u8> {
    let mut c = vec![1u8];
    let mut b = vec![1u8];
    let mut l = 0usize;
    let mut m = 1usize;
    let mut last_discrepancy = 1u8;

    for n in 0..syndromes.len() {
        let mut delta = syndromes[n];
        for i in 1..=l {
            if i < c.len() {
                delta = gf::add(delta, gf::mul(c[i], syndromes[n - i]));
            }
        }
        if delta == 0 {
            m += 1;
        } else if 2 * l <= n {
            let t_poly = c.clone();
            let coef = gf::div(delta, last_discrepancy);
            while c.len() < b.len() + m {
                c.push(0);
            }
            for (i, &bi) in b.iter().enumerate() {
                c[i + m] = gf::add(c[i + m], gf::mul(coef, bi));
            }
            l = n + 1 - l;
            b = t_poly;
            last_discrepancy = delta;
            m = 1;
        } else {
            let coef = gf::div(delta, last_discrepancy);
            while c.len() < b.len() + m {
                c.push(0);
            }
            for (i, &bi) in b.iter().enumerate() {
                c[i + m] = gf::add(c[i + m], gf::mul(coef, bi));
            }
            m += 1;
        }
    }
    c.truncate(l + 1);
    c
}

fn poly_mul_truncated(a: &[u8], b: &[u8], max_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; max_len];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 {
            continue;
        }
        for (j, &bj) in b.iter().enumerate() {
            if i + j >= max_len {
                break;
            }
            out[i + j] = gf::add(out[i + j], gf::mul(ai, bj));
        }
    }
    out
}

/// Formal derivative over GF(2^m): term i*c_i x^(i-1) survives only for odd i.
fn formal_derivative(poly: &[u8]) -> Vec<u8> {
    if poly.len() <= 1 {
        return vec![0];
    }
    (1..poly.len())
        .step_by(2)
        .map(|i| poly[i])
        .collect::<Vec<_>>()
}

/// Gaussian elimination over GF(64) solving `matrix * x = rhs` in place.
/// Returns `false` if `matrix` is singular.
fn gaussian_eliminate(matrix: &mut [Vec<u8>], rhs: &mut [u8]) -> bool {
    let m = matrix.len();
    for col in 0..m {
        let pivot = (col..m).find(|&r| matrix[r][col] != 0);
        let Some(pivot) = pivot else { return false };
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        let inv = gf::inv(matrix[col][col]);
        for c in col..m {
            matrix[col][c] = gf::mul(matrix[col][c], inv);
        }
        rhs[col] = gf::mul(rhs[col], inv);

        for r in 0..m {
            if r == col || matrix[r][col] == 0 {
                continue;
            }
            let factor = matrix[r][col];
            for c in col..m {
                matrix[r][c] = gf::add(matrix[r][c], gf::mul(factor, matrix[col][c]));
            }
            rhs[r] = gf::add(rhs[r], gf::mul(factor, rhs[col]));
        }
    }
    true
}
