//! HyperLogLog cardinality estimator, per §3/§6: precision 14 (16,384
//! registers, ~16 KB), `alpha ≈ 0.7213/(1+1.079/m)`. Value semantics:
//! `add` and `merge` both return a new estimate of set membership without
//! ever storing the elements themselves.

use stratum_primitives::murmur3_64;

use crate::config::HllConfig;

///
/// Hll
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hll {
    precision: u8,
    registers: Vec<u8>,
}

impl Hll {
    #[must_use]
    pub fn new(config: HllConfig) -> Self {
        let m = 1usize << config.precision;
        Self {
            precision: config.precision,
            registers: vec![0u8; m],
        }
    }

    #[must_use]
    pub fn registers_len(&self) -> usize {
        self.registers.len()
    }

    pub fn add(&mut self, bytes: &[u8]) {
        let hash = murmur3_64(bytes);
        let p = self.precision;
        let idx = (hash >> (64 - p)) as usize;
        // Shifting the index bits out leaves the remaining (64-p)-bit string
        // in the high bit positions; its leading-zero count is the rank.
        let remaining = hash << p;
        let rank = (remaining.leading_zeros() as u8) + 1;
        if rank > self.registers[idx] {
            self.registers[idx] = rank;
        }
    }

    /// Estimated cardinality, with small-range linear counting correction.
    #[must_use]
    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;
        let alpha_m = 0.7213 / (1.0 + 1.079 / m);

        let sum_inv: f64 = self.registers.iter().map(|&r| 2f64.powi(-(r as i32))).sum();
        let raw_estimate = alpha_m * m * m / sum_inv;

        let zeros = self.registers.iter().filter(|&&r| r == 0).count();
        if raw_estimate <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else {
            raw_estimate
        }
    }

    /// Mergeable: result equals the HLL that had observed the union of
    /// both inputs' elements.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        assert_eq!(self.precision, other.precision, "precision mismatch");
        let registers = self
            .registers
            .iter()
            .zip(other.registers.iter())
            .map(|(&a, &b)| a.max(b))
            .collect();
        Self {
            precision: self.precision,
            registers,
        }
    }
}
