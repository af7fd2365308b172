//! Process-stable content hashing for predicates and expressions.
//!
//! Expression identifiers double as DAG lookup keys, so they must be identical
//! across runs and across engine instances. We therefore hash canonicalized
//! payload bytes with FNV-1a instead of going through [std::hash::Hasher]
//! implementations seeded with process-randomized state.

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Salt mixed into the identifier of a conjunction.
pub(crate) const AND_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Salt mixed into the identifier of a disjunction.
///
/// Distinct from [AND_SALT] so that `And(a, b)` and `Or(a, b)` never collide.
pub(crate) const OR_SALT: u64 = 0xc2b2_ae3d_27d4_eb4f;

/// An incremental FNV-1a hasher over little-endian payload bytes.
#[derive(Debug)]
pub(crate) struct StableHasher(u64);

impl StableHasher {
    pub(crate) fn new() -> Self {
        Self(FNV_OFFSET)
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    pub(crate) fn write_u8(&mut self, value: u8) {
        self.write(&[value]);
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }

    pub(crate) fn write_i64(&mut self, value: i64) {
        self.write(&value.to_le_bytes());
    }

    /// Hashes the IEEE 754 bit pattern, so `0.0` and `-0.0` hash differently.
    pub(crate) fn write_f64(&mut self, value: f64) {
        self.write(&value.to_bits().to_le_bytes());
    }

    pub(crate) fn finish(&self) -> u64 {
        self.0
    }
}

/// Combines two child identifiers under an operator salt.
///
/// Callers are expected to pass children in canonical order; the combine
/// itself is deliberately order-sensitive so that unequal child sequences
/// produce unequal identifiers.
pub(crate) fn combine(salt: u64, left: u64, right: u64) -> u64 {
    let mut hasher = StableHasher::new();
    hasher.write_u64(salt);
    hasher.write_u64(left);
    hasher.write_u64(right);
    hasher.finish()
}
