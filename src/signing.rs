//! Operator signing surface (§6).
//!
//! `sign`/`verify` are the default SHA-256-based implementation the spec
//! calls out explicitly: "production implementations substitute BLS with
//! identical semantics." Nothing upstream of this module should assume
//! anything about the signature scheme beyond `verify(sign(o,t,v),o,t,v) ==
//! true` and the asymmetry across operator ids (invariant 6).

use sha2::{Digest, Sha256};

/// Sign `(operator_id, task_id, value)`. `value` is formatted to two decimal
/// places before hashing, matching the wire format used everywhere else this
/// tuple is hashed (aggregated signatures, verification hashes).
pub fn sign(operator_id: &str, task_id: &str, value: f64) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{:.2}", operator_id, task_id, value));
    hasher.finalize().to_vec()
}

/// Verify a signature produced by [`sign`]. Symmetric with `sign` by
/// construction — recomputes the same digest and compares.
pub fn verify(signature: &[u8], operator_id: &str, task_id: &str, value: f64) -> bool {
    sign(operator_id, task_id, value) == signature
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let sig = sign("op-a", "task-1", 22.456);
        assert!(verify(&sig, "op-a", "task-1", 22.456));
    }

    #[test]
    fn rejects_wrong_operator() {
        let sig = sign("op-a", "task-1", 22.456);
        assert!(!verify(&sig, "op-b", "task-1", 22.456));
    }

    #[test]
    fn rejects_wrong_task() {
        let sig = sign("op-a", "task-1", 22.456);
        assert!(!verify(&sig, "op-a", "task-2", 22.456));
    }

    #[test]
    fn tolerates_sub_cent_precision_noise() {
        // value is rounded to 2dp before hashing, so 22.4561 and 22.4558
        // both sign identically — this is intentional (it's the wire
        // precision used for aggregated signatures too).
        let sig = sign("op-a", "task-1", 22.4561);
        assert!(verify(&sig, "op-a", "task-1", 22.4558));
    }

    #[test]
    fn distinguishes_materially_different_values() {
        let sig = sign("op-a", "task-1", 22.45);
        assert!(!verify(&sig, "op-a", "task-1", 22.46));
    }
}
