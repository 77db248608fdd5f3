use sha2::{Digest, Sha256};

/// Number of hex characters in an entropy proof.
pub const PROOF_LEN: usize = 16;

/// Compute the proof of an entropy block: the first 16 hex characters of
/// its SHA-256 digest.
pub fn proof_of(block: &[u8]) -> String {
    let mut digest = hex::encode(Sha256::digest(block));
    digest.truncate(PROOF_LEN);
    digest
}

/// Check that `proof` was produced from `block`.
pub fn verify_proof(block: &[u8], proof: &str) -> bool {
    proof_of(block).eq_ignore_ascii_case(proof)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_length() {
        assert_eq!(proof_of(b"anything").len(), PROOF_LEN);
    }

    #[test]
    fn proof_verifies_its_own_block() {
        let block = [7u8; 32];
        let proof = proof_of(&block);
        assert!(verify_proof(&block, &proof));
        assert!(verify_proof(&block, &proof.to_uppercase()));
        assert!(!verify_proof(&[8u8; 32], &proof));
    }
}
