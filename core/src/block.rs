use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel payload carried by the genesis block on every node.
pub const GENESIS_DATA: &str = "genesis";

/// `prev_hash` of the genesis block: an all-zero string the length of a
/// SHA-256 hex digest.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One entry in the chain.
///
/// Field order here matches the wire format exactly: `{index, timestamp,
/// data, prev_hash, nonce, hash}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub data: String,
    pub prev_hash: String,
    pub nonce: u64,
    pub hash: String,
}

/// Writes `field` as `"{byte_len}:{field}"`, with no trailing separator.
///
/// Each field is self-delimiting: a value can contain any byte sequence,
/// including colons or the digits of another field's length, without being
/// able to forge a field boundary, since the boundary is fixed by the
/// length prefix rather than by scanning for a separator character.
fn push_length_prefixed(buf: &mut Vec<u8>, field: &str) {
    buf.extend_from_slice(field.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(field.as_bytes());
}

/// Canonical hash pre-image over (`index`, `timestamp`, `data`, `prev_hash`,
/// `nonce`), in that order.
pub fn canonical_preimage(index: u64, timestamp: i64, data: &str, prev_hash: &str, nonce: u64) -> Vec<u8> {
    let index_s = index.to_string();
    let timestamp_s = timestamp.to_string();
    let nonce_s = nonce.to_string();

    let mut buf = Vec::with_capacity(data.len() + prev_hash.len() + 32);
    push_length_prefixed(&mut buf, &index_s);
    push_length_prefixed(&mut buf, &timestamp_s);
    push_length_prefixed(&mut buf, data);
    push_length_prefixed(&mut buf, prev_hash);
    push_length_prefixed(&mut buf, &nonce_s);
    buf
}

/// SHA-256 of the canonical pre-image, lowercase hex.
pub fn compute_hash(index: u64, timestamp: i64, data: &str, prev_hash: &str, nonce: u64) -> String {
    let preimage = canonical_preimage(index, timestamp, data, prev_hash, nonce);
    hex::encode(Sha256::digest(&preimage))
}

impl Block {
    /// Recomputes the hash from this block's own fields, independent of
    /// the stored `hash` value.
    pub fn recompute_hash(&self) -> String {
        compute_hash(self.index, self.timestamp, &self.data, &self.prev_hash, self.nonce)
    }

    /// `true` if the stored `hash` matches recomputation.
    pub fn hash_is_consistent(&self) -> bool {
        self.hash == self.recompute_hash()
    }

    /// `true` if `hash` begins with `difficulty` hex-zero characters.
    pub fn satisfies_difficulty(&self, difficulty: usize) -> bool {
        hash_satisfies_difficulty(&self.hash, difficulty)
    }

    /// The canonical genesis block for a given difficulty, with `nonce`
    /// already mined to satisfy it.
    ///
    /// Every node must produce a byte-identical genesis block for a given
    /// difficulty so that chains from independently-bootstrapped nodes are
    /// comparable at all.
    pub fn genesis(difficulty: usize) -> Block {
        let index = 0;
        let timestamp = 0;
        let prev_hash = GENESIS_PREV_HASH.to_string();

        let mut nonce: u64 = 0;
        loop {
            let hash = compute_hash(index, timestamp, GENESIS_DATA, &prev_hash, nonce);
            if hash_satisfies_difficulty(&hash, difficulty) {
                return Block {
                    index,
                    timestamp,
                    data: GENESIS_DATA.to_string(),
                    prev_hash,
                    nonce,
                    hash,
                };
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// `true` if this is a byte-identical canonical genesis block for the
    /// given difficulty.
    pub fn is_canonical_genesis(&self, difficulty: usize) -> bool {
        self.index == 0
            && self.data == GENESIS_DATA
            && self.prev_hash == GENESIS_PREV_HASH
            && self.hash_is_consistent()
            && self.satisfies_difficulty(difficulty)
    }
}

/// `true` if `hash` begins with `difficulty` '0' hex characters.
pub fn hash_satisfies_difficulty(hash: &str, difficulty: usize) -> bool {
    let prefix_len = difficulty.min(hash.len());
    hash.as_bytes()[..prefix_len].iter().all(|&b| b == b'0') && hash.len() >= difficulty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recompute_hash_matches_construction() {
        let hash = compute_hash(1, 1000, "hello", GENESIS_PREV_HASH, 42);
        let block = Block {
            index: 1,
            timestamp: 1000,
            data: "hello".to_string(),
            prev_hash: GENESIS_PREV_HASH.to_string(),
            nonce: 42,
            hash: hash.clone(),
        };
        assert!(block.hash_is_consistent());
        assert_eq!(block.recompute_hash(), hash);
    }

    #[test]
    fn tampered_hash_is_detected() {
        let mut block = Block {
            index: 1,
            timestamp: 1000,
            data: "hello".to_string(),
            prev_hash: GENESIS_PREV_HASH.to_string(),
            nonce: 42,
            hash: compute_hash(1, 1000, "hello", GENESIS_PREV_HASH, 42),
        };
        block.hash.replace_range(0..1, if block.hash.starts_with('0') { "f" } else { "0" });
        assert!(!block.hash_is_consistent());
    }

    #[test]
    fn length_prefix_prevents_field_boundary_collision() {
        // Without length-prefixing, data="1|x" and a differently-split
        // field set could collide on a naive `|`-joined pre-image. The
        // length-prefixed encoding must not collide here.
        let a = canonical_preimage(1, 0, "ab", "c", 0);
        let b = canonical_preimage(1, 0, "a", "bc", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn genesis_is_canonical() {
        let genesis = Block::genesis(1);
        assert!(genesis.is_canonical_genesis(1));
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.prev_hash, GENESIS_PREV_HASH);
    }

    #[test]
    fn difficulty_check_respects_prefix_length() {
        assert!(hash_satisfies_difficulty("00ab", 2));
        assert!(!hash_satisfies_difficulty("0fab", 2));
        assert!(hash_satisfies_difficulty("anything", 0));
    }
}
