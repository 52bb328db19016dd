use crate::block::Block;
use crate::error::RejectReason;
use serde::{Deserialize, Serialize};

/// The node's local, append-mostly ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    blocks: Vec<Block>,
}

/// Outcome of offering a single block to `Chain::receive_block`, matching
/// the cases enumerated for `/receive_block`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Extended the tip; the block is now part of the chain.
    Accepted,
    /// `block.index <= tip.index`; state unchanged.
    Stale,
    /// `block.index > tip.index + 1`; a sync pass should be triggered.
    Orphan,
    /// `block.index == tip.index + 1` but `prev_hash` does not match; a
    /// sync pass should be triggered (we are on a divergent branch).
    LinkageMismatch,
    /// Failed a core invariant (hash mismatch / insufficient work) even
    /// though it extended the tip positionally.
    Invalid(RejectReason),
}

/// Validates `block` against its immediate predecessor (§4.4 Validate(block, prev)).
pub fn validate_against_predecessor(block: &Block, prev: &Block, difficulty: usize) -> Result<(), RejectReason> {
    if !block.hash_is_consistent() {
        return Err(RejectReason::HashMismatch);
    }
    if !block.satisfies_difficulty(difficulty) {
        return Err(RejectReason::InsufficientWork { difficulty });
    }
    if block.index != prev.index + 1 {
        return Err(RejectReason::Orphan { index: block.index, tip_index: prev.index });
    }
    if block.prev_hash != prev.hash {
        return Err(RejectReason::LinkageMismatch);
    }
    Ok(())
}

/// Validates an entire candidate chain end-to-end (§4.4 Validate(chain)).
pub fn validate_chain(blocks: &[Block], difficulty: usize) -> Result<(), RejectReason> {
    let genesis = blocks.first().ok_or(RejectReason::EmptyChain)?;
    if !genesis.is_canonical_genesis(difficulty) {
        return Err(RejectReason::BadGenesis);
    }
    for pair in blocks.windows(2) {
        let (prev, block) = (&pair[0], &pair[1]);
        validate_against_predecessor(block, prev, difficulty)?;
    }
    Ok(())
}

impl Chain {
    /// Builds a fresh chain containing only the canonical genesis block.
    pub fn genesis(difficulty: usize) -> Chain {
        Chain { blocks: vec![Block::genesis(difficulty)] }
    }

    /// Wraps an already-validated block list. Callers must validate first
    /// (see `validate_chain`); this constructor does not re-check.
    pub fn from_validated_blocks(blocks: Vec<Block>) -> Chain {
        Chain { blocks }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The block at the greatest index.
    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain invariant: at least genesis always present")
    }

    /// Offers a single candidate block for tip extension, classifying it
    /// per §4.3. Appends on `Accepted`; leaves state untouched otherwise.
    pub fn receive_block(&mut self, block: Block, difficulty: usize) -> ReceiveOutcome {
        let tip = self.tip();

        if block.index <= tip.index {
            return ReceiveOutcome::Stale;
        }
        if block.index > tip.index + 1 {
            return ReceiveOutcome::Orphan;
        }
        if block.prev_hash != tip.hash {
            return ReceiveOutcome::LinkageMismatch;
        }

        match validate_against_predecessor(&block, tip, difficulty) {
            Ok(()) => {
                self.blocks.push(block);
                ReceiveOutcome::Accepted
            }
            Err(reason) => ReceiveOutcome::Invalid(reason),
        }
    }

    /// Appends a freshly-mined block onto the current tip. Caller is
    /// responsible for having mined against the current tip; this simply
    /// records the result (mining itself performs the PoW, and the tip may
    /// have changed concurrently — callers must re-check before calling).
    pub fn append_mined(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Replaces this chain with `candidate` if it is strictly longer.
    /// Ties keep the local chain. Caller must have already end-to-end
    /// validated `candidate`. Returns `true` if replacement occurred.
    pub fn replace_if_longer(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() > self.blocks.len() {
            self.blocks = candidate;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mine_next(prev: &Block, data: &str, difficulty: usize) -> Block {
        let mut nonce = 0u64;
        loop {
            let hash = crate::block::compute_hash(prev.index + 1, 0, data, &prev.hash, nonce);
            if crate::block::hash_satisfies_difficulty(&hash, difficulty) {
                return Block {
                    index: prev.index + 1,
                    timestamp: 0,
                    data: data.to_string(),
                    prev_hash: prev.hash.clone(),
                    nonce,
                    hash,
                };
            }
            nonce += 1;
        }
    }

    #[test]
    fn genesis_chain_has_length_one() {
        let chain = Chain::genesis(1);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.tip().index, 0);
    }

    #[test]
    fn happy_path_extension_accepted() {
        let mut chain = Chain::genesis(1);
        let next = mine_next(chain.tip(), "alpha", 1);
        assert_eq!(chain.receive_block(next, 1), ReceiveOutcome::Accepted);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn stale_block_rejected_without_state_change() {
        let mut chain = Chain::genesis(1);
        let next = mine_next(chain.tip(), "alpha", 1);
        chain.receive_block(next.clone(), 1);
        // Re-offering the same (now stale relative to nothing, but already
        // consumed) index must be rejected as stale.
        assert_eq!(chain.receive_block(next, 1), ReceiveOutcome::Stale);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn forward_gap_is_orphan() {
        let mut chain = Chain::genesis(1);
        let first = mine_next(chain.tip(), "a", 1);
        let second = mine_next(&first, "b", 1);
        assert_eq!(chain.receive_block(second, 1), ReceiveOutcome::Orphan);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn linkage_mismatch_at_equal_index() {
        let mut chain = Chain::genesis(1);
        let genesis_for_fork = Block::genesis(1);
        // A block claiming to extend a different genesis-equivalent block
        // at the same index as a real extension.
        let divergent = mine_next(&genesis_for_fork, "divergent", 1);
        let mut divergent = divergent;
        divergent.prev_hash = "not-the-real-tip-hash".to_string();
        divergent.hash = divergent.recompute_hash();
        assert_eq!(chain.receive_block(divergent, 1), ReceiveOutcome::LinkageMismatch);
    }

    #[test]
    fn replace_only_when_strictly_longer() {
        let mut chain = Chain::genesis(1);
        let short = chain.blocks().to_vec();
        assert!(!chain.replace_if_longer(short));

        let mut longer = chain.blocks().to_vec();
        let extra = mine_next(longer.last().unwrap(), "extra", 1);
        longer.push(extra);
        assert!(chain.replace_if_longer(longer));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn validate_chain_detects_bad_genesis() {
        let mut blocks = vec![Block::genesis(1)];
        blocks[0].data = "tampered".to_string();
        blocks[0].hash = blocks[0].recompute_hash();
        assert_eq!(validate_chain(&blocks, 1), Err(RejectReason::BadGenesis));
    }
}
