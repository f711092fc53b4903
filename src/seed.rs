use ethereum_types::H256;
use lazy_static::lazy_static;
use parking_lot::Mutex;

lazy_static! {
    /// Last computed `(epoch, seed)` pair. Later epochs chain forward from it.
    static ref LAST_SEED: Mutex<(u64, H256)> = Mutex::new((0, H256::zero()));
}

/// Get the seedhash for a given block number.
pub fn get_seedhash(block_number: u64) -> H256 {
    seedhash_for_epoch(crate::epoch(block_number))
}

/// Get the seedhash for a given epoch: the zero hash hashed `epoch` times
/// with Keccak-256.
pub fn seedhash_for_epoch(epoch: u64) -> H256 {
    let mut last = LAST_SEED.lock();
    let (mut current, mut seed) = if last.0 <= epoch {
        *last
    } else {
        (0, H256::zero())
    };
    while current < epoch {
        seed = H256::from(crate::keccak_256(seed.as_bytes()));
        current += 1;
    }
    *last = (epoch, seed);
    seed
}
