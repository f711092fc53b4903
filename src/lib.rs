//! Apache-2 licensed Huchash implementation.

// The reference algorithm used is from https://github.com/ethereum/wiki/wiki/Ethash

mod miller_rabin;

pub mod config;
pub mod dag;
pub mod dataset;
pub mod error;
pub mod io;
pub mod seed;
pub mod store;

use byteorder::{ByteOrder, LittleEndian};
use ethereum_types::{H256, H512};
use sha3::{Digest, Keccak256, Keccak512};

use miller_rabin::is_prime;

pub use config::DagConfig;
pub use dag::{EpochParams, FullDAG, LightDAG};
pub use dataset::{make_dataset, make_dataset_par};
pub use error::{DagError, IoError, LightError};
pub use seed::{get_seedhash, seedhash_for_epoch};
pub use store::DagStore;

pub const DATASET_BYTES_INIT: usize = 1073741824; // 2 to the power of 30.
pub const DATASET_BYTES_GROWTH: usize = 8388608; // 2 to the power of 23.
pub const CACHE_BYTES_INIT: usize = 16777216; // 2 to the power of 24.
pub const CACHE_BYTES_GROWTH: usize = 131072; // 2 to the power of 17.
pub const MIX_BYTES: usize = 128;
pub const WORD_BYTES: usize = 4;
pub const HASH_BYTES: usize = 64;
pub const DATASET_PARENTS: usize = 256;
pub const CACHE_ROUNDS: usize = 3;
pub const ACCESSES: usize = 64;

pub const EPOCH_LENGTH: u64 = 30000;

const HASH_WORDS: usize = HASH_BYTES / WORD_BYTES;
const MIX_WORDS: usize = MIX_BYTES / WORD_BYTES;
const MIX_HASHES: usize = MIX_BYTES / HASH_BYTES;

/// Epoch a block belongs to.
pub fn epoch(block_number: u64) -> u64 {
    block_number / EPOCH_LENGTH
}

/// Cache size in bytes for the given epoch. The node count is always prime.
pub fn get_cache_size(epoch: u64) -> usize {
    let mut sz = CACHE_BYTES_INIT + CACHE_BYTES_GROWTH * epoch as usize;
    sz -= HASH_BYTES;
    while !is_prime(sz / HASH_BYTES) {
        sz -= 2 * HASH_BYTES;
    }
    sz
}

/// Dataset size in bytes for the given epoch. The row count is always prime.
pub fn get_full_size(epoch: u64) -> usize {
    let mut sz = DATASET_BYTES_INIT + DATASET_BYTES_GROWTH * epoch as usize;
    sz -= MIX_BYTES;
    while !is_prime(sz / MIX_BYTES) {
        sz -= 2 * MIX_BYTES
    }
    sz
}

pub fn keccak_512(data: &[u8]) -> [u8; 64] {
    let mut output = [0u8; 64];
    output.copy_from_slice(&Keccak512::digest(data));
    output
}

pub fn keccak_256(data: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&Keccak256::digest(data));
    output
}

const FNV_PRIME: u32 = 0x01000193;

pub fn fnv(v1: u32, v2: u32) -> u32 {
    v1.wrapping_mul(FNV_PRIME) ^ v2
}

fn fnv_mix_hash(mix: &mut [u32], data: &[u32]) {
    for (m, d) in mix.iter_mut().zip(data) {
        *m = fnv(*m, *d);
    }
}

/// Make a Huchash cache using the given seed.
///
/// `cache.len()` should be a multiple of [`HASH_BYTES`]; trailing bytes are
/// left untouched.
pub fn make_cache(cache: &mut [u8], seed: H256) {
    let n = cache.len() / HASH_BYTES;
    if n == 0 {
        return;
    }

    cache[..HASH_BYTES].copy_from_slice(&keccak_512(seed.as_bytes()));
    for i in 1..n {
        let (last, next) = cache.split_at_mut(i * HASH_BYTES);
        next[..HASH_BYTES].copy_from_slice(&keccak_512(&last[(i - 1) * HASH_BYTES..]));
    }

    for _ in 0..CACHE_ROUNDS {
        for i in 0..n {
            let v = LittleEndian::read_u32(&cache[i * HASH_BYTES..]) as usize % n;
            let prev = (i + n - 1) % n;
            let mut r = [0u8; HASH_BYTES];
            for (j, b) in r.iter_mut().enumerate() {
                *b = cache[prev * HASH_BYTES + j] ^ cache[v * HASH_BYTES + j];
            }
            cache[i * HASH_BYTES..(i + 1) * HASH_BYTES].copy_from_slice(&keccak_512(&r));
        }
    }
}

/// Compute a single dataset item from the cache. Items only depend on the
/// cache, so any subset of them can be computed independently.
///
/// Panics if `cache` holds less than one [`HASH_BYTES`] node.
pub fn calc_dataset_item(cache: &[u8], i: usize) -> H512 {
    let n = cache.len() / HASH_BYTES;

    let mut seed = [0u8; HASH_BYTES];
    seed.copy_from_slice(&cache[(i % n) * HASH_BYTES..][..HASH_BYTES]);
    let head = LittleEndian::read_u32(&seed) ^ i as u32;
    LittleEndian::write_u32(&mut seed, head);

    let mut mix = [0u32; HASH_WORDS];
    LittleEndian::read_u32_into(&keccak_512(&seed), &mut mix);

    let mut parent = [0u32; HASH_WORDS];
    for j in 0..DATASET_PARENTS {
        let cache_index = fnv(i as u32 ^ j as u32, mix[j % HASH_WORDS]) as usize % n;
        LittleEndian::read_u32_into(
            &cache[cache_index * HASH_BYTES..(cache_index + 1) * HASH_BYTES],
            &mut parent,
        );
        fnv_mix_hash(&mut mix, &parent);
    }

    let mut out = [0u8; HASH_BYTES];
    LittleEndian::write_u32_into(&mix, &mut out);
    H512::from(keccak_512(&out))
}

/// Outcome of a single proof-of-work evaluation.
///
/// `success` is false only when the dataset lookup could not produce an
/// item; it says nothing about difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeResult {
    pub result: H256,
    pub mix_hash: H256,
    pub success: bool,
}

impl ComputeResult {
    fn failed() -> Self {
        Self {
            result: H256::zero(),
            mix_hash: H256::zero(),
            success: false,
        }
    }
}

/// "Main" function of Huchash, calculating the mix digest and result given
/// the header hash and nonce. `lookup` returns dataset item `i`, or `None`
/// when it cannot be read.
pub fn hashimoto<F>(
    header_hash: H256,
    nonce: u64,
    full_size: usize,
    lookup: F,
) -> ComputeResult
where
    F: Fn(usize) -> Option<H512>,
{
    let rows = (full_size / MIX_BYTES) as u32;
    if rows == 0 {
        return ComputeResult::failed();
    }

    let mut input = [0u8; 40]; // 32 + 8
    input[..32].copy_from_slice(header_hash.as_bytes());
    LittleEndian::write_u64(&mut input[32..], nonce);
    let seed = keccak_512(&input);
    let seed_head = LittleEndian::read_u32(&seed);

    let mut mix = [0u32; MIX_WORDS];
    for (i, w) in mix.iter_mut().enumerate() {
        *w = LittleEndian::read_u32(&seed[(i % HASH_WORDS) * WORD_BYTES..]);
    }

    let mut temp = [0u32; MIX_WORDS];
    for i in 0..ACCESSES {
        let p = (fnv(i as u32 ^ seed_head, mix[i % MIX_WORDS]) % rows) as usize * MIX_HASHES;
        for k in 0..MIX_HASHES {
            let item = match lookup(p + k) {
                Some(item) => item,
                None => return ComputeResult::failed(),
            };
            LittleEndian::read_u32_into(
                item.as_bytes(),
                &mut temp[k * HASH_WORDS..(k + 1) * HASH_WORDS],
            );
        }
        fnv_mix_hash(&mut mix, &temp);
    }

    let mut cmix = [0u32; MIX_WORDS / 4];
    for (i, c) in cmix.iter_mut().enumerate() {
        let w = &mix[i * 4..i * 4 + 4];
        *c = fnv(fnv(fnv(w[0], w[1]), w[2]), w[3]);
    }
    let mut mix_hash = [0u8; 32];
    LittleEndian::write_u32_into(&cmix, &mut mix_hash);

    let mut final_input = [0u8; 64 + 32];
    final_input[..64].copy_from_slice(&seed);
    final_input[64..].copy_from_slice(&mix_hash);

    ComputeResult {
        result: H256::from(keccak_256(&final_input)),
        mix_hash: H256::from(mix_hash),
        success: true,
    }
}

/// Huchash used by a light client. Only stores the cache rather than the
/// full dataset.
pub fn hashimoto_light(
    header_hash: H256,
    nonce: u64,
    full_size: usize,
    cache: &[u8],
) -> ComputeResult {
    if cache.len() < HASH_BYTES {
        return ComputeResult::failed();
    }
    hashimoto(header_hash, nonce, full_size, |i| {
        Some(calc_dataset_item(cache, i))
    })
}

/// Huchash used by a full client. Stores the whole dataset in memory.
pub fn hashimoto_full(header_hash: H256, nonce: u64, dataset: &[u8]) -> ComputeResult {
    hashimoto(header_hash, nonce, dataset.len(), |i| {
        dataset
            .get(i * HASH_BYTES..(i + 1) * HASH_BYTES)
            .map(H512::from_slice)
    })
}
