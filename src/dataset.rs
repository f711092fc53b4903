use rayon::prelude::*;
use rayon::ThreadPool;

use crate::error::DagError;
use crate::{calc_dataset_item, HASH_BYTES};

/// Make a Huchash dataset using the given cache.
pub fn make_dataset(dataset: &mut [u8], cache: &[u8]) {
    for (i, item) in dataset.chunks_exact_mut(HASH_BYTES).enumerate() {
        item.copy_from_slice(calc_dataset_item(cache, i).as_bytes());
    }
}

/// Make a Huchash dataset on `pool`, one progress chunk at a time.
///
/// After each chunk, `progress` receives the completed percentage from the
/// calling thread. Percentages strictly increase and the last one is 100.
/// Returning `true` stops generation; the buffer is then only partially
/// filled and must be discarded.
pub fn make_dataset_par<F>(
    dataset: &mut [u8],
    cache: &[u8],
    pool: &ThreadPool,
    mut progress: F,
) -> Result<(), DagError>
where
    F: FnMut(u32) -> bool,
{
    let items = dataset.len() / HASH_BYTES;
    if items == 0 {
        return Ok(());
    }
    let chunk_items = (items + 99) / 100;

    let mut done = 0;
    for chunk in dataset[..items * HASH_BYTES].chunks_mut(chunk_items * HASH_BYTES) {
        let base = done;
        pool.install(|| {
            chunk
                .par_chunks_mut(HASH_BYTES)
                .enumerate()
                .for_each(|(k, item)| {
                    item.copy_from_slice(calc_dataset_item(cache, base + k).as_bytes())
                })
        });
        done += chunk.len() / HASH_BYTES;

        let percent = (done * 100 / items) as u32;
        if progress(percent) {
            return Err(DagError::Aborted(percent));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make_cache;
    use ethereum_types::H256;

    fn fixture() -> (Vec<u8>, ThreadPool) {
        let mut cache = vec![0u8; 1024];
        make_cache(&mut cache, H256::zero());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        (cache, pool)
    }

    #[test]
    fn parallel_matches_sequential() {
        let (cache, pool) = fixture();
        let mut seq = vec![0u8; 333 * HASH_BYTES];
        let mut par = vec![0u8; 333 * HASH_BYTES];
        make_dataset(&mut seq, &cache);
        make_dataset_par(&mut par, &cache, &pool, |_| false).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn progress_is_monotonic_and_complete() {
        let (cache, pool) = fixture();
        for items in [1usize, 99, 100, 250, 512] {
            let mut dataset = vec![0u8; items * HASH_BYTES];
            let mut seen = Vec::new();
            make_dataset_par(&mut dataset, &cache, &pool, |p| {
                seen.push(p);
                false
            })
            .unwrap();
            assert!(seen.len() <= 100, "{} items", items);
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "{:?}", seen);
            assert_eq!(seen.last(), Some(&100));
        }
    }

    #[test]
    fn abort_stops_early() {
        let (cache, pool) = fixture();
        let mut dataset = vec![0u8; 1000 * HASH_BYTES];
        let mut calls = 0;
        let res = make_dataset_par(&mut dataset, &cache, &pool, |p| {
            calls += 1;
            p >= 10
        });
        assert!(matches!(res, Err(DagError::Aborted(10))));
        assert_eq!(calls, 10);
        // nothing past the tenth chunk was written
        assert!(dataset[100 * HASH_BYTES..].iter().all(|b| *b == 0));
    }
}
