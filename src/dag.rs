use std::path::Path;
use std::sync::Arc;

use ethereum_types::{H256, H512};
use log::{debug, info, warn};
use memmap2::{Mmap, MmapMut};
use rayon::ThreadPool;

use crate::config::DagConfig;
use crate::error::{DagError, IoError, LightError};
use crate::io::{self, DagFile, Prepared, MAGIC_NUM_SIZE};
use crate::{ComputeResult, HASH_BYTES, MIX_BYTES};

/// Everything that stays constant for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochParams {
    pub epoch: u64,
    pub seed: H256,
    pub cache_size: usize,
    pub full_size: usize,
}

impl EpochParams {
    pub fn for_epoch(epoch: u64) -> Self {
        Self {
            epoch,
            seed: crate::seedhash_for_epoch(epoch),
            cache_size: crate::get_cache_size(epoch),
            full_size: crate::get_full_size(epoch),
        }
    }

    pub fn for_block(number: u64) -> Self {
        Self::for_epoch(crate::epoch(number))
    }

    fn validate(&self) -> Result<(), LightError> {
        if self.cache_size == 0 || self.cache_size % HASH_BYTES != 0 {
            return Err(LightError::InvalidParams(
                "cache size must be a non-zero multiple of 64",
            ));
        }
        if self.full_size == 0 || self.full_size % MIX_BYTES != 0 {
            return Err(LightError::InvalidParams(
                "dataset size must be a non-zero multiple of 128",
            ));
        }
        Ok(())
    }
}

/// Light handle: the cache for one epoch. Read-only once built.
pub struct LightDAG {
    block_number: u64,
    params: EpochParams,
    cache: Vec<u8>,
}

impl LightDAG {
    pub fn new(number: u64) -> Result<Self, LightError> {
        Self::with_params(number, EpochParams::for_block(number))
    }

    /// Build a light handle with explicit sizes, e.g. reduced ones for tests.
    pub fn with_params(number: u64, params: EpochParams) -> Result<Self, LightError> {
        params.validate()?;

        let mut cache = Vec::new();
        cache
            .try_reserve_exact(params.cache_size)
            .map_err(|_| LightError::Alloc(params.cache_size))?;
        cache.resize(params.cache_size, 0);
        crate::make_cache(&mut cache, params.seed);

        Ok(Self {
            block_number: number,
            params,
            cache,
        })
    }

    pub fn compute(&self, hash: H256, nonce: u64) -> ComputeResult {
        crate::hashimoto_light(hash, nonce, self.params.full_size, &self.cache)
    }

    pub fn is_valid_for(&self, number: u64) -> bool {
        crate::epoch(number) == self.params.epoch
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn epoch(&self) -> u64 {
        self.params.epoch
    }

    pub fn seed(&self) -> H256 {
        self.params.seed
    }

    pub fn params(&self) -> &EpochParams {
        &self.params
    }

    pub fn cache(&self) -> &[u8] {
        &self.cache
    }

    pub fn full_size(&self) -> usize {
        self.params.full_size
    }
}

enum Storage {
    Memory(Vec<u8>),
    /// Whole file including the magic number header.
    Mapped(Mmap),
}

/// Full handle: the complete dataset for one epoch, either generated in
/// memory or mapped from the dataset directory. Dropping it releases the
/// buffer.
pub struct FullDAG {
    light: Arc<LightDAG>,
    storage: Storage,
}

impl FullDAG {
    /// Build the dataset through the default dataset directory.
    pub fn new<F>(light: Arc<LightDAG>, progress: F) -> Result<Self, DagError>
    where
        F: FnMut(u32) -> bool,
    {
        Self::with_config(light, &DagConfig::default(), progress)
    }

    /// Reuse the dataset file for this epoch if one is valid, otherwise
    /// generate it and persist it under `config.dataset_dir`.
    pub fn with_config<F>(
        light: Arc<LightDAG>,
        config: &DagConfig,
        progress: F,
    ) -> Result<Self, DagError>
    where
        F: FnMut(u32) -> bool,
    {
        let dir = config.dataset_dir.as_path();
        let seed = light.seed();
        let full_size = light.full_size();

        let file = match io::prepare(dir, &seed, full_size, config.force_create)? {
            Prepared::Match(file) => {
                info!("Reusing DAG file {}", file.path.display());
                // dataset files are never resized once sealed
                let map = unsafe { Mmap::map(&file.file) }
                    .map_err(|e| map_fail(&file, e))?;
                return Ok(Self {
                    light,
                    storage: Storage::Mapped(map),
                });
            }
            Prepared::Created(file) => file,
            Prepared::SizeMismatch | Prepared::MagicMismatch => {
                warn!(
                    "DAG file for epoch {} in {} is invalid, regenerating",
                    light.epoch(),
                    dir.display()
                );
                io::create(dir, &seed, full_size)?
            }
        };

        // the file was just created at its final length and no other handle
        // writes to it until it is sealed
        let mut map = unsafe { MmapMut::map_mut(&file.file) }.map_err(|e| map_fail(&file, e))?;
        let pool = build_pool(config.threads)?;
        info!("Generating DAG for epoch {} into {}", light.epoch(), file.path.display());
        crate::make_dataset_par(&mut map[MAGIC_NUM_SIZE..], light.cache(), &pool, progress)?;

        map.flush().map_err(|e| map_fail(&file, e))?;
        io::seal(&mut map);
        map.flush_range(0, MAGIC_NUM_SIZE)
            .map_err(|e| map_fail(&file, e))?;
        let map = map.make_read_only().map_err(|e| map_fail(&file, e))?;
        info!("DAG for epoch {} written to {}", light.epoch(), file.path.display());

        if config.datasets_on_disk > 0 {
            if let Err(e) = prune(dir, &light, config.datasets_on_disk) {
                warn!("Could not prune DAG files in {}: {}", dir.display(), e);
            }
        }

        Ok(Self {
            light,
            storage: Storage::Mapped(map),
        })
    }

    /// Generate the dataset in memory only, never touching the dataset
    /// directory.
    pub fn in_memory<F>(
        light: Arc<LightDAG>,
        config: &DagConfig,
        progress: F,
    ) -> Result<Self, DagError>
    where
        F: FnMut(u32) -> bool,
    {
        let full_size = light.full_size();
        let mut dataset = Vec::new();
        dataset
            .try_reserve_exact(full_size)
            .map_err(|_| DagError::Alloc(full_size))?;
        dataset.resize(full_size, 0);

        let pool = build_pool(config.threads)?;
        debug!("Generating DAG for epoch {} in memory", light.epoch());
        crate::make_dataset_par(&mut dataset, light.cache(), &pool, progress)?;

        Ok(Self {
            light,
            storage: Storage::Memory(dataset),
        })
    }

    pub fn compute(&self, hash: H256, nonce: u64) -> ComputeResult {
        let dag = self.dag();
        crate::hashimoto(hash, nonce, self.light.full_size(), |i| {
            dag.get(i * HASH_BYTES..(i + 1) * HASH_BYTES)
                .map(H512::from_slice)
        })
    }

    /// Read-only view of the dataset, without the file header.
    pub fn dag(&self) -> &[u8] {
        match &self.storage {
            Storage::Memory(dataset) => dataset.as_slice(),
            Storage::Mapped(map) => &map[MAGIC_NUM_SIZE..],
        }
    }

    pub fn dag_size(&self) -> u64 {
        self.dag().len() as u64
    }

    pub fn light(&self) -> &Arc<LightDAG> {
        &self.light
    }

    pub fn epoch(&self) -> u64 {
        self.light.epoch()
    }
}

fn map_fail(file: &DagFile, source: std::io::Error) -> IoError {
    log::error!("Could not map DAG file {}: {}", file.path.display(), source);
    IoError {
        op: "map DAG file",
        path: file.path.clone(),
        source,
    }
}

fn build_pool(threads: usize) -> Result<ThreadPool, DagError> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("huchash-dag-{}", i))
        .build()?)
}

/// Drop dataset files other than the current epoch and the `keep - 1`
/// epochs before it.
fn prune(dir: &Path, light: &LightDAG, keep: usize) -> Result<(), IoError> {
    let epoch = light.epoch();
    let first = epoch.saturating_sub(keep as u64 - 1);
    let mut seeds: Vec<H256> = (first..epoch).map(crate::seedhash_for_epoch).collect();
    seeds.push(light.seed());

    let removed = io::prune(dir, &seeds)?;
    if removed > 0 {
        debug!("Pruned {} DAG files from {}", removed, dir.display());
    }
    Ok(())
}
