//! Per-epoch handle retention.
//!
//! Handles are shared as `Arc`s. Moving to a new epoch inserts a new handle
//! and evicts the least recently used one; anyone still holding an evicted
//! handle keeps using it until they drop it.

use std::sync::Arc;

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;

use crate::config::DagConfig;
use crate::dag::{EpochParams, FullDAG, LightDAG};
use crate::error::{DagError, LightError};

type ParamsFn = Box<dyn Fn(u64) -> EpochParams + Send + Sync>;

pub struct DagStore {
    config: DagConfig,
    params: ParamsFn,
    lights: Mutex<LruCache<u64, Arc<LightDAG>>>,
    fulls: Mutex<LruCache<u64, Arc<FullDAG>>>,
    /// Serializes dataset creation so one file has a single writer.
    generating: Mutex<()>,
}

impl DagStore {
    pub fn new(config: DagConfig) -> Self {
        Self::with_params(config, EpochParams::for_epoch)
    }

    /// Store deriving epoch parameters through `params`, e.g. reduced sizes.
    pub fn with_params<P>(config: DagConfig, params: P) -> Self
    where
        P: Fn(u64) -> EpochParams + Send + Sync + 'static,
    {
        // at least the current epoch is always retained
        let lights = LruCache::new(config.caches_in_mem.max(1));
        let fulls = LruCache::new(config.datasets_in_mem.max(1));
        Self {
            config,
            params: Box::new(params),
            lights: Mutex::new(lights),
            fulls: Mutex::new(fulls),
            generating: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DagConfig {
        &self.config
    }

    /// Light handle for the epoch of `number`, built on first use.
    pub fn light(&self, number: u64) -> Result<Arc<LightDAG>, LightError> {
        let epoch = crate::epoch(number);
        if let Some(light) = self.lights.lock().get(&epoch) {
            return Ok(light.clone());
        }

        let light = Arc::new(LightDAG::with_params(number, (self.params)(epoch))?);
        let mut lights = self.lights.lock();
        if let Some(existing) = lights.get(&epoch) {
            return Ok(existing.clone());
        }
        insert(&mut *lights, epoch, light.clone(), "cache");
        Ok(light)
    }

    /// Full handle for the epoch of `number`, reusing or generating the
    /// dataset file under the configured directory.
    pub fn full<F>(&self, number: u64, progress: F) -> Result<Arc<FullDAG>, DagError>
    where
        F: FnMut(u32) -> bool,
    {
        let epoch = crate::epoch(number);
        if let Some(full) = self.fulls.lock().get(&epoch) {
            return Ok(full.clone());
        }

        let _generating = self.generating.lock();
        if let Some(full) = self.fulls.lock().get(&epoch) {
            return Ok(full.clone());
        }
        let light = self.light(number)?;
        let full = Arc::new(FullDAG::with_config(light, &self.config, progress)?);
        let mut fulls = self.fulls.lock();
        insert(&mut *fulls, epoch, full.clone(), "dataset");
        Ok(full)
    }
}

fn insert<T>(lru: &mut LruCache<u64, Arc<T>>, epoch: u64, handle: Arc<T>, kind: &str) {
    if lru.len() == lru.cap() {
        if let Some((evicted, _)) = lru.pop_lru() {
            debug!("Evicted {} for epoch {}", kind, evicted);
        }
    }
    lru.put(epoch, handle);
}
