//! Render-target allocation.
//!
//! The scene graph never talks to a GPU directly. Offscreen targets come from a
//! [`RenderTargetPool`] supplied by the embedder. Ownership is encoded in the
//! types:
//!
//! - [`RenderTarget`] is the owning handle. It is neither `Clone` nor `Copy`
//!   and [`RenderTargetPool::release`] consumes it, so a target can only be
//!   returned to the pool once.
//! - [`RenderTargetRef`] is a plain `Copy` reference used by draw submissions
//!   and by texturizers that borrow another node's target. It cannot be
//!   released.

use std::collections::HashMap;

use crate::error::{SceneError, SceneResult};

/// Owning handle to a pooled render target.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    id: u64,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// Create a handle. Only pool implementations should call this.
    pub fn new(id: u64, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Non-owning reference to this target.
    pub fn target_ref(&self) -> RenderTargetRef {
        RenderTargetRef {
            id: self.id,
            width: self.width,
            height: self.height,
        }
    }
}

/// Non-owning reference to a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetRef {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

/// Pooled allocator for offscreen render targets.
pub trait RenderTargetPool {
    /// Hand out a target of exactly `width`×`height`.
    fn allocate(&mut self, width: u32, height: u32) -> SceneResult<RenderTarget>;

    /// Return a target to the pool.
    fn release(&mut self, target: RenderTarget);
}

/// Pool limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturePoolConfig {
    /// Maximum bytes held by live and idle targets together.
    pub max_bytes: usize,
    /// Maximum number of idle targets kept per (w, h) bucket.
    pub max_per_bucket: usize,
}

impl Default for TexturePoolConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            max_per_bucket: 4,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TexturePoolStats {
    /// Number of `allocate` calls, successful or not.
    pub allocate_calls: u64,
    /// Targets created from scratch.
    pub created: u64,
    /// Allocations served from an idle bucket.
    pub reused: u64,
    /// Number of `release` calls.
    pub release_calls: u64,
    /// Idle targets dropped to stay under the limits.
    pub evicted: u64,
    /// Allocations refused.
    pub failures: u64,
    pub live_targets: usize,
    pub idle_targets: usize,
    pub used_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey {
    width: u32,
    height: u32,
}

impl BucketKey {
    fn byte_len(self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }
}

/// Bounded pool keyed by target size.
///
/// Released targets are parked in their bucket and handed out again for the
/// next request of the same size. When a fresh target would exceed the byte
/// budget, idle targets are evicted first; if that is not enough the
/// allocation fails.
#[derive(Debug)]
pub struct TexturePool {
    config: TexturePoolConfig,
    stats: TexturePoolStats,
    buckets: HashMap<BucketKey, Vec<RenderTarget>>,
    next_id: u64,
}

impl TexturePool {
    pub fn new(config: TexturePoolConfig) -> Self {
        Self {
            config,
            stats: TexturePoolStats::default(),
            buckets: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn stats(&self) -> TexturePoolStats {
        self.stats.clone()
    }

    pub fn config(&self) -> TexturePoolConfig {
        self.config
    }

    /// Drop every idle target.
    pub fn clear_idle(&mut self) {
        let keys: Vec<BucketKey> = self.buckets.keys().copied().collect();
        for key in keys {
            if let Some(bucket) = self.buckets.remove(&key) {
                self.forget_idle(key, bucket.len());
            }
        }
    }

    fn forget_idle(&mut self, key: BucketKey, count: usize) {
        self.stats.idle_targets = self.stats.idle_targets.saturating_sub(count);
        self.stats.used_bytes = self
            .stats
            .used_bytes
            .saturating_sub(key.byte_len().saturating_mul(count));
        self.stats.evicted = self.stats.evicted.saturating_add(count as u64);
    }

    /// Evict idle targets until `needed` more bytes fit, or nothing is left.
    fn make_room(&mut self, needed: usize) -> bool {
        while self.stats.used_bytes.saturating_add(needed) > self.config.max_bytes {
            let Some(key) = self
                .buckets
                .iter()
                .find(|(_, targets)| !targets.is_empty())
                .map(|(key, _)| *key)
            else {
                return false;
            };
            if let Some(bucket) = self.buckets.get_mut(&key) {
                bucket.pop();
            }
            self.forget_idle(key, 1);
        }
        true
    }
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new(TexturePoolConfig::default())
    }
}

impl RenderTargetPool for TexturePool {
    fn allocate(&mut self, width: u32, height: u32) -> SceneResult<RenderTarget> {
        self.stats.allocate_calls = self.stats.allocate_calls.saturating_add(1);

        if width == 0 || height == 0 {
            self.stats.failures = self.stats.failures.saturating_add(1);
            return Err(SceneError::InvalidRenderTargetSize { width, height });
        }

        let key = BucketKey { width, height };
        if let Some(target) = self.buckets.get_mut(&key).and_then(|b| b.pop()) {
            self.stats.reused = self.stats.reused.saturating_add(1);
            self.stats.idle_targets = self.stats.idle_targets.saturating_sub(1);
            self.stats.live_targets = self.stats.live_targets.saturating_add(1);
            return Ok(target);
        }

        if !self.make_room(key.byte_len()) {
            self.stats.failures = self.stats.failures.saturating_add(1);
            log::warn!(
                "Render target pool exhausted: {}x{} needs {} bytes, {} of {} in use",
                width,
                height,
                key.byte_len(),
                self.stats.used_bytes,
                self.config.max_bytes
            );
            return Err(SceneError::allocation(width, height, "pool budget exhausted"));
        }

        let id = self.next_id;
        self.next_id += 1;
        self.stats.created = self.stats.created.saturating_add(1);
        self.stats.live_targets = self.stats.live_targets.saturating_add(1);
        self.stats.used_bytes = self.stats.used_bytes.saturating_add(key.byte_len());
        log::trace!("Created render target #{} ({}x{})", id, width, height);
        Ok(RenderTarget::new(id, width, height))
    }

    fn release(&mut self, target: RenderTarget) {
        self.stats.release_calls = self.stats.release_calls.saturating_add(1);
        self.stats.live_targets = self.stats.live_targets.saturating_sub(1);

        let key = BucketKey {
            width: target.width,
            height: target.height,
        };
        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() >= self.config.max_per_bucket {
            self.stats.used_bytes = self.stats.used_bytes.saturating_sub(key.byte_len());
            self.stats.evicted = self.stats.evicted.saturating_add(1);
            return;
        }
        bucket.push(target);
        self.stats.idle_targets = self.stats.idle_targets.saturating_add(1);
    }
}
