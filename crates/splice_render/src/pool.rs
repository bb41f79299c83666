use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::trace;

const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Default)]
struct PoolInner {
    free: HashMap<(u32, u32), Vec<Vec<u8>>>,
    max_free_per_size: usize,
    allocated: usize,
    reused: usize,
}

fn lock(inner: &Mutex<PoolInner>) -> MutexGuard<'_, PoolInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocated: usize,
    pub reused: usize,
    pub free: usize,
}

/// Recycles RGBA pixel buffers. A [`Bitmap`] hands its buffer back when it
/// is dropped, so releasing thumbnails is just dropping them.
#[derive(Clone)]
pub struct BitmapPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl BitmapPool {
    pub fn new(max_free_per_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                max_free_per_size,
                ..Default::default()
            })),
        }
    }

    /// A zeroed bitmap, reusing a released buffer of the same size if one
    /// is available.
    pub fn acquire(&self, width: u32, height: u32) -> Bitmap {
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        let pixels = {
            let mut inner = lock(&self.inner);
            let reusable = inner.free.get_mut(&(width, height)).and_then(Vec::pop);
            match reusable {
                Some(mut buf) => {
                    inner.reused += 1;
                    buf.fill(0);
                    buf
                }
                None => {
                    inner.allocated += 1;
                    vec![0; len]
                }
            }
        };
        Bitmap {
            width,
            height,
            pixels,
            pool: Arc::downgrade(&self.inner),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = lock(&self.inner);
        PoolStats {
            allocated: inner.allocated,
            reused: inner.reused,
            free: inner.free.values().map(Vec::len).sum(),
        }
    }
}

impl Default for BitmapPool {
    fn default() -> Self {
        Self::new(32)
    }
}

impl fmt::Debug for BitmapPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapPool").field("stats", &self.stats()).finish()
    }
}

/// An RGBA image backed by a pooled buffer.
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    pool: Weak<Mutex<PoolInner>>,
}

impl Bitmap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Explicit form of dropping the bitmap.
    pub fn release(self) {}
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Drop for Bitmap {
    fn drop(&mut self) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let mut inner = lock(&pool);
        let max = inner.max_free_per_size;
        let free = inner.free.entry((self.width, self.height)).or_default();
        if free.len() < max {
            free.push(std::mem::take(&mut self.pixels));
            trace!(width = self.width, height = self.height, "bitmap returned to pool");
        }
    }
}
