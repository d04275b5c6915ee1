use std::collections::HashMap;

use crate::{backend::Storage, texture::TextureShape};

/// Spare texture storage, bucketed by size class.
///
/// Each class retains at most `limit` spares; anything beyond is freed.
pub(crate) struct TexturePool {
    free: HashMap<TextureShape, Vec<Storage>>,
    limit: usize,
}
impl TexturePool {
    pub fn new(limit: usize) -> TexturePool {
        TexturePool {
            free: HashMap::new(),
            limit,
        }
    }

    pub fn take(&mut self, shape: TextureShape) -> Option<Storage> {
        self.free.get_mut(&shape)?.pop()
    }

    /// Returns `false` if the class is full and the storage was freed instead.
    pub fn put(&mut self, shape: TextureShape, storage: Storage) -> bool {
        let spares = self.free.entry(shape).or_default();
        if spares.len() >= self.limit {
            return false;
        }
        spares.push(storage);
        true
    }

    /// Free every spare. Returns how many were freed.
    pub fn drain(&mut self) -> usize {
        let freed = self.len();
        self.free.clear();
        freed
    }

    pub fn len(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}
