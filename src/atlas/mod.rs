//! Icon texture atlas
//!
//! Fixed-size slots packed row-major across one or more texture pages. The
//! atlas is owned by the renderer that created it, never shared globally, so
//! releasing the renderer releases every icon it resolved.

pub mod loader;

pub use loader::{BitmapLoader, IconPipeline};

use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Bitmap {
        Bitmap {
            width,
            height,
            data: vec![0; (width * height * 4) as usize],
        }
    }
}

/// Stable handle to an atlas slot. Keys are never reused within one atlas.
pub type AtlasKey = u64;

static NEXT_TEXTURE_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy)]
struct AtlasEntry {
    index: u32,
    width: u32,
    height: u32,
}

pub struct IconAtlas {
    base_texture_id: u32,
    texture_size: u32,
    icon_size: u32,
    next_index: u32,
    entries: IndexMap<AtlasKey, AtlasEntry>,
    uri_keys: IndexMap<String, AtlasKey>,
    next_key: AtlasKey,
}

impl IconAtlas {
    pub fn new(texture_size: u32, icon_size: u32) -> IconAtlas {
        let pages_reserved = 64;
        IconAtlas {
            base_texture_id: NEXT_TEXTURE_ID.fetch_add(pages_reserved, Ordering::Relaxed),
            texture_size,
            icon_size,
            next_index: 0,
            entries: IndexMap::new(),
            uri_keys: IndexMap::new(),
            next_key: 1,
        }
    }

    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    pub fn icon_size(&self) -> u32 {
        self.icon_size
    }

    fn slots_per_row(&self) -> u32 {
        (self.texture_size / self.icon_size).max(1)
    }

    fn slots_per_page(&self) -> u32 {
        self.slots_per_row() * self.slots_per_row()
    }

    pub fn key_for(&self, uri: &str) -> Option<AtlasKey> {
        self.uri_keys.get(uri).copied()
    }

    /// Registers a decoded icon. Oversized bitmaps keep their reported
    /// dimensions for layout but occupy a single slot.
    pub fn add(&mut self, uri: &str, bitmap: &Bitmap) -> AtlasKey {
        if let Some(key) = self.uri_keys.get(uri) {
            return *key;
        }
        let key = self.next_key;
        self.next_key += 1;
        self.entries.insert(
            key,
            AtlasEntry {
                index: self.next_index,
                width: bitmap.width,
                height: bitmap.height,
            },
        );
        self.next_index += 1;
        self.uri_keys.insert(uri.to_string(), key);
        key
    }

    pub fn texture_id(&self, key: AtlasKey) -> Option<u32> {
        let e = self.entries.get(&key)?;
        Some(self.base_texture_id + e.index / self.slots_per_page())
    }

    pub fn image_width(&self, key: AtlasKey) -> Option<u32> {
        self.entries.get(&key).map(|e| e.width)
    }

    pub fn image_height(&self, key: AtlasKey) -> Option<u32> {
        self.entries.get(&key).map(|e| e.height)
    }

    /// Texel offset of the slot's upper-left corner within its page.
    pub fn offset(&self, key: AtlasKey) -> Option<(u32, u32)> {
        let e = self.entries.get(&key)?;
        let slot = e.index % self.slots_per_page();
        let row = slot / self.slots_per_row();
        let col = slot % self.slots_per_row();
        Some((col * self.icon_size, row * self.icon_size))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn release(&mut self) {
        self.entries.clear();
        self.uri_keys.clear();
        self.next_index = 0;
    }
}
