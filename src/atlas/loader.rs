//! Asynchronous icon resolution
//!
//! Icon URIs resolve through a per-renderer pipeline: at most one decode is
//! in flight per URI, reference-counted by the points waiting on it, and a
//! request whose last waiter goes away is cancelled. Polling never blocks
//! the render thread; a point simply stays in the loading bucket until its
//! decode lands.
//!
//! A failed decode retries through the default icon. The default icon
//! failing to decode is a broken installation and is not recovered from.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use indexmap::IndexMap;

use super::{AtlasKey, Bitmap, IconAtlas};
use crate::style::Color;

/// Decodes an icon URI into a bitmap. Implementations run on worker
/// threads and must be safe to call concurrently.
pub trait BitmapLoader: Send + Sync {
    fn load(&self, uri: &str) -> Result<Bitmap>;
}

/// Per-point icon resolution state, owned by the point node and reconciled
/// by [`IconPipeline::resolve`] each frame.
#[derive(Debug, Clone, Default)]
pub struct IconState {
    /// Styled URI; `None` falls back to the default icon unless a label
    /// carries the feature instead.
    pub uri: Option<String>,
    /// URI this point currently holds a loader reference for.
    pub pending_uri: Option<String>,
    pub key: Option<AtlasKey>,
    pub width: f32,
    pub height: f32,
    pub tint: Color,
}

impl IconState {
    pub fn is_resolved(&self) -> bool {
        self.key.is_some()
    }
}

#[derive(Default)]
struct DecodeSlot {
    result: Mutex<Option<Result<Bitmap>>>,
    cancelled: AtomicBool,
}

struct PendingDecode {
    slot: Arc<DecodeSlot>,
    refs: u32,
}

pub struct IconPipeline {
    atlas: IconAtlas,
    loader: Arc<dyn BitmapLoader>,
    default_uri: String,
    pending: IndexMap<String, PendingDecode>,
}

impl IconPipeline {
    pub fn new(
        loader: Arc<dyn BitmapLoader>,
        default_uri: impl Into<String>,
        texture_size: u32,
        icon_size: u32,
    ) -> IconPipeline {
        IconPipeline {
            atlas: IconAtlas::new(texture_size, icon_size),
            loader,
            default_uri: default_uri.into(),
            pending: IndexMap::new(),
        }
    }

    pub fn atlas(&self) -> &IconAtlas {
        &self.atlas
    }

    pub fn default_uri(&self) -> &str {
        &self.default_uri
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Advances one icon's resolution. Returns true once the icon has an
    /// atlas key; false while a decode is still outstanding or the point
    /// wants no icon at all.
    ///
    /// `want_default` substitutes the default icon when the style names no
    /// URI (a labeled point renders its label instead).
    pub fn resolve(&mut self, icon: &mut IconState, want_default: bool) -> bool {
        let mut uri = match icon.uri.clone() {
            Some(uri) => uri,
            None if want_default => self.default_uri.clone(),
            None => {
                if let Some(old) = icon.pending_uri.take() {
                    self.dereference(&old);
                }
                icon.key = None;
                return false;
            }
        };

        loop {
            // the styled URI changed while a request was outstanding
            if let Some(old) = icon.pending_uri.clone() {
                if old != uri {
                    self.dereference(&old);
                    icon.pending_uri = None;
                }
            }

            if let Some(key) = self.atlas.key_for(&uri) {
                if let Some(old) = icon.pending_uri.take() {
                    self.dereference(&old);
                }
                self.assign(icon, key);
                return true;
            }

            if icon.pending_uri.as_deref() == Some(uri.as_str()) {
                let outcome = match self.pending.get(&uri) {
                    Some(p) => p.slot.result.lock().unwrap().take(),
                    None => {
                        // request evaporated under us, re-issue it
                        icon.pending_uri = None;
                        continue;
                    }
                };
                match outcome {
                    None => return false, // still decoding
                    Some(Ok(bitmap)) => {
                        self.dereference(&uri);
                        icon.pending_uri = None;
                        let key = self.atlas.add(&uri, &bitmap);
                        self.assign(icon, key);
                        return true;
                    }
                    Some(Err(e)) => {
                        self.dereference(&uri);
                        icon.pending_uri = None;
                        if uri == self.default_uri {
                            panic!("default icon {} failed to decode: {}", uri, e);
                        }
                        log::warn!("icon {} failed to decode, substituting default: {}", uri, e);
                        uri = self.default_uri.clone();
                        continue;
                    }
                }
            }

            self.request(&uri);
            icon.pending_uri = Some(uri);
            return false;
        }
    }

    /// Drops whatever loader reference the icon holds and clears its key.
    pub fn release_icon(&mut self, icon: &mut IconState) {
        if let Some(uri) = icon.pending_uri.take() {
            self.dereference(&uri);
        }
        icon.key = None;
    }

    /// Drops the atlas and every outstanding request, then starts over with
    /// a new slot size. Used when the display density changes; callers must
    /// also clear the atlas keys their icons cached.
    pub fn recycle(&mut self, icon_size: u32) {
        let texture_size = self.atlas.texture_size();
        self.release();
        self.atlas = IconAtlas::new(texture_size, icon_size);
    }

    pub fn release(&mut self) {
        let uris: Vec<String> = self.pending.keys().cloned().collect();
        for uri in uris {
            if let Some(p) = self.pending.swap_remove(&uri) {
                p.slot.cancelled.store(true, Ordering::Release);
            }
        }
        self.atlas.release();
    }

    fn assign(&self, icon: &mut IconState, key: AtlasKey) {
        icon.key = Some(key);
        icon.width = self.atlas.image_width(key).unwrap_or(0) as f32;
        icon.height = self.atlas.image_height(key).unwrap_or(0) as f32;
    }

    fn request(&mut self, uri: &str) {
        if let Some(p) = self.pending.get_mut(uri) {
            p.refs += 1;
            return;
        }
        let slot = Arc::new(DecodeSlot::default());
        let job_slot = slot.clone();
        let loader = self.loader.clone();
        let job_uri = uri.to_string();
        rayon::spawn(move || {
            if job_slot.cancelled.load(Ordering::Acquire) {
                return;
            }
            let result = loader.load(&job_uri);
            if !job_slot.cancelled.load(Ordering::Acquire) {
                *job_slot.result.lock().unwrap() = Some(result);
            }
        });
        self.pending.insert(uri.to_string(), PendingDecode { slot, refs: 1 });
    }

    fn dereference(&mut self, uri: &str) {
        let drop_entry = match self.pending.get_mut(uri) {
            Some(p) => {
                p.refs = p.refs.saturating_sub(1);
                p.refs == 0
            }
            None => false,
        };
        if drop_entry {
            if let Some(p) = self.pending.swap_remove(uri) {
                p.slot.cancelled.store(true, Ordering::Release);
            }
        }
    }
}
