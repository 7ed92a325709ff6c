use crate::{Rect, RectId, Result};

/// The caller-side collaborator that owns the actual pixels.
///
/// The packer only decides where things go. Everything that touches memory,
/// a GPU texture or a file goes through this trait, on whatever thread the
/// implementation requires.
pub trait BackingStoreManager {
    /// Handle to one backing store. The packer keeps exactly one live at a time.
    type Store;

    /// Returns a new, zeroed store of at least `width` x `height`.
    fn allocate_backing_store(&mut self, width: u32, height: u32) -> Result<Self::Store>;

    /// Releases a store. Ownership guarantees this happens at most once per store.
    fn delete_backing_store(&mut self, store: Self::Store);

    /// Whether the packer may compact a level in place before growing.
    fn can_compact(&self) -> bool {
        true
    }

    /// Called before the store grows to make room for `cause`, with the
    /// number of hooks already called during this addition. Rects returned
    /// here are removed and the addition is retried.
    fn pre_expand(&mut self, _cause: &Rect, _attempt: u32) -> Vec<RectId> {
        Vec::new()
    }

    /// Called when the store cannot grow any further. Rects returned here are
    /// removed and the addition is retried; with none, the addition fails.
    fn addition_failed(&mut self, _cause: &Rect, _attempt: u32) -> Vec<RectId> {
        Vec::new()
    }

    /// Opens a batch of [`BackingStoreManager::move_rect`] calls.
    /// `old` and `new` are the same store during in-place compaction.
    fn begin_movement(&mut self, old: &Self::Store, new: &Self::Store) -> Result<()>;

    /// Copies the contents of `old_rect` on `old` to `new_rect` on `new`.
    fn move_rect(
        &mut self,
        old: &Self::Store,
        old_rect: &Rect,
        new: &Self::Store,
        new_rect: &Rect,
    ) -> Result<()>;

    fn end_movement(&mut self, old: &Self::Store, new: &Self::Store) -> Result<()>;
}
