use std::cmp::Reverse;

use log::{debug, trace};

use crate::{
    Added, BackingStoreManager, Error, Layout, LevelSet, PackerOptions, Rect, RectId, Result,
};

/// Packs rects onto a backing store owned by `M`, compacting shelves and
/// growing the store as needed.
///
/// The store is allocated lazily on the first [`RectanglePacker::add`] or
/// [`RectanglePacker::backing_store`] call. [`RectanglePacker::dispose`]
/// consumes the packer, so there is no way to use it afterwards.
pub struct RectanglePacker<M: BackingStoreManager, P = ()> {
    manager: M,
    store: Option<M::Store>,
    levels: LevelSet<P>,
    options: PackerOptions,
}

impl<M: BackingStoreManager, P> RectanglePacker<M, P> {
    pub fn new(manager: M, width: i32, height: i32) -> Result<Self> {
        Self::with_options(
            manager,
            PackerOptions {
                width,
                height,
                ..Default::default()
            },
        )
    }

    pub fn with_options(manager: M, options: PackerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            manager,
            store: None,
            levels: LevelSet::new(options.width, options.height)?,
            options,
        })
    }

    pub fn options(&self) -> &PackerOptions {
        &self.options
    }

    /// Caps future growth. `None` lifts the cap on that axis.
    pub fn set_max_size(&mut self, max_width: Option<i32>, max_height: Option<i32>) {
        self.options.max_width = max_width;
        self.options.max_height = max_height;
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut M {
        &mut self.manager
    }

    pub fn levels(&self) -> &LevelSet<P> {
        &self.levels
    }

    pub fn width(&self) -> i32 {
        self.levels.width()
    }

    pub fn height(&self) -> i32 {
        self.levels.height()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, id: RectId) -> Option<&Rect<P>> {
        self.levels.get(id)
    }

    pub fn payload_mut(&mut self, id: RectId) -> Option<&mut P> {
        self.levels.payload_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RectId, &Rect<P>)> + '_ {
        self.levels.iter()
    }

    pub fn layout(&self) -> Layout {
        Layout::of(&self.levels)
    }

    pub fn vertical_fragmentation_ratio(&self) -> f32 {
        self.levels.vertical_fragmentation_ratio()
    }

    pub fn backing_store(&mut self) -> Result<&M::Store> {
        let store = match self.store.take() {
            Some(store) => store,
            None => {
                debug!(
                    "allocating {}x{} backing store",
                    self.levels.width(),
                    self.levels.height()
                );
                self.manager
                    .allocate_backing_store(self.levels.width() as u32, self.levels.height() as u32)?
            }
        };
        Ok(self.store.insert(store))
    }

    /// The live store alongside its manager, for writing new contents.
    pub fn store_and_manager(&mut self) -> Result<(&M::Store, &mut M)> {
        self.backing_store()?;
        let store = self
            .store
            .as_ref()
            .ok_or(Error::Internal("backing store missing after allocation"))?;
        Ok((store, &mut self.manager))
    }

    /// Places `rect`, compacting a shelf or growing the backing store if it
    /// doesn't fit as things are.
    ///
    /// Before growing, and again once growth is capped, the manager may name
    /// rects to evict; the addition is retried whenever any were removed.
    pub fn add(&mut self, rect: Rect<P>) -> Result<RectId> {
        self.backing_store()?;
        let mut rect = rect;
        let mut attempt = 0;
        loop {
            rect = match self.levels.add(rect)? {
                Added::Placed(id) => return Ok(id),
                Added::NeedsCompaction(rect) | Added::NeedsGrowth(rect) => rect,
            };

            if self.manager.can_compact() {
                if let Some(store) = &self.store {
                    rect = match self.levels.compact_and_add(rect, store, &mut self.manager)? {
                        Added::Placed(id) => return Ok(id),
                        Added::NeedsCompaction(rect) | Added::NeedsGrowth(rect) => rect,
                    };
                }
            }

            let evict = self.manager.pre_expand(&rect.geometry(), attempt);
            attempt += 1;
            if self.evict(evict) > 0 {
                continue;
            }

            match self.grow(&rect) {
                Err(e @ Error::CapacityExceeded { .. }) => {
                    let evict = self.manager.addition_failed(&rect.geometry(), attempt);
                    attempt += 1;
                    if self.evict(evict) == 0 {
                        return Err(e);
                    }
                }
                other => other?,
            }
        }
    }

    fn evict(&mut self, ids: Vec<RectId>) -> usize {
        let mut evicted = 0;
        for id in ids {
            if self.levels.remove(id).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!("evicted {} rects to make room", evicted);
        }
        evicted
    }

    /// Frees the space held by `id`. Nothing is compacted or shrunk.
    pub fn remove(&mut self, id: RectId) -> Result<Rect<P>> {
        self.levels.remove(id).ok_or(Error::UnknownRect(id))
    }

    /// Drops every rect but keeps the backing store and its size.
    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Re-lays out every rect at the current size into a fresh store.
    ///
    /// Returns false, changing nothing, when the re-layout does not fit;
    /// packing by decreasing height is a heuristic and can lose to the
    /// incremental layout.
    pub fn compact(&mut self) -> Result<bool> {
        self.backing_store()?;
        match self.relayout(self.levels.width(), self.levels.height(), None)? {
            Some(layout) => {
                debug!(
                    "compacting {} rects in a {}x{} store",
                    self.levels.len(),
                    layout.width(),
                    layout.height()
                );
                self.migrate(layout)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes the backing store and hands the manager back.
    pub fn dispose(mut self) -> M {
        if let Some(store) = self.store.take() {
            self.manager.delete_backing_store(store);
        }
        self.manager
    }

    fn grow(&mut self, cause: &Rect<P>) -> Result<()> {
        let (max_w, max_h) = self.options.max_size();
        let capacity = Error::CapacityExceeded {
            width: max_w,
            height: max_h,
        };
        if cause.w() > max_w || cause.h() > max_h {
            return Err(capacity);
        }

        let (mut w, mut h) = (self.levels.width(), self.levels.height());

        if let Some(threshold) = self.options.compaction_threshold {
            if self.levels.vertical_fragmentation_ratio() > threshold {
                if let Some(layout) = self.relayout(w, h, Some(cause))? {
                    debug!("reclaiming empty levels in a {}x{} store", w, h);
                    return self.migrate(layout);
                }
            }
        }

        loop {
            if cause.w() > w {
                w = cause.w();
            } else {
                let grown = (h as f64 * (1.0 + self.options.expansion_factor as f64)) as i64;
                let next = grown.max(h as i64 + 1).min(max_h as i64) as i32;
                if next <= h {
                    return Err(capacity);
                }
                h = next;
            }

            if let Some(layout) = self.relayout(w, h, Some(cause))? {
                debug!(
                    "growing backing store from {}x{} to {}x{} for a {}x{} rect",
                    self.levels.width(),
                    self.levels.height(),
                    w,
                    h,
                    cause.w(),
                    cause.h()
                );
                return self.migrate(layout);
            }
        }
    }

    /// Greedy re-layout of every placed rect, tallest first, into a fresh
    /// `w` x `h` set. Payloads of the result are ids into `self.levels`.
    fn relayout(&self, w: i32, h: i32, cause: Option<&Rect<P>>) -> Result<Option<LevelSet<RectId>>> {
        let mut layout = LevelSet::new(w, h)?;
        let mut order: Vec<_> = self.levels.iter().map(|(id, r)| (id, r.w(), r.h())).collect();
        order.sort_by_key(|&(_, _, rh)| Reverse(rh));

        for (id, rw, rh) in order {
            if !matches!(layout.add(Rect::sized(rw, rh, id)?)?, Added::Placed(_)) {
                return Ok(None);
            }
        }
        if let Some(cause) = cause {
            if !layout.could_allocate_if_compacted(cause) {
                return Ok(None);
            }
        }
        Ok(Some(layout))
    }

    /// Moves every rect into a new store laid out as `layout`, then swaps the
    /// new store and layout in. On failure the old store and layout stay.
    fn migrate(&mut self, layout: LevelSet<RectId>) -> Result<()> {
        self.levels.plan_relocation(&layout)?;
        let Some(old) = self.store.take() else {
            self.levels.cancel_relocation();
            return Err(Error::Internal("migrating without a backing store"));
        };

        match self.relocate(&old, &layout) {
            Ok(new) => {
                self.manager.delete_backing_store(old);
                self.store = Some(new);
                self.levels.adopt(layout)
            }
            Err(e) => {
                self.levels.cancel_relocation();
                self.store = Some(old);
                Err(e)
            }
        }
    }

    fn relocate(&mut self, old: &M::Store, layout: &LevelSet<RectId>) -> Result<M::Store> {
        let new = self
            .manager
            .allocate_backing_store(layout.width() as u32, layout.height() as u32)?;
        match self.move_all(old, &new) {
            Ok(()) => Ok(new),
            Err(e) => {
                self.manager.delete_backing_store(new);
                Err(e)
            }
        }
    }

    fn move_all(&mut self, old: &M::Store, new: &M::Store) -> Result<()> {
        self.manager.begin_movement(old, new)?;
        for (id, rect) in self.levels.iter() {
            let to = rect
                .next_location()
                .ok_or(Error::Internal("rect has no planned location"))?;
            trace!("relocate {:?}: {} -> {}", id, rect.position(), to);
            let target = Rect::span(to.x, to.y, rect.w(), rect.h());
            self.manager.move_rect(old, &rect.geometry(), new, &target)?;
        }
        self.manager.end_movement(old, new)
    }
}
