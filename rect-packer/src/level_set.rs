use log::debug;

use crate::arena::Arena;
use crate::{BackingStoreManager, Error, Level, Rect, RectId, Result};

/// Outcome of offering a rect to a [`LevelSet`].
///
/// A rejected rect is handed back so the caller can retry with more effort.
#[derive(Debug)]
pub enum Added<P> {
    Placed(RectId),
    /// Some shelf could take the rect once compacted. Nothing was changed.
    NeedsCompaction(Rect<P>),
    /// No shelf can take it and there is no vertical room for a new one.
    NeedsGrowth(Rect<P>),
}

impl<P> Added<P> {
    pub fn placed(&self) -> Option<RectId> {
        match self {
            Added::Placed(id) => Some(*id),
            _ => None,
        }
    }
}

/// A stack of shelves covering a `width` x `height` area, top to bottom.
///
/// Owns the placed rects; callers refer to them by [`RectId`].
#[derive(Debug)]
pub struct LevelSet<P> {
    width: i32,
    height: i32,
    next_add_y: i32,
    levels: Vec<Level>,
    rects: Arena<P>,
}

impl<P> LevelSet<P> {
    pub fn new(width: i32, height: i32) -> Result<Self> {
        if width < 0 || height < 0 {
            return Err(Error::InvalidGeometry {
                x: 0,
                y: 0,
                w: width,
                h: height,
            });
        }
        Ok(Self {
            width,
            height,
            next_add_y: 0,
            levels: Vec::new(),
            rects: Arena::default(),
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Vertical extent taken up by shelves so far.
    pub fn used_height(&self) -> i32 {
        self.next_add_y
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.len() == 0
    }

    pub fn get(&self, id: RectId) -> Option<&Rect<P>> {
        self.rects.get(id).map(|e| &e.rect)
    }

    /// Only the payload is handed out mutably; geometry belongs to the set.
    pub fn payload_mut(&mut self, id: RectId) -> Option<&mut P> {
        self.rects.get_mut(id).map(|e| e.rect.payload_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (RectId, &Rect<P>)> + '_ {
        self.rects.iter().map(|(id, e)| (id, &e.rect))
    }

    pub fn add(&mut self, mut rect: Rect<P>) -> Result<Added<P>> {
        if rect.w() > self.width {
            return Ok(Added::NeedsGrowth(rect));
        }

        // Most recently added shelves first.
        let id = self.rects.next_id();
        let last = self.levels.len().wrapping_sub(1);
        for index in (0..self.levels.len()).rev() {
            let room = if index == last {
                self.height - self.next_add_y
            } else {
                0
            };
            if let Some(grown) = self.levels[index].add(id, &mut rect, room) {
                self.next_add_y += grown;
                return Ok(Added::Placed(self.rects.insert(rect, index)));
            }
        }

        if self
            .levels
            .iter()
            .rev()
            .any(|level| level.could_allocate_if_compacted(&rect))
        {
            return Ok(Added::NeedsCompaction(rect));
        }

        if rect.h() > self.height - self.next_add_y {
            return Ok(Added::NeedsGrowth(rect));
        }

        let mut level = Level::new(self.width, rect.h(), self.next_add_y);
        if level.add(id, &mut rect, 0).is_none() {
            return Err(Error::Internal("a fresh level rejected the rect it was sized for"));
        }
        self.next_add_y += rect.h();
        self.levels.push(level);
        Ok(Added::Placed(self.rects.insert(rect, self.levels.len() - 1)))
    }

    pub fn remove(&mut self, id: RectId) -> Option<Rect<P>> {
        let entry = self.rects.get(id)?;
        let removed = self.levels[entry.level].remove(id, &entry.rect);
        debug_assert!(removed, "rect {id:?} missing from its level");
        self.rects.remove(id).map(|e| e.rect)
    }

    /// Compacts the first shelf (newest first) that would then fit `rect`,
    /// and places it there.
    pub fn compact_and_add<M: BackingStoreManager>(
        &mut self,
        mut rect: Rect<P>,
        store: &M::Store,
        manager: &mut M,
    ) -> Result<Added<P>> {
        let Some(index) = self
            .levels
            .iter()
            .rposition(|level| level.could_allocate_if_compacted(&rect))
        else {
            return Ok(Added::NeedsGrowth(rect));
        };

        let level = &mut self.levels[index];
        debug!(
            "compacting level {} (y={}, h={}) for a {}x{} rect",
            index,
            level.y(),
            level.height(),
            rect.w(),
            rect.h()
        );
        level.compact(&mut self.rects, store, manager)?;
        let id = self.rects.next_id();
        if level.add(id, &mut rect, 0).is_none() {
            return Err(Error::Internal("a compacted level rejected the rect it was compacted for"));
        }
        Ok(Added::Placed(self.rects.insert(rect, index)))
    }

    /// Only the newest shelf may grow, and only into unused vertical space.
    pub fn can_expand(&self, level: usize, new_height: i32) -> bool {
        match self.levels.last() {
            Some(last) if level == self.levels.len() - 1 => {
                self.height - self.next_add_y >= new_height - last.height()
            }
            _ => false,
        }
    }

    /// Whether `rect` would fit after compacting shelves, growing the last
    /// one, or opening a new one.
    pub fn could_allocate_if_compacted<Q>(&self, rect: &Rect<Q>) -> bool {
        if rect.w() > self.width {
            return false;
        }
        if self.levels.iter().any(|l| l.fits_after_compaction(rect)) {
            return true;
        }
        if rect.h() <= self.height - self.next_add_y {
            return true;
        }
        match self.levels.last() {
            Some(last) => {
                rect.w() <= self.width - last.next_add_x()
                    && self.can_expand(self.levels.len() - 1, rect.h())
            }
            None => false,
        }
    }

    /// Height of completely empty shelves over the used height. High values
    /// mean a full re-layout would reclaim a lot.
    pub fn vertical_fragmentation_ratio(&self) -> f32 {
        if self.next_add_y == 0 {
            return 0.0;
        }
        let free: i32 = self
            .levels
            .iter()
            .filter(|l| l.is_empty())
            .map(Level::height)
            .sum();
        free as f32 / self.next_add_y as f32
    }

    pub fn clear(&mut self) {
        self.levels.clear();
        self.rects.clear();
        self.next_add_y = 0;
    }

    /// Records where each rect lands in `layout`, a re-layout whose payloads
    /// are ids into this set.
    pub(crate) fn plan_relocation(&mut self, layout: &LevelSet<RectId>) -> Result<()> {
        for (_, placed) in layout.iter() {
            let entry = self
                .rects
                .get_mut(*placed.payload())
                .ok_or(Error::Internal("re-layout references a missing rect"))?;
            entry.rect.set_next_location(Some(placed.position()));
        }
        Ok(())
    }

    pub(crate) fn cancel_relocation(&mut self) {
        for (_, entry) in self.rects.iter_mut() {
            entry.rect.set_next_location(None);
        }
    }

    /// Takes over the shelves of `layout`, pointing them back at this set's
    /// rects and moving each rect to its planned location.
    pub(crate) fn adopt(&mut self, mut layout: LevelSet<RectId>) -> Result<()> {
        if layout.len() != self.len() {
            return Err(Error::Internal("re-layout lost or gained rects"));
        }

        let rects = &mut self.rects;
        let placed = &layout.rects;
        for (index, level) in layout.levels.iter_mut().enumerate() {
            level.map_ids(|shadow| {
                let new = &placed
                    .get(shadow)
                    .ok_or(Error::Internal("re-layout level holds an unknown rect"))?
                    .rect;
                let id = *new.payload();
                let entry = rects
                    .get_mut(id)
                    .ok_or(Error::Internal("re-layout references a missing rect"))?;
                if entry.rect.size() != new.size() {
                    return Err(Error::Internal("rect size changed during re-layout"));
                }
                entry.rect.place(new.x(), new.y());
                entry.rect.set_next_location(None);
                entry.level = index;
                Ok(id)
            })?;
        }

        self.width = layout.width;
        self.height = layout.height;
        self.next_add_y = layout.next_add_y;
        self.levels = layout.levels;
        Ok(())
    }
}
