use log::trace;

use crate::arena::Arena;
use crate::{BackingStoreManager, Error, Rect, RectId, Result};

/// One shelf: a horizontal strip packed left to right.
///
/// Space freed in the middle of the shelf goes to a free list of
/// full-height spans, kept sorted by x and coalesced after every change.
/// A span that ends at the shelf's right edge is folded back into the edge.
#[derive(Debug, Clone)]
pub struct Level {
    width: i32,
    height: i32,
    y: i32,
    next_add_x: i32,
    rects: Vec<RectId>,
    free_list: Vec<Rect>,
}

impl Level {
    pub(crate) fn new(width: i32, height: i32, y: i32) -> Self {
        Self {
            width,
            height,
            y,
            next_add_x: 0,
            rects: Vec::new(),
            free_list: Vec::new(),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    /// Right edge of the packed run.
    pub fn next_add_x(&self) -> i32 {
        self.next_add_x
    }

    pub fn rects(&self) -> &[RectId] {
        &self.rects
    }

    pub fn free_list(&self) -> &[Rect] {
        &self.free_list
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Free-list width plus the unused tail of the shelf.
    pub fn reclaimable_width(&self) -> i32 {
        self.free_list.iter().map(Rect::w).sum::<i32>() + (self.width - self.next_add_x)
    }

    /// Places `rect` on this shelf and records it under `id`.
    ///
    /// `room` is how far the shelf may grow downward; only the last level of a
    /// set gets any. Returns how much the shelf grew, or `None` if the rect
    /// doesn't fit.
    pub(crate) fn add<P>(&mut self, id: RectId, rect: &mut Rect<P>, room: i32) -> Option<i32> {
        let mut grown = 0;
        if rect.h() > self.height {
            if rect.w() > self.width - self.next_add_x {
                return None;
            }
            let grow = rect.h() - self.height;
            if grow > room {
                return None;
            }
            self.height = rect.h();
            for span in &mut self.free_list {
                span.resize(span.w(), self.height);
            }
            grown = grow;
        }

        if rect.w() <= self.width - self.next_add_x {
            rect.place(self.next_add_x, self.y);
            self.rects.push(id);
            self.next_add_x += rect.w();
            return Some(grown);
        }

        // First fit, in list order.
        let index = self.free_list.iter().position(|span| span.can_contain(&*rect))?;
        let span = &mut self.free_list[index];
        rect.place(span.x(), self.y);
        self.rects.push(id);
        if span.w() > rect.w() {
            span.place(span.x() + rect.w(), self.y);
            span.resize(span.w() - rect.w(), self.height);
        } else {
            self.free_list.remove(index);
        }
        self.coalesce();
        Some(0)
    }

    pub(crate) fn remove<P>(&mut self, id: RectId, rect: &Rect<P>) -> bool {
        let Some(index) = self.rects.iter().position(|&r| r == id) else {
            return false;
        };
        self.rects.remove(index);

        if rect.max_x() + 1 == self.next_add_x {
            self.next_add_x -= rect.w();
        } else if rect.w() > 0 {
            self.free_list
                .push(Rect::span(rect.x(), self.y, rect.w(), self.height));
            self.coalesce();
        }
        true
    }

    /// Cheap pre-check: would squeezing out the free list make room for `rect`?
    /// Always false for a shelf with nothing on its free list.
    pub fn could_allocate_if_compacted<P>(&self, rect: &Rect<P>) -> bool {
        !self.free_list.is_empty() && self.fits_after_compaction(rect)
    }

    pub(crate) fn fits_after_compaction<P>(&self, rect: &Rect<P>) -> bool {
        rect.h() <= self.height && self.reclaimable_width() >= rect.w()
    }

    /// Slides every rect left over the free list, moving pixels through `manager`.
    pub(crate) fn compact<P, M: BackingStoreManager>(
        &mut self,
        rects: &mut Arena<P>,
        store: &M::Store,
        manager: &mut M,
    ) -> Result<()> {
        if self.free_list.is_empty() {
            return Ok(());
        }

        let mut order = Vec::with_capacity(self.rects.len());
        for &id in &self.rects {
            let entry = rects
                .get(id)
                .ok_or(Error::Internal("level holds a rect the set does not know"))?;
            order.push((entry.rect.x(), id));
        }
        order.sort_by_key(|&(x, _)| x);

        manager.begin_movement(store, store)?;
        let mut dest = 0;
        for &(x, id) in &order {
            let entry = rects
                .get_mut(id)
                .ok_or(Error::Internal("level holds a rect the set does not know"))?;
            let rect = &mut entry.rect;
            if x != dest {
                let target = Rect::span(dest, rect.y(), rect.w(), rect.h());
                trace!("compact: {:?} {} -> {}", id, x, dest);
                manager.move_rect(store, &rect.geometry(), store, &target)?;
                rect.place(dest, rect.y());
            }
            dest += rect.w();
        }

        self.rects = order.into_iter().map(|(_, id)| id).collect();
        self.next_add_x = dest;
        self.free_list.clear();
        manager.end_movement(store, store)
    }

    /// Rewrites rect ids after a re-layout, keeping the shelf geometry.
    pub(crate) fn map_ids(&mut self, mut f: impl FnMut(RectId) -> Result<RectId>) -> Result<()> {
        for id in &mut self.rects {
            *id = f(*id)?;
        }
        Ok(())
    }

    /// Sorts the free list by x, merges touching spans and folds a trailing
    /// span into the right edge of the packed run.
    fn coalesce(&mut self) {
        let mut spans = std::mem::take(&mut self.free_list);
        spans.sort_by_key(Rect::x);

        let mut merged: Vec<Rect> = Vec::with_capacity(spans.len());
        for span in spans {
            match merged.last_mut() {
                Some(prev) if prev.max_x() + 1 == span.x() => {
                    let w = prev.w() + span.w();
                    prev.resize(w, self.height);
                }
                _ => merged.push(span),
            }
        }

        while let Some(last) = merged.last() {
            if last.max_x() + 1 != self.next_add_x {
                break;
            }
            self.next_add_x = last.x();
            merged.pop();
        }
        self.free_list = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::Recorder;

    fn put(level: &mut Level, arena: &mut Arena<()>, w: i32, h: i32) -> Option<RectId> {
        let id = arena.next_id();
        let mut rect = Rect::sized(w, h, ()).unwrap();
        level.add(id, &mut rect, 0)?;
        Some(arena.insert(rect, 0))
    }

    fn take(level: &mut Level, arena: &mut Arena<()>, id: RectId) {
        let entry = arena.remove(id).unwrap();
        assert!(level.remove(id, &entry.rect));
    }

    #[test]
    fn appends_left_to_right() {
        let mut arena = Arena::default();
        let mut level = Level::new(100, 20, 40);
        let a = put(&mut level, &mut arena, 30, 20).unwrap();
        let b = put(&mut level, &mut arena, 50, 10).unwrap();
        assert_eq!(arena.get(a).unwrap().rect.position(), glam::ivec2(0, 40));
        assert_eq!(arena.get(b).unwrap().rect.position(), glam::ivec2(30, 40));
        assert_eq!(level.next_add_x(), 80);

        assert!(put(&mut level, &mut arena, 21, 5).is_none());
        assert!(put(&mut level, &mut arena, 10, 21).is_none());
    }

    #[test]
    fn grows_only_with_room() {
        let arena: Arena<()> = Arena::default();
        let mut level = Level::new(100, 20, 0);
        let id = arena.next_id();
        let mut rect = Rect::sized(10, 25, ()).unwrap();
        assert_eq!(level.add(id, &mut rect, 4), None);
        assert_eq!(level.add(id, &mut rect, 5), Some(5));
        assert_eq!(level.height(), 25);
    }

    #[test]
    fn removing_rightmost_retreats_edge() {
        let mut arena = Arena::default();
        let mut level = Level::new(100, 20, 0);
        put(&mut level, &mut arena, 30, 20).unwrap();
        let b = put(&mut level, &mut arena, 25, 20).unwrap();
        take(&mut level, &mut arena, b);
        assert_eq!(level.next_add_x(), 30);
        assert!(level.free_list().is_empty());
    }

    #[test]
    fn removing_inner_rect_frees_its_footprint() {
        let mut arena = Arena::default();
        let mut level = Level::new(100, 20, 60);
        put(&mut level, &mut arena, 30, 20).unwrap();
        let b = put(&mut level, &mut arena, 25, 12).unwrap();
        put(&mut level, &mut arena, 45, 20).unwrap();
        take(&mut level, &mut arena, b);
        assert_eq!(level.free_list(), &[Rect::span(30, 60, 25, 20)]);

        // The shelf is full, so only the free span can take this.
        let c = put(&mut level, &mut arena, 20, 15).unwrap();
        assert_eq!(arena.get(c).unwrap().rect.position(), glam::ivec2(30, 60));
        assert_eq!(level.free_list(), &[Rect::span(50, 60, 5, 20)]);
    }

    #[test]
    fn free_spans_coalesce_and_fold_into_edge() {
        let mut arena = Arena::default();
        let mut level = Level::new(100, 10, 0);
        let ids: Vec<_> = (0..5)
            .map(|_| put(&mut level, &mut arena, 10, 10).unwrap())
            .collect();

        take(&mut level, &mut arena, ids[1]);
        take(&mut level, &mut arena, ids[2]);
        assert_eq!(level.free_list(), &[Rect::span(10, 0, 20, 10)]);

        take(&mut level, &mut arena, ids[3]);
        assert_eq!(level.free_list(), &[Rect::span(10, 0, 30, 10)]);
        assert_eq!(level.next_add_x(), 50);

        // Removing the rightmost rect only retreats the edge by its own width.
        take(&mut level, &mut arena, ids[4]);
        assert_eq!(level.next_add_x(), 40);

        // The next coalesce folds a span touching the edge back into it.
        take(&mut level, &mut arena, ids[0]);
        assert!(level.free_list().is_empty());
        assert_eq!(level.next_add_x(), 0);
        assert!(level.is_empty());
    }

    #[test]
    fn huge_rects_are_rejected_without_overflow() {
        let mut arena = Arena::default();
        let mut level = Level::new(100, 20, 0);
        put(&mut level, &mut arena, 30, 20).unwrap();
        assert!(put(&mut level, &mut arena, i32::MAX, 10).is_none());
        assert!(put(&mut level, &mut arena, i32::MAX, 25).is_none());
        assert_eq!(level.next_add_x(), 30);
        assert_eq!(level.height(), 20);
    }

    #[test]
    fn out_of_order_spans_merge() {
        let mut arena = Arena::default();
        let mut level = Level::new(100, 10, 0);
        let ids: Vec<_> = (0..6)
            .map(|_| put(&mut level, &mut arena, 10, 10).unwrap())
            .collect();

        take(&mut level, &mut arena, ids[3]);
        take(&mut level, &mut arena, ids[1]);
        assert_eq!(
            level.free_list(),
            &[Rect::span(10, 0, 10, 10), Rect::span(30, 0, 10, 10)]
        );

        take(&mut level, &mut arena, ids[2]);
        assert_eq!(level.free_list(), &[Rect::span(10, 0, 30, 10)]);
        assert_eq!(level.next_add_x(), 60);
    }

    #[test]
    fn compaction_precheck() {
        let mut arena = Arena::default();
        let mut level = Level::new(100, 10, 0);
        let a = put(&mut level, &mut arena, 40, 10).unwrap();
        put(&mut level, &mut arena, 40, 10).unwrap();

        let wide = Rect::sized(50, 10, ()).unwrap();
        assert!(!level.could_allocate_if_compacted(&wide));

        take(&mut level, &mut arena, a);
        assert!(level.could_allocate_if_compacted(&wide));
        assert!(!level.could_allocate_if_compacted(&Rect::sized(61, 10, ()).unwrap()));
        assert!(!level.could_allocate_if_compacted(&Rect::sized(10, 11, ()).unwrap()));
    }

    #[test]
    fn compact_slides_rects_left() {
        let mut arena = Arena::default();
        let mut level = Level::new(100, 10, 30);
        let ids: Vec<_> = [10, 20, 30, 25]
            .into_iter()
            .map(|w| put(&mut level, &mut arena, w, 10).unwrap())
            .collect();
        take(&mut level, &mut arena, ids[0]);
        take(&mut level, &mut arena, ids[2]);

        let mut manager = Recorder::new();
        level.compact(&mut arena, &7, &mut manager).unwrap();

        assert_eq!(
            manager.moves(),
            vec![
                (Rect::span(10, 30, 20, 10), Rect::span(0, 30, 20, 10)),
                (Rect::span(60, 30, 25, 10), Rect::span(20, 30, 25, 10)),
            ]
        );
        assert_eq!(arena.get(ids[1]).unwrap().rect.x(), 0);
        assert_eq!(arena.get(ids[3]).unwrap().rect.x(), 20);
        assert_eq!(level.next_add_x(), 45);
        assert!(level.free_list().is_empty());
    }

    #[test]
    fn compacting_a_packed_level_is_a_no_op() {
        let mut arena = Arena::default();
        let mut level = Level::new(100, 10, 0);
        for w in [10, 20, 30] {
            put(&mut level, &mut arena, w, 10).unwrap();
        }
        let mut manager = Recorder::new();
        level.compact(&mut arena, &0, &mut manager).unwrap();
        assert!(manager.events.is_empty());
        assert_eq!(level.next_add_x(), 60);
    }
}
