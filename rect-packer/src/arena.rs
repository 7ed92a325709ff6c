use serde::{Deserialize, Serialize};

use crate::Rect;

/// Handle to a rect placed in a packer.
///
/// Handles survive compaction and backing-store growth; they are invalidated
/// only by removing the rect (or clearing the packer). A stale handle never
/// aliases a newer rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RectId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
pub(crate) struct Entry<P> {
    pub rect: Rect<P>,
    /// Index of the level holding the rect.
    pub level: usize,
}

#[derive(Debug)]
struct Slot<P> {
    generation: u32,
    entry: Option<Entry<P>>,
}

#[derive(Debug)]
pub(crate) struct Arena<P> {
    slots: Vec<Slot<P>>,
    vacant: Vec<u32>,
    len: usize,
}

impl<P> Default for Arena<P> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            len: 0,
        }
    }
}

impl<P> Arena<P> {
    /// The id the next [`Arena::insert`] will hand out.
    pub fn next_id(&self) -> RectId {
        match self.vacant.last() {
            Some(&index) => RectId {
                index,
                generation: self.slots[index as usize].generation,
            },
            None => RectId {
                index: self.slots.len() as u32,
                generation: 0,
            },
        }
    }

    pub fn insert(&mut self, rect: Rect<P>, level: usize) -> RectId {
        let id = self.next_id();
        let entry = Some(Entry { rect, level });
        match self.vacant.pop() {
            Some(index) => self.slots[index as usize].entry = entry,
            None => self.slots.push(Slot {
                generation: 0,
                entry,
            }),
        }
        self.len += 1;
        id
    }

    pub fn remove(&mut self, id: RectId) -> Option<Entry<P>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.index);
        self.len -= 1;
        Some(entry)
    }

    pub fn get(&self, id: RectId) -> Option<&Entry<P>> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
    }

    pub fn get_mut(&mut self, id: RectId) -> Option<&mut Entry<P>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (RectId, &Entry<P>)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    RectId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entry,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RectId, &mut Entry<P>)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.entry.as_mut().map(|entry| {
                (
                    RectId {
                        index: index as u32,
                        generation,
                    },
                    entry,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.vacant.push(index as u32);
            }
        }
        self.len = 0;
    }
}
