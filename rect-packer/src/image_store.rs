//! A backing store kept in CPU memory as RGBA images.

use std::path::Path;

use image::{GenericImage, GenericImageView, Rgba, RgbaImage};
use log::trace;

use crate::{BackingStoreManager, Error, Rect, Result};

/// Handle to one image owned by an [`ImageStoreManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageStore(usize);

#[derive(Debug, Default)]
pub struct ImageStoreManager {
    images: Vec<Option<RgbaImage>>,
}

impl ImageStoreManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self, store: ImageStore) -> Option<&RgbaImage> {
        self.images.get(store.0).and_then(Option::as_ref)
    }

    pub fn image_mut(&mut self, store: ImageStore) -> Option<&mut RgbaImage> {
        self.images.get_mut(store.0).and_then(Option::as_mut)
    }

    /// Number of stores allocated and not yet deleted.
    pub fn live(&self) -> usize {
        self.images.iter().filter(|i| i.is_some()).count()
    }

    /// Copies `pixels` into the footprint of `rect`.
    pub fn write<P>(&mut self, store: ImageStore, rect: &Rect<P>, pixels: &RgbaImage) -> Result<()> {
        let image = self.image_mut(store).ok_or(Error::Internal("unknown image store"))?;
        image.copy_from(pixels, rect.x() as u32, rect.y() as u32)?;
        Ok(())
    }

    pub fn fill<P>(&mut self, store: ImageStore, rect: &Rect<P>, color: Rgba<u8>) -> Result<()> {
        let image = self.image_mut(store).ok_or(Error::Internal("unknown image store"))?;
        let (x, y) = (rect.x() as u32, rect.y() as u32);
        if x + rect.w() as u32 > image.width() || y + rect.h() as u32 > image.height() {
            return Err(Error::Internal("fill outside the image store"));
        }
        for py in y..y + rect.h() as u32 {
            for px in x..x + rect.w() as u32 {
                image.put_pixel(px, py, color);
            }
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, store: ImageStore, path: P) -> Result<()> {
        let image = self.image(store).ok_or(Error::Internal("unknown image store"))?;
        image.save(path)?;
        Ok(())
    }
}

impl BackingStoreManager for ImageStoreManager {
    type Store = ImageStore;

    fn allocate_backing_store(&mut self, width: u32, height: u32) -> Result<ImageStore> {
        self.images.push(Some(RgbaImage::new(width, height)));
        Ok(ImageStore(self.images.len() - 1))
    }

    fn delete_backing_store(&mut self, store: ImageStore) {
        if let Some(slot) = self.images.get_mut(store.0) {
            *slot = None;
        }
    }

    fn begin_movement(&mut self, _old: &ImageStore, _new: &ImageStore) -> Result<()> {
        Ok(())
    }

    fn move_rect(
        &mut self,
        old: &ImageStore,
        old_rect: &Rect,
        new: &ImageStore,
        new_rect: &Rect,
    ) -> Result<()> {
        if old_rect.w() == 0 || old_rect.h() == 0 {
            return Ok(());
        }
        trace!(
            "image move {:?}@{} -> {:?}@{}",
            old,
            old_rect.position(),
            new,
            new_rect.position()
        );

        let source = image::math::Rect {
            x: old_rect.x() as u32,
            y: old_rect.y() as u32,
            width: old_rect.w() as u32,
            height: old_rect.h() as u32,
        };
        if old == new {
            let image = self.image_mut(*old).ok_or(Error::Internal("unknown image store"))?;
            if !image.copy_within(source, new_rect.x() as u32, new_rect.y() as u32) {
                return Err(Error::Internal("move outside the image store"));
            }
            return Ok(());
        }

        let patch = self
            .image(*old)
            .ok_or(Error::Internal("unknown image store"))?
            .view(source.x, source.y, source.width, source.height)
            .to_image();
        let target = self.image_mut(*new).ok_or(Error::Internal("unknown image store"))?;
        target.copy_from(&patch, new_rect.x() as u32, new_rect.y() as u32)?;
        Ok(())
    }

    fn end_movement(&mut self, _old: &ImageStore, _new: &ImageStore) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RectanglePacker;

    fn color(tag: u8) -> Rgba<u8> {
        Rgba([tag, 255 - tag, tag / 2, 255])
    }

    fn check_pixels(packer: &mut RectanglePacker<ImageStoreManager, u8>) {
        let store = *packer.backing_store().unwrap();
        let image = packer.manager().image(store).unwrap();
        for (_, rect) in packer.iter() {
            for y in rect.y()..rect.y() + rect.h() {
                for x in rect.x()..rect.x() + rect.w() {
                    assert_eq!(*image.get_pixel(x as u32, y as u32), color(*rect.payload()));
                }
            }
        }
    }

    fn add(packer: &mut RectanglePacker<ImageStoreManager, u8>, w: i32, h: i32, tag: u8) -> crate::RectId {
        let id = packer.add(Rect::sized(w, h, tag).unwrap()).unwrap();
        let store = *packer.backing_store().unwrap();
        let rect = packer.get(id).unwrap().geometry();
        packer.manager_mut().fill(store, &rect, color(tag)).unwrap();
        id
    }

    #[test]
    fn fresh_stores_are_zeroed() {
        let mut manager = ImageStoreManager::new();
        let store = manager.allocate_backing_store(4, 3).unwrap();
        let image = manager.image(store).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn pixels_follow_compaction() {
        let mut packer = RectanglePacker::new(ImageStoreManager::new(), 40, 8).unwrap();
        let a = add(&mut packer, 10, 8, 1);
        add(&mut packer, 10, 8, 2);
        let c = add(&mut packer, 10, 8, 3);
        add(&mut packer, 10, 8, 4);
        packer.remove(a).unwrap();
        packer.remove(c).unwrap();

        add(&mut packer, 20, 8, 5);
        assert_eq!(packer.manager().live(), 1);
        assert_eq!(packer.width(), 40);
        check_pixels(&mut packer);
    }

    #[test]
    fn pixels_follow_growth() {
        let mut packer = RectanglePacker::new(ImageStoreManager::new(), 16, 16).unwrap();
        for tag in 0..6 {
            add(&mut packer, 5 + tag as i32, 4 + tag as i32, tag * 40);
        }
        add(&mut packer, 30, 3, 250);
        assert!(packer.width() >= 30);
        assert_eq!(packer.manager().live(), 1);
        check_pixels(&mut packer);

        let manager = packer.dispose();
        assert_eq!(manager.live(), 0);
    }

    #[test]
    fn writes_outside_the_store_fail() {
        let mut manager = ImageStoreManager::new();
        let store = manager.allocate_backing_store(4, 4).unwrap();
        let rect = Rect::new(2, 2, 3, 3, ()).unwrap();
        assert!(manager.fill(store, &rect, color(1)).is_err());
        assert!(manager.write(store, &rect, &RgbaImage::new(3, 3)).is_err());
    }
}
