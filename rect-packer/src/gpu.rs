//! A backing store living in wgpu textures.
//!
//! Moves are recorded as texture-to-texture copies on one command encoder per
//! movement batch and submitted in [`BackingStoreManager::end_movement`].
//! wgpu forbids copying a texture onto itself, so in-place compaction first
//! snapshots the store into a scratch texture and copies out of that.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};

use crate::{BackingStoreManager, Error, Rect, Result};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(0);

pub struct Texture {
    id: u64,
    inner: wgpu::Texture,
    desc: wgpu::TextureDescriptor<'static>,
    view: wgpu::TextureView,
}

impl Texture {
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Texture {
        let desc = wgpu::TextureDescriptor {
            label: Some("rect-packer backing store"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
        };
        let inner = device.create_texture(&desc);
        let view = inner.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            inner,
            desc,
            view,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.inner
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> glam::UVec2 {
        glam::uvec2(self.desc.size.width, self.desc.size.height)
    }

    fn copy_at(&self, x: i32, y: i32) -> wgpu::ImageCopyTexture<'_> {
        wgpu::ImageCopyTexture {
            texture: &self.inner,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: x as u32,
                y: y as u32,
                z: 0,
            },
            aspect: wgpu::TextureAspect::All,
        }
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("size", &self.desc.size)
            .field("format", &self.desc.format)
            .finish()
    }
}

/// Keeps packed rects in RGBA8 textures on one device.
pub struct TextureStoreManager {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    encoder: Option<wgpu::CommandEncoder>,
    scratch: Option<Texture>,
}

impl TextureStoreManager {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        Self {
            device,
            queue,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            encoder: None,
            scratch: None,
        }
    }

    /// Opens the first adapter wgpu finds, without a surface.
    pub fn headless(format: wgpu::TextureFormat) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::Backends::all());
        let adapter = instance
            .enumerate_adapters(wgpu::Backends::all())
            .next()
            .ok_or_else(|| Error::Gpu("no adapter available".into()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                features: wgpu::Features::default(),
                limits: wgpu::Limits::downlevel_webgl2_defaults(),
            },
            None,
        ))
        .map_err(|e| Error::Gpu(e.to_string()))?;
        Ok(Self::new(device, queue, format))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Uploads tightly packed RGBA8 `pixels` into the footprint of `rect`.
    pub fn write<P>(&self, store: &Texture, rect: &Rect<P>, pixels: &[u8]) -> Result<()> {
        if rect.w() == 0 || rect.h() == 0 {
            return Ok(());
        }
        let expected = rect.w() as usize * rect.h() as usize * 4;
        if pixels.len() != expected {
            return Err(Error::Gpu(format!(
                "expected {} bytes for a {}x{} rect, got {}",
                expected,
                rect.w(),
                rect.h(),
                pixels.len()
            )));
        }
        self.queue.write_texture(
            store.copy_at(rect.x(), rect.y()),
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: NonZeroU32::new(rect.w() as u32 * 4),
                rows_per_image: NonZeroU32::new(rect.h() as u32),
            },
            extent(rect),
        );
        Ok(())
    }

    /// Reads a whole store back as an RGBA image. Blocks on the device.
    pub fn read(&self, store: &Texture) -> Result<image::RgbaImage> {
        let size = store.size();
        let row = size.x * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = (row + align - 1) / align * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("rect-packer readback"),
            size: padded as u64 * size.y as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_texture_to_buffer(
            store.copy_at(0, 0),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: NonZeroU32::new(padded),
                    rows_per_image: NonZeroU32::new(size.y),
                },
            },
            store.desc.size,
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| Error::Gpu(e.to_string()))?
            .map_err(|e| Error::Gpu(e.to_string()))?;

        let mut pixels = Vec::with_capacity((row * size.y) as usize);
        {
            let view = slice.get_mapped_range();
            for line in view.chunks_exact(padded as usize) {
                pixels.extend_from_slice(&line[..row as usize]);
            }
        }
        buffer.unmap();
        image::RgbaImage::from_raw(size.x, size.y, pixels)
            .ok_or_else(|| Error::Gpu("readback size mismatch".into()))
    }
}

fn extent<P>(rect: &Rect<P>) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: rect.w() as u32,
        height: rect.h() as u32,
        depth_or_array_layers: 1,
    }
}

impl BackingStoreManager for TextureStoreManager {
    type Store = Texture;

    fn allocate_backing_store(&mut self, width: u32, height: u32) -> Result<Texture> {
        debug!("allocating {}x{} texture", width, height);
        Ok(Texture::new(&self.device, width, height, self.format, self.usage))
    }

    fn delete_backing_store(&mut self, store: Texture) {
        store.inner.destroy();
    }

    fn begin_movement(&mut self, old: &Texture, new: &Texture) -> Result<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rect-packer movement"),
            });
        if old == new {
            let size = old.size();
            let scratch = Texture::new(&self.device, size.x, size.y, self.format, self.usage);
            encoder.copy_texture_to_texture(old.copy_at(0, 0), scratch.copy_at(0, 0), old.desc.size);
            self.scratch = Some(scratch);
        }
        self.encoder = Some(encoder);
        Ok(())
    }

    fn move_rect(&mut self, old: &Texture, old_rect: &Rect, new: &Texture, new_rect: &Rect) -> Result<()> {
        if old_rect.w() == 0 || old_rect.h() == 0 {
            return Ok(());
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or(Error::Internal("move outside a movement batch"))?;
        let source = match &self.scratch {
            Some(scratch) if old == new => scratch,
            _ => old,
        };
        trace!("texture move {} -> {}", old_rect.position(), new_rect.position());
        encoder.copy_texture_to_texture(
            source.copy_at(old_rect.x(), old_rect.y()),
            new.copy_at(new_rect.x(), new_rect.y()),
            extent(old_rect),
        );
        Ok(())
    }

    fn end_movement(&mut self, _old: &Texture, _new: &Texture) -> Result<()> {
        let encoder = self
            .encoder
            .take()
            .ok_or(Error::Internal("end of a movement batch that never began"))?;
        self.queue.submit(Some(encoder.finish()));
        if let Some(scratch) = self.scratch.take() {
            scratch.inner.destroy();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RectanglePacker;

    // Machines without any adapter skip these.
    fn init() -> Option<TextureStoreManager> {
        TextureStoreManager::headless(wgpu::TextureFormat::Rgba8Unorm).ok()
    }

    fn solid(w: i32, h: i32, tag: u8) -> Vec<u8> {
        [tag, tag, tag, 255].repeat((w * h) as usize)
    }

    #[test]
    fn rects_survive_compaction_and_growth() {
        let Some(manager) = init() else { return };
        let mut packer = RectanglePacker::new(manager, 64, 16).unwrap();

        let mut ids = Vec::new();
        for tag in 1..=4u8 {
            let id = packer.add(Rect::sized(16, 16, tag).unwrap()).unwrap();
            let rect = packer.get(id).unwrap().geometry();
            let (store, manager) = packer.store_and_manager().unwrap();
            manager.write(store, &rect, &solid(16, 16, tag * 50)).unwrap();
            ids.push(id);
        }
        packer.remove(ids[0]).unwrap();
        packer.remove(ids[2]).unwrap();
        // Compaction, then growth.
        packer.add(Rect::sized(32, 16, 0).unwrap()).unwrap();
        packer.add(Rect::sized(64, 8, 0).unwrap()).unwrap();
        assert_eq!(packer.height(), 24);

        let (store, manager) = packer.store_and_manager().unwrap();
        let image = manager.read(store).unwrap();
        for (_, rect) in packer.iter().filter(|(_, r)| *r.payload() != 0) {
            let tag = *rect.payload() * 50;
            let pixel = image.get_pixel(rect.x() as u32 + 3, rect.y() as u32 + 3);
            assert_eq!(pixel.0, [tag, tag, tag, 255]);
        }
    }

    #[test]
    fn write_checks_length() {
        let Some(mut manager) = init() else { return };
        let store = manager.allocate_backing_store(8, 8).unwrap();
        let rect = Rect::new(0, 0, 2, 2, ()).unwrap();
        assert!(manager.write(&store, &rect, &[0; 15]).is_err());
        manager.write(&store, &rect, &solid(2, 2, 9)).unwrap();
        assert_eq!(manager.read(&store).unwrap().get_pixel(1, 1).0, [9, 9, 9, 255]);
        manager.delete_backing_store(store);
    }
}
