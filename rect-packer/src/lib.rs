//! Shelf-based rectangle packing for texture atlases.
//!
//! A [`RectanglePacker`] places rects onto horizontal shelves ([`Level`]s)
//! of a backing store it never touches directly: every pixel copy goes through
//! a caller-supplied [`BackingStoreManager`]. When a rect does not fit, the
//! packer first compacts a fragmented shelf in place, then grows the store
//! and re-lays out everything into it.

mod arena;
mod error;
mod layout;
mod level;
mod level_set;
mod options;
mod packer;
mod rect;
mod store;

pub use arena::RectId;
pub use error::*;
pub use layout::*;
pub use level::*;
pub use level_set::*;
pub use options::*;
pub use packer::*;
pub use rect::*;
pub use store::*;

pub mod image_store;
#[cfg(feature = "wgpu")]
pub mod gpu;

pub use image;
