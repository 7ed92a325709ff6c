use glam::IVec2;

use crate::{Error, Result};

/// An axis-aligned integer rectangle carrying an opaque caller payload.
///
/// Position and size are never negative. The payload is handed back untouched
/// by the packer; it never inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rect<P = ()> {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    payload: P,
    next_location: Option<IVec2>,
}

fn check(x: i32, y: i32, w: i32, h: i32) -> Result<()> {
    if x < 0 || y < 0 || w < 0 || h < 0 {
        return Err(Error::InvalidGeometry { x, y, w, h });
    }
    Ok(())
}

impl<P> Rect<P> {
    pub fn new(x: i32, y: i32, w: i32, h: i32, payload: P) -> Result<Self> {
        check(x, y, w, h)?;
        Ok(Self {
            x,
            y,
            w,
            h,
            payload,
            next_location: None,
        })
    }

    /// A rect at the origin, the usual shape for something about to be packed.
    pub fn sized(w: i32, h: i32, payload: P) -> Result<Self> {
        Self::new(0, 0, w, h, payload)
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn w(&self) -> i32 {
        self.w
    }

    pub fn h(&self) -> i32 {
        self.h
    }

    pub fn position(&self) -> IVec2 {
        glam::ivec2(self.x, self.y)
    }

    pub fn size(&self) -> IVec2 {
        glam::ivec2(self.w, self.h)
    }

    pub fn area(&self) -> i64 {
        self.w as i64 * self.h as i64
    }

    pub fn set_position(&mut self, x: i32, y: i32) -> Result<()> {
        check(x, y, self.w, self.h)?;
        self.x = x;
        self.y = y;
        Ok(())
    }

    pub fn set_size(&mut self, w: i32, h: i32) -> Result<()> {
        check(self.x, self.y, w, h)?;
        self.w = w;
        self.h = h;
        Ok(())
    }

    /// Inclusive largest x inside the rect, or -1 when it has no width.
    pub fn max_x(&self) -> i32 {
        if self.w == 0 {
            -1
        } else {
            self.x + self.w - 1
        }
    }

    /// Inclusive largest y inside the rect, or -1 when it has no height.
    pub fn max_y(&self) -> i32 {
        if self.h == 0 {
            -1
        } else {
            self.y + self.h - 1
        }
    }

    pub fn can_contain<Q>(&self, other: &Rect<Q>) -> bool {
        self.w >= other.w && self.h >= other.h
    }

    /// Whether the two footprints share at least one pixel.
    pub fn intersects<Q>(&self, other: &Rect<Q>) -> bool {
        if self.w == 0 || self.h == 0 || other.w == 0 || other.h == 0 {
            return false;
        }
        self.x <= other.max_x()
            && other.x <= self.max_x()
            && self.y <= other.max_y()
            && other.y <= self.max_y()
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Position and size only, the shape handed to a [`crate::BackingStoreManager`].
    pub fn geometry(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
            payload: (),
            next_location: None,
        }
    }

    /// Where this rect is headed while the packer migrates to a new backing store.
    pub fn next_location(&self) -> Option<IVec2> {
        self.next_location
    }

    pub(crate) fn set_next_location(&mut self, location: Option<IVec2>) {
        self.next_location = location;
    }

    pub(crate) fn place(&mut self, x: i32, y: i32) {
        debug_assert!(x >= 0 && y >= 0);
        self.x = x;
        self.y = y;
    }

    pub(crate) fn resize(&mut self, w: i32, h: i32) {
        debug_assert!(w >= 0 && h >= 0);
        self.w = w;
        self.h = h;
    }
}

impl Rect {
    pub(crate) fn span(x: i32, y: i32, w: i32, h: i32) -> Rect {
        debug_assert!(x >= 0 && y >= 0 && w >= 0 && h >= 0);
        Rect {
            x,
            y,
            w,
            h,
            payload: (),
            next_location: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_components_are_rejected() {
        assert!(matches!(
            Rect::new(-1, 0, 1, 1, ()),
            Err(Error::InvalidGeometry { x: -1, .. })
        ));
        assert!(Rect::sized(1, -3, ()).is_err());

        let mut r = Rect::new(2, 3, 4, 5, ()).unwrap();
        assert!(r.set_position(0, -1).is_err());
        assert!(r.set_size(-4, 5).is_err());
        // failed mutations leave the rect untouched
        assert_eq!((r.x(), r.y(), r.w(), r.h()), (2, 3, 4, 5));

        r.set_position(7, 8).unwrap();
        r.set_size(1, 2).unwrap();
        assert_eq!((r.x(), r.y(), r.w(), r.h()), (7, 8, 1, 2));
    }

    #[test]
    fn max_coordinates_are_inclusive() {
        let r = Rect::new(10, 20, 5, 3, ()).unwrap();
        assert_eq!(r.max_x(), 14);
        assert_eq!(r.max_y(), 22);
        assert_eq!(r.area(), 15);

        let empty = Rect::new(10, 20, 0, 0, ()).unwrap();
        assert_eq!(empty.max_x(), -1);
        assert_eq!(empty.max_y(), -1);
    }

    #[test]
    fn containment_and_intersection() {
        let big = Rect::new(0, 0, 10, 10, ()).unwrap();
        let small = Rect::new(9, 9, 4, 4, "glyph").unwrap();
        assert!(big.can_contain(&small));
        assert!(!small.can_contain(&big));
        assert!(big.intersects(&small));

        let beside = Rect::new(10, 0, 4, 4, ()).unwrap();
        assert!(!big.intersects(&beside));

        let flat = Rect::new(5, 5, 3, 0, ()).unwrap();
        assert!(!big.intersects(&flat));
    }

    #[test]
    fn geometry_drops_payload() {
        let r = Rect::new(1, 2, 3, 4, String::from("a")).unwrap();
        let g = r.geometry();
        assert_eq!(g.position(), glam::ivec2(1, 2));
        assert_eq!(g.size(), glam::ivec2(3, 4));
        assert_eq!(r.into_payload(), "a");
    }
}
