//! Orientation math
//!
//! JPEG orientation for still requests and the affine transform applied to
//! the preview surface so the sensor image is upright in the view.

use crate::types::{Rotation, Size};

/// Display rotation to JPEG orientation lookup, indexed by quarter turns.
pub const DEFAULT_ROTATION_TABLE: [u32; 4] = [90, 0, 270, 180];

/// Orientation in degrees to stamp on a still capture.
///
/// `(table[rotation] + sensor_orientation + 270) % 360`; always one of
/// 0/90/180/270 for right-angle sensor mounts. The device-reported
/// orientation is reduced first so out-of-range values cannot overflow.
pub fn jpeg_orientation(table: &[u32; 4], rotation: Rotation, sensor_orientation: u32) -> u32 {
    (table[rotation.quarter_turns()] % 360 + sensor_orientation % 360 + 270) % 360
}

/// 2D affine transform `[a b c; d e f]` mapping `(x, y)` to
/// `(a*x + b*y + c, d*x + e*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    /// Map `src` onto `dst`, scaling each axis independently.
    pub fn rect_to_rect(src: Rect, dst: Rect) -> Self {
        if src.width() == 0.0 || src.height() == 0.0 {
            return Self::IDENTITY;
        }
        let sx = dst.width() / src.width();
        let sy = dst.height() / src.height();
        Affine {
            a: sx,
            b: 0.0,
            c: dst.left - src.left * sx,
            d: 0.0,
            e: sy,
            f: dst.top - src.top * sy,
        }
    }

    /// `other` applied after `self`.
    pub fn then(self, other: Affine) -> Affine {
        Affine {
            a: other.a * self.a + other.b * self.d,
            b: other.a * self.b + other.b * self.e,
            c: other.a * self.c + other.b * self.f + other.c,
            d: other.d * self.a + other.e * self.d,
            e: other.d * self.b + other.e * self.e,
            f: other.d * self.c + other.e * self.f + other.f,
        }
    }

    pub fn post_scale(self, sx: f32, sy: f32, px: f32, py: f32) -> Affine {
        self.then(Affine {
            a: sx,
            b: 0.0,
            c: px - sx * px,
            d: 0.0,
            e: sy,
            f: py - sy * py,
        })
    }

    pub fn post_rotate(self, degrees: f32, px: f32, py: f32) -> Affine {
        let (sin, cos) = degrees.to_radians().sin_cos();
        self.then(Affine {
            a: cos,
            b: -sin,
            c: px - cos * px + sin * py,
            d: sin,
            e: cos,
            f: py - sin * px - cos * py,
        })
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn from_size(width: f32, height: f32) -> Self {
        Rect {
            left: 0.0,
            top: 0.0,
            right: width,
            bottom: height,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    pub fn offset(self, dx: f32, dy: f32) -> Rect {
        Rect {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }
}

/// Transform for a preview surface of `view` size showing a stream of
/// `preview` size while the display sits at `rotation`.
pub fn preview_transform(view: Size, preview: Size, rotation: Rotation) -> Affine {
    let view_rect = Rect::from_size(view.width as f32, view.height as f32);
    let (cx, cy) = view_rect.center();

    match rotation {
        Rotation::Rotation90 | Rotation::Rotation270 => {
            let buffer_rect = Rect::from_size(preview.height as f32, preview.width as f32);
            let (bx, by) = buffer_rect.center();
            let buffer_rect = buffer_rect.offset(cx - bx, cy - by);

            let scale = (view.height as f32 / preview.height as f32)
                .max(view.width as f32 / preview.width as f32);
            let degrees = 90.0 * (rotation.quarter_turns() as f32 - 2.0);

            Affine::rect_to_rect(view_rect, buffer_rect)
                .post_scale(scale, scale, cx, cy)
                .post_rotate(degrees, cx, cy)
        }
        Rotation::Rotation180 => Affine::IDENTITY.post_rotate(180.0, cx, cy),
        Rotation::Rotation0 => Affine::IDENTITY,
    }
}
