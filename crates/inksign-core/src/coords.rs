//! Coordinate transformation between image space and screen space
//!
//! Image space is the intrinsic pixel grid of a rasterized page. Screen space
//! is the CSS pixel grid of the page `<img>` element, which shows the image
//! with `object-fit: contain`: scaled uniformly, centered, letterboxed on one
//! axis.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, Size};

/// Where a contain-fitted image lands inside its container
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainFit {
    pub offset_x: f64,
    pub offset_y: f64,
    pub display_width: f64,
    pub display_height: f64,
}

impl ContainFit {
    /// Fit `image` inside `container`, preserving aspect ratio and centering.
    /// Degenerate inputs yield an all-zero fit.
    pub fn compute(container: Size, image: Size) -> Self {
        if container.is_empty() || image.is_empty() {
            return Self::default();
        }

        let image_aspect = image.aspect();
        let container_aspect = container.aspect();

        if image_aspect > container_aspect {
            let display_width = container.width;
            let display_height = display_width / image_aspect;
            Self {
                offset_x: 0.0,
                offset_y: (container.height - display_height) / 2.0,
                display_width,
                display_height,
            }
        } else {
            let display_height = container.height;
            let display_width = display_height * image_aspect;
            Self {
                offset_x: (container.width - display_width) / 2.0,
                offset_y: 0.0,
                display_width,
                display_height,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.display_width <= 0.0 || self.display_height <= 0.0
    }
}

/// Image ↔ screen transform for one displayed page image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateMapper {
    container: Rect,
    image: Size,
    fit: ContainFit,
}

impl CoordinateMapper {
    /// `container` is the element's bounding rect in screen space, `image` the
    /// raster's intrinsic size
    pub fn new(container: Rect, image: Size) -> Self {
        Self {
            container,
            image,
            fit: ContainFit::compute(container.size(), image),
        }
    }

    /// Mapper for an image shown at its natural size with its top-left corner
    /// at `origin`
    pub fn identity(origin: Point, image: Size) -> Self {
        Self::new(Rect::from_origin_size(origin, image), image)
    }

    pub fn container(&self) -> Rect {
        self.container
    }

    pub fn image_size(&self) -> Size {
        self.image
    }

    pub fn fit(&self) -> ContainFit {
        self.fit
    }

    /// False until the image element has been laid out
    pub fn is_ready(&self) -> bool {
        !self.fit.is_empty() && !self.image.is_empty()
    }

    /// The letterboxed sub-rectangle the image actually occupies on screen
    pub fn displayed_rect(&self) -> Rect {
        Rect::new(
            self.container.x + self.fit.offset_x,
            self.container.y + self.fit.offset_y,
            self.fit.display_width,
            self.fit.display_height,
        )
    }

    /// Screen pixels per image pixel. Uniform under contain-fit.
    pub fn scale(&self) -> f64 {
        if !self.is_ready() {
            return 0.0;
        }
        self.fit.display_width / self.image.width
    }

    pub fn image_to_screen(&self, x: f64, y: f64) -> Point {
        if !self.is_ready() {
            return Point::default();
        }
        Point::new(
            self.container.x + self.fit.offset_x + (x / self.image.width) * self.fit.display_width,
            self.container.y
                + self.fit.offset_y
                + (y / self.image.height) * self.fit.display_height,
        )
    }

    /// Inverse of [`image_to_screen`](Self::image_to_screen), clamped to the
    /// page so a dragged point never leaves its logical bounds
    pub fn screen_to_image(&self, x: f64, y: f64) -> Point {
        if !self.is_ready() {
            return Point::default();
        }
        let ix = (x - self.container.x - self.fit.offset_x) / self.fit.display_width
            * self.image.width;
        let iy = (y - self.container.y - self.fit.offset_y) / self.fit.display_height
            * self.image.height;
        Point::new(
            ix.clamp(0.0, self.image.width),
            iy.clamp(0.0, self.image.height),
        )
    }

    pub fn image_to_screen_size(&self, width: f64, height: f64) -> Size {
        if !self.is_ready() {
            return Size::default();
        }
        Size::new(
            width * (self.fit.display_width / self.image.width),
            height * (self.fit.display_height / self.image.height),
        )
    }

    pub fn image_rect_to_screen(&self, rect: Rect) -> Rect {
        let origin = self.image_to_screen(rect.x, rect.y);
        let size = self.image_to_screen_size(rect.width, rect.height);
        Rect::from_origin_size(origin, size)
    }

    /// Convert a screen-space displacement to image units, without clamping
    pub fn screen_delta_to_image(&self, dx: f64, dy: f64) -> (f64, f64) {
        if !self.is_ready() {
            return (0.0, 0.0);
        }
        (
            dx * self.image.width / self.fit.display_width,
            dy * self.image.height / self.fit.display_height,
        )
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    // Strategy for valid positive dimensions (1.0 to 2000.0 pixels)
    fn dimension() -> impl Strategy<Value = f64> {
        1.0f64..2000.0
    }

    // Strategy for a percentage (0.0 to 1.0)
    fn percentage() -> impl Strategy<Value = f64> {
        0.0f64..=1.0
    }

    fn offset() -> impl Strategy<Value = f64> {
        -500.0f64..500.0
    }

    proptest! {
        /// Property: screen -> image -> screen returns the original point for
        /// any point inside the displayed rectangle
        #[test]
        fn roundtrip_screen_to_image_to_screen(
            left in offset(),
            top in offset(),
            container_w in dimension(),
            container_h in dimension(),
            image_w in dimension(),
            image_h in dimension(),
            x_pct in percentage(),
            y_pct in percentage(),
        ) {
            let mapper = CoordinateMapper::new(
                Rect::new(left, top, container_w, container_h),
                Size::new(image_w, image_h),
            );
            let shown = mapper.displayed_rect();
            let sx = shown.x + x_pct * shown.width;
            let sy = shown.y + y_pct * shown.height;

            let img = mapper.screen_to_image(sx, sy);
            let back = mapper.image_to_screen(img.x, img.y);

            prop_assert!(
                (back.x - sx).abs() < 1.0 && (back.y - sy).abs() < 1.0,
                "screen->image->screen failed: ({}, {}) -> ({}, {}) -> ({}, {})",
                sx, sy, img.x, img.y, back.x, back.y
            );
        }

        /// Property: image -> screen -> image returns the original point for any
        /// point inside the image bounds
        #[test]
        fn roundtrip_image_to_screen_to_image(
            left in offset(),
            top in offset(),
            container_w in dimension(),
            container_h in dimension(),
            image_w in dimension(),
            image_h in dimension(),
            x_pct in percentage(),
            y_pct in percentage(),
        ) {
            let mapper = CoordinateMapper::new(
                Rect::new(left, top, container_w, container_h),
                Size::new(image_w, image_h),
            );
            let ix = x_pct * image_w;
            let iy = y_pct * image_h;

            let screen = mapper.image_to_screen(ix, iy);
            let back = mapper.screen_to_image(screen.x, screen.y);

            let tolerance = 1e-6 * image_w.max(image_h);
            prop_assert!((back.x - ix).abs() < tolerance, "x: {} -> {}", ix, back.x);
            prop_assert!((back.y - iy).abs() < tolerance, "y: {} -> {}", iy, back.y);
        }

        /// Property: screen_to_image never leaves [0, w] x [0, h]
        #[test]
        fn screen_to_image_is_clamped(
            container_w in dimension(),
            container_h in dimension(),
            image_w in dimension(),
            image_h in dimension(),
            sx in -1.0e5f64..1.0e5,
            sy in -1.0e5f64..1.0e5,
        ) {
            let mapper = CoordinateMapper::new(
                Rect::new(0.0, 0.0, container_w, container_h),
                Size::new(image_w, image_h),
            );
            let p = mapper.screen_to_image(sx, sy);
            prop_assert!(p.x >= 0.0 && p.x <= image_w, "x out of bounds: {}", p.x);
            prop_assert!(p.y >= 0.0 && p.y <= image_h, "y out of bounds: {}", p.y);
        }

        /// Property: the fitted image always sits inside the container and
        /// touches it on at least one axis
        #[test]
        fn contain_fit_fills_one_axis(
            container_w in dimension(),
            container_h in dimension(),
            image_w in dimension(),
            image_h in dimension(),
        ) {
            let fit = ContainFit::compute(
                Size::new(container_w, container_h),
                Size::new(image_w, image_h),
            );
            let tolerance = 1e-6;
            prop_assert!(fit.display_width <= container_w + tolerance);
            prop_assert!(fit.display_height <= container_h + tolerance);
            prop_assert!(
                (fit.display_width - container_w).abs() < tolerance
                    || (fit.display_height - container_h).abs() < tolerance
            );
            prop_assert!(fit.offset_x >= -tolerance && fit.offset_y >= -tolerance);
        }

        /// Property: per-axis size ratios agree, so one uniform scale is valid
        #[test]
        fn size_ratios_are_uniform(
            container_w in dimension(),
            container_h in dimension(),
            image_w in dimension(),
            image_h in dimension(),
        ) {
            let mapper = CoordinateMapper::new(
                Rect::new(0.0, 0.0, container_w, container_h),
                Size::new(image_w, image_h),
            );
            let s = mapper.image_to_screen_size(image_w, image_h);
            let rx = s.width / image_w;
            let ry = s.height / image_h;
            prop_assert!((rx - ry).abs() < 1e-9 * rx.max(1.0), "rx={} ry={}", rx, ry);
        }
    }
}
