/// An axis-aligned face box in pixel coordinates.
///
/// Edges are stored directly: `left`/`top` are inclusive, `right`/`bottom`
/// are the far edges (`right - left` is the width). Regions may extend past
/// the frame; consumers that read pixels clamp them first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Region {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Builds a region from an `(x, y, width, height)` box.
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.left as f64 + self.width() as f64 / 2.0,
            self.top as f64 + self.height() as f64 / 2.0,
        )
    }

    /// Whether `(x, y)` lies within the region, edges included.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.left as f64
            && x <= self.right as f64
            && y >= self.top as f64
            && y <= self.bottom as f64
    }

    /// Mutual containment: each region's center lies inside the other.
    ///
    /// Stricter than overlap. A large box engulfing a small one fails
    /// because the large box's center falls outside the small one.
    pub fn mutually_contains(&self, other: &Region) -> bool {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        other.contains_point(ax, ay) && self.contains_point(bx, by)
    }

    /// Grows the region by `dx` on the left and right and `dy` on the top
    /// and bottom.
    pub fn padded(&self, dx: i32, dy: i32) -> Region {
        Region::new(
            self.left - dx,
            self.top - dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    /// Clips the region to a `width` x `height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Region {
        let w = width as i32;
        let h = height as i32;
        Region::new(
            self.left.clamp(0, w),
            self.top.clamp(0, h),
            self.right.clamp(0, w),
            self.bottom.clamp(0, h),
        )
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        Region::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    pub fn iou(&self, other: &Region) -> f64 {
        let ix1 = self.left.max(other.left);
        let iy1 = self.top.max(other.top);
        let ix2 = self.right.min(other.right);
        let iy2 = self.bottom.min(other.bottom);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let area_a = self.width() as f64 * self.height() as f64;
        let area_b = other.width() as f64 * other.height() as f64;
        inter / (area_a + area_b - inter)
    }
}
