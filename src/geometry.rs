//! Small geometric value types shared by the scene graph.

/// Default bounds margin applied on every side of the scissor when no
/// ancestor overrides it.
pub const DEFAULT_BOUNDS_MARGIN: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Build a color from a packed `0xAARRGGBB` value.
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            r: ((argb >> 16) & 0xFF) as f32 / 255.0,
            g: ((argb >> 8) & 0xFF) as f32 / 255.0,
            b: (argb & 0xFF) as f32 / 255.0,
            a: ((argb >> 24) & 0xFF) as f32 / 255.0,
        }
    }

    pub fn is_white(&self) -> bool {
        *self == Self::WHITE
    }

    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Axis-aligned rectangle in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rectangle from its edges.
    pub fn from_edges(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// A scissor without area clips everything away.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Intersection of two rectangles, collapsed to zero size when they are
    /// disjoint. The result always lies inside `self`.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let left = self.x.max(other.x).min(self.right());
        let top = self.y.max(other.y).min(self.bottom());
        let right = self.right().min(other.right()).max(left);
        let bottom = self.bottom().min(other.bottom()).max(top);
        Rect::from_edges(left, top, right, bottom)
    }

    /// Whether `other` lies completely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Touching edges count as overlapping, so a zero-size box on the border
    /// of the scissor is still considered inside.
    pub fn touches(&self, other: &Rect) -> bool {
        !(self.x > other.right()
            || self.y > other.bottom()
            || other.x > self.right()
            || other.y > self.bottom())
    }

    /// Grow the rectangle by a (possibly asymmetric) margin.
    pub fn expand(&self, margin: &BoundsMargin) -> Rect {
        Rect::from_edges(
            self.x - margin.left,
            self.y - margin.top,
            self.right() + margin.right,
            self.bottom() + margin.bottom,
        )
    }
}

/// Extra room around the scissor inside which out-of-view nodes are kept alive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsMargin {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundsMargin {
    pub const fn uniform(margin: f32) -> Self {
        Self {
            left: margin,
            top: margin,
            right: margin,
            bottom: margin,
        }
    }

    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

impl Default for BoundsMargin {
    fn default() -> Self {
        Self::uniform(DEFAULT_BOUNDS_MARGIN)
    }
}
