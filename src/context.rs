/// Accumulated 2D affine transform plus alpha.
///
/// A point `(x, y)` in node-local space maps to
/// `(ta * x + tb * y + px, tc * x + td * y + py)`.
///
/// Every node holds a world context (relative to the stage) and, when it
/// lives below a render-to-texture ancestor, a render context (relative to
/// that ancestor's texture).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Context {
    pub alpha: f32,
    pub px: f32,
    pub py: f32,
    pub ta: f32,
    pub tb: f32,
    pub tc: f32,
    pub td: f32,
}

/// Alpha values below this are snapped to zero so that floating point noise
/// cannot make a node flap between visible and invisible.
pub const ALPHA_EPSILON: f32 = 1e-14;

impl Context {
    /// Identity transform, fully opaque.
    pub const IDENTITY: Self = Self {
        alpha: 1.0,
        px: 0.0,
        py: 0.0,
        ta: 1.0,
        tb: 0.0,
        tc: 0.0,
        td: 1.0,
    };

    /// Create a pure translation.
    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            px: x,
            py: y,
            ..Self::IDENTITY
        }
    }

    /// True when there is no rotation or shear, so the transform maps
    /// axis-aligned rectangles onto axis-aligned rectangles.
    pub fn is_square(&self) -> bool {
        self.tb == 0.0 && self.tc == 0.0
    }

    /// Shear, rotation or negative scale present.
    pub fn is_complex(&self) -> bool {
        self.tb != 0.0 || self.tc != 0.0 || self.ta < 0.0 || self.td < 0.0
    }

    /// Check if the transform part is the identity (alpha is ignored).
    pub fn is_identity(&self) -> bool {
        self.px == 0.0
            && self.py == 0.0
            && self.ta == 1.0
            && self.tb == 0.0
            && self.tc == 0.0
            && self.td == 1.0
    }

    /// Transform a 2D point by this matrix.
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.ta * x + self.tb * y + self.px,
            self.tc * x + self.td * y + self.py,
        )
    }

    /// Corners of a `w`×`h` box in local space: top-left, top-right,
    /// bottom-right, bottom-left.
    pub fn corner_points(&self, w: f32, h: f32) -> [(f32, f32); 4] {
        [
            self.transform_point(0.0, 0.0),
            self.transform_point(w, 0.0),
            self.transform_point(w, h),
            self.transform_point(0.0, h),
        ]
    }

    /// Compose with the parent: `parent * self`, alpha multiplied.
    ///
    /// This is the general path. The update traversal uses the incremental
    /// per-term variant instead, but both must agree.
    pub fn then(&self, parent: &Context) -> Context {
        Context {
            alpha: clamp_alpha(parent.alpha * self.alpha),
            px: parent.px + self.px * parent.ta + self.py * parent.tb,
            py: parent.py + self.px * parent.tc + self.py * parent.td,
            ta: parent.ta * self.ta + parent.tb * self.tc,
            tb: parent.ta * self.tb + parent.tb * self.td,
            tc: parent.tc * self.ta + parent.td * self.tc,
            td: parent.tc * self.tb + parent.td * self.td,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Snap tiny alpha values to zero.
pub fn clamp_alpha(alpha: f32) -> f32 {
    if alpha < ALPHA_EPSILON { 0.0 } else { alpha }
}
