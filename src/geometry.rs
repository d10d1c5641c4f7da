//! .
//!
//! The origin of coordinate system is in top-left corner. All coordinates are
//! expressed in source-raster pixels.

use {
  euclid::{Point2D, Vector2D, Size2D},
  image::RgbaImage
};

/// Canvas coordinate basis
#[derive(Debug, Copy, Clone)]
pub struct CanvasSpace;

pub type Point = Point2D<f32, CanvasSpace>;
pub type V2 = Vector2D<f32, CanvasSpace>;
pub type Size = Size2D<f32, CanvasSpace>;

/// Circles at or below this radius are considered dead, and are swept
/// at the end of each frame.
pub const DEAD_RADIUS: f32 = 0.01;

/// Brightness floor applied to sampled colors, so that near-black circles
/// remain visible on dark backgrounds.
pub const BRIGHTNESS_FLOOR: f32 = 0.1;

/// RGB color, channels in `[0, 1]`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rgb {
  pub r: f32,
  pub g: f32,
  pub b: f32
}

impl Rgb {
  pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };

  /// Sample the raster at `point`, clamped to the image bounds.
  pub fn sample(raster: &RgbaImage, point: Point) -> Rgb {
    let x = (point.x as i64).clamp(0, raster.width() as i64 - 1) as u32;
    let y = (point.y as i64).clamp(0, raster.height() as i64 - 1) as u32;
    let px = raster.get_pixel(x, y).0;
    Rgb {
      r: px[0] as f32 / 255.0,
      g: px[1] as f32 / 255.0,
      b: px[2] as f32 / 255.0
    }
  }

  /// Similarity in `[0, 1]`: `1 - |Δrgb| / √3`.
  pub fn similarity(self, other: Rgb) -> f32 {
    let d = (
      (self.r - other.r).powi(2) +
      (self.g - other.g).powi(2) +
      (self.b - other.b).powi(2)
    ).sqrt();
    1.0 - d / 3f32.sqrt()
  }

  pub fn blend(self, other: Rgb, t: f32) -> Rgb {
    Rgb {
      r: self.r + (other.r - self.r) * t,
      g: self.g + (other.g - self.g) * t,
      b: self.b + (other.b - self.b) * t
    }
  }

  pub fn brightness(self) -> f32 {
    (self.r + self.g + self.b) / 3.0
  }

  /// Lift near-black colors up to [`BRIGHTNESS_FLOOR`].
  pub fn boosted(self) -> Rgb {
    let b = self.brightness();
    if b >= BRIGHTNESS_FLOOR { return self; }
    let lift = BRIGHTNESS_FLOOR - b;
    Rgb {
      r: (self.r + lift).min(1.0),
      g: (self.g + lift).min(1.0),
      b: (self.b + lift).min(1.0)
    }
  }
}

/// Color-adaptation sub-phase, see [`Lifecycle::Adapting`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AdaptPhase {
  /// Probing ring points around the circle for a better color match.
  Resampling { original: Rgb },
  /// Moving toward a chosen target point, blending color on the way.
  Seeking { target: Point, color: Rgb }
}

/// Per-circle lifecycle tag. Exactly one variant is active at a time;
/// fields only exist on the variants that use them.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Lifecycle {
  /// Settled; eligible for color-similarity polling.
  Stable,
  /// Progressive growth ramp after initial placement.
  Growing { target_radius: f32, start_time: f64 },
  /// Step-growth of a dynamically spawned circle, until first collision.
  DynamicSpawning { target_radius: f32 },
  /// Mid color-adaptation cycle.
  Adapting(AdaptPhase)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
  pub center: Point,
  /// Previous position; Verlet integration derives velocity from it.
  pub prev: Point,
  pub radius: f32,
  pub target_radius: f32,
  pub start_radius: f32,
  pub color: Rgb,
  /// `π·radius²`, recomputed on every radius mutation.
  pub mass: f32,
  /// Pinned circles are excluded from physics resolution.
  pub pinned: bool,
  pub lifecycle: Lifecycle,
  /// Sim-clock time until which the circle is exempt from color adaptation.
  pub protected_until: f64
}

impl Circle {
  pub fn new(center: Point, radius: f32, color: Rgb) -> Self {
    let radius = radius.max(0.0);
    Circle {
      center,
      prev: center,
      radius,
      target_radius: radius,
      start_radius: radius,
      color,
      mass: mass_of(radius),
      pinned: false,
      lifecycle: Lifecycle::Stable,
      protected_until: 0.0
    }
  }

  /// The only radius mutation path; keeps `mass = π·r²` in sync.
  pub fn set_radius(&mut self, radius: f32) {
    self.radius = radius.max(0.0);
    self.mass = mass_of(self.radius);
  }

  pub fn is_dead(&self) -> bool {
    self.radius <= DEAD_RADIUS
  }

  pub fn velocity(&self) -> V2 {
    self.center - self.prev
  }
}

pub fn mass_of(radius: f32) -> f32 {
  std::f32::consts::PI * radius * radius
}
