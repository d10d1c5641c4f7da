//! Spatial+temporal visual-complexity map over the source raster.
//!
//! Per-pixel scalar in `[0, 1]`: Sobel edge magnitude over luminance, blended
//! 70/30 with a normalized temporal frame difference once a compatible
//! previous frame exists. Rebuilt at most every 100 ms. Feeds weighted
//! placement, adaptive shrink, and adaptation scheduling.

use {
  crate::geometry::Point,
  image::RgbaImage,
  rand::Rng
};

/// Minimum seconds between rebuilds.
pub const UPDATE_INTERVAL: f64 = 0.1;
/// Rejection-sampling attempts before falling back to a uniform point.
pub const SAMPLE_ATTEMPTS: u32 = 20;

const SPATIAL_WEIGHT: f32 = 0.7;
const TEMPORAL_WEIGHT: f32 = 0.3;

pub struct ColorChangeMap {
  width: usize,
  height: usize,
  values: Vec<f32>,
  prev: Option<RgbaImage>,
  last_update: f64
}

impl ColorChangeMap {
  pub fn new() -> Self {
    ColorChangeMap {
      width: 0,
      height: 0,
      values: vec![],
      prev: None,
      last_update: f64::NEG_INFINITY
    }
  }

  /// Rebuild from the raster, unless the last rebuild was under
  /// [`UPDATE_INTERVAL`] ago. Returns whether a rebuild happened.
  pub fn update(&mut self, raster: &RgbaImage, now: f64) -> bool {
    if now - self.last_update < UPDATE_INTERVAL {
      return false;
    }
    self.last_update = now;

    let (w, h) = (raster.width() as usize, raster.height() as usize);
    if w < 3 || h < 3 {
      self.width = w;
      self.height = h;
      self.values = vec![0.0; w * h];
      self.prev = Some(raster.clone());
      return true;
    }
    if (self.width, self.height) != (w, h) {
      self.width = w;
      self.height = h;
      self.values = vec![0.0; w * h];
      // a resize invalidates the temporal reference
      self.prev = None;
    }

    let luma = raster.pixels()
      .map(|p| {
        let [r, g, b, _] = p.0;
        (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
      })
      .collect::<Vec<_>>();
    let temporal = self.prev.as_ref()
      .filter(|prev| prev.dimensions() == raster.dimensions());

    {
      use rayon::prelude::*;

      let values = &mut self.values;
      values.par_chunks_mut(w)
        .enumerate()
        .filter(|(y, _)| (1..h - 1).contains(y))
        .for_each(|(y, row)| {
          for x in 1..w - 1 {
            let l = |dx: usize, dy: usize| luma[(y + dy - 1) * w + (x + dx - 1)];
            let gx = l(2, 0) + 2.0 * l(2, 1) + l(2, 2)
                   - l(0, 0) - 2.0 * l(0, 1) - l(0, 2);
            let gy = l(0, 2) + 2.0 * l(1, 2) + l(2, 2)
                   - l(0, 0) - 2.0 * l(1, 0) - l(2, 0);
            let spatial = ((gx * gx + gy * gy).sqrt() / 4.0).min(1.0);

            row[x] = match temporal {
              Some(prev) => {
                let a = raster.get_pixel(x as u32, y as u32).0;
                let b = prev.get_pixel(x as u32, y as u32).0;
                let delta = ((a[0] as f32 - b[0] as f32).abs()
                  + (a[1] as f32 - b[1] as f32).abs()
                  + (a[2] as f32 - b[2] as f32).abs()) / (3.0 * 255.0);
                SPATIAL_WEIGHT * spatial + TEMPORAL_WEIGHT * delta
              }
              None => spatial
            };
          }
        });
    }

    // border pixels copy the nearest interior value
    for x in 1..w - 1 {
      self.values[x] = self.values[w + x];
      self.values[(h - 1) * w + x] = self.values[(h - 2) * w + x];
    }
    for y in 0..h {
      self.values[y * w] = self.values[y * w + 1];
      self.values[y * w + w - 1] = self.values[y * w + w - 2];
    }

    self.prev = Some(raster.clone());
    true
  }

  pub fn intensity_at(&self, point: Point) -> f32 {
    if self.values.is_empty() { return 0.0; }
    let x = (point.x as i64).clamp(0, self.width as i64 - 1) as usize;
    let y = (point.y as i64).clamp(0, self.height as i64 - 1) as usize;
    self.values[y * self.width + x]
  }

  pub fn average(&self) -> f32 {
    if self.values.is_empty() { return 0.0; }
    self.values.iter().sum::<f32>() / self.values.len() as f32
  }

  /// Rejection-sample a point weighted toward high-change regions;
  /// uniform fallback after [`SAMPLE_ATTEMPTS`].
  pub fn weighted_point(&self, rng: &mut impl Rng) -> Point {
    let uniform = |rng: &mut dyn rand::RngCore| Point::new(
      rng.gen_range(0.0..self.width.max(1) as f32),
      rng.gen_range(0.0..self.height.max(1) as f32)
    );
    if self.values.is_empty() {
      return uniform(rng);
    }
    for _ in 0..SAMPLE_ATTEMPTS {
      let p = uniform(rng);
      if rng.gen_range(0.0..1.0f32) < self.intensity_at(p) {
        return p;
      }
    }
    uniform(rng)
  }
}

impl Default for ColorChangeMap {
  fn default() -> Self { Self::new() }
}

#[cfg(test)] mod tests {
  use {
    super::*,
    image::Rgba
  };

  fn flat(w: u32, h: u32, v: u8) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
  }

  /// Half-black, half-white vertical split.
  fn split(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, _| {
      if x < w / 2 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
    })
  }

  #[test] fn flat_image_has_no_signal() {
    let mut map = ColorChangeMap::new();
    assert!(map.update(&flat(16, 16, 128), 0.0));
    assert_eq!(map.average(), 0.0);
  }

  #[test] fn edges_light_up() {
    let mut map = ColorChangeMap::new();
    map.update(&split(16, 16), 0.0);
    assert!(map.intensity_at(Point::new(8.0, 8.0)) > 0.5);
    assert_eq!(map.intensity_at(Point::new(3.0, 8.0)), 0.0);
  }

  #[test] fn rebuild_is_throttled() {
    let mut map = ColorChangeMap::new();
    assert!(map.update(&flat(8, 8, 0), 0.0));
    assert!(!map.update(&split(8, 8), 0.05));
    assert!(map.update(&split(8, 8), 0.11));
  }

  #[test] fn temporal_difference_contributes() {
    let mut map = ColorChangeMap::new();
    map.update(&flat(16, 16, 0), 0.0);
    map.update(&flat(16, 16, 255), 1.0);
    // pure temporal signal on a flat frame: 0.3 * 1.0
    let v = map.intensity_at(Point::new(8.0, 8.0));
    assert!((v - TEMPORAL_WEIGHT).abs() < 1e-4, "{}", v);
  }

  #[test] fn borders_copy_interior() {
    let mut map = ColorChangeMap::new();
    map.update(&split(16, 16), 0.0);
    assert_eq!(
      map.intensity_at(Point::new(8.0, 0.0)),
      map.intensity_at(Point::new(8.0, 1.0))
    );
    let corner = map.intensity_at(Point::new(0.0, 0.0));
    assert_eq!(corner, map.intensity_at(Point::new(1.0, 1.0)));
  }

  #[test] fn weighted_points_prefer_edges() {
    use rand::prelude::*;
    let mut rng = rand_pcg::Pcg64::seed_from_u64(0);
    let mut map = ColorChangeMap::new();
    map.update(&split(64, 64), 0.0);

    let near_edge = (0..300)
      .filter(|_| (map.weighted_point(&mut rng).x - 32.0).abs() <= 2.0)
      .count();
    // the edge band is ~6% of the area; weighting must concentrate picks
    assert!(near_edge > 100, "{}", near_edge);
  }
}
