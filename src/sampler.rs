//! Bridson-style Poisson-disk sampling: random points with a guaranteed
//! minimum pairwise separation. The sequence is not deterministic across
//! seeds, only constraint-satisfying.

use {
  crate::geometry::{Point, Size, V2},
  rand::Rng
};

/// Candidate attempts per active point before it is retired.
pub const MAX_ATTEMPTS: u32 = 30;
const SEED_POINTS: usize = 4;

pub struct PoissonSampler {
  bounds: Size,
  min_dist: f32,
  cell_size: f32,
  cols: usize,
  rows: usize,
  /// Background grid; at most one accepted point per cell.
  grid: Vec<Option<Point>>,
  active: Vec<Point>,
  points: Vec<Point>
}

impl PoissonSampler {
  pub fn new(bounds: Size, min_dist: f32) -> Self {
    let min_dist = min_dist.max(f32::EPSILON);
    let cell_size = min_dist / 2f32.sqrt();
    let cols = (bounds.width / cell_size).ceil().max(1.0) as usize;
    let rows = (bounds.height / cell_size).ceil().max(1.0) as usize;
    PoissonSampler {
      bounds,
      min_dist,
      cell_size,
      cols,
      rows,
      grid: vec![None; cols * rows],
      active: vec![],
      points: vec![]
    }
  }

  pub fn points(&self) -> &[Point] {
    &self.points
  }

  /// Seed the active list from several random points and emit up to `limit`
  /// samples.
  pub fn generate(&mut self, rng: &mut impl Rng, limit: usize) -> Vec<Point> {
    for _ in 0..SEED_POINTS {
      let p = Point::new(
        rng.gen_range(0.0..self.bounds.width),
        rng.gen_range(0.0..self.bounds.height)
      );
      if self.accepts(p) {
        self.commit(p);
      }
    }

    let mut out = self.points.clone();
    while out.len() < limit {
      match self.next(rng) {
        Some(p) => out.push(p),
        None => break
      }
    }
    out
  }

  /// Produce the next sample, retiring active points that exhaust their
  /// attempt budget. `None` once the domain is saturated.
  pub fn next(&mut self, rng: &mut impl Rng) -> Option<Point> {
    while !self.active.is_empty() {
      let slot = rng.gen_range(0..self.active.len());
      let around = self.active[slot];

      let accepted = (0..MAX_ATTEMPTS).find_map(|_| {
        // annulus [d, 2d] around the active point
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let dist = rng.gen_range(self.min_dist..self.min_dist * 2.0);
        let p = around + V2::new(angle.cos(), angle.sin()) * dist;
        self.accepts(p).then(|| p)
      });

      match accepted {
        Some(p) => {
          self.commit(p);
          return Some(p);
        }
        None => { self.active.swap_remove(slot); }
      }
    }
    None
  }

  fn cell_of(&self, p: Point) -> (usize, usize) {
    (
      ((p.x / self.cell_size) as usize).min(self.cols - 1),
      ((p.y / self.cell_size) as usize).min(self.rows - 1)
    )
  }

  /// In bounds, and at least `min_dist` from every point in nearby cells.
  fn accepts(&self, p: Point) -> bool {
    if p.x < 0.0 || p.y < 0.0 || p.x >= self.bounds.width || p.y >= self.bounds.height {
      return false;
    }
    let (cx, cy) = self.cell_of(p);
    let x0 = cx.saturating_sub(2);
    let y0 = cy.saturating_sub(2);
    let x1 = (cx + 2).min(self.cols - 1);
    let y1 = (cy + 2).min(self.rows - 1);
    for y in y0..=y1 {
      for x in x0..=x1 {
        if let Some(q) = self.grid[y * self.cols + x] {
          if (q - p).length() < self.min_dist {
            return false;
          }
        }
      }
    }
    true
  }

  fn commit(&mut self, p: Point) {
    let (cx, cy) = self.cell_of(p);
    self.grid[cy * self.cols + cx] = Some(p);
    self.active.push(p);
    self.points.push(p);
  }
}
