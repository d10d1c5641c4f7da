//! Frame-stepped simulation driver.
//!
//! Owns the circle list and every subsystem, advances them in a fixed order
//! each frame, and runs initial placement on a background thread so a new
//! raster never stalls the caller. The clock is plain `f64` seconds fed in
//! by the caller, which keeps every schedule (polling, spawning, growth)
//! reproducible under test.

use {
  crate::{
    change_map::ColorChangeMap,
    config::PackingConfig,
    geometry::{Circle, Lifecycle, Rgb, Size},
    growth::{GrowthController, SampleResponse},
    index::HashGrid,
    physics::{self, RelaxParams},
    placement::{PlacementEngine, Progress},
    spawner::DynamicSpawner
  },
  anyhow::{ensure, Result},
  image::RgbaImage,
  rand::prelude::*,
  rand_pcg::Pcg64,
  std::sync::mpsc::{self, Receiver, TryRecvError},
  std::thread
};

/// At most this many circles are handed to the renderer per frame.
pub const RENDER_CAP: usize = 300;

/// Messages streamed from the placement worker.
pub enum GenerationUpdate {
  Progress(Progress),
  Done(Vec<Circle>),
  Failed(String)
}

/// Flat record for the renderer; no simulation state leaks through.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CircleRecord {
  pub x: f32,
  pub y: f32,
  pub radius: f32,
  pub color: Rgb
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct SimStats {
  pub frames: u64,
  pub spawned: usize,
  pub purged: usize
}

/// A running background placement job. The raster is retained so a dead
/// worker can be recovered synchronously.
struct Job {
  rx: Receiver<GenerationUpdate>,
  raster: RgbaImage
}

pub struct Orchestrator {
  config: PackingConfig,
  bounds: Size,
  circles: Vec<Circle>,
  grid: HashGrid,
  change_map: ColorChangeMap,
  growth: GrowthController,
  spawner: DynamicSpawner,
  rng: Pcg64,
  clock: f64,
  stats: SimStats,
  job: Option<Job>,
  /// Raster queued while a job is already running; at most one is kept.
  deferred: Option<RgbaImage>,
  last_progress: Option<Progress>
}

impl Orchestrator {
  pub fn new(config: PackingConfig, bounds: Size, seed: u64) -> Result<Self> {
    ensure!(
      bounds.width.is_finite() && bounds.height.is_finite()
        && bounds.width >= 1.0 && bounds.height >= 1.0,
      "canvas bounds must be at least 1x1, got {}x{}", bounds.width, bounds.height
    );
    let config = config.sanitized();
    Ok(Orchestrator {
      grid: HashGrid::sized_for(bounds, (config.min_circle_size + config.max_circle_size) / 2.0),
      spawner: DynamicSpawner::new(config.spawn_interval),
      change_map: ColorChangeMap::new(),
      growth: GrowthController::new(),
      rng: Pcg64::seed_from_u64(seed),
      circles: vec![],
      clock: 0.0,
      stats: SimStats::default(),
      job: None,
      deferred: None,
      last_progress: None,
      config,
      bounds
    })
  }

  pub fn circles(&self) -> &[Circle] { self.circles.as_slice() }
  pub fn stats(&self) -> SimStats { self.stats }
  pub fn clock(&self) -> f64 { self.clock }
  pub fn is_generating(&self) -> bool { self.job.is_some() }

  /// Progress of the running placement job, if one is active.
  pub fn progress(&self) -> Option<&Progress> {
    self.job.is_some().then_some(self.last_progress.as_ref()).flatten()
  }

  /// Start building a fresh circle set for `raster` on a background thread.
  /// A second request while one is running is deferred; only the latest
  /// deferred raster survives.
  pub fn request_generation(&mut self, raster: &RgbaImage) {
    if self.job.is_some() {
      self.deferred = Some(raster.clone());
      return;
    }

    let engine = PlacementEngine::new(self.config.clone(), self.bounds);
    let worker_raster = raster.clone();
    let mut rng = Pcg64::seed_from_u64(self.rng.gen());
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
      .name("placement".into())
      .spawn(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
          engine.generate(&worker_raster, &mut rng, &mut |p| {
            let _ = tx.send(GenerationUpdate::Progress(p));
          })
        }));
        let _ = match result {
          Ok(circles) => tx.send(GenerationUpdate::Done(circles)),
          Err(payload) => tx.send(GenerationUpdate::Failed(panic_message(payload)))
        };
      });

    match spawned {
      Ok(_) => {
        self.last_progress = None;
        self.job = Some(Job { rx, raster: raster.clone() });
      }
      Err(e) => {
        log::warn!("failed to spawn placement thread ({e}), generating synchronously");
        self.generate_sync(raster.clone());
      }
    }
  }

  /// Advance the simulation by `dt` seconds of sim time.
  pub fn step(&mut self, raster: &RgbaImage, dt: f64) {
    self.clock += dt;
    self.stats.frames += 1;
    self.poll_job();

    if self.config.enable_color_change_map {
      self.change_map.update(raster, self.clock);
    }
    self.grid.rebuild(&self.circles);

    if self.config.use_verlet_physics {
      physics::relax(&mut self.circles, self.bounds, RelaxParams {
        gravity: self.config.gravity,
        damping: self.config.damping,
        substeps: self.config.substeps,
        iterations: self.config.physics_iterations,
        spacing_factor: self.config.circle_spacing
      }, &mut self.rng);
    } else {
      physics::relax_forces(
        &mut self.circles, self.bounds,
        self.config.physics_iterations, self.config.circle_spacing
      );
    }

    let outcome = self.growth.update(
      &mut self.circles, &self.grid, raster, &self.change_map,
      &self.config, self.bounds, self.clock, &mut self.rng
    );
    self.stats.purged += outcome.purged;
    if outcome.rebuild_index {
      self.grid.rebuild(&self.circles);
    }

    if self.config.enable_dynamic_spawning {
      self.stats.spawned += self.spawner.maybe_spawn(
        &mut self.circles, &self.grid, raster, &self.config, self.clock, &mut self.rng
      );
    }

    // answer this frame's color checks from the raster; the responses land
    // next frame, matching the latency of a real readback
    if self.config.enable_color_monitoring {
      for request in self.growth.take_requests() {
        self.growth.submit_response(SampleResponse {
          request,
          color: Rgb::sample(raster, request.center)
        });
      }
    }
  }

  /// Visible circles in insertion order, truncated to [`RENDER_CAP`].
  pub fn render_list(&self) -> Vec<CircleRecord> {
    self.circles.iter()
      .filter(|c| !c.is_dead())
      .take(RENDER_CAP)
      .map(|c| CircleRecord {
        x: c.center.x,
        y: c.center.y,
        radius: c.radius,
        color: c.color
      })
      .collect()
  }

  fn poll_job(&mut self) {
    let Some(job) = self.job.take() else { return };
    loop {
      match job.rx.try_recv() {
        Ok(GenerationUpdate::Progress(p)) => self.last_progress = Some(p),
        Ok(GenerationUpdate::Done(circles)) => {
          self.install(circles);
          break;
        }
        Ok(GenerationUpdate::Failed(message)) => {
          log::warn!("placement worker failed ({message}), generating synchronously");
          self.generate_sync(job.raster);
          break;
        }
        Err(TryRecvError::Empty) => {
          self.job = Some(job);
          return;
        }
        Err(TryRecvError::Disconnected) => {
          log::warn!("placement worker vanished, generating synchronously");
          self.generate_sync(job.raster);
          break;
        }
      }
    }
    if let Some(raster) = self.deferred.take() {
      self.request_generation(&raster);
    }
  }

  /// Adopt a freshly generated circle set and rebuild the index around it.
  fn install(&mut self, mut circles: Vec<Circle>) {
    let avg_radius = match circles.len() {
      0 => (self.config.min_circle_size + self.config.max_circle_size) / 2.0,
      n => circles.iter().map(|c| c.target_radius).sum::<f32>() / n as f32
    };
    // placement emits stagger offsets from zero; rebase them onto the sim
    // clock so a late regeneration still ramps instead of snapping to target
    for c in circles.iter_mut() {
      if let Lifecycle::Growing { start_time, .. } = &mut c.lifecycle {
        *start_time += self.clock;
      }
    }
    self.circles = circles;
    self.grid = HashGrid::sized_for(self.bounds, avg_radius);
    self.grid.rebuild(&self.circles);
    // the fresh layout gets a full interval before spawning resumes
    self.spawner.defer(self.clock);
    self.last_progress = None;
  }

  fn generate_sync(&mut self, raster: RgbaImage) {
    let engine = PlacementEngine::new(self.config.clone(), self.bounds);
    let circles = engine.generate(&raster, &mut self.rng, &mut |_| {});
    self.install(circles);
  }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
  payload.downcast_ref::<&str>()
    .map(|s| s.to_string())
    .or_else(|| payload.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "placement worker panicked".into())
}

#[cfg(test)] mod tests {
  use {
    super::*,
    crate::geometry::Point,
    image::Rgba,
    std::time::Duration
  };

  fn raster(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, _| {
      if x < w / 2 { Rgba([200, 60, 60, 255]) } else { Rgba([60, 60, 200, 255]) }
    })
  }

  fn orchestrator(total: usize) -> Orchestrator {
    Orchestrator::new(PackingConfig {
      total_circles: total,
      ..Default::default()
    }, Size::new(300.0, 200.0), 7).unwrap()
  }

  /// Pump frames until the background job completes.
  fn pump(o: &mut Orchestrator, raster: &RgbaImage) {
    for _ in 0..500 {
      o.step(raster, 1.0 / 60.0);
      if !o.is_generating() { return; }
      thread::sleep(Duration::from_millis(2));
    }
    panic!("generation never completed");
  }

  #[test] fn rejects_degenerate_bounds() {
    assert!(Orchestrator::new(PackingConfig::default(), Size::new(0.0, 100.0), 0).is_err());
    assert!(Orchestrator::new(PackingConfig::default(), Size::new(100.0, f32::NAN), 0).is_err());
  }

  #[test] fn background_generation_installs_circles() {
    let raster = raster(300, 200);
    let mut o = orchestrator(40);

    o.request_generation(&raster);
    assert!(o.is_generating());
    pump(&mut o, &raster);
    assert!(!o.circles().is_empty());
    // spawner was deferred, so the first frames add nothing on their own
    let count = o.circles().len();
    o.step(&raster, 1.0 / 60.0);
    assert!(o.circles().len() >= count.saturating_sub(1));
  }

  #[test] fn second_request_is_deferred_not_dropped() {
    let raster = raster(300, 200);
    let mut o = orchestrator(30);

    o.request_generation(&raster);
    o.request_generation(&raster);
    assert!(o.deferred.is_some());
    pump(&mut o, &raster);
    // the deferred raster was either promoted to a job or consumed by it
    assert!(o.deferred.is_none());
    if o.is_generating() {
      pump(&mut o, &raster);
    }
    assert!(!o.circles().is_empty());
  }

  #[test] fn late_regeneration_still_ramps() {
    let raster = raster(300, 200);
    let mut o = orchestrator(25);
    // age the clock well past the stagger window and ramp duration
    for _ in 0..120 {
      o.step(&raster, 1.0 / 12.0);
    }
    assert!(o.clock() > 9.0);

    o.request_generation(&raster);
    pump(&mut o, &raster);
    o.step(&raster, 1.0 / 60.0);

    let growing = o.circles().iter()
      .filter(|c| matches!(c.lifecycle, Lifecycle::Growing { .. }))
      .count();
    assert!(growing > 0, "every ramp finished within one frame");
    for c in o.circles() {
      if let Lifecycle::Growing { target_radius, .. } = c.lifecycle {
        assert!(
          c.radius < target_radius * 0.9,
          "radius {} snapped to target {}", c.radius, target_radius
        );
      }
    }
  }

  #[test] fn render_list_is_capped() {
    let raster = raster(300, 200);
    let mut o = orchestrator(10);
    o.circles = (0..400)
      .map(|i| Circle::new(Point::new((i % 20) as f32 * 15.0, (i / 20) as f32 * 10.0), 3.0, Rgb::BLACK))
      .collect();
    o.circles[0].set_radius(0.0);

    o.step(&raster, 1.0 / 60.0);
    let records = o.render_list();
    assert_eq!(records.len(), RENDER_CAP);
    assert!(records.iter().all(|r| r.radius > 0.0));
  }

  #[test] fn spawning_fills_an_empty_canvas() {
    let raster = raster(300, 200);
    let mut o = Orchestrator::new(PackingConfig {
      total_circles: 10,
      spawn_interval: 100.0,
      ..Default::default()
    }, Size::new(300.0, 200.0), 3).unwrap();

    for _ in 0..120 {
      o.step(&raster, 1.0 / 30.0);
    }
    assert!(o.stats().spawned > 0);
    assert!(!o.circles().is_empty());
  }
}
