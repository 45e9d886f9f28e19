//! The CPU splat radius estimator

use crate::extraction::{reconstruct_positions, PointExtractor};
use crate::initial_radius::{accumulate_density, seed_bounds};
use crate::raster::PassContext;
use crate::refinement::refine;
use splatcrate_core::debug::{compose, DebugView};
use splatcrate_core::{
    check_screen_size, BoundsSlot, DebugImage, DrawStatus, Error, ExtractedPoint, FrameInput, FrameStats,
    PointRecord, RadiusBounds, RenderTarget, RenderTargetSet, Result, ScreenEffect, SplattingConfig,
};
use std::time::Instant;

/// Estimates a splat radius for every valid depth sample of a frame
///
/// Owns the render targets and the compaction buffer for one screen size.
/// Each `draw` reconstructs positions, compacts valid pixels into points,
/// seeds a radius bracket from local density and bisects it
/// `num_iterations` times.
///
/// ```no_run
/// use splatcrate_core::{DepthBuffer, FrameInput, Matrix4, ScreenEffect, SplattingConfig};
/// use splatcrate_splatting::ScreenSpaceSplatting;
///
/// let mut splatting = ScreenSpaceSplatting::new(SplattingConfig::default(), 640, 480)?;
/// let depth = DepthBuffer::filled(640, 480, 1.0);
/// let input = FrameInput::new(&depth).with_camera(Matrix4::identity(), Matrix4::identity());
/// splatting.draw(&input, None)?;
/// for record in splatting.point_records() {
///     println!("{:?} -> {}", record.pixel, record.radius());
/// }
/// # Ok::<(), splatcrate_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ScreenSpaceSplatting {
    config: SplattingConfig,
    width: u32,
    height: u32,
    targets: RenderTargetSet,
    extractor: PointExtractor,
    debug_view: DebugView,
    final_slot: BoundsSlot,
}

impl ScreenSpaceSplatting {
    /// Validate `config` and allocate targets for a `width x height` screen
    pub fn new(config: SplattingConfig, width: u32, height: u32) -> Result<Self> {
        config.validate()?;
        check_screen_size(width, height)?;

        let (grid_width, grid_height) = config.grid_dimensions(width, height);
        let extractor = PointExtractor::new(config.extraction_block_size, config.point_capacity(width, height));

        Ok(Self {
            targets: RenderTargetSet::new(width, height, grid_width, grid_height),
            extractor,
            config,
            width,
            height,
            debug_view: DebugView::default(),
            final_slot: BoundsSlot::Ping,
        })
    }

    pub fn config(&self) -> &SplattingConfig {
        &self.config
    }

    pub fn k_neighbors(&self) -> u32 {
        self.config.k_neighbors
    }

    /// Change the neighbor target used by the next `draw`
    pub fn set_k_neighbors(&mut self, k_neighbors: u32) -> Result<()> {
        if k_neighbors == 0 {
            return Err(Error::InvalidConfig("k_neighbors must be at least 1".to_string()));
        }
        self.config.k_neighbors = k_neighbors;
        Ok(())
    }

    pub fn debug_view(&self) -> DebugView {
        self.debug_view
    }

    /// Select what `draw` composites into its output image
    pub fn set_debug_view(&mut self, view: DebugView) {
        self.debug_view = view;
    }

    /// Size of the compaction buffer
    pub fn point_capacity(&self) -> usize {
        self.extractor.capacity()
    }

    pub fn targets(&self) -> &RenderTargetSet {
        &self.targets
    }

    /// Points extracted by the last completed `draw`
    pub fn points(&self) -> &[ExtractedPoint] {
        self.extractor.points()
    }

    /// Slot holding the brackets written by the last completed `draw`
    pub fn final_slot(&self) -> BoundsSlot {
        self.final_slot
    }

    pub fn final_bounds(&self) -> &RenderTarget<RadiusBounds> {
        self.targets.bounds(self.final_slot)
    }

    pub fn feedback_radius(&self) -> &RenderTarget<f32> {
        &self.targets.feedback_radius
    }

    pub fn neighbor_counts(&self) -> &RenderTarget<f32> {
        &self.targets.neighbor_counts
    }

    pub fn density_grid(&self) -> &RenderTarget<f32> {
        &self.targets.density_grid
    }

    /// Final state of every extracted point
    pub fn point_records(&self) -> Vec<PointRecord> {
        self.targets.point_records(self.points(), self.final_slot)
    }
}

impl ScreenEffect for ScreenSpaceSplatting {
    fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        check_screen_size(width, height)?;
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }

        let (grid_width, grid_height) = self.config.grid_dimensions(width, height);
        self.targets = RenderTargetSet::new(width, height, grid_width, grid_height);
        self.extractor = PointExtractor::new(
            self.config.extraction_block_size,
            self.config.point_capacity(width, height),
        );
        self.width = width;
        self.height = height;
        self.final_slot = BoundsSlot::Ping;

        log::debug!(
            "resized splatting targets to {}x{} ({} point capacity)",
            width,
            height,
            self.extractor.capacity()
        );
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw(&mut self, input: &FrameInput<'_>, output: Option<&mut DebugImage>) -> Result<DrawStatus> {
        input.check_size((self.width, self.height), output.as_deref())?;

        let camera = match input.camera() {
            Ok(camera) => camera,
            Err(reason) => {
                log::error!("skipping splat radius estimation: {}", reason);
                return Ok(DrawStatus::Skipped(reason));
            }
        };

        let start = Instant::now();
        let ctx = PassContext::new(&self.config, self.width, self.height);
        self.targets.clear();

        reconstruct_positions(input.depth, &camera, &mut self.targets.position);
        let extraction = self.extractor.extract(&self.targets.position, &camera);
        if extraction.dropped > 0 {
            log::debug!(
                "point buffer full: kept {} points, dropped {}",
                extraction.extracted,
                extraction.dropped
            );
        }

        let points = self.extractor.points();
        accumulate_density(points, ctx.grid_size, &mut self.targets.density_grid);
        seed_bounds(
            points,
            &self.targets.density_grid,
            &ctx,
            &mut self.targets.bounds[BoundsSlot::Ping.index()],
        );

        let rounds = self.config.num_iterations;
        self.final_slot = refine(points, &mut self.targets, &ctx, rounds);

        if let Some(output) = output {
            compose(&self.targets, &self.config, self.debug_view, input.color, output)?;
        }

        log::debug!(
            "estimated radii for {} points in {} rounds ({:.2?})",
            extraction.extracted,
            rounds,
            start.elapsed()
        );

        Ok(DrawStatus::Completed(FrameStats {
            extracted_points: Some(extraction.extracted),
            dropped_points: Some(extraction.dropped),
            iterations: rounds,
        }))
    }

    fn num_iterations(&self) -> u32 {
        self.config.num_iterations
    }

    fn set_num_iterations(&mut self, num_iterations: u32) {
        self.config.num_iterations = num_iterations;
    }
}
