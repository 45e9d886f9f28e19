//! wgpu compute realisation of the splat radius estimator
//!
//! Every pass is a compute entry point over storage buffers laid out like
//! the CPU render targets. Max and sum blending map to `atomicMax` and
//! `atomicAdd`; ping-pong is two bind groups over the same pair of bounds
//! buffers with front and back swapped.

use crate::device::GpuContext;
use bytemuck::{Pod, Zeroable};
use nalgebra::Point3;
use splatcrate_core::debug::{compose, DebugView};
use splatcrate_core::{
    check_screen_size, BoundsSlot, CameraMatrices, DebugImage, DrawStatus, Error, ExtractedPoint, FrameInput,
    FrameStats, PointRecord, RadiusBounds, RenderTarget, RenderTargetSet, Result, ScreenEffect, SplattingConfig,
};
use std::sync::Arc;
use std::time::Instant;

const SHADER_SOURCES: [&str; 4] = [
    include_str!("shaders/common.wgsl"),
    include_str!("shaders/extraction.wgsl"),
    include_str!("shaders/initial_radius.wgsl"),
    include_str!("shaders/refinement.wgsl"),
];

const PIXEL_WORKGROUP: u32 = 8;
const LINEAR_WORKGROUP: u32 = 64;

/// Uniform block read by every pass; mirrors `Params` in common.wgsl
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuParams {
    pub projection_view: [[f32; 4]; 4],
    pub inv_projection_view: [[f32; 4]; 4],
    pub width: u32,
    pub height: u32,
    pub grid_width: u32,
    pub grid_height: u32,
    pub grid_size: u32,
    pub k_neighbors: u32,
    pub capacity: u32,
    pub block_size: u32,
    pub blocks_x: u32,
    pub blocks_y: u32,
    pub max_splat_pixels: f32,
    pub projection_yy: f32,
    pub fallback_radius: f32,
    pub target_policy: u32,
    pub _padding: [u32; 2],
}

impl GpuParams {
    fn new(config: &SplattingConfig, camera: &CameraMatrices, screen: &ScreenLayout) -> Self {
        Self {
            projection_view: camera.projection_view.into(),
            inv_projection_view: camera.inv_projection_view.into(),
            width: screen.width,
            height: screen.height,
            grid_width: screen.grid_width,
            grid_height: screen.grid_height,
            grid_size: config.initial_estimation_grid_size,
            k_neighbors: config.k_neighbors,
            capacity: screen.capacity,
            block_size: config.extraction_block_size,
            blocks_x: screen.blocks_x,
            blocks_y: screen.blocks_y,
            max_splat_pixels: config.max_splat_pixels as f32,
            projection_yy: camera.projection[(1, 1)],
            fallback_radius: config.fallback_radius,
            target_policy: config.target_policy.code(),
            _padding: [0; 2],
        }
    }
}

/// Buffer dimensions derived from the screen size and configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScreenLayout {
    width: u32,
    height: u32,
    grid_width: u32,
    grid_height: u32,
    blocks_x: u32,
    blocks_y: u32,
    capacity: u32,
}

impl ScreenLayout {
    fn new(config: &SplattingConfig, width: u32, height: u32) -> Self {
        let (grid_width, grid_height) = config.grid_dimensions(width, height);
        let block = config.extraction_block_size.max(1);
        let capacity = config.point_capacity(width, height).min(u32::MAX as usize) as u32;
        Self {
            width,
            height,
            grid_width,
            grid_height,
            blocks_x: width.div_ceil(block),
            blocks_y: height.div_ceil(block),
            capacity,
        }
    }

    fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    fn block_count(&self) -> u32 {
        self.blocks_x * self.blocks_y
    }
}

/// Storage behind the render targets
struct TargetBuffers {
    params: wgpu::Buffer,
    depth: wgpu::Buffer,
    positions: wgpu::Buffer,
    points: wgpu::Buffer,
    density: wgpu::Buffer,
    bounds: [wgpu::Buffer; 2],
    /// Feedback radius bits followed by neighbor counts
    accum: wgpu::Buffer,
    block_offsets: wgpu::Buffer,
}

impl TargetBuffers {
    fn new(context: &GpuContext, screen: &ScreenLayout) -> Result<Self> {
        let pixels = screen.pixel_count();
        let sizes = [
            ("positions", pixels * 16),
            ("points", 8 + 4 * screen.capacity as u64),
            ("density", 4 * screen.grid_width as u64 * screen.grid_height as u64),
            ("bounds", pixels * 8),
            ("accum", pixels * 8),
            ("block offsets", 4 * screen.block_count() as u64),
        ];
        let limit = context.device.limits().max_storage_buffer_binding_size as u64;
        if let Some((name, size)) = sizes.iter().find(|(_, size)| *size > limit) {
            return Err(Error::Gpu(format!(
                "{} buffer needs {} bytes, device allows {}",
                name, size, limit
            )));
        }

        let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
        let [positions, points, density, bounds, accum, block_offsets] = sizes.map(|(_, size)| size);

        Ok(Self {
            params: context.create_buffer_init(
                "Splatting Params Buffer",
                &[GpuParams::zeroed()],
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            ),
            depth: context.create_buffer(
                "Splatting Depth Buffer",
                pixels * 4,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            ),
            positions: context.create_buffer("Splatting Position Buffer", positions, storage),
            points: context.create_buffer("Splatting Point Buffer", points, storage),
            density: context.create_buffer("Splatting Density Buffer", density, storage),
            bounds: [
                context.create_buffer("Splatting Bounds Ping Buffer", bounds, storage),
                context.create_buffer("Splatting Bounds Pong Buffer", bounds, storage),
            ],
            accum: context.create_buffer("Splatting Accumulation Buffer", accum, storage),
            block_offsets: context.create_buffer("Splatting Block Offset Buffer", block_offsets, storage),
        })
    }

    /// Buffers reset to the cleared sentinel at the start of every frame
    fn per_frame(&self) -> [&wgpu::Buffer; 7] {
        [
            &self.positions,
            &self.points,
            &self.density,
            &self.bounds[0],
            &self.bounds[1],
            &self.accum,
            &self.block_offsets,
        ]
    }
}

struct Pipelines {
    reconstruct_positions: wgpu::ComputePipeline,
    count_blocks: wgpu::ComputePipeline,
    scan_blocks: wgpu::ComputePipeline,
    compact_points: wgpu::ComputePipeline,
    accumulate_density: wgpu::ComputePipeline,
    seed_bounds: wgpu::ComputePipeline,
    distribute: wgpu::ComputePipeline,
    gather: wgpu::ComputePipeline,
    update_bounds: wgpu::ComputePipeline,
}

impl Pipelines {
    fn new(context: &GpuContext, layout: &wgpu::PipelineLayout, shader: &wgpu::ShaderModule) -> Self {
        let create = |entry_point: &str| {
            context.create_compute_pipeline(&format!("Splatting {} Pipeline", entry_point), layout, shader, entry_point)
        };

        Self {
            reconstruct_positions: create("reconstruct_positions"),
            count_blocks: create("count_blocks"),
            scan_blocks: create("scan_blocks"),
            compact_points: create("compact_points"),
            accumulate_density: create("accumulate_density"),
            seed_bounds: create("seed_bounds"),
            distribute: create("distribute"),
            gather: create("gather"),
            update_bounds: create("update_bounds"),
        }
    }
}

fn layout_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bind_group_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![
        layout_entry(0, wgpu::BufferBindingType::Uniform),
        layout_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
    ];
    entries.extend((2..=8).map(|binding| layout_entry(binding, wgpu::BufferBindingType::Storage { read_only: false })));
    entries
}

/// One bind group per front slot
fn create_bind_groups(
    context: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    buffers: &TargetBuffers,
) -> [wgpu::BindGroup; 2] {
    [BoundsSlot::Ping, BoundsSlot::Pong].map(|front| {
        let resources = [
            &buffers.params,
            &buffers.depth,
            &buffers.positions,
            &buffers.points,
            &buffers.density,
            &buffers.bounds[front.index()],
            &buffers.bounds[front.other().index()],
            &buffers.accum,
            &buffers.block_offsets,
        ];
        let entries: Vec<wgpu::BindGroupEntry> = resources
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let label = match front {
            BoundsSlot::Ping => "Splatting Ping Bind Group",
            BoundsSlot::Pong => "Splatting Pong Bind Group",
        };
        context.create_bind_group(label, layout, &entries)
    })
}

fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    label: &str,
    workgroups: (u32, u32),
) {
    let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    compute_pass.set_pipeline(pipeline);
    compute_pass.set_bind_group(0, bind_group, &[]);
    compute_pass.dispatch_workgroups(workgroups.0.max(1), workgroups.1.max(1), 1);
}

/// Render targets and points copied back from the device
#[derive(Debug, Clone)]
pub struct GpuReadback {
    pub targets: RenderTargetSet,
    pub points: Vec<ExtractedPoint>,
    /// Valid pixels that did not fit the point buffer
    pub dropped: usize,
    pub final_slot: BoundsSlot,
}

impl GpuReadback {
    pub fn final_bounds(&self) -> &RenderTarget<RadiusBounds> {
        self.targets.bounds(self.final_slot)
    }

    pub fn point_records(&self) -> Vec<PointRecord> {
        self.targets.point_records(&self.points, self.final_slot)
    }
}

/// GPU splat radius estimator
///
/// `draw` records and submits every pass without waiting for the device;
/// `read_targets` copies the results back.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use splatcrate_core::{DepthBuffer, FrameInput, Matrix4, ScreenEffect, SplattingConfig};
/// use splatcrate_gpu::{GpuContext, GpuScreenSpaceSplatting};
///
/// async fn example() -> splatcrate_core::Result<()> {
///     let context = Arc::new(GpuContext::new().await?);
///     let mut splatting = GpuScreenSpaceSplatting::new(context, SplattingConfig::default(), 640, 480).await?;
///
///     let depth = DepthBuffer::filled(640, 480, 1.0);
///     let input = FrameInput::new(&depth).with_camera(Matrix4::identity(), Matrix4::identity());
///     splatting.draw(&input, None)?;
///
///     let readback = splatting.read_targets().await?;
///     println!("{} points", readback.points.len());
///     Ok(())
/// }
/// ```
pub struct GpuScreenSpaceSplatting {
    context: Arc<GpuContext>,
    config: SplattingConfig,
    screen: ScreenLayout,
    debug_view: DebugView,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Pipelines,
    buffers: TargetBuffers,
    bind_groups: [wgpu::BindGroup; 2],
    last_camera: Option<CameraMatrices>,
    final_slot: BoundsSlot,
}

impl GpuScreenSpaceSplatting {
    /// Compile the passes and allocate buffers for a `width x height` screen
    pub async fn new(context: Arc<GpuContext>, config: SplattingConfig, width: u32, height: u32) -> Result<Self> {
        config.validate()?;
        check_screen_size(width, height)?;

        let bind_group_layout =
            context.create_bind_group_layout("Splatting Bind Group Layout", &bind_group_layout_entries());
        let pipeline_layout = context.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Splatting Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        context.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = context.create_shader_module("Splatting Shaders", &SHADER_SOURCES.join("\n"));
        let pipelines = Pipelines::new(&context, &pipeline_layout, &shader);
        if let Some(error) = context.device.pop_error_scope().await {
            return Err(Error::Gpu(format!("failed to build splatting pipelines: {}", error)));
        }

        let screen = ScreenLayout::new(&config, width, height);
        let buffers = TargetBuffers::new(&context, &screen)?;
        let bind_groups = create_bind_groups(&context, &bind_group_layout, &buffers);

        Ok(Self {
            context,
            config,
            screen,
            debug_view: DebugView::default(),
            bind_group_layout,
            pipelines,
            buffers,
            bind_groups,
            last_camera: None,
            final_slot: BoundsSlot::Ping,
        })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.context
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

    pub fn set_debug_view(&mut self, view: DebugView) {
        self.debug_view = view;
    }

    pub fn point_capacity(&self) -> usize {
        self.screen.capacity as usize
    }

    /// Slot holding the brackets written by the last submitted `draw`
    pub fn final_slot(&self) -> BoundsSlot {
        self.final_slot
    }

    /// Wait for the device and copy every target back
    pub async fn read_targets(&self) -> Result<GpuReadback> {
        let context = &self.context;
        let ScreenLayout {
            width,
            height,
            grid_width,
            grid_height,
            ..
        } = self.screen;
        let pixels = self.screen.pixel_count() as usize;

        let positions: Vec<[f32; 4]> = context.read_buffer(&self.buffers.positions).await?;
        let point_words: Vec<u32> = context.read_buffer(&self.buffers.points).await?;
        let density: Vec<u32> = context.read_buffer(&self.buffers.density).await?;
        let ping: Vec<RadiusBounds> = context.read_buffer(&self.buffers.bounds[0]).await?;
        let pong: Vec<RadiusBounds> = context.read_buffer(&self.buffers.bounds[1]).await?;
        let accum: Vec<u32> = context.read_buffer(&self.buffers.accum).await?;

        let (feedback_bits, count_words) = accum.split_at(pixels.min(accum.len()));
        let targets = RenderTargetSet {
            position: RenderTarget::from_data(width, height, positions)?,
            bounds: [
                RenderTarget::from_data(width, height, ping)?,
                RenderTarget::from_data(width, height, pong)?,
            ],
            neighbor_counts: RenderTarget::from_data(width, height, count_words.iter().map(|c| *c as f32).collect())?,
            feedback_radius: RenderTarget::from_data(
                width,
                height,
                feedback_bits.iter().map(|bits| f32::from_bits(*bits)).collect(),
            )?,
            density_grid: RenderTarget::from_data(
                grid_width,
                grid_height,
                density.iter().map(|c| *c as f32).collect(),
            )?,
        };

        let (header, indices) = point_words.split_at(2.min(point_words.len()));
        let count = header.first().copied().unwrap_or(0) as usize;
        let total = header.get(1).copied().unwrap_or(0) as usize;

        let points: Vec<ExtractedPoint> = indices
            .iter()
            .take(count)
            .filter(|index| (**index as usize) < pixels)
            .map(|index| {
                let index = *index as usize;
                let [x, y, z, _] = targets.position[index];
                let position = Point3::new(x, y, z);
                ExtractedPoint {
                    pixel: targets.position.coords_of(index),
                    position,
                    pixels_per_unit: self
                        .last_camera
                        .and_then(|camera| camera.pixels_per_unit(&position, height))
                        .unwrap_or(0.0),
                }
            })
            .collect();

        Ok(GpuReadback {
            dropped: total.saturating_sub(points.len()),
            targets,
            points,
            final_slot: self.final_slot,
        })
    }

    fn encode_frame(&self, encoder: &mut wgpu::CommandEncoder, rounds: u32) {
        let screen = self.screen;
        let pipelines = &self.pipelines;
        let pixel_groups = (
            screen.width.div_ceil(PIXEL_WORKGROUP),
            screen.height.div_ceil(PIXEL_WORKGROUP),
        );
        let block_groups = (screen.block_count().div_ceil(LINEAR_WORKGROUP), 1);
        let point_groups = (screen.capacity.div_ceil(LINEAR_WORKGROUP), 1);

        for buffer in self.buffers.per_frame() {
            encoder.clear_buffer(buffer, 0, None);
        }

        let seed = &self.bind_groups[BoundsSlot::Ping.index()];
        dispatch(encoder, &pipelines.reconstruct_positions, seed, "Reconstruct Positions", pixel_groups);
        dispatch(encoder, &pipelines.count_blocks, seed, "Count Blocks", block_groups);
        dispatch(encoder, &pipelines.scan_blocks, seed, "Scan Blocks", (1, 1));
        dispatch(encoder, &pipelines.compact_points, seed, "Compact Points", block_groups);
        dispatch(encoder, &pipelines.accumulate_density, seed, "Accumulate Density", point_groups);
        dispatch(encoder, &pipelines.seed_bounds, seed, "Seed Bounds", point_groups);

        for round in 0..rounds {
            let front = BoundsSlot::front_for_round(round);
            let bind_group = &self.bind_groups[front.index()];

            encoder.clear_buffer(&self.buffers.accum, 0, None);
            encoder.clear_buffer(&self.buffers.bounds[front.other().index()], 0, None);
            dispatch(encoder, &pipelines.distribute, bind_group, "Distribute", point_groups);
            dispatch(encoder, &pipelines.gather, bind_group, "Gather", point_groups);
            dispatch(encoder, &pipelines.update_bounds, bind_group, "Update Bounds", point_groups);
        }
    }
}

impl ScreenEffect for GpuScreenSpaceSplatting {
    fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        check_screen_size(width, height)?;
        if (width, height) == self.size() {
            return Ok(());
        }

        let screen = ScreenLayout::new(&self.config, width, height);
        let buffers = TargetBuffers::new(&self.context, &screen)?;
        self.bind_groups = create_bind_groups(&self.context, &self.bind_group_layout, &buffers);
        self.buffers = buffers;
        self.screen = screen;
        self.final_slot = BoundsSlot::Ping;
        self.last_camera = None;

        log::debug!(
            "resized GPU splatting buffers to {}x{} ({} point capacity)",
            width,
            height,
            screen.capacity
        );
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn draw(&mut self, input: &FrameInput<'_>, output: Option<&mut DebugImage>) -> Result<DrawStatus> {
        input.check_size(self.size(), output.as_deref())?;

        let camera = match input.camera() {
            Ok(camera) => camera,
            Err(reason) => {
                log::error!("skipping splat radius estimation: {}", reason);
                return Ok(DrawStatus::Skipped(reason));
            }
        };

        let start = Instant::now();
        let rounds = self.config.num_iterations;
        let params = GpuParams::new(&self.config, &camera, &self.screen);
        self.context
            .queue
            .write_buffer(&self.buffers.params, 0, bytemuck::bytes_of(&params));
        self.context
            .queue
            .write_buffer(&self.buffers.depth, 0, bytemuck::cast_slice(input.depth.data()));

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Splatting Frame Encoder"),
            });
        self.encode_frame(&mut encoder, rounds);
        self.context.queue.submit(std::iter::once(encoder.finish()));

        self.last_camera = Some(camera);
        self.final_slot = BoundsSlot::after_rounds(rounds);

        if let Some(output) = output {
            let readback = pollster::block_on(self.read_targets())?;
            compose(&readback.targets, &self.config, self.debug_view, input.color, output)?;
        }

        log::debug!("submitted splatting frame with {} rounds ({:.2?})", rounds, start.elapsed());

        Ok(DrawStatus::Completed(FrameStats {
            extracted_points: None,
            dropped_points: None,
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
