//! Run the splat radius estimator on a synthetic depth buffer
//!
//! ```text
//! cargo run -p splatcrate-demos --bin splat_radius_demo -- --width 640 --height 480 --iterations 4 --debug radius.png
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use splatcrate::debug::{save_png, DebugView};
use splatcrate::gpu::{GpuContext, GpuScreenSpaceSplatting};
use splatcrate::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "splat_radius_demo")]
#[command(about = "Estimate splat radii for a synthetic sphere in front of a wall")]
struct Cli {
    #[arg(long, default_value = "640")]
    width: u32,

    #[arg(long, default_value = "480")]
    height: u32,

    /// JSON file with a `SplattingConfig`; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target neighbor count
    #[arg(short, long)]
    k_neighbors: Option<u32>,

    /// Bisection rounds
    #[arg(short, long)]
    iterations: Option<u32>,

    /// Write a debug view to this PNG
    #[arg(long)]
    debug: Option<PathBuf>,

    /// Debug view to render, e.g. "composite" or "neighbor_counts"
    #[arg(long, default_value = "composite", value_parser = parse_debug_view)]
    view: DebugView,

    /// Run the compute shader pipeline instead of the CPU one
    #[arg(long, default_value = "false")]
    gpu: bool,
}

fn parse_debug_view(name: &str) -> std::result::Result<DebugView, String> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).map_err(|e| e.to_string())
}

fn load_config(cli: &Cli) -> Result<SplattingConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SplattingConfig::default(),
    };
    if let Some(k_neighbors) = cli.k_neighbors {
        config.k_neighbors = k_neighbors;
    }
    if let Some(iterations) = cli.iterations {
        config.num_iterations = iterations;
    }
    config.validate()?;
    Ok(config)
}

fn perspective(width: u32, height: u32) -> Matrix4<f32> {
    nalgebra::Perspective3::new(width as f32 / height as f32, std::f32::consts::FRAC_PI_3, 0.1, 100.0).to_homogeneous()
}

/// Unit sphere at z = -4 in front of a wall at z = -8, everything else empty
fn synthetic_scene(width: u32, height: u32, camera: &CameraMatrices) -> (DepthBuffer, ColorBuffer) {
    let center = Vector3::new(0.0, 0.0, -4.0);
    let inv = camera.inv_projection_view;

    let mut depth = DepthBuffer::filled(width, height, 1.0);
    let mut color = ColorBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let [nx, ny] = pixel_to_ndc(x, y, width, height);
            let near = inv.transform_point(&Point3::new(nx, ny, -1.0));
            let far = inv.transform_point(&Point3::new(nx, ny, 1.0));
            let direction = (far - near).normalize();

            let offset = near.coords - center;
            let b = offset.dot(&direction);
            let c = offset.norm_squared() - 1.0;
            let discriminant = b * b - c;

            let hit = if discriminant >= 0.0 {
                Some((near + direction * (-b - discriminant.sqrt()), [0.8, 0.3, 0.2, 1.0]))
            } else if direction.z < 0.0 && (x / 8 + y / 8) % 2 == 0 {
                let t = (-8.0 - near.z) / direction.z;
                Some((near + direction * t, [0.6, 0.6, 0.6, 1.0]))
            } else {
                None
            };

            if let Some((point, rgba)) = hit {
                if let Some(screen) = camera.project(&point, width, height) {
                    depth.set(x, y, screen.depth);
                    color.set(x, y, rgba);
                }
            }
        }
    }
    (depth, color)
}

fn summarize(records: &[PointRecord]) {
    if records.is_empty() {
        println!("no points extracted");
        return;
    }
    let radii: Vec<f32> = records.iter().map(|r| r.radius()).collect();
    let min = radii.iter().copied().fold(f32::INFINITY, f32::min);
    let max = radii.iter().copied().fold(0.0, f32::max);
    let mean = radii.iter().sum::<f32>() / radii.len() as f32;
    let counts = records.iter().map(|r| r.neighbor_count).sum::<f32>() / records.len() as f32;

    println!("points:          {}", records.len());
    println!("radius min/max:  {:.5} / {:.5}", min, max);
    println!("radius mean:     {:.5}", mean);
    println!("mean neighbors:  {:.2}", counts);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let (width, height) = (cli.width, cli.height);

    let view = Matrix4::identity();
    let projection = perspective(width, height);
    let camera = CameraMatrices::new(view, projection).context("camera matrices are not invertible")?;
    let (depth, color) = synthetic_scene(width, height, &camera);
    let input = FrameInput::new(&depth).with_color(&color).with_camera(view, projection);

    let mut debug_image = cli.debug.as_ref().map(|_| DebugImage::new(width, height));

    let records = if cli.gpu {
        let context = Arc::new(pollster::block_on(GpuContext::new())?);
        let mut splatting = pollster::block_on(GpuScreenSpaceSplatting::new(context, config, width, height))?;
        splatting.set_debug_view(cli.view);
        let status = splatting.draw(&input, debug_image.as_mut())?;
        log::info!("gpu draw finished: {:?}", status);

        let readback = pollster::block_on(splatting.read_targets())?;
        if readback.dropped > 0 {
            log::warn!("{} points did not fit the point buffer", readback.dropped);
        }
        readback.point_records()
    } else {
        let mut splatting = ScreenSpaceSplatting::new(config, width, height)?;
        splatting.set_debug_view(cli.view);
        let status = splatting.draw(&input, debug_image.as_mut())?;
        log::info!("cpu draw finished: {:?}", status);
        splatting.point_records()
    };

    summarize(&records);

    if let (Some(path), Some(image)) = (&cli.debug, &debug_image) {
        save_png(image, path)?;
        println!("wrote {} view to {}", serde_json::to_string(&cli.view)?, path.display());
    }

    Ok(())
}
