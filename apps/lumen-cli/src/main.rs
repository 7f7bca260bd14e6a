use clap::{Parser, Subcommand};
use glam::Vec3;
use lumen_common::CanvasSize;
use lumen_ecs::{
    ComponentKind, DirectionalLight, Geometry, Material, PerspectiveCamera, Renderable, Transform,
};
use lumen_kernel::{CameraSystem, TransformSystem, World, WorldEvent};
use lumen_render::{GpuCall, HeadlessDevice, Journal, RenderSettings, RenderSystem};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen-cli", about = "CLI tool for the lumen scene runtime")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Run a headless frame loop and report GPU traffic per frame
    Demo {
        /// Number of frames to run
        #[arg(short, long, default_value = "5")]
        frames: u32,
        /// Number of cubes in the scene
        #[arg(short, long, default_value = "3")]
        cubes: usize,
        /// Number of directional lights
        #[arg(short, long, default_value = "1")]
        lights: usize,
        #[arg(long, default_value = "1280")]
        width: u32,
        #[arg(long, default_value = "720")]
        height: u32,
        /// Print one JSON object per frame
        #[arg(long)]
        json: bool,
    },
}

/// GPU traffic of one demo frame.
#[derive(Debug, Serialize)]
struct FrameReport {
    frame: u32,
    time_ms: f64,
    draws: usize,
    uniform_writes: usize,
    programs_linked: usize,
    buffers_created: usize,
}

impl FrameReport {
    fn from_journal(frame: u32, time_ms: f64, journal: &Journal) -> Self {
        Self {
            frame,
            time_ms,
            draws: journal.draw_calls(),
            uniform_writes: journal.uniform_writes(),
            programs_linked: journal.programs_linked(),
            buffers_created: journal.count(|c| matches!(c, GpuCall::CreateBuffer { .. })),
        }
    }
}

/// Unit cube with per-face normals.
fn cube_geometry() -> Geometry {
    let p = 0.5_f32;
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([0.0, 0.0, 1.0], [[-p, -p, p], [p, -p, p], [p, p, p], [-p, p, p]]),
        ([0.0, 0.0, -1.0], [[p, -p, -p], [-p, -p, -p], [-p, p, -p], [p, p, -p]]),
        ([1.0, 0.0, 0.0], [[p, -p, p], [p, -p, -p], [p, p, -p], [p, p, p]]),
        ([-1.0, 0.0, 0.0], [[-p, -p, -p], [-p, -p, p], [-p, p, p], [-p, p, -p]]),
        ([0.0, 1.0, 0.0], [[-p, p, p], [p, p, p], [p, p, -p], [-p, p, -p]]),
        ([0.0, -1.0, 0.0], [[-p, -p, -p], [p, -p, -p], [p, -p, p], [-p, -p, p]]),
    ];

    let mut positions = Vec::with_capacity(72);
    let mut normals = Vec::with_capacity(72);
    let mut indices = Vec::with_capacity(36);
    for (face, (normal, corners)) in faces.iter().enumerate() {
        for corner in corners {
            positions.extend_from_slice(corner);
            normals.extend_from_slice(normal);
        }
        let base = (face * 4) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    Geometry::new(positions)
        .with_normals(normals)
        .with_indices(indices)
}

fn build_scene(world: &mut World, cubes: usize, lights: usize) -> anyhow::Result<()> {
    let mut camera = PerspectiveCamera::default();
    camera.set_translation(Vec3::new(0.0, 3.0, 8.0));
    world.register_entity(vec![camera.into()])?;

    for i in 0..cubes {
        let x = (i as f32 - (cubes as f32 - 1.0) / 2.0) * 1.5;
        world.register_entity(vec![
            Transform::from_translation(Vec3::new(x, 0.0, 0.0)).into(),
            Renderable::default().into(),
            cube_geometry().into(),
            Material::lambert(Vec3::new(0.9, 0.5, 0.2)).into(),
        ])?;
    }

    for i in 0..lights {
        let angle = i as f32 * std::f32::consts::TAU / lights.max(1) as f32;
        let direction = Vec3::new(angle.cos(), -1.0, angle.sin());
        world.register_entity(vec![DirectionalLight::new(direction, Vec3::ONE, 1.0).into()])?;
    }
    Ok(())
}

fn run_demo(
    frames: u32,
    cubes: usize,
    lights: usize,
    canvas: CanvasSize,
    json: bool,
) -> anyhow::Result<()> {
    let device = HeadlessDevice::new();
    let journal = device.journal();
    let settings = RenderSettings {
        canvas,
        ..RenderSettings::default()
    };

    let mut world = World::new();
    world.add_system(TransformSystem::new());
    world.add_system(CameraSystem::new());
    world.add_system(RenderSystem::new(device, settings)?);
    build_scene(&mut world, cubes, lights)?;
    world.publish(WorldEvent::resize(canvas));

    // Only the first cube spins, so later frames show a single model upload.
    let spinner = world.entities_with(ComponentKind::Transform).first().copied();

    if !json {
        println!(
            "Headless demo: frames={frames}, cubes={cubes}, lights={lights}, canvas={}x{}",
            canvas.width, canvas.height
        );
        println!("frame  time_ms  draws  uniforms  programs  buffers");
    }

    for frame in 0..frames {
        let time = f64::from(frame) * 16.0;
        if frame > 0 {
            if let Some(transform) = spinner.and_then(|id| world.get_mut::<Transform>(id)) {
                transform.rotate(Vec3::new(0.0, 0.05, 0.0));
            }
        }

        journal.clear();
        world.update(time)?;
        world.render(time)?;

        let report = FrameReport::from_journal(frame, time, &journal);
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!(
                "{:>5}  {:>7.1}  {:>5}  {:>8}  {:>8}  {:>7}",
                report.frame,
                report.time_ms,
                report.draws,
                report.uniform_writes,
                report.programs_linked,
                report.buffers_created
            );
        }
    }

    world.shutdown()?;
    tracing::info!(live_objects = journal.live_objects(), "demo finished");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            println!("lumen-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("ecs: {}", lumen_ecs::crate_info());
            println!("kernel: systems={}", World::new().system_count());
            println!("render: {}", lumen_render::crate_info());
        }
        Commands::Demo {
            frames,
            cubes,
            lights,
            width,
            height,
            json,
        } => run_demo(frames, cubes, lights, CanvasSize::new(width, height), json)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_six_faces() {
        let cube = cube_geometry();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), Some(36));
        assert!(cube.attributes().contains(lumen_ecs::AttributeSet::NORMAL));
    }

    #[test]
    fn scene_counts() {
        let mut world = World::new();
        build_scene(&mut world, 4, 2).unwrap();
        assert_eq!(world.entity_count(), 7);
        assert_eq!(
            world
                .entities_with(ComponentKind::Renderable)
                .len(),
            4
        );
    }
}
