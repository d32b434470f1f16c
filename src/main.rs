use std::path::PathBuf;

use glam::{Quat, Vec3};
use log::{error, info};
use wgpu_deferred::gpu::{Backend, SoftwareBackend, WgpuBackend};
use wgpu_deferred::renderer::{
    cube_mesh, plane_mesh, sphere_mesh, FramePipeline, MaterialHandle, MeshHandle, RendererContext,
};
use wgpu_deferred::scene::{Camera, Drawable, FrameInput, Light, Material, Transform};
use wgpu_deferred::{init_logging, RenderSettings, Result};

struct Options {
    gpu: bool,
    out: PathBuf,
    settings: Option<PathBuf>,
}

impl Options {
    fn from_args() -> Self {
        let mut options = Options {
            gpu: false,
            out: PathBuf::from("frame.png"),
            settings: None,
        };
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--gpu" => options.gpu = true,
                "--out" => {
                    if let Some(path) = args.next() {
                        options.out = PathBuf::from(path);
                    }
                }
                "--settings" => options.settings = args.next().map(PathBuf::from),
                other => log::warn!("Ignoring unknown argument '{}'", other),
            }
        }
        options
    }
}

struct DemoScene {
    camera: Camera,
    lights: Vec<Light>,
    opaque: Vec<Drawable>,
    transparent: Vec<Drawable>,
}

impl DemoScene {
    fn input(&self) -> FrameInput<'_> {
        FrameInput {
            camera: &self.camera,
            lights: &self.lights,
            opaque: &self.opaque,
            transparent: &self.transparent,
            shadow_casters: &self.opaque,
        }
    }
}

fn drawable<B: Backend>(
    ctx: &RendererContext<B>,
    mesh: MeshHandle,
    material: MaterialHandle,
    transform: Transform,
) -> Option<Drawable> {
    let bounds = ctx.mesh(mesh)?.bounds;
    Some(Drawable::new(mesh, material, bounds).with_transform(transform))
}

fn build_scene<B: Backend>(ctx: &mut RendererContext<B>) -> Result<DemoScene> {
    let (width, height) = (ctx.targets().width(), ctx.targets().height());

    let (vertices, indices) = cube_mesh();
    let cube = ctx.create_mesh("Cube", &vertices, &indices)?;
    let (vertices, indices) = plane_mesh(20.0, 20.0);
    let floor = ctx.create_mesh("Floor", &vertices, &indices)?;
    let (vertices, indices) = sphere_mesh(32, 16);
    let sphere = ctx.create_mesh("Sphere", &vertices, &indices)?;

    let floor_material = ctx.create_material(Material::grey(0.6).with_roughness(0.9));
    let red = ctx.create_material(Material::new(Vec3::new(0.8, 0.1, 0.1)).with_roughness(0.4));
    let gold = ctx.create_material(
        Material::new(Vec3::new(1.0, 0.77, 0.34))
            .with_metalness(1.0)
            .with_roughness(0.3),
    );
    let glass = ctx.create_material(
        Material::new(Vec3::new(0.2, 0.5, 1.0))
            .with_opacity(0.4)
            .double_sided(),
    );

    let mut opaque = Vec::new();
    opaque.extend(drawable(ctx, floor, floor_material, Transform::default()));
    for (i, material) in [red, gold, red].into_iter().enumerate() {
        let x = (i as f32 - 1.0) * 2.5;
        let transform = Transform::from_trs(
            Vec3::new(x, 0.5, 0.0),
            Quat::from_rotation_y(0.4 * i as f32),
            Vec3::ONE,
        );
        opaque.extend(drawable(ctx, cube, material, transform));
    }
    opaque.extend(drawable(
        ctx,
        sphere,
        gold,
        Transform::from_translation(Vec3::new(0.0, 0.75, -3.0)),
    ));

    let mut transparent = Vec::new();
    transparent.extend(drawable(
        ctx,
        sphere,
        glass,
        Transform::from_trs(Vec3::new(1.2, 1.0, 2.0), Quat::IDENTITY, Vec3::splat(1.5)),
    ));

    let mut camera = Camera::new(
        60f32.to_radians(),
        width as f32 / height.max(1) as f32,
        0.1,
        100.0,
    );
    camera.look_at(Vec3::new(6.0, 5.0, 9.0), Vec3::ZERO, Vec3::Y);

    let lights = vec![
        Light::directional(Vec3::new(-0.4, -1.0, -0.3), Vec3::ONE, 3.0),
        Light::point(Vec3::new(-2.0, 1.5, 2.0), 6.0, Vec3::new(1.0, 0.6, 0.2), 8.0),
    ];

    Ok(DemoScene {
        camera,
        lights,
        opaque,
        transparent,
    })
}

fn render<B: Backend>(backend: B, settings: RenderSettings, options: &Options) -> Result<()> {
    let resolution = settings.resolution;
    let mut ctx = RendererContext::new(backend, settings, resolution.width, resolution.height)?;
    let scene = build_scene(&mut ctx)?;
    let pipeline = FramePipeline::standard();

    pipeline.render(&mut ctx, &scene.input())?;

    let stats = ctx.stats();
    info!(
        "Frame {}: {} passes, {} draw calls, {} triangles, {} materials",
        stats.frame_index, stats.passes_run, stats.draw_calls, stats.triangles, stats.materials
    );
    for (pass, nanos) in ctx.timings().iter().filter(|(_, nanos)| *nanos > 0) {
        info!("  {:<18} {:>8.3} ms", pass.label(), nanos as f64 / 1.0e6);
    }

    let image = ctx.read_output_rgba8()?;
    image.save(&options.out)?;
    info!("Wrote {}", options.out.display());
    Ok(())
}

fn run(options: &Options) -> Result<()> {
    let settings = match &options.settings {
        Some(path) => RenderSettings::load_from_path(path),
        None => RenderSettings::default(),
    };

    if options.gpu {
        let backend = WgpuBackend::new()?;
        info!("Rendering on {}", backend.adapter_info().name);
        render(backend, settings, options)
    } else {
        info!("Rendering on the software backend");
        render(SoftwareBackend::new(), settings, options)
    }
}

fn main() {
    init_logging();
    let options = Options::from_args();
    if let Err(err) = run(&options) {
        error!("Render failed: {err}");
        std::process::exit(1);
    }
}
