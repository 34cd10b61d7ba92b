use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use image::RgbaImage;
use log::{info, warn};

use glyphgrid::charset::CharacterSet;
use glyphgrid::compositor::{compose_glyph_frame, FrameOutcome, GlyphCompositor, GlyphOverlay};
use glyphgrid::glyph_raster::{BlockRasterizer, FontRasterizer, GlyphRasterizer};
use glyphgrid::glyph_style::GlyphStyle;
use glyphgrid::mask::MaskTexture;
use glyphgrid::preset::{apply_overrides, load_and_validate_preset, ParamOverride};
use glyphgrid::render_loop::{LoopMode, ParamStore, RenderLoop, TickOutput};
use glyphgrid::renderer::PatternRenderer;
use glyphgrid::scene::SceneSpec;
use glyphgrid::schema::{ColorPalette, DensityMode, EffectParameters};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GLYPHGRID_GIT_HASH"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "glyphgrid")]
#[command(about = "Glyph-grid image effects for rendered frames")]
#[command(version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a preset and print the resolved parameters.
    Check {
        preset: PathBuf,
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Render one frame through the pixel-pattern engine.
    Pattern {
        #[command(flatten)]
        render: RenderArgs,
        /// Use the CPU mirror instead of wgpu.
        #[arg(long)]
        software: bool,
        #[arg(short = 'o', long = "out", default_value = "pattern.png")]
        out: PathBuf,
    },
    /// Render one capture through the CPU glyph compositor.
    Glyphs {
        #[command(flatten)]
        render: RenderArgs,
        /// TTF/OTF font for glyphs; density blocks are used without one.
        #[arg(long)]
        font: Option<PathBuf>,
        #[arg(short = 'o', long = "out", default_value = "glyphs.png")]
        out: PathBuf,
        /// Also write the character grid as plain text.
        #[arg(long)]
        text: Option<PathBuf>,
    },
    /// Run the render loop for a number of frames and write a PNG sequence.
    Animate {
        #[command(flatten)]
        render: RenderArgs,
        #[arg(long, value_enum, default_value_t = AnimateMode::Pattern)]
        mode: AnimateMode,
        #[arg(long, default_value_t = 30)]
        frames: u32,
        /// Host frame rate used to derive per-tick wall time.
        #[arg(long, default_value_t = 30.0)]
        fps: f32,
        #[arg(long)]
        software: bool,
        #[arg(long)]
        font: Option<PathBuf>,
        #[arg(short = 'o', long = "out-dir", default_value = "frames")]
        out_dir: PathBuf,
    },
    /// List glyph styles, character sets, density modes and palettes.
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AnimateMode {
    Pattern,
    Glyphs,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[arg(long)]
    preset: Option<PathBuf>,
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
    /// image:<path>, solid:<#hex> or gradient:<#hex>,<#hex>
    #[arg(long, default_value = "gradient:#101820,#f2aa4c")]
    scene: String,
    /// Physical size of procedural scenes, WIDTHxHEIGHT.
    #[arg(long, default_value = "320x180")]
    size: String,
    /// Device pixel ratio of the scene.
    #[arg(long, default_value_t = 1.0)]
    dpr: f32,
    /// Image whose alpha channel drives the logo/image density modes.
    #[arg(long)]
    mask: Option<PathBuf>,
    /// Pointer position in physical pixels, X,Y.
    #[arg(long)]
    mouse: Option<String>,
}

impl RenderArgs {
    fn params(&self) -> Result<EffectParameters> {
        resolve_params(self.preset.as_deref(), &self.set)
    }

    fn size(&self) -> Result<(u32, u32)> {
        parse_size(&self.size)
    }

    fn mouse(&self) -> Result<[f32; 2]> {
        match self.mouse.as_deref() {
            Some(raw) => parse_mouse(raw),
            None => Ok([0.0, 0.0]),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { preset, set } => run_check(&preset, &set),
        Commands::Pattern {
            render,
            software,
            out,
        } => run_pattern(&render, software, &out),
        Commands::Glyphs {
            render,
            font,
            out,
            text,
        } => run_glyphs(&render, font.as_deref(), &out, text.as_deref()),
        Commands::Animate {
            render,
            mode,
            frames,
            fps,
            software,
            font,
            out_dir,
        } => run_animate(&render, mode, frames, fps, software, font.as_deref(), &out_dir),
        Commands::List { json } => run_list(json),
    }
}

fn run_check(preset_path: &Path, set: &[String]) -> Result<()> {
    let params = resolve_params(Some(preset_path), set)?;
    println!(
        "OK: {} (cell {}px, spacing {}, style {}, charset {}, density {:?})",
        preset_path.display(),
        params.cell_size,
        params.cell_spacing,
        params.style.name(),
        params.character_set.name(),
        params.density.mode
    );
    print!("{}", serde_yaml::to_string(&params)?);
    Ok(())
}

fn run_pattern(render: &RenderArgs, software: bool, out: &Path) -> Result<()> {
    let params = render.params()?;
    let source = SceneSpec::parse(&render.scene)?.open(render.size()?, render.dpr)?;
    let (width, height) = source.size();
    let renderer = pattern_renderer(width, height, software);
    let mut render_loop = RenderLoop::new(
        source,
        LoopMode::Pattern(renderer),
        ParamStore::new(params)?,
    );
    render_loop.set_mouse(render.mouse()?);
    load_loop_mask(&mut render_loop, render.mask.as_deref());

    match render_loop.tick(0.0)? {
        TickOutput::Pattern {
            width,
            height,
            rgba,
        } => write_png(out, width, height, rgba)?,
        other => bail!("pattern render produced no frame: {other:?}"),
    }
    println!("Wrote {}", out.display());
    Ok(())
}

fn run_glyphs(
    render: &RenderArgs,
    font: Option<&Path>,
    out: &Path,
    text: Option<&Path>,
) -> Result<()> {
    let params = render.params()?;
    let mut source = SceneSpec::parse(&render.scene)?.open(render.size()?, render.dpr)?;
    let frame = source.capture(0)?;
    let mask = match render.mask.as_deref() {
        Some(path) => match MaskTexture::load(path) {
            Ok(mask) => Some(mask),
            Err(error) => {
                warn!("mask load failed, density mask inactive: {error:#}");
                None
            }
        },
        None => None,
    };
    let mut rasterizer = glyph_rasterizer(font)?;
    let overlay = compose_glyph_frame(&frame, &params, mask.as_ref(), rasterizer.as_mut())?;
    write_overlay(out, text, &overlay)?;
    println!(
        "Wrote {} ({}x{} cells, {} drawn)",
        out.display(),
        overlay.glyphs.cols(),
        overlay.glyphs.rows(),
        overlay.glyphs.drawn_count()
    );
    Ok(())
}

fn run_animate(
    render: &RenderArgs,
    mode: AnimateMode,
    frames: u32,
    fps: f32,
    software: bool,
    font: Option<&Path>,
    out_dir: &Path,
) -> Result<()> {
    if !(fps > 0.0) {
        bail!("--fps must be positive, got {fps}");
    }
    let params = render.params()?;
    let source = SceneSpec::parse(&render.scene)?.open(render.size()?, render.dpr)?;
    let (width, height) = source.size();
    let loop_mode = match mode {
        AnimateMode::Pattern => LoopMode::Pattern(pattern_renderer(width, height, software)),
        AnimateMode::Glyphs => LoopMode::Glyphs(GlyphCompositor::new(glyph_rasterizer(font)?)),
    };
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut render_loop = RenderLoop::new(source, loop_mode, ParamStore::new(params)?);
    render_loop.set_mouse(render.mouse()?);
    load_loop_mask(&mut render_loop, render.mask.as_deref());

    let delta = 1.0 / f64::from(fps);
    let mut written = 0_u32;
    for frame_index in 0..frames {
        let path = out_dir.join(format!("frame_{frame_index:04}.png"));
        match render_loop.tick(delta)? {
            TickOutput::Pattern {
                width,
                height,
                rgba,
            } => {
                write_png(&path, width, height, rgba)?;
                written += 1;
            }
            TickOutput::Glyphs(FrameOutcome::Captured) => {
                if let LoopMode::Glyphs(compositor) = render_loop.mode() {
                    if let Some(overlay) = compositor.overlay() {
                        write_overlay(&path, None, overlay)?;
                        written += 1;
                    }
                }
            }
            TickOutput::Glyphs(_) | TickOutput::Dropped => {}
        }
        if frame_index % 30 == 0 {
            eprintln!("rendered frame {}/{}", frame_index + 1, frames);
        }
    }
    println!("Wrote {} frames to {}", written, out_dir.display());
    Ok(())
}

fn run_list(json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "styles": GlyphStyle::ALL
                .iter()
                .map(|style| serde_json::json!({ "id": style.id(), "name": style.name() }))
                .collect::<Vec<_>>(),
            "character_sets": CharacterSet::all()
                .map(|set| serde_json::json!({ "id": set.id(), "name": set.name(), "chars": set.chars() }))
                .collect::<Vec<_>>(),
            "density_modes": DensityMode::ALL
                .iter()
                .map(|mode| serde_json::json!({ "id": mode.id(), "name": mode }))
                .collect::<Vec<_>>(),
            "color_palettes": ColorPalette::ALL
                .iter()
                .map(|palette| serde_json::json!({ "id": palette.id(), "name": palette.name() }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Styles:");
    for style in GlyphStyle::ALL {
        println!("  {} {}", style.id(), style.name());
    }
    println!("Character sets:");
    for set in CharacterSet::all() {
        println!("  {:>2} {:<14} \"{}\"", set.id(), set.name(), set.chars());
    }
    println!("Density modes:");
    for mode in DensityMode::ALL {
        println!("  {} {}", mode.id(), serde_yaml::to_string(&mode)?.trim());
    }
    println!("Color palettes:");
    for palette in ColorPalette::ALL {
        println!("  {} {}", palette.id(), palette.name());
    }
    Ok(())
}

fn resolve_params(preset: Option<&Path>, set: &[String]) -> Result<EffectParameters> {
    let base = match preset {
        Some(path) => load_and_validate_preset(path)?,
        None => EffectParameters::default(),
    };
    let overrides = set
        .iter()
        .map(|raw| ParamOverride::parse(raw))
        .collect::<Result<Vec<_>>>()?;
    apply_overrides(&base, &overrides)
}

fn pattern_renderer(width: u32, height: u32, software: bool) -> PatternRenderer {
    if software {
        return PatternRenderer::new_software();
    }
    match pollster::block_on(PatternRenderer::new(width, height)) {
        Ok(renderer) => renderer,
        Err(error) => {
            warn!("GPU pattern backend unavailable, using software: {error:#}");
            PatternRenderer::new_software()
        }
    }
}

fn glyph_rasterizer(font: Option<&Path>) -> Result<Box<dyn GlyphRasterizer>> {
    Ok(match font {
        Some(path) => Box::new(FontRasterizer::from_path(path)?),
        None => Box::new(BlockRasterizer::new()),
    })
}

fn load_loop_mask(render_loop: &mut RenderLoop, mask: Option<&Path>) {
    let Some(path) = mask else {
        return;
    };
    render_loop.request_mask(path);
    render_loop.wait_for_mask();
    if render_loop.masks().current().is_some() {
        info!("density mask loaded from {}", path.display());
    }
}

fn write_overlay(out: &Path, text: Option<&Path>, overlay: &GlyphOverlay) -> Result<()> {
    // the overlay is opaque, so premultiplied and straight alpha agree
    write_png(
        out,
        overlay.pixmap.width(),
        overlay.pixmap.height(),
        overlay.pixmap.data().to_vec(),
    )?;
    if let Some(text_path) = text {
        fs::write(text_path, overlay.glyphs.to_text())
            .with_context(|| format!("failed to write {}", text_path.display()))?;
    }
    Ok(())
}

fn write_png(path: &Path, width: u32, height: u32, rgba: Vec<u8>) -> Result<()> {
    let image = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn parse_size(raw: &str) -> Result<(u32, u32)> {
    let parsed = raw
        .split_once(['x', 'X'])
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)));
    match parsed {
        Some((width, height)) if width > 0 && height > 0 => Ok((width, height)),
        _ => bail!("invalid --size '{}': expected WIDTHxHEIGHT", raw),
    }
}

fn parse_mouse(raw: &str) -> Result<[f32; 2]> {
    let parsed = raw
        .split_once(',')
        .and_then(|(x, y)| Some([x.trim().parse::<f32>().ok()?, y.trim().parse::<f32>().ok()?]));
    parsed.ok_or_else(|| anyhow!("invalid --mouse '{}': expected X,Y", raw))
}
