use glyphgrid::frame::RenderFrame;
use glyphgrid::mask::MaskTexture;
use glyphgrid::pattern::{render_pattern_software, FrameInputs};
use glyphgrid::render_loop::{LoopMode, ParamStore, RenderLoop, TickOutput};
use glyphgrid::renderer::PatternRenderer;
use glyphgrid::scene::{ProceduralPattern, ProceduralSource};
use glyphgrid::schema::{DensityMode, EffectParameters, HexColor};

// wider than any adapter's max_texture_dimension_2d
const OVERSIZE: u32 = 40_000;

fn gpu_renderer(width: u32, height: u32) -> Option<PatternRenderer> {
    match pollster::block_on(PatternRenderer::new(width, height)) {
        Ok(r) => Some(r),
        Err(e) if e.to_string().contains("no suitable GPU adapter found") => {
            eprintln!("Skipping test: no GPU adapter found");
            None
        }
        Err(e) => panic!("renderer failed to initialize: {e:?}"),
    }
}

#[test]
fn wgpu_pattern_renders_full_coverage_white() {
    let renderer_result = pollster::block_on(PatternRenderer::new(64, 64));
    let mut renderer = match renderer_result {
        Ok(r) => r,
        Err(e) => {
            let err_str = e.to_string();
            if err_str.contains("no suitable GPU adapter found") {
                eprintln!("Skipping test: no GPU adapter found");
                return;
            }
            panic!("renderer failed to initialize: {e:?}");
        }
    };
    assert!(renderer.is_gpu_backend());

    let frame = RenderFrame::new(64, 64, [255, 255, 255, 255].repeat(64 * 64)).expect("frame");
    let rgba = renderer
        .render_frame_rgba(&frame, None, &EffectParameters::default(), &FrameInputs::default())
        .expect("render_frame_rgba should succeed");
    assert_eq!(rgba.len(), 64 * 64 * 4);
    assert!(
        rgba.chunks_exact(4).all(|px| px == [255, 255, 255, 255]),
        "white source at full coverage should stay white"
    );
}

#[test]
fn wgpu_pattern_density_gate_matches_software() {
    let mut renderer = match pollster::block_on(PatternRenderer::new(96, 64)) {
        Ok(r) => r,
        Err(e) if e.to_string().contains("no suitable GPU adapter found") => {
            eprintln!("Skipping test: no GPU adapter found");
            return;
        }
        Err(e) => panic!("renderer failed to initialize: {e:?}"),
    };

    let mut params = EffectParameters {
        cell_size: 8.0,
        ..EffectParameters::default()
    };
    params.density.mode = DensityMode::Uniform;
    params.density.cell_density = 50.0;
    params.density.random_seed = 3;

    let frame = RenderFrame::new(96, 64, [255, 255, 255, 255].repeat(96 * 64)).expect("frame");
    let gpu = renderer
        .render_frame_rgba(&frame, None, &params, &FrameInputs::default())
        .expect("gpu render");
    let cpu = render_pattern_software(&frame, None, &params, FrameInputs::default());

    // the integer hash is shared, so both substrates keep the same cells
    let lit = |rgba: &[u8]| {
        (0..8_u32)
            .flat_map(|row| (0..12_u32).map(move |col| (col, row)))
            .map(|(col, row)| {
                let x = col * 8 + 4;
                let y = row * 8 + 4;
                rgba[((y * 96 + x) * 4) as usize] > 128
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(lit(&gpu), lit(&cpu));
}

#[test]
fn wgpu_oversize_mask_falls_back_to_full_density() {
    let Some(mut renderer) = gpu_renderer(32, 32) else {
        return;
    };
    let mut params = EffectParameters {
        cell_size: 8.0,
        ..EffectParameters::default()
    };
    params.density.mode = DensityMode::ImageMask;
    let frame = RenderFrame::new(32, 32, [255, 255, 255, 255].repeat(32 * 32)).expect("frame");
    let huge = MaskTexture::from_alpha(OVERSIZE, 1, vec![0; OVERSIZE as usize]).expect("mask");

    let unmasked = renderer
        .render_frame_rgba(&frame, None, &params, &FrameInputs::default())
        .expect("render without mask");
    for _ in 0..2 {
        let masked = renderer
            .render_frame_rgba(&frame, Some(&huge), &params, &FrameInputs::default())
            .expect("oversize mask should not fail the frame");
        assert_eq!(masked, unmasked);
    }
}

#[test]
fn wgpu_render_failure_drops_the_tick() {
    let Some(renderer) = gpu_renderer(32, 32) else {
        return;
    };
    let white = HexColor::parse("#ffffff").expect("color");
    let source = ProceduralSource::new(OVERSIZE, 1, 1.0, ProceduralPattern::Solid(white))
        .expect("scene");
    let params = ParamStore::new(EffectParameters::default()).expect("params");
    let mut render_loop = RenderLoop::new(Box::new(source), LoopMode::Pattern(renderer), params);

    for _ in 0..2 {
        let output = render_loop.tick(1.0 / 60.0).expect("tick keeps running");
        assert_eq!(output, TickOutput::Dropped);
    }
}
