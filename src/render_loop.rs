use std::path::PathBuf;

use anyhow::Result;
use log::{debug, warn};

use crate::compositor::{FrameOutcome, GlyphCompositor};
use crate::mask::{MaskLoader, MaskTicket};
use crate::pattern::FrameInputs;
use crate::renderer::PatternRenderer;
use crate::scene::FrameSource;
use crate::schema::EffectParameters;

/// Last-write-wins parameter store. Writers replace the whole value; the
/// render loop takes one snapshot at the start of each frame.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    current: EffectParameters,
    revision: u64,
}

impl ParamStore {
    pub fn new(params: EffectParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            current: params,
            revision: 0,
        })
    }

    /// Rejected writes leave the previous value in place.
    pub fn set(&mut self, params: EffectParameters) -> Result<()> {
        params.validate()?;
        self.current = params;
        self.revision += 1;
        Ok(())
    }

    pub fn update(&mut self, edit: impl FnOnce(&mut EffectParameters)) -> Result<()> {
        let mut next = self.current.clone();
        edit(&mut next);
        self.set(next)
    }

    pub fn snapshot(&self) -> EffectParameters {
        self.current.clone()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Effect time source. With a target FPS the time advances in whole
/// `1 / target_fps` steps; leftover wall time carries to the next frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameClock {
    effect_time: f64,
    accumulator: f64,
    frame_index: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` seconds of wall time and returns the effect time for the
    /// frame about to render.
    pub fn advance(&mut self, delta: f64, target_fps: f32) -> f32 {
        self.accumulator += delta.max(0.0);
        if target_fps > 0.0 {
            let step = 1.0 / f64::from(target_fps);
            let steps = (self.accumulator / step).floor();
            self.effect_time += steps * step;
            self.accumulator -= steps * step;
        } else {
            self.effect_time += self.accumulator;
            self.accumulator = 0.0;
        }
        self.frame_index += 1;
        self.effect_time as f32
    }

    pub fn effect_time(&self) -> f32 {
        self.effect_time as f32
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

pub enum LoopMode {
    Pattern(PatternRenderer),
    Glyphs(GlyphCompositor),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutput {
    /// Tight top-down RGBA8 rows from the pattern engine.
    Pattern { width: u32, height: u32, rgba: Vec<u8> },
    Glyphs(FrameOutcome),
    /// Capture or render failed; nothing new to show this frame.
    Dropped,
}

/// One render thread's worth of state: source, parameters, mask, clock and
/// the active pipeline.
pub struct RenderLoop {
    source: Box<dyn FrameSource>,
    mode: LoopMode,
    params: ParamStore,
    masks: MaskLoader,
    clock: FrameClock,
    mouse: [f32; 2],
}

impl RenderLoop {
    pub fn new(source: Box<dyn FrameSource>, mode: LoopMode, params: ParamStore) -> Self {
        Self {
            source,
            mode,
            params,
            masks: MaskLoader::new(),
            clock: FrameClock::new(),
            mouse: [0.0, 0.0],
        }
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    pub fn mode(&self) -> &LoopMode {
        &self.mode
    }

    pub fn masks(&self) -> &MaskLoader {
        &self.masks
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Pointer in physical pixels, top-down. Read at the start of the next
    /// tick.
    pub fn set_mouse(&mut self, mouse: [f32; 2]) {
        self.mouse = mouse;
    }

    pub fn request_mask(&mut self, path: impl Into<PathBuf>) -> MaskTicket {
        self.masks.request(path)
    }

    /// Blocks until a pending mask load resolves.
    pub fn wait_for_mask(&mut self) -> bool {
        self.masks.wait()
    }

    pub fn clear_mask(&mut self) {
        self.masks.clear();
    }

    /// Renders one frame after `delta` seconds of wall time.
    pub fn tick(&mut self, delta: f64) -> Result<TickOutput> {
        let params = self.params.snapshot();
        if self.masks.poll() {
            debug!("density mask changed");
        }
        let time = self.clock.advance(delta, params.post.target_fps);
        let frame_index = self.clock.frame_index();
        let mask = if params.density.mode.uses_mask() {
            self.masks.current()
        } else {
            None
        };

        match &mut self.mode {
            LoopMode::Glyphs(compositor) => Ok(TickOutput::Glyphs(compositor.on_frame(
                self.source.as_mut(),
                &params,
                mask,
            ))),
            LoopMode::Pattern(renderer) => {
                let frame = match self.source.capture(frame_index) {
                    Ok(frame) => frame,
                    Err(error) => {
                        warn!("scene capture failed on frame {frame_index}: {error:#}");
                        return Ok(TickOutput::Dropped);
                    }
                };
                let inputs = FrameInputs {
                    time,
                    mouse: self.mouse,
                    frame_index: frame_index as u32,
                };
                let rgba = match renderer.render_frame_rgba(&frame, mask, &params, &inputs) {
                    Ok(rgba) => rgba,
                    Err(error) => {
                        warn!("pattern render failed on frame {frame_index}: {error:#}");
                        return Ok(TickOutput::Dropped);
                    }
                };
                Ok(TickOutput::Pattern {
                    width: frame.width(),
                    height: frame.height(),
                    rgba,
                })
            }
        }
    }
}
