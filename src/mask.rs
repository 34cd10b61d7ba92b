//! Alpha-mask images for the image/logo density modes and their background
//! loader.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use image::ImageReader;
use log::{debug, warn};

static NEXT_MASK_ID: AtomicU64 = AtomicU64::new(1);

/// Decoded mask: one alpha byte per pixel, row-major, top-down.
#[derive(Debug, Clone)]
pub struct MaskTexture {
    id: u64,
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl MaskTexture {
    pub fn from_alpha(width: u32, height: u32, alpha: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("mask must be non-empty, got {width}x{height}");
        }
        if alpha.len() != width as usize * height as usize {
            bail!(
                "mask alpha length mismatch: expected {} for {width}x{height}, got {}",
                width as usize * height as usize,
                alpha.len()
            );
        }
        Ok(Self {
            id: NEXT_MASK_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            alpha,
        })
    }

    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self> {
        let alpha = rgba.chunks_exact(4).map(|px| px[3]).collect();
        Self::from_alpha(width, height, alpha)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let image = ImageReader::open(path)
            .with_context(|| format!("failed to open mask image {}", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("failed to detect mask format {}", path.display()))?
            .decode()
            .map_err(|error| anyhow!("failed to decode mask {}: {error}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Self::from_rgba(width, height, image.as_raw())
    }

    /// Unique per decoded mask; clones share it.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// Alpha in `[0, 1]` at `uv` (top-down). Caller has already rejected
    /// out-of-range UVs; `uv == 1.0` is clamped onto the last texel.
    pub fn alpha_at_uv(&self, u: f32, v: f32) -> f32 {
        let x = ((u * self.width as f32).floor().max(0.0) as u32).min(self.width - 1);
        let y = ((v * self.height as f32).floor().max(0.0) as u32).min(self.height - 1);
        f32::from(self.alpha[self.texel_index(x, y)]) / 255.0
    }

    fn texel_index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Identifies one mask request; only the most recent one may install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskTicket(u64);

struct PendingLoad {
    ticket: MaskTicket,
    path: PathBuf,
    receiver: Receiver<Result<MaskTexture>>,
}

/// Decodes mask images off the render thread. A newer request supersedes any
/// in-flight one; late results for older tickets are dropped.
#[derive(Default)]
pub struct MaskLoader {
    generation: u64,
    current: Option<MaskTexture>,
    pending: Option<PendingLoad>,
}

impl MaskLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, path: impl Into<PathBuf>) -> MaskTicket {
        self.generation += 1;
        let ticket = MaskTicket(self.generation);
        let path = path.into();
        let (sender, receiver) = mpsc::channel();
        let worker_path = path.clone();
        thread::spawn(move || {
            let _ = sender.send(MaskTexture::load(&worker_path));
        });
        debug!("mask load #{} requested: {}", ticket.0, path.display());
        self.pending = Some(PendingLoad {
            ticket,
            path,
            receiver,
        });
        ticket
    }

    /// Installs a finished load if one is ready. Returns true when the active
    /// mask changed.
    pub fn poll(&mut self) -> bool {
        let Some(pending) = self.pending.as_ref() else {
            return false;
        };
        let outcome = match pending.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => Err(anyhow!("mask decode worker exited")),
        };
        let Some(pending) = self.pending.take() else {
            return false;
        };
        let path = pending.path.display().to_string();
        self.complete(pending.ticket, outcome.with_context(|| path))
    }

    /// Blocks until the in-flight load (if any) resolves, then installs it.
    pub fn wait(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        let outcome = pending
            .receiver
            .recv()
            .map_err(|_| anyhow!("mask decode worker exited"))
            .and_then(|result| result);
        let path = pending.path.display().to_string();
        self.complete(pending.ticket, outcome.with_context(|| path))
    }

    /// Applies a load result. Results for superseded tickets are discarded.
    pub fn complete(&mut self, ticket: MaskTicket, result: Result<MaskTexture>) -> bool {
        if ticket.0 != self.generation {
            debug!(
                "discarding stale mask load #{} (latest #{})",
                ticket.0, self.generation
            );
            return false;
        }
        match result {
            Ok(mask) => {
                debug!("mask #{} ready: {}x{}", ticket.0, mask.width, mask.height);
                self.current = Some(mask);
            }
            Err(error) => {
                warn!("mask load failed, density mask inactive: {error:#}");
                self.current = None;
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.current = None;
    }

    pub fn current(&self) -> Option<&MaskTexture> {
        self.current.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
