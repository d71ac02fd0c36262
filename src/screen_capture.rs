//! Ambilight: screen sampling and smoothed rendering.
//!
//! Two cooperating loops decoupled through a single-slot frame cell.
//! The sampler shells out to an external capture utility on its own
//! cadence and reduces each shot to one representative color; the
//! render loop smooths the output toward the latest sample and writes
//! at a fixed rate. Staleness is acceptable, a missed frame is not an
//! error, and neither loop ever blocks the other.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use image::imageops::FilterType;
use tracing::{debug, info, warn};

use crate::color::Rgb;
use crate::config::{AmbilightConfig, CaptureRegion};
use crate::effect::EffectContext;

/// Bound on one external capture invocation.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(3);

/// Smoothing factors below this are treated as this, so the output
/// always converges.
const MIN_ALPHA: f32 = 0.01;

/// Single-slot hand-off between sampler and renderer.
///
/// The producer overwrites unconsumed samples (latest wins); [`take`]
/// clears the slot so a stale sample is never reprocessed. The lock is
/// held only for the copy, never across a capture or a device write,
/// and the whole triple moves under it — a reader can never observe a
/// torn value.
///
/// [`take`]: SharedFrame::take
#[derive(Default)]
pub struct SharedFrame {
    slot: Mutex<Option<Rgb>>,
}

impl SharedFrame {
    pub fn publish(&self, color: Rgb) {
        *self.slot.lock().unwrap() = Some(color);
    }

    pub fn take(&self) -> Option<Rgb> {
        self.slot.lock().unwrap().take()
    }
}

/// External capture utilities we know how to drive, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTool {
    GnomeScreenshot,
    Grim,
    Scrot,
}

impl CaptureTool {
    const ALL: [Self; 3] = [Self::GnomeScreenshot, Self::Grim, Self::Scrot];

    pub fn binary(&self) -> &'static str {
        match self {
            Self::GnomeScreenshot => "gnome-screenshot",
            Self::Grim => "grim",
            Self::Scrot => "scrot",
        }
    }

    fn command(&self, out: &Path) -> Command {
        let mut cmd = Command::new(self.binary());
        match self {
            Self::GnomeScreenshot => {
                cmd.arg("--file").arg(out);
            }
            Self::Grim => {
                cmd.arg(out);
            }
            Self::Scrot => {
                cmd.arg("--overwrite").arg(out);
            }
        }
        cmd
    }

    /// Find the first available tool on `$PATH`.
    pub fn detect() -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.available())
    }

    fn available(&self) -> bool {
        let Some(paths) = std::env::var_os("PATH") else {
            return false;
        };
        std::env::split_paths(&paths).any(|dir| dir.join(self.binary()).is_file())
    }
}

/// A screen sampler bound to one capture tool and region.
pub struct ScreenSampler {
    tool: CaptureTool,
    region: CaptureRegion,
    band_height: u32,
    out_path: PathBuf,
}

impl ScreenSampler {
    pub fn new(tool: CaptureTool, config: &AmbilightConfig) -> Self {
        let out_path =
            std::env::temp_dir().join(format!("clevo-ambilight-{}.png", std::process::id()));
        Self {
            tool,
            region: config.region,
            band_height: config.band_height,
            out_path,
        }
    }

    pub fn tool(&self) -> CaptureTool {
        self.tool
    }

    /// Capture the screen and reduce it to one representative color.
    ///
    /// The capture file is consumed once and deleted.
    pub fn capture_and_reduce(&self) -> anyhow::Result<Rgb> {
        self.run_capture()?;
        let img = image::open(&self.out_path)
            .with_context(|| format!("decode {}", self.out_path.display()))?;
        let _ = std::fs::remove_file(&self.out_path);
        Ok(reduce(&img, self.region, self.band_height))
    }

    fn run_capture(&self) -> anyhow::Result<()> {
        let mut child = self
            .tool
            .command(&self.out_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {}", self.tool.binary()))?;

        let deadline = Instant::now() + CAPTURE_TIMEOUT;
        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                anyhow::bail!("{} exited with {status}", self.tool.binary());
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                anyhow::bail!("{} timed out after {CAPTURE_TIMEOUT:?}", self.tool.binary());
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

/// Reduce an image to a single color.
///
/// Crops to the configured region, then downscales to one pixel with a
/// quality resampling filter — the filter does the averaging, so there
/// is no per-pixel accumulation loop on our side.
pub fn reduce(img: &image::DynamicImage, region: CaptureRegion, band_height: u32) -> Rgb {
    use image::GenericImageView;

    let (w, h) = img.dimensions();
    let cropped = match region {
        CaptureRegion::BottomBand if h > band_height => {
            img.crop_imm(0, h - band_height, w, band_height)
        }
        _ => img.crop_imm(0, 0, w, h),
    };
    let pixel = cropped
        .resize_exact(1, 1, FilterType::Lanczos3)
        .to_rgb8()
        .get_pixel(0, 0)
        .0;
    Rgb::new(pixel[0], pixel[1], pixel[2])
}

/// One exponential smoothing step of the output toward the target.
pub fn smooth_step(current: &mut [f32; 3], target: Rgb, alpha: f32) {
    let alpha = alpha.clamp(MIN_ALPHA, 1.0);
    for (cur, tgt) in current.iter_mut().zip([target.r, target.g, target.b]) {
        *cur += (tgt as f32 - *cur) * alpha;
    }
}

/// Producer loop: capture at the configured rate, publish latest-wins.
///
/// A single capture failure is logged and skipped; the thread only ends
/// when the running flag clears.
pub fn run_sampler_loop(ctx: &EffectContext, sampler: &ScreenSampler, frame: &SharedFrame) {
    info!(tool = sampler.tool().binary(), "ambilight sampler started");
    while ctx.running() {
        let started = Instant::now();
        match sampler.capture_and_reduce() {
            Ok(color) => {
                debug!(r = color.r, g = color.g, b = color.b, "screen sample");
                frame.publish(color);
            }
            Err(e) => warn!("screen capture failed, skipping sample: {e:#}"),
        }
        let interval = Duration::from_secs_f64(1.0 / ctx.params.sample_fps().max(1) as f64);
        let elapsed = started.elapsed();
        if elapsed < interval {
            ctx.sleep_while_running(interval - elapsed);
        }
    }
}

/// Consumer loop: smooth toward the latest sample and write every tick.
///
/// Never blocks on the sampler — without a new sample it keeps
/// converging toward the last known target.
pub fn run_render_loop(ctx: &EffectContext, frame: &SharedFrame, config: &AmbilightConfig) {
    let tick = Duration::from_secs_f64(1.0 / config.render_fps.max(1) as f64);
    let mut current = [0.0f32; 3];
    let mut target = Rgb::BLACK;
    while ctx.running() {
        let started = Instant::now();
        if let Some(sample) = frame.take() {
            target = sample;
        }
        smooth_step(&mut current, target, config.alpha);
        ctx.emit(Rgb::from_f32(current[0], current[1], current[2]));
        let elapsed = started.elapsed();
        if elapsed < tick {
            ctx.sleep_while_running(tick - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_image(w: u32, h: u32, rgb: [u8; 3]) -> image::DynamicImage {
        image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(w, h, image::Rgb(rgb)))
    }

    fn assert_close(got: Rgb, want: Rgb) {
        for (g, w) in [(got.r, want.r), (got.g, want.g), (got.b, want.b)] {
            assert!(
                (g as i16 - w as i16).abs() <= 1,
                "channel {g} not within 1 of {w} ({got:?} vs {want:?})"
            );
        }
    }

    #[test]
    fn test_reduce_uniform_image() {
        let img = uniform_image(64, 48, [120, 30, 200]);
        assert_close(
            reduce(&img, CaptureRegion::Full, 0),
            Rgb::new(120, 30, 200),
        );
    }

    #[test]
    fn test_reduce_bottom_band_ignores_top() {
        // White everywhere except a red bottom band.
        let mut buf = image::RgbImage::from_pixel(100, 100, image::Rgb([255, 255, 255]));
        for y in 80..100 {
            for x in 0..100 {
                buf.put_pixel(x, y, image::Rgb([255, 0, 0]));
            }
        }
        let img = image::DynamicImage::ImageRgb8(buf);
        assert_close(
            reduce(&img, CaptureRegion::BottomBand, 20),
            Rgb::new(255, 0, 0),
        );
    }

    #[test]
    fn test_reduce_band_taller_than_image_uses_full_frame() {
        let img = uniform_image(10, 10, [5, 6, 7]);
        assert_close(
            reduce(&img, CaptureRegion::BottomBand, 200),
            Rgb::new(5, 6, 7),
        );
    }

    #[test]
    fn test_shared_frame_latest_wins_and_clears() {
        let frame = SharedFrame::default();
        assert_eq!(frame.take(), None);
        frame.publish(Rgb::new(1, 1, 1));
        frame.publish(Rgb::new(2, 2, 2));
        assert_eq!(frame.take(), Some(Rgb::new(2, 2, 2)));
        // Consumed: a second take sees nothing.
        assert_eq!(frame.take(), None);
    }

    #[test]
    fn test_smoothing_converges_without_overshoot() {
        let target = Rgb::new(200, 50, 0);
        let mut current = [0.0f32; 3];
        let mut prev_dist = f32::MAX;
        for _ in 0..200 {
            smooth_step(&mut current, target, 0.2);
            for (cur, tgt) in current.iter().zip([200.0f32, 50.0, 0.0]) {
                assert!(*cur <= tgt + f32::EPSILON, "overshot: {cur} > {tgt}");
            }
            let dist = current
                .iter()
                .zip([200.0f32, 50.0, 0.0])
                .map(|(c, t)| (t - c).abs())
                .fold(0.0, f32::max);
            assert!(dist <= prev_dist);
            prev_dist = dist;
        }
        assert!(prev_dist < 1.0, "did not converge: {prev_dist}");
    }

    #[test]
    fn test_smoothing_alpha_one_jumps_to_target() {
        let mut current = [10.0f32, 20.0, 30.0];
        smooth_step(&mut current, Rgb::new(1, 2, 3), 1.0);
        assert_eq!(current, [1.0, 2.0, 3.0]);
    }
}
