use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::{SystemTime, UNIX_EPOCH};

use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, ImageEncoder, RgbaImage};

use crate::error::{CanvasError, CanvasResult};
use crate::ops::draw::DrawOp;

// ============================================================================
// IMPORT
// ============================================================================

/// Decode any supported raster format into straight-alpha RGBA.
pub fn decode_image(bytes: &[u8]) -> CanvasResult<RgbaImage> {
    let img = image::load_from_memory(bytes).map_err(CanvasError::Decode)?;
    Ok(img.to_rgba8())
}

pub fn load_image(path: &Path) -> CanvasResult<RgbaImage> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

/// Uniformly scale `image` so it fits inside `canvas_w × canvas_h`
/// (growing small images as well) and centre it. Returns the scaled image
/// and its top-left corner in canvas space.
pub fn fit_image(image: &RgbaImage, canvas_w: u32, canvas_h: u32) -> (RgbaImage, (i32, i32)) {
    let (iw, ih) = image.dimensions();
    let scale = (canvas_w as f32 / iw.max(1) as f32).min(canvas_h as f32 / ih.max(1) as f32);
    let tw = ((iw as f32 * scale).round() as u32).clamp(1, canvas_w.max(1));
    let th = ((ih as f32 * scale).round() as u32).clamp(1, canvas_h.max(1));
    let scaled = if (tw, th) == (iw, ih) {
        image.clone()
    } else {
        imageops::resize(image, tw, th, FilterType::Lanczos3)
    };
    let x = (canvas_w as i32 - tw as i32) / 2;
    let y = (canvas_h as i32 - th as i32) / 2;
    (scaled, (x, y))
}

/// The draw op that places an imported image on a canvas of the given size.
pub fn import_op(image: &RgbaImage, canvas_w: u32, canvas_h: u32) -> DrawOp {
    let (scaled, origin) = fit_image(image, canvas_w, canvas_h);
    DrawOp::Image { image: Arc::new(scaled), origin, opacity: 1.0 }
}

/// Run `job` on a worker thread; the result arrives on the returned channel.
/// The UI polls it each frame so the result is applied on the UI thread.
pub fn spawn_loader<T, F>(job: F) -> Receiver<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        // The receiver may be gone if the window closed first.
        let _ = tx.send(job());
    });
    rx
}

// ============================================================================
// EXPORT
// ============================================================================

pub fn encode_png(image: &RgbaImage, path: &Path) -> CanvasResult<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    PngEncoder::new(writer)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
        .map_err(CanvasError::Encode)
}

/// `sketch-YYYY-MM-DD.png` for the UTC date of `now`.
pub fn export_file_name(now: SystemTime) -> String {
    let days = now
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() / 86_400) as i64)
        .unwrap_or(0);
    let (y, m, d) = civil_from_days(days);
    format!("sketch-{:04}-{:02}-{:02}.png", y, m, d)
}

/// Write `image` into `dir` under today's export name. Returns the path.
pub fn export_png(image: &RgbaImage, dir: &Path, now: SystemTime) -> CanvasResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(now));
    encode_png(image, &path)?;
    log::info!("exported {}x{} to {}", image.width(), image.height(), path.display());
    Ok(path)
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = yoe + era * 400 + if m <= 2 { 1 } else { 0 };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::time::Duration;

    #[test]
    fn export_name_uses_utc_date() {
        assert_eq!(export_file_name(UNIX_EPOCH), "sketch-1970-01-01.png");
        // 2024-02-29 12:00:00 UTC
        let leap = UNIX_EPOCH + Duration::from_secs(1_709_208_000);
        assert_eq!(export_file_name(leap), "sketch-2024-02-29.png");
        let new_year = UNIX_EPOCH + Duration::from_secs(1_735_689_599);
        assert_eq!(export_file_name(new_year), "sketch-2024-12-31.png");
    }

    #[test]
    fn wide_image_is_letterboxed() {
        let img = RgbaImage::from_pixel(200, 100, Rgba([1, 2, 3, 255]));
        let (scaled, origin) = fit_image(&img, 100, 100);
        assert_eq!(scaled.dimensions(), (100, 50));
        assert_eq!(origin, (0, 25));
    }

    #[test]
    fn small_image_grows_to_fit() {
        let img = RgbaImage::from_pixel(10, 20, Rgba([1, 2, 3, 255]));
        let (scaled, origin) = fit_image(&img, 100, 100);
        assert_eq!(scaled.dimensions(), (50, 100));
        assert_eq!(origin, (25, 0));
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        assert!(matches!(decode_image(b"definitely not a png"), Err(CanvasError::Decode(_))));
    }
}
