use std::path::Path;
use std::sync::Arc;

use egui::Pos2;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::error::CanvasResult;
use crate::ops::draw::DrawOp;
use crate::ops::shapes::{edge_coverage, sdf_polygon};

/// Edge length of the generated built-in icons.
const BUILTIN_SIZE: u32 = 128;

#[derive(Clone, Debug)]
pub struct Stamp {
    pub name: String,
    pub image: Arc<RgbaImage>,
}

/// Named stamp icons available to the stamp tool.
#[derive(Clone, Debug, Default)]
pub struct StampSet {
    stamps: Vec<Stamp>,
}

impl StampSet {
    /// Procedurally drawn icons that exist without any files on disk.
    pub fn builtin() -> Self {
        let star: Vec<(f32, f32)> = (0..10)
            .map(|i| {
                let r = if i % 2 == 0 { 1.0 } else { 0.45 };
                let a = std::f32::consts::PI * i as f32 / 5.0 - std::f32::consts::FRAC_PI_2;
                (r * a.cos(), r * a.sin())
            })
            .collect();
        let diamond = vec![(0.0, -1.0), (0.75, 0.0), (0.0, 1.0), (-0.75, 0.0)];
        let triangle = vec![(0.0, -0.95), (0.95, 0.8), (-0.95, 0.8)];
        let circle: Vec<(f32, f32)> = (0..48)
            .map(|i| {
                let a = std::f32::consts::TAU * i as f32 / 48.0;
                (0.95 * a.cos(), 0.95 * a.sin())
            })
            .collect();

        let stamps = vec![
            icon("star", &star, Rgba([250, 200, 40, 255])),
            icon("circle", &circle, Rgba([60, 130, 230, 255])),
            icon("diamond", &diamond, Rgba([40, 180, 170, 255])),
            icon("triangle", &triangle, Rgba([90, 190, 70, 255])),
        ];
        Self { stamps }
    }

    /// Every decodable image in `dir`, named after its file stem, in file
    /// name order. Files that fail to decode are skipped.
    pub fn load_dir(dir: &Path) -> CanvasResult<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut stamps = Vec::new();
        for path in paths {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else { continue };
            match crate::io::load_image(&path) {
                Ok(image) => stamps.push(Stamp { name, image: Arc::new(image) }),
                Err(e) => log::debug!("skipping stamp {}: {}", path.display(), e),
            }
        }
        log::info!("loaded {} stamps from {}", stamps.len(), dir.display());
        Ok(Self { stamps })
    }

    /// Add `other`'s stamps, replacing same-named ones.
    pub fn merge(&mut self, other: StampSet) {
        for stamp in other.stamps {
            if let Some(slot) = self.stamps.iter_mut().find(|s| s.name == stamp.name) {
                *slot = stamp;
            } else {
                self.stamps.push(stamp);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Stamp> {
        self.stamps.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stamps.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

fn icon(name: &str, unit_verts: &[(f32, f32)], color: Rgba<u8>) -> Stamp {
    let half = BUILTIN_SIZE as f32 * 0.5;
    let verts: Vec<(f32, f32)> = unit_verts.iter().map(|(x, y)| (half + x * half, half + y * half)).collect();
    let image = RgbaImage::from_fn(BUILTIN_SIZE, BUILTIN_SIZE, |x, y| {
        let a = edge_coverage(sdf_polygon(x as f32 + 0.5, y as f32 + 0.5, &verts));
        Rgba([color[0], color[1], color[2], (color[3] as f32 * a).round() as u8])
    });
    Stamp { name: name.to_string(), image: Arc::new(image) }
}

/// Draw op placing `stamp` centred on `center`, its longer edge scaled to
/// `size` pixels.
pub fn place(stamp: &Stamp, center: Pos2, size: f32, opacity: f32) -> DrawOp {
    let (w, h) = stamp.image.dimensions();
    let longest = w.max(h).max(1) as f32;
    let factor = size.max(1.0) / longest;
    let tw = ((w as f32 * factor).round() as u32).max(1);
    let th = ((h as f32 * factor).round() as u32).max(1);
    let image = if (tw, th) == (w, h) {
        Arc::clone(&stamp.image)
    } else {
        Arc::new(imageops::resize(&*stamp.image, tw, th, FilterType::Triangle))
    };
    let origin = (
        (center.x - tw as f32 * 0.5).round() as i32,
        (center.y - th as f32 * 0.5).round() as i32,
    );
    DrawOp::Image { image, origin, opacity }
}
