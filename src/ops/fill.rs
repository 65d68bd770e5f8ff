use image::{Rgba, RgbaImage};

use crate::canvas::TiledBitmap;

fn within_tolerance(a: Rgba<u8>, b: Rgba<u8>, tolerance: u8) -> bool {
    a.0.iter().zip(b.0.iter()).all(|(x, y)| x.abs_diff(*y) <= tolerance)
}

/// Scanline flood fill of the region connected (4-way) to `seed` whose
/// pixels lie within `tolerance` of the seed colour on every channel.
pub fn flood_fill(bitmap: &mut TiledBitmap, seed: (u32, u32), color: Rgba<u8>, tolerance: u8) {
    let (w, h) = (bitmap.width(), bitmap.height());
    let (sx, sy) = seed;
    if sx >= w || sy >= h {
        return;
    }
    let target = *bitmap.get_pixel(sx, sy);
    if target == color {
        return;
    }

    let mut visited = vec![false; (w as usize) * (h as usize)];
    let mut stack = vec![(sx, sy)];
    let matches = |bmp: &TiledBitmap, x: u32, y: u32| within_tolerance(*bmp.get_pixel(x, y), target, tolerance);

    while let Some((x, y)) = stack.pop() {
        let row = y as usize * w as usize;
        if visited[row + x as usize] || !matches(bitmap, x, y) {
            continue;
        }
        let mut left = x;
        while left > 0 && !visited[row + left as usize - 1] && matches(bitmap, left - 1, y) {
            left -= 1;
        }
        let mut right = x;
        while right + 1 < w && !visited[row + right as usize + 1] && matches(bitmap, right + 1, y) {
            right += 1;
        }
        for fx in left..=right {
            visited[row + fx as usize] = true;
            bitmap.put_pixel(fx, y, color);
        }
        for fx in left..=right {
            if y > 0 && !visited[row - w as usize + fx as usize] {
                stack.push((fx, y - 1));
            }
            if y + 1 < h && !visited[row + w as usize + fx as usize] {
                stack.push((fx, y + 1));
            }
        }
    }
}

/// Colour of the flattened image at `(x, y)`; `None` outside it.
pub fn sample(image: &RgbaImage, x: u32, y: u32) -> Option<Rgba<u8>> {
    (x < image.width() && y < image.height()).then(|| *image.get_pixel(x, y))
}
