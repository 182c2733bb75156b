use crate::core_modules::change_detector::MotionRegion;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: u32 = 2;

/// Returns a copy of `image` with an outline drawn around every region.
/// Outlines run from `(x, y)` to `(x + width + 1, y + height + 1)` and are
/// clipped to the image.
pub fn draw_regions(image: &RgbImage, regions: &[MotionRegion]) -> RgbImage {
    let mut canvas = image.clone();
    for region in regions {
        draw_outline(&mut canvas, region, BOX_COLOR, BOX_THICKNESS);
    }
    canvas
}

fn draw_outline(canvas: &mut RgbImage, region: &MotionRegion, color: Rgb<u8>, thickness: u32) {
    let (x, y) = (region.x as i32, region.y as i32);
    // Ring `i` is inset by `i` pixels from the outermost one, which spans
    // `(x, y)` to `(x + width + thickness - 1, y + height + thickness - 1)`.
    for i in 0..thickness {
        let width = (region.width + thickness).saturating_sub(2 * i);
        let height = (region.height + thickness).saturating_sub(2 * i);
        if width == 0 || height == 0 {
            break;
        }
        let ring = Rect::at(x + i as i32, y + i as i32).of_size(width, height);
        draw_hollow_rect_mut(canvas, ring, color);
    }
}
