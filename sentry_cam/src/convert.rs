//! Conversions between `image` buffers and OpenCV matrices.

use image::RgbImage;
use sentry_vision::Frame;
use opencv::{
    core::{self, Mat, Point, Scalar},
    imgproc,
    prelude::*,
};

/// Timestamp text drawn on recorded and displayed frames.
pub const TIMESTAMP_FORMAT: &str = "%A %d %B %Y %I:%M:%S%p";

/// Red, in OpenCV's BGR order.
const TEXT_COLOR: (f64, f64, f64) = (0.0, 0.0, 255.0);

/// Converts a captured BGR matrix into an RGB image buffer.
pub fn bgr_to_rgb_image(bgr: &Mat) -> opencv::Result<Option<RgbImage>> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    Ok(RgbImage::from_raw(width, height, rgb.data_bytes()?.to_vec()))
}

/// Copies an RGB image buffer into a new BGR matrix.
pub fn rgb_image_to_bgr(image: &RgbImage) -> opencv::Result<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        image.height() as i32,
        image.width() as i32,
        core::CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(image.as_raw());

    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

/// Draws `text` at `origin` in the small red Hershey font.
pub fn put_label(frame: &mut Mat, text: &str, origin: Point, scale: f64, thickness: i32) -> opencv::Result<()> {
    let (b, g, r) = TEXT_COLOR;
    imgproc::put_text(
        frame,
        text,
        origin,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        Scalar::new(b, g, r, 0.0),
        thickness,
        imgproc::LINE_8,
        false,
    )
}

/// Stamps `text` in the bottom-left corner.
pub fn put_timestamp(frame: &mut Mat, text: &str) -> opencv::Result<()> {
    let origin = Point::new(10, frame.rows() - 10);
    put_label(frame, text, origin, 0.35, 1)
}

/// The frame as a BGR matrix with its status line and timestamp drawn on,
/// the way it is shown on screen and written to video.
pub fn stamp(frame: &Frame) -> opencv::Result<Mat> {
    let mut mat = rgb_image_to_bgr(frame.image())?;
    let status = format!("Status: {}", frame.status_text());
    put_label(&mut mat, &status, Point::new(10, 20), 0.5, 2)?;
    let timestamp = frame.timestamp().format(TIMESTAMP_FORMAT).to_string();
    put_timestamp(&mut mat, &timestamp)?;
    Ok(mat)
}

/// Same as [`stamp`], back in RGB for sinks that take a `Frame`.
pub fn stamped_frame(frame: &Frame) -> opencv::Result<Frame> {
    let mat = stamp(frame)?;
    Ok(match bgr_to_rgb_image(&mat)? {
        Some(image) => frame.with_image(image),
        None => frame.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn dark(motion: bool) -> Frame {
        Frame::new(RgbImage::new(160, 120), Local::now()).with_motion(motion)
    }

    fn red_pixels(image: &RgbImage, rows: std::ops::Range<u32>) -> usize {
        rows.flat_map(|y| (0..image.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| image.get_pixel(x, y).0[0] > 0)
            .count()
    }

    #[test]
    fn stamped_frame_carries_status_and_timestamp() {
        let stamped = stamped_frame(&dark(true)).unwrap();
        let image = stamped.image();

        assert_eq!(image.dimensions(), (160, 120));
        assert!(red_pixels(image, 5..25) > 0, "status line missing");
        assert!(red_pixels(image, 100..112) > 0, "timestamp missing");
        assert!(stamped.motion());
    }

    #[test]
    fn status_line_depends_on_the_verdict() {
        let moving = stamped_frame(&dark(true)).unwrap();
        let still = stamped_frame(&dark(false)).unwrap();
        assert_ne!(
            red_pixels(moving.image(), 5..25),
            red_pixels(still.image(), 5..25)
        );
    }

    #[test]
    fn colour_round_trips_through_bgr() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgb([200, 10, 30]));
        let back = bgr_to_rgb_image(&rgb_image_to_bgr(&image).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(back, image);
    }
}
