//! On-screen preview of the feed, or of the region of interest when aiming.

use crate::convert;
use opencv::highgui;
use sentry_vision::core_modules::region::RegionOfInterest;
use sentry_vision::FrameReport;

const FEED_WINDOW: &str = "Security Feed";
const AIM_WINDOW: &str = "Region of Interest";

pub enum Preview {
    /// The annotated frame with its status line and timestamp.
    Feed,
    /// Only the cropped colour region, for pointing the camera.
    Aim(RegionOfInterest),
}

impl Preview {
    pub fn show(&self, report: &FrameReport) -> opencv::Result<()> {
        match self {
            Preview::Feed => {
                let mat = convert::stamp(&report.frame)?;
                highgui::imshow(FEED_WINDOW, &mat)?;
            }
            Preview::Aim(region) => match region.extract_color(report.frame.image()) {
                Ok(roi) => {
                    let mat = convert::rgb_image_to_bgr(&roi)?;
                    highgui::imshow(AIM_WINDOW, &mat)?;
                }
                Err(e) => log::warn!("cannot show region of interest: {e}"),
            },
        }
        // The window is not painted without a key poll.
        highgui::wait_key(1)?;
        Ok(())
    }

    pub fn close() {
        if let Err(e) = highgui::destroy_all_windows() {
            log::warn!("failed to close preview windows: {e}");
        }
    }
}
