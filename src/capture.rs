use crate::config::{CaptureMethod, ImageFormat};
use crate::foundation::error::ScenecastResult;
use crate::page::ScenePage;
use std::time::Instant;

/// Capture the frame the page is currently displaying.
///
/// The strategy is fixed at run start; incompatible combinations
/// (extension + headless) were rejected before the browser launched, so
/// dispatch here is a plain match over the tagged variants.
pub fn capture_frame(
    page: &mut dyn ScenePage,
    method: CaptureMethod,
    format: ImageFormat,
    jpeg_quality: u32,
    deadline: Instant,
) -> ScenecastResult<Vec<u8>> {
    match method {
        CaptureMethod::Screencast => page.next_screencast_frame(deadline),
        CaptureMethod::Extension => page.grab_visible_tab(),
        CaptureMethod::Screenshot => {
            let quality = match format {
                ImageFormat::Jpeg => Some(jpeg_quality),
                ImageFormat::Png => None,
            };
            page.screenshot(format, quality)
        }
    }
}
