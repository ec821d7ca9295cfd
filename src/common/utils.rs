use std::path::Path;

pub trait PathExt {
    fn ext_lower(&self) -> String;
    fn lossy_string(&self) -> String;
}

impl PathExt for Path {
    fn ext_lower(&self) -> String {
        self.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn lossy_string(&self) -> String {
        self.to_string_lossy().into_owned()
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Resize dimensions so that the larger side equals `small_height`, preserving aspect ratio.
/// Images already smaller than `small_height` keep their size.
pub fn small_width_height(width: u32, height: u32, small_height: u32) -> (u32, u32) {
    let (nwidth, nheight) = if width >= std::cmp::max(height, small_height) {
        (small_height, (height as u64 * small_height as u64 / width as u64) as u32)
    } else if height >= std::cmp::max(width, small_height) {
        ((width as u64 * small_height as u64 / height as u64) as u32, small_height)
    } else {
        (width, height)
    };

    (nwidth.max(1), nheight.max(1))
}
