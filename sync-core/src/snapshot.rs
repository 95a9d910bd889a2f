//! Synchronized weather state as seen by the renderer.
//!
//! A [`WeatherSnapshot`] is a plain value. The engine owns the authoritative
//! copy, mutates it only through the merge and asset completion paths, and
//! publishes immutable clones for readers.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use sync_types::{AssetRef, Timestamp};
use thiserror::Error;

/// Bitmap construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitmapError {
    /// Width or height is zero.
    #[error("bitmap dimensions must be non-zero, got {width}x{height}")]
    EmptyDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// Pixel buffer does not match the dimensions.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize {
        /// Bytes required for the dimensions.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
}

/// A decoded RGBA8 image.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Bytes per pixel (RGBA8).
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Wrap an RGBA8 pixel buffer.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, BitmapError> {
        if width == 0 || height == 0 {
            return Err(BitmapError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(BitmapError::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &format!("[{} bytes]", self.pixels.len()))
            .finish()
    }
}

/// Theme selector chosen by the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Theme(u8);

impl Theme {
    /// Theme used until the companion picks one.
    pub const DEFAULT: Theme = Theme(3);

    /// Create a theme selector.
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Raw selector value.
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The condition icon: what is displayed and what is being fetched.
///
/// The displayed bitmap survives failed or superseded fetches; only a
/// successful completion for the pending reference, or an explicit clear,
/// replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionImage {
    bitmap: Option<Arc<Bitmap>>,
    source: Option<AssetRef>,
    pending: Option<AssetRef>,
}

impl ConditionImage {
    /// Bitmap to draw, if any.
    pub fn bitmap(&self) -> Option<&Arc<Bitmap>> {
        self.bitmap.as_ref()
    }

    /// Reference the displayed bitmap was decoded from.
    pub fn source(&self) -> Option<&AssetRef> {
        self.source.as_ref()
    }

    /// Reference currently being fetched.
    pub fn pending(&self) -> Option<&AssetRef> {
        self.pending.as_ref()
    }

    /// Note that `asset` should be displayed.
    ///
    /// Returns true if a fetch must be started; false if the asset is already
    /// displayed or already being fetched.
    pub fn request(&mut self, asset: &AssetRef) -> bool {
        if self.pending.as_ref() == Some(asset) {
            return false;
        }
        if self.source.as_ref() == Some(asset) && self.bitmap.is_some() {
            self.pending = None;
            return false;
        }
        self.pending = Some(asset.clone());
        true
    }

    /// Install a decoded bitmap for `asset`.
    ///
    /// Returns false (and changes nothing) if `asset` is no longer the
    /// pending reference.
    pub fn complete(&mut self, asset: &AssetRef, bitmap: Arc<Bitmap>) -> bool {
        if self.pending.as_ref() != Some(asset) {
            return false;
        }
        self.pending = None;
        self.source = Some(asset.clone());
        self.bitmap = Some(bitmap);
        true
    }

    /// Give up on fetching `asset`, keeping whatever is displayed.
    ///
    /// Returns true if `asset` was pending.
    pub fn abandon(&mut self, asset: &AssetRef) -> bool {
        if self.pending.as_ref() != Some(asset) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Drop the displayed bitmap and any pending fetch.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl Serialize for ConditionImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ConditionImage", 4)?;
        state.serialize_field("source", &self.source.as_ref().map(AssetRef::as_str))?;
        state.serialize_field("pending", &self.pending.as_ref().map(AssetRef::as_str))?;
        state.serialize_field("width", &self.bitmap.as_ref().map(|b| b.width()))?;
        state.serialize_field("height", &self.bitmap.as_ref().map(|b| b.height()))?;
        state.end()
    }
}

/// Everything the renderer needs, as of one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    /// Short condition description.
    pub condition: Option<String>,
    /// High temperature.
    pub high: Option<f64>,
    /// Low temperature.
    pub low: Option<f64>,
    /// Condition icon.
    pub image: ConditionImage,
    /// When the held data was received (or produced, if stamped).
    pub received_at: Option<Timestamp>,
    /// How old data may get before a refresh is requested.
    #[serde(rename = "refresh_interval_ms", serialize_with = "duration_millis")]
    pub refresh_interval: Duration,
    /// Theme selector.
    pub theme: Theme,
}

fn duration_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

impl WeatherSnapshot {
    /// Empty state with the configured interval and theme.
    pub fn new(refresh_interval: Duration, theme: Theme) -> Self {
        Self {
            condition: None,
            high: None,
            low: None,
            image: ConditionImage::default(),
            received_at: None,
            refresh_interval,
            theme,
        }
    }

    /// True if nothing has been received yet.
    pub fn is_empty(&self) -> bool {
        self.received_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(side: u32) -> Arc<Bitmap> {
        let len = (side * side) as usize * Bitmap::BYTES_PER_PIXEL;
        Arc::new(Bitmap::from_rgba(side, side, vec![0x7f; len]).unwrap())
    }

    #[test]
    fn bitmap_validates_buffer() {
        assert!(matches!(
            Bitmap::from_rgba(0, 4, vec![]),
            Err(BitmapError::EmptyDimensions { .. })
        ));
        assert_eq!(
            Bitmap::from_rgba(2, 2, vec![0; 15]),
            Err(BitmapError::BufferSize {
                expected: 16,
                actual: 15
            })
        );
        assert!(Bitmap::from_rgba(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn bitmap_debug_hides_pixels() {
        let debug = format!("{:?}", bitmap(2));
        assert!(debug.contains("[16 bytes]"));
        assert!(!debug.contains("127"));
    }

    #[test]
    fn request_deduplicates_pending_and_displayed() {
        let icon = AssetRef::for_content(b"sun");
        let mut image = ConditionImage::default();

        assert!(image.request(&icon));
        assert!(!image.request(&icon));

        assert!(image.complete(&icon, bitmap(2)));
        assert!(image.pending().is_none());
        assert!(!image.request(&icon));
    }

    #[test]
    fn superseded_completion_is_discarded() {
        let sun = AssetRef::for_content(b"sun");
        let rain = AssetRef::for_content(b"rain");
        let mut image = ConditionImage::default();

        image.request(&sun);
        image.request(&rain);

        assert!(!image.complete(&sun, bitmap(2)));
        assert!(image.bitmap().is_none());
        assert_eq!(image.pending(), Some(&rain));
    }

    #[test]
    fn abandon_keeps_displayed_bitmap() {
        let sun = AssetRef::for_content(b"sun");
        let rain = AssetRef::for_content(b"rain");
        let mut image = ConditionImage::default();
        image.request(&sun);
        image.complete(&sun, bitmap(2));

        image.request(&rain);
        assert!(image.abandon(&rain));

        assert_eq!(image.source(), Some(&sun));
        assert!(image.bitmap().is_some());
        assert!(image.pending().is_none());
        assert!(!image.abandon(&rain));
    }

    #[test]
    fn clear_drops_everything() {
        let sun = AssetRef::for_content(b"sun");
        let mut image = ConditionImage::default();
        image.request(&sun);
        image.complete(&sun, bitmap(2));

        image.clear();
        assert_eq!(image, ConditionImage::default());
        assert!(!image.complete(&sun, bitmap(2)));
    }

    #[test]
    fn snapshot_serializes_without_pixels() {
        let mut snapshot = WeatherSnapshot::new(Duration::from_secs(60), Theme::DEFAULT);
        snapshot.condition = Some("Clear".into());
        let sun = AssetRef::for_content(b"sun");
        snapshot.image.request(&sun);
        snapshot.image.complete(&sun, bitmap(3));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["condition"], "Clear");
        assert_eq!(json["refresh_interval_ms"], 60_000);
        assert_eq!(json["theme"], 3);
        assert_eq!(json["image"]["width"], 3);
        assert!(json["image"].get("pixels").is_none());
    }
}
