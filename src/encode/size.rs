use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::foundation::error::{RenderError, RenderResult};
use crate::render::frame::FrameRGB;

/// Width of panoramic generator output that is letterboxed into 16:9.
const PANORAMA_WIDTH: u32 = 2048;
/// Columns dropped from each side of a panoramic frame.
const PANORAMA_CROP: u32 = 112;

/// The three supported encoder resolutions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "SizeRepr", into = "String")]
pub enum OutputSize {
    /// 1024x1024.
    Square1024,
    /// 512x512.
    Square512,
    /// 1920x1080.
    Wide1080p,
}

impl OutputSize {
    /// `(width, height)` in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Square1024 => (1024, 1024),
            Self::Square512 => (512, 512),
            Self::Wide1080p => (1920, 1080),
        }
    }

    /// Encoder size string, e.g. `1920x1080`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square1024 => "1024x1024",
            Self::Square512 => "512x512",
            Self::Wide1080p => "1920x1080",
        }
    }

    /// Byte length of one conformed `rgb24` frame.
    pub fn frame_bytes(self) -> usize {
        let (w, h) = self.dimensions();
        FrameRGB::byte_len(w, h)
    }

    /// Bring `frame` to exactly this size.
    ///
    /// Frames already at the target size pass through untouched. A 2048-wide frame targeting
    /// 1920x1080 loses 112 columns on each side and is bilinearly resized. Anything else means
    /// the generator was configured for a different size.
    pub fn conform(self, frame: FrameRGB) -> RenderResult<FrameRGB> {
        let (width, height) = self.dimensions();
        if frame.width == width && frame.height == height {
            return Ok(frame);
        }
        if self == Self::Wide1080p && frame.width == PANORAMA_WIDTH {
            return crop_and_resize(frame, width, height);
        }
        Err(RenderError::config_mismatch(format!(
            "generator output is {}x{}, but the requested output size is {}",
            frame.width,
            frame.height,
            self.as_str()
        )))
    }
}

fn crop_and_resize(frame: FrameRGB, width: u32, height: u32) -> RenderResult<FrameRGB> {
    let (src_w, src_h) = (frame.width, frame.height);
    if frame.data.len() != FrameRGB::byte_len(src_w, src_h) {
        return Err(RenderError::validation(
            "frame.data size mismatch with width*height*3",
        ));
    }
    let img = RgbImage::from_raw(src_w, src_h, frame.data)
        .ok_or_else(|| RenderError::validation("frame buffer does not match its dimensions"))?;
    let cropped =
        imageops::crop_imm(&img, PANORAMA_CROP, 0, src_w - 2 * PANORAMA_CROP, src_h).to_image();
    let resized = imageops::resize(&cropped, width, height, FilterType::Triangle);
    Ok(FrameRGB {
        width,
        height,
        data: resized.into_raw(),
    })
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputSize {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1024" | "1024x1024" => Ok(Self::Square1024),
            "512" | "512x512" => Ok(Self::Square512),
            "1920" | "1920x1080" => Ok(Self::Wide1080p),
            other => Err(RenderError::validation(format!(
                "unsupported output size '{other}' (expected 1024x1024, 512x512 or 1920x1080)"
            ))),
        }
    }
}

impl TryFrom<u32> for OutputSize {
    type Error = RenderError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        value.to_string().parse()
    }
}

impl From<OutputSize> for String {
    fn from(value: OutputSize) -> Self {
        value.as_str().to_string()
    }
}

// Accepts both the numeric selector (`1024`) and the size string (`"1024x1024"`).
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum SizeRepr {
    Number(u32),
    Text(String),
}

impl TryFrom<SizeRepr> for OutputSize {
    type Error = RenderError;

    fn try_from(value: SizeRepr) -> Result<Self, Self::Error> {
        match value {
            SizeRepr::Number(n) => n.try_into(),
            SizeRepr::Text(s) => s.parse(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/size.rs"]
mod tests;
