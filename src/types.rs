use std::fmt;

/// One of the three data streams a depth camera can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Color,
    Depth,
    Infrared,
}

impl StreamKind {
    /// Every stream kind, in timestamp-table order.
    pub const ALL: [StreamKind; 3] = [StreamKind::Color, StreamKind::Depth, StreamKind::Infrared];

    /// Slot of this kind in per-kind tables.
    pub const fn index(self) -> usize {
        match self {
            StreamKind::Color => 0,
            StreamKind::Depth => 1,
            StreamKind::Infrared => 2,
        }
    }

    /// The single-bit mask for this kind.
    pub const fn mask(self) -> StreamMask {
        match self {
            StreamKind::Color => StreamMask::COLOR,
            StreamKind::Depth => StreamMask::DEPTH,
            StreamKind::Infrared => StreamMask::INFRARED,
        }
    }

    /// Pixel layout the decoder fills for this kind.
    pub const fn pixel_format(self) -> PixelFormat {
        match self {
            StreamKind::Color => PixelFormat::Rgb8,
            StreamKind::Depth | StreamKind::Infrared => PixelFormat::Gray16,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Color => "color",
            StreamKind::Depth => "depth",
            StreamKind::Infrared => "infrared",
        };
        f.write_str(name)
    }
}

bitflags::bitflags! {
    /// A combination of stream kinds, used both for capture requests and for
    /// the readiness state shared with the producer callbacks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamMask: u8 {
        const DEPTH    = 1 << 0;
        const COLOR    = 1 << 1;
        const INFRARED = 1 << 2;

        const DEPTH_COLOR    = Self::DEPTH.bits() | Self::COLOR.bits();
        const DEPTH_INFRARED = Self::DEPTH.bits() | Self::INFRARED.bits();
    }
}

impl StreamMask {
    /// Whether `kind` is part of this mask.
    pub fn has(self, kind: StreamKind) -> bool {
        self.contains(kind.mask())
    }

    /// Iterate the kinds named by this mask, in table order.
    pub fn kinds(self) -> impl Iterator<Item = StreamKind> {
        StreamKind::ALL.into_iter().filter(move |k| self.has(*k))
    }
}

impl From<StreamKind> for StreamMask {
    fn from(kind: StreamKind) -> Self {
        kind.mask()
    }
}

/// Output resolution presets supported by the sensor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// 160 x 120
    Qqvga,
    /// 320 x 240
    Qvga,
    /// 640 x 480
    Vga,
    /// 1280 x 1024
    Sxga,
}

impl Resolution {
    pub const fn width(self) -> u32 {
        match self {
            Resolution::Qqvga => 160,
            Resolution::Qvga => 320,
            Resolution::Vga => 640,
            Resolution::Sxga => 1280,
        }
    }

    pub const fn height(self) -> u32 {
        match self {
            Resolution::Qqvga => 120,
            Resolution::Qvga => 240,
            Resolution::Vga => 480,
            Resolution::Sxga => 1024,
        }
    }

    /// Parse a preset name such as `vga` (case-insensitive).
    pub fn from_name(name: &str) -> Option<Resolution> {
        match name.trim().to_ascii_lowercase().as_str() {
            "qqvga" => Some(Resolution::Qqvga),
            "qvga" => Some(Resolution::Qvga),
            "vga" => Some(Resolution::Vga),
            "sxga" => Some(Resolution::Sxga),
            _ => None,
        }
    }
}

/// Frame-rate presets supported by the sensor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameRate {
    Fps15,
    Fps30,
    Fps60,
}

impl FrameRate {
    pub const fn hz(self) -> u32 {
        match self {
            FrameRate::Fps15 => 15,
            FrameRate::Fps30 => 30,
            FrameRate::Fps60 => 60,
        }
    }

    pub fn from_hz(hz: u32) -> Option<FrameRate> {
        match hz {
            15 => Some(FrameRate::Fps15),
            30 => Some(FrameRate::Fps30),
            60 => Some(FrameRate::Fps60),
            _ => None,
        }
    }
}

/// Resolution and frame rate negotiated with the driver for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl OutputMode {
    pub const fn new(resolution: Resolution, fps: FrameRate) -> Self {
        Self {
            width: resolution.width(),
            height: resolution.height(),
            fps: fps.hz(),
        }
    }
}

/// Pixel layout of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed 8-bit RGB, 3 bytes per pixel.
    Rgb8,
    /// 16-bit native-endian samples (depth in millimeters, or raw IR).
    Gray16,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray16 => 2,
        }
    }
}

/// A 2-D pixel array for one stream kind.
///
/// Rows are `stride` bytes apart; `stride` is at least
/// `width * bytes_per_pixel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl Image {
    /// Allocate a zero-filled, tightly packed image for `kind`.
    pub fn zeroed(kind: StreamKind, width: u32, height: u32) -> Self {
        let format = kind.pixel_format();
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            kind,
            width,
            height,
            format,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes of row `y`, without stride padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        let len = self.width as usize * self.format.bytes_per_pixel();
        self.data.get(start..start + len)
    }

    /// 16-bit sample at (x, y) for depth and infrared images.
    pub fn sample_u16(&self, x: u32, y: u32) -> Option<u16> {
        if self.format != PixelFormat::Gray16 || x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let at = x as usize * 2;
        Some(u16::from_ne_bytes([row[at], row[at + 1]]))
    }

    /// RGB triple at (x, y) for color images.
    pub fn rgb(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if self.format != PixelFormat::Rgb8 || x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let at = x as usize * 3;
        Some([row[at], row[at + 1], row[at + 2]])
    }
}

/// One captured image and the sensor timestamp it was produced at.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub image: Image,
    pub timestamp_ms: f64,
}

/// Device identification reported by the sensor driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: usize,
    pub serial_number: String,
    pub vendor_name: String,
    pub vendor_id: u16,
    pub product_name: String,
    /// Driver connection string, unique per attached device.
    pub connection: String,
    pub bus: u8,
    pub address: u8,
}

/// Focal lengths (pixels) and stereo baseline (centimeters) of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub focal_length_color: f32,
    pub focal_length_depth: f32,
    pub baseline: f32,
}
