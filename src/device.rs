//! Static e-reader device profiles.
//!
//! Every profile records the panel resolution, the number of gray levels the panel can
//! show and the contrast scale used as the default gamma for grayscale output.

use std::collections::HashMap;

use image::Rgba;
use lazy_static::lazy_static;

use crate::error::{Error, Result};
use crate::imgutils::palette::Palette;
use crate::types::Orientation;

/// Number of distinct gray levels a device panel can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PaletteType {
    Palette4,
    Palette15,
    Palette16,
}

impl PaletteType {
    pub fn cardinality(&self) -> usize {
        match self {
            PaletteType::Palette4 => 4,
            PaletteType::Palette15 => 15,
            PaletteType::Palette16 => 16,
        }
    }

    /// Gray levels of this palette, darkest first.
    pub fn palette(&self) -> Palette {
        let levels: Vec<u8> = match self {
            PaletteType::Palette4 => vec![0x00, 0x55, 0xaa, 0xff],
            // 15-level panels cannot show 0xee
            PaletteType::Palette15 => (0..14u8).map(|i| i * 0x11).chain([0xff]).collect(),
            PaletteType::Palette16 => (0..16u8).map(|i| i * 0x11).collect(),
        };
        Palette::new(levels.into_iter().map(|v| Rgba([v, v, v, 0xff])).collect())
    }
}

/// Static record of a target e-reader.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceProfile {
    pub code: &'static str,
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub palette: PaletteType,
    pub scale: f64,
}

const DEFAULT_SCALE: f64 = 1.8;

const fn profile(
    code: &'static str,
    name: &'static str,
    width: u32,
    height: u32,
    palette: PaletteType,
) -> DeviceProfile {
    DeviceProfile {
        code,
        name,
        width,
        height,
        palette,
        scale: DEFAULT_SCALE,
    }
}

static PROFILES: &[DeviceProfile] = &[
    profile("K1", "Kindle 1", 600, 670, PaletteType::Palette4),
    profile("K2", "Kindle 2", 600, 670, PaletteType::Palette15),
    profile("K11", "Kindle 11", 1072, 1448, PaletteType::Palette16),
    profile("K34", "Kindle Keyboard/Touch", 600, 800, PaletteType::Palette16),
    profile("K578", "Kindle", 600, 800, PaletteType::Palette16),
    profile("KDX", "Kindle DX/DXG", 824, 1000, PaletteType::Palette16),
    profile("KPW", "Kindle Paperwhite 1/2", 758, 1024, PaletteType::Palette16),
    profile("KV", "Kindle Paperwhite 3/4/Voyage/Oasis", 1072, 1448, PaletteType::Palette16),
    profile("KPW5", "Kindle Paperwhite 5/Signature Edition", 1236, 1648, PaletteType::Palette16),
    profile("KPW6", "Kindle Paperwhite 6", 1264, 1680, PaletteType::Palette16),
    profile("KCS12", "Kindle Colorsoft", 1264, 1680, PaletteType::Palette16),
    profile("KO", "Kindle Oasis 2/3", 1264, 1680, PaletteType::Palette16),
    profile("KS", "Kindle Scribe", 1860, 2480, PaletteType::Palette16),
    profile("KOMT", "Kobo Mini/Touch", 600, 800, PaletteType::Palette16),
    profile("KOG", "Kobo Glo", 768, 1024, PaletteType::Palette16),
    profile("KOGHD", "Kobo Glo HD", 1072, 1448, PaletteType::Palette16),
    profile("KOA", "Kobo Aura", 758, 1024, PaletteType::Palette16),
    profile("KOAHD", "Kobo Aura HD", 1080, 1440, PaletteType::Palette16),
    profile("KOAH2O", "Kobo Aura H2O", 1080, 1430, PaletteType::Palette16),
    profile("KOAO", "Kobo Aura ONE", 1404, 1872, PaletteType::Palette16),
    profile("KON", "Kobo Nia", 758, 1024, PaletteType::Palette16),
    profile("KOC", "Kobo Clara HD/Clara 2E", 1072, 1448, PaletteType::Palette16),
    profile("KOCC", "Kobo Clara Colour", 1072, 1448, PaletteType::Palette16),
    profile("KOL", "Kobo Libra H2O/Libra 2", 1264, 1680, PaletteType::Palette16),
    profile("KOLC", "Kobo Libra Colour", 1264, 1680, PaletteType::Palette16),
    profile("KOF", "Kobo Forma", 1440, 1920, PaletteType::Palette16),
    profile("KOS", "Kobo Sage", 1440, 1920, PaletteType::Palette16),
    profile("KOE", "Kobo Elipsa", 1404, 1872, PaletteType::Palette16),
    profile("OTHER", "Other", 0, 0, PaletteType::Palette16),
];

lazy_static! {
    static ref PROFILE_INDEX: HashMap<&'static str, &'static DeviceProfile> =
        PROFILES.iter().map(|p| (p.code, p)).collect();
}

impl DeviceProfile {
    /// Looks a profile up by its device code, ignoring case.
    ///
    /// # Arguments
    ///
    /// * `code` - Device code such as `"KPW5"` or `"koc"`
    ///
    /// # Returns
    ///
    /// * `Ok(&DeviceProfile)` - The matching static profile
    /// * `Err(Error::Config)` - The code names no known device
    pub fn lookup(code: &str) -> Result<&'static DeviceProfile> {
        let normalized = code.trim().to_ascii_uppercase();
        PROFILE_INDEX
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| Error::Config(format!("Unknown device type '{}'", code)))
    }

    /// All known profiles, in declaration order.
    pub fn all() -> &'static [DeviceProfile] {
        PROFILES
    }

    /// Target resolution as `(width, height)`.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_dimensions(self.width, self.height)
    }

    /// Profiles without a resolution leave page sizes untouched.
    pub fn has_resolution(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}
