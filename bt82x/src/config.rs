//! Types used during BT82x boot and display configuration.
//!
//! The types in this module are used as arguments for some of the methods
//! of [`BT82x`](super::BT82x).

use log::warn;

/// Selects a clock frequency for the system clock.
///
/// The system clock is derived from the chip's 576MHz PLL, so only
/// frequencies that divide it reasonably are offered.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClockFrequency {
    F36MHz,
    F48MHz,
    F60MHz,
    F72MHz,
    F84MHz,
}

impl ClockFrequency {
    pub const DEFAULT_SYSCLK_FREQ: Self = Self::F72MHz;

    /// The PLL output the system clock is divided from.
    pub const SYSPLL_FREQ: u32 = 576_000_000;

    /// Returns the frequency as a multiple of 12MHz.
    pub const fn multiplier(self) -> u32 {
        match self {
            ClockFrequency::F36MHz => 3,
            ClockFrequency::F48MHz => 4,
            ClockFrequency::F60MHz => 5,
            ClockFrequency::F72MHz => 6,
            ClockFrequency::F84MHz => 7,
        }
    }

    pub const fn reg_frequency_value(self) -> u32 {
        self.multiplier() * 12_000_000
    }

    /// The divider field for `SYSCLKDIV`, which is the PLL frequency
    /// divided by the system clock, rounded, minus one.
    pub const fn sysclkdiv_freq(self) -> u8 {
        let freq = self.reg_frequency_value();
        let rounded = (Self::SYSPLL_FREQ + freq / 2) / freq;
        (rounded - 1) as u8
    }
}

impl Default for ClockFrequency {
    fn default() -> Self {
        Self::DEFAULT_SYSCLK_FREQ
    }
}

/// The size of the DDR fitted alongside the chip.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum DdrSize {
    Mb128 = 0,
    Mb512 = 2,
}

impl DdrSize {
    /// The value for the size field of `SETDDRTYPE`.
    pub const fn to_raw(self) -> u8 {
        self as u8
    }

    pub const fn bytes(self) -> u32 {
        match self {
            DdrSize::Mb128 => 128 * 1024 * 1024,
            DdrSize::Mb512 => 512 * 1024 * 1024,
        }
    }
}

impl Default for DdrSize {
    fn default() -> Self {
        Self::Mb128
    }
}

/// Settings for [`BT82x::boot`](crate::BT82x::boot).
///
/// This behaves as a "builder" type, with methods that modify its parameters.
/// The default value for each parameter matches the usual BT820 board
/// configuration.
#[derive(Clone, Debug)]
pub struct BootParameters {
    pub(crate) clock: ClockFrequency,
    pub(crate) ddr_size: DdrSize,
    pub(crate) touch: bool,
    pub(crate) audio: bool,
    pub(crate) watchdog: bool,
    pub(crate) poll_limit: u32,
}

impl BootParameters {
    pub const DEFAULT_POLL_LIMIT: u32 = 100;

    pub fn new() -> Self {
        core::default::Default::default()
    }

    pub fn clock<'a>(&'a mut self, v: ClockFrequency) -> &'a mut Self {
        self.clock = v;
        self
    }

    pub fn ddr_size<'a>(&'a mut self, v: DdrSize) -> &'a mut Self {
        self.ddr_size = v;
        self
    }

    pub fn touch<'a>(&'a mut self, v: bool) -> &'a mut Self {
        self.touch = v;
        self
    }

    pub fn audio<'a>(&'a mut self, v: bool) -> &'a mut Self {
        self.audio = v;
        self
    }

    pub fn watchdog<'a>(&'a mut self, v: bool) -> &'a mut Self {
        self.watchdog = v;
        self
    }

    /// Sets how many times each boot stage polls its register before
    /// giving up with [`Error::Timeout`](crate::error::Error::Timeout).
    pub fn poll_limit<'a>(&'a mut self, v: u32) -> &'a mut Self {
        self.poll_limit = v;
        self
    }
}

impl Default for BootParameters {
    fn default() -> Self {
        Self {
            clock: ClockFrequency::DEFAULT_SYSCLK_FREQ,
            ddr_size: DdrSize::Mb128,
            touch: true,
            audio: true,
            watchdog: true,
            poll_limit: Self::DEFAULT_POLL_LIMIT,
        }
    }
}

/// Selects which clock edge of the pixel clock where video data will be sampled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClockPolarity {
    RisingEdge,
    FallingEdge,
}

impl ClockPolarity {
    pub const fn reg_pclk_pol_value(self) -> u32 {
        match self {
            Self::RisingEdge => 0,
            Self::FallingEdge => 1,
        }
    }
}

/// Represents the period transition cycles for one dimension (horizontal or
/// vertical) of the video raster.
///
/// For horizontal parameters, the values are in pixel clocks. For vertical
/// parameters, the values are in lines.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VideoTimingDimension {
    pub total: u16,
    pub visible: u16,
    pub offset: u16,
    pub sync_start: u16,
    pub sync_end: u16,
}

impl VideoTimingDimension {
    /// Calculates a `VideoTimingDimension` from the sizes of the
    /// individual periods in the cycle.
    ///
    /// A `VideoTimingDimension` captures the number of steps _into_ a
    /// period where each event occurs, but when describing a mode we often
    /// speak of how many cycles each period has on its own, and so this
    /// function allows converting from the latter to the former automatically.
    pub const fn calculate(active: u16, front_porch: u16, sync: u16, back_porch: u16) -> Self {
        Self {
            total: active + front_porch + sync + back_porch,
            visible: active,
            offset: front_porch + sync + back_porch,
            sync_start: front_porch,
            sync_end: front_porch + sync,
        }
    }
}

/// Represents the timing parameters for video output.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DisplayParameters {
    pub pclk_div: u8,
    pub pclk_pol: ClockPolarity,
    pub horiz: VideoTimingDimension,
    pub vert: VideoTimingDimension,
}

/// Display resolutions with built-in timings.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DisplayPreset {
    Fhd1920x1080At60,
    Wuxga1920x1200At60,
}

impl Default for DisplayPreset {
    fn default() -> Self {
        Self::Wuxga1920x1200At60
    }
}

/// The largest width or height the line buffer supports.
pub const MAX_DIMENSION: u32 = 2047;

impl DisplayParameters {
    /// Approximates reasonable timings for a panel of the given size and
    /// refresh rate, given the system clock frequency in Hz.
    ///
    /// Sizes larger than [`MAX_DIMENSION`](MAX_DIMENSION) are trimmed. If
    /// the system clock is too slow for the requested refresh rate then the
    /// rate is lowered to the fastest achievable one.
    pub fn derive(width: u32, height: u32, refresh_rate: u32, freq: u32) -> Self {
        let width = trim_dimension("width", width);
        let height = trim_dimension("height", height);
        let pixels = width * height;

        let mut min_cycles = pixels + (pixels >> 2);
        let mut max_rate = freq / min_cycles;
        if refresh_rate > max_rate {
            min_cycles = pixels + (pixels >> 3);
            max_rate = freq / min_cycles;
        }

        let (refresh_rate, pclk) = if max_rate < refresh_rate {
            warn!("frame rate limited to {}Hz", max_rate);
            (core::cmp::max(max_rate, 1), 1)
        } else {
            let rate = core::cmp::max(refresh_rate, 1);
            (rate, (max_rate / rate).max(1).min(u8::MAX as u32))
        };

        let cycles = freq / (refresh_rate * pclk);
        let vcycle = ((height as u64 * cycles as u64) / pixels as u64) as u32;
        let vcycle = core::cmp::max((vcycle + ((vcycle + height) >> 1) + height + height) >> 2, 1);
        let hcycle = cycles / vcycle;
        let hoffset = hcycle.saturating_sub(width) >> 1;
        let voffset = vcycle.saturating_sub(height) >> 1;
        let hsync1 = hoffset >> 1;
        let vsync1 = voffset >> 1;

        Self {
            pclk_div: pclk as u8,
            pclk_pol: ClockPolarity::FallingEdge,
            horiz: VideoTimingDimension {
                total: hcycle as u16,
                visible: width as u16,
                offset: (hoffset + hsync1) as u16,
                sync_start: 0,
                sync_end: hsync1 as u16,
            },
            vert: VideoTimingDimension {
                total: vcycle as u16,
                visible: height as u16,
                offset: (voffset + vsync1) as u16,
                sync_start: 0,
                sync_end: vsync1 as u16,
            },
        }
    }

    /// Returns the timings for a preset, given the system clock frequency
    /// in Hz.
    pub fn preset(preset: DisplayPreset, freq: u32) -> Self {
        match preset {
            DisplayPreset::Fhd1920x1080At60 => Self::derive(1920, 1080, 60, freq),
            DisplayPreset::Wuxga1920x1200At60 => Self::WUXGA_1920X1200_60HZ,
        }
    }

    /// Known-good timings for a 1920x1200 panel with the system clock at
    /// 72MHz.
    pub const WUXGA_1920X1200_60HZ: Self = Self {
        pclk_div: 1,
        pclk_pol: ClockPolarity::RisingEdge,
        horiz: VideoTimingDimension {
            total: 2080,
            visible: 1920,
            offset: 50,
            sync_start: 0,
            sync_end: 30,
        },
        vert: VideoTimingDimension {
            total: 1244,
            visible: 1200,
            offset: 10,
            sync_start: 0,
            sync_end: 3,
        },
    };

    /// Returns the refresh rate these timings produce, in millihertz, given
    /// the system clock frequency in Hz.
    pub fn refresh_rate_millihertz(&self, freq: u32) -> u32 {
        let per_frame =
            self.horiz.total as u64 * self.vert.total as u64 * core::cmp::max(self.pclk_div, 1) as u64;
        if per_frame == 0 {
            return 0;
        }
        ((freq as u64 * 1000) / per_frame) as u32
    }
}

fn trim_dimension(name: &str, v: u32) -> u32 {
    if v > MAX_DIMENSION {
        warn!("display {} {} is too large, trimming to {}", name, v, MAX_DIMENSION);
        MAX_DIMENSION
    } else if v == 0 {
        1
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_frequency() {
        assert_eq!(ClockFrequency::F72MHz.reg_frequency_value(), 72_000_000);
        assert_eq!(ClockFrequency::F72MHz.sysclkdiv_freq(), 7);
        assert_eq!(ClockFrequency::F36MHz.sysclkdiv_freq(), 15);
        assert_eq!(ClockFrequency::F60MHz.sysclkdiv_freq(), 9);
        assert_eq!(ClockFrequency::F84MHz.sysclkdiv_freq(), 6);
        assert_eq!(ClockFrequency::default(), ClockFrequency::F72MHz);
    }

    #[test]
    fn test_boot_parameters_builder() {
        let mut params = BootParameters::new();
        params.clock(ClockFrequency::F48MHz).audio(false).poll_limit(5);
        assert_eq!(params.clock, ClockFrequency::F48MHz);
        assert_eq!(params.ddr_size, DdrSize::Mb128);
        assert!(params.touch);
        assert!(!params.audio);
        assert_eq!(params.poll_limit, 5);
    }

    #[test]
    fn test_derive_fhd() {
        let got = DisplayParameters::derive(1920, 1080, 60, 72_000_000);
        // 72MHz can't drive 1080p at 60Hz, so the rate drops to 30Hz.
        let want = DisplayParameters {
            pclk_div: 1,
            pclk_pol: ClockPolarity::FallingEdge,
            horiz: VideoTimingDimension {
                total: 2099,
                visible: 1920,
                offset: 133,
                sync_start: 0,
                sync_end: 44,
            },
            vert: VideoTimingDimension {
                total: 1143,
                visible: 1080,
                offset: 46,
                sync_start: 0,
                sync_end: 15,
            },
        };
        assert_eq!(got, want);
    }

    #[test]
    fn test_derive_small_panel() {
        let got = DisplayParameters::derive(800, 480, 60, 72_000_000);
        assert_eq!(got.pclk_div, 2);
        assert_eq!(got.horiz.total, 1032);
        assert_eq!(got.horiz.offset, 174);
        assert_eq!(got.horiz.sync_end, 58);
        assert_eq!(got.vert.total, 581);
        assert_eq!(got.vert.offset, 75);
        assert_eq!(got.vert.sync_end, 25);
        assert!(got.horiz.offset > got.horiz.sync_end);
        assert!(got.horiz.total - got.horiz.visible > got.horiz.offset);
    }

    #[test]
    fn test_derive_trims_oversize() {
        let got = DisplayParameters::derive(4000, 3000, 60, 72_000_000);
        assert_eq!(got.horiz.visible, 2047);
        assert_eq!(got.vert.visible, 2047);
        assert_eq!(got.pclk_div, 1);
    }

    #[test]
    fn test_wuxga_preset() {
        let got = DisplayParameters::preset(DisplayPreset::Wuxga1920x1200At60, 72_000_000);
        assert_eq!(got.horiz.total, 2080);
        assert_eq!(got.vert.total, 1244);
        assert_eq!(got.pclk_pol, ClockPolarity::RisingEdge);
        // 2080 * 1244 clocks per frame at 72MHz.
        assert_eq!(got.refresh_rate_millihertz(72_000_000), 27_825);
    }
}
