//! Various types used as arguments to coprocessor commands.

pub trait Options: Clone + Copy + PartialEq + Eq {
    fn new() -> Self;
}

pub fn defaults<T: Options>() -> T {
    T::new()
}

/// Where a command that decodes data, like `CMD_LOADIMAGE` or `CMD_INFLATE`,
/// reads its input from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MediaSource {
    /// The data follows the command in the command FIFO.
    CommandFifo,
    /// The data streams through the media FIFO in `RAM_G`.
    MediaFifo,
    /// The data is read from flash, at the address most recently selected
    /// by `CMD_FLASHSOURCE`.
    Flash,
}

impl MediaSource {
    const MASK: u32 = OPT_MEDIAFIFO | OPT_FLASH;

    const fn to_raw(self) -> u32 {
        match self {
            MediaSource::CommandFifo => 0,
            MediaSource::MediaFifo => OPT_MEDIAFIFO,
            MediaSource::Flash => OPT_FLASH,
        }
    }

    const fn from_raw(raw: u32) -> Self {
        if raw & OPT_FLASH != 0 {
            MediaSource::Flash
        } else if raw & OPT_MEDIAFIFO != 0 {
            MediaSource::MediaFifo
        } else {
            MediaSource::CommandFifo
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LoadImage(u32);

impl Options for LoadImage {
    fn new() -> Self {
        Self(0)
    }
}

impl LoadImage {
    pub const fn jpeg_color_mode(self, mode: JPEGColorMode) -> Self {
        Self((self.0 & !OPT_MONO) | mode as u32)
    }

    /// Skips generating the display list commands that would draw the
    /// image, leaving only the decoded bitmap in memory.
    pub const fn no_display_list(self) -> Self {
        Self(self.0 | OPT_NODL)
    }

    pub const fn scale_to_screen(self) -> Self {
        Self(self.0 | OPT_FULLSCREEN)
    }

    pub const fn dither(self) -> Self {
        Self(self.0 | OPT_DITHER)
    }

    pub const fn true_color(self) -> Self {
        Self(self.0 | OPT_TRUECOLOR)
    }

    pub const fn ycbcr(self) -> Self {
        Self(self.0 | OPT_YCBCR)
    }

    pub const fn source(self, src: MediaSource) -> Self {
        Self((self.0 & !MediaSource::MASK) | src.to_raw())
    }

    pub const fn media_source(self) -> MediaSource {
        MediaSource::from_raw(self.0)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Inflate(u32);

impl Options for Inflate {
    fn new() -> Self {
        Self(0)
    }
}

impl Inflate {
    pub const fn source(self, src: MediaSource) -> Self {
        Self((self.0 & !MediaSource::MASK) | src.to_raw())
    }

    pub const fn media_source(self) -> MediaSource {
        MediaSource::from_raw(self.0)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum JPEGColorMode {
    RGB565 = 0,
    Monochrome = 1,
}


const OPT_MONO: u32 = 1;
const OPT_NODL: u32 = 2;
const OPT_FULLSCREEN: u32 = 8;
const OPT_MEDIAFIFO: u32 = 16;
const OPT_FLASH: u32 = 64;
const OPT_DITHER: u32 = 256;
const OPT_TRUECOLOR: u32 = 512;
const OPT_YCBCR: u32 = 1024;
