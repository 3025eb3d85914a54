//! Various types used as arguments to coprocessor commands.

pub trait Options: Clone + Copy + PartialEq + Eq {
    fn new() -> Self;
}

pub fn defaults<T: Options>() -> T {
    T::new()
}

/// Options for `CMD_LOADIMAGE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadImage(u32);

impl Options for LoadImage {
    fn new() -> Self {
        Self(0)
    }
}

impl LoadImage {
    pub const fn jpeg_color_mode(self, mode: JPEGColorMode) -> Self {
        Self((self.0 & (!0b1)) | mode as u32)
    }

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

    pub const fn source(self, source: DataSource) -> Self {
        Self((self.0 & !SOURCE_MASK) | source as u32)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

/// Options for `CMD_INFLATE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inflate(u32);

impl Options for Inflate {
    fn new() -> Self {
        Self(0)
    }
}

impl Inflate {
    pub const fn source(self, source: DataSource) -> Self {
        Self((self.0 & !SOURCE_MASK) | source as u32)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

#[repr(u32)]
pub enum JPEGColorMode {
    RGB565 = 0,
    Monochrome = 1,
}

/// Where a command that consumes a data stream reads it from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum DataSource {
    /// Data follows the command in the FIFO.
    CommandStream = 0,
    /// Data comes from the media FIFO.
    MediaFifo = OPT_MEDIAFIFO,
    /// Data comes from flash, at the address set by `CMD_FLASHSOURCE`.
    Flash = OPT_FLASH,
    /// Data comes from the file named by `CMD_FSSOURCE`.
    FileSystem = OPT_FS,
}


const OPT_NODL: u32 = 2;
const OPT_FULLSCREEN: u32 = 8;
const OPT_MEDIAFIFO: u32 = 16;
const OPT_FLASH: u32 = 64;
const OPT_DITHER: u32 = 256;
const OPT_TRUECOLOR: u32 = 512;
const OPT_FS: u32 = 8192;
const SOURCE_MASK: u32 = OPT_MEDIAFIFO | OPT_FLASH | OPT_FS;
