//! ANSI Color Palette and Selection
//!
//! Frames are re-colorized on every tick by drawing from a fixed palette of
//! seven named terminal colors. Selection is uniform with one constraint:
//! the same color is never emitted twice in a row.
//!
//! The no-repeat rule is enforced by an additive remap rather than a retry
//! loop: draw a uniform index, and if it collides with the previous color,
//! add a uniform offset in `[1, PALETTE_LEN - 1]` modulo the palette size.
//! The result stays uniform over the remaining colors.

use rand::Rng;

/// A color from the stream palette, identified by its SGR foreground code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnsiColor {
    /// SGR 31
    Red,
    /// SGR 33
    Yellow,
    /// SGR 32
    Green,
    /// SGR 34
    Blue,
    /// SGR 35
    Magenta,
    /// SGR 36
    Cyan,
    /// SGR 37
    White,
}

/// The fixed stream palette, in the order color indices refer to.
pub const PALETTE: [AnsiColor; 7] = [
    AnsiColor::Red,
    AnsiColor::Yellow,
    AnsiColor::Green,
    AnsiColor::Blue,
    AnsiColor::Magenta,
    AnsiColor::Cyan,
    AnsiColor::White,
];

impl AnsiColor {
    /// The SGR foreground color code for this color.
    #[must_use]
    pub const fn sgr_code(self) -> u8 {
        match self {
            Self::Red => 31,
            Self::Green => 32,
            Self::Yellow => 33,
            Self::Blue => 34,
            Self::Magenta => 35,
            Self::Cyan => 36,
            Self::White => 37,
        }
    }

    /// Human-readable color name, as it would appear in configuration or logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Blue => "blue",
            Self::Magenta => "magenta",
            Self::Cyan => "cyan",
            Self::White => "white",
        }
    }

    /// Wrap `text` in this color's escape sequence.
    ///
    /// Opens with the SGR foreground code and closes with the
    /// default-foreground reset (`ESC[39m`), leaving other attributes
    /// untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use framecast_core::color::AnsiColor;
    ///
    /// assert_eq!(AnsiColor::Red.paint("hi"), "\x1b[31mhi\x1b[39m");
    /// ```
    #[must_use]
    pub fn paint(self, text: &str) -> String {
        format!("\x1b[{}m{}\x1b[39m", self.sgr_code(), text)
    }
}

/// Pick the next color index, never repeating `last`.
///
/// Draws uniformly over `[0, PALETTE.len())`. On a collision with `last`,
/// remaps by a uniform nonzero offset modulo the palette size, which is
/// uniform over the remaining colors. The first call of a session passes
/// `None` and may produce any index.
///
/// Stateless: the caller retains the returned index and feeds it back as
/// `last` on the next tick.
pub fn next_color_index<R: Rng>(rng: &mut R, last: Option<usize>) -> usize {
    let mut index = rng.gen_range(0..PALETTE.len());
    if Some(index) == last {
        index = (index + rng.gen_range(1..PALETTE.len())) % PALETTE.len();
    }
    index
}
