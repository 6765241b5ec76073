//! Standard Sinclair ULA (Uncommitted Logic Array) — border rasteriser and
//! screen raster.
//!
//! This crate covers the video side of the ULA: cycle-accurate border pixel
//! writes driven by the current border colour and beam position, plus the
//! once-per-frame bitmap+attribute raster of the active screen area.
//! Keyboard and beeper are separate concerns wired through the system bus;
//! memory contention and the "snow" bus-conflict effect are out of scope.
//!
//! # Standalone IC
//!
//! This crate has no dependencies — VRAM is read through a closure supplied
//! by the caller, keeping the rasteriser decoupled from any particular
//! memory model.
//!
//! # Timing
//!
//! 48K: 224 T-states/line, 312 lines/frame, 24 T-states of border each side
//! of the 128-T-state active window. 128K/+3: 228 T-states/line, border
//! widens to 26 T-states each side; the extra 4 T-states are absorbed by
//! flyback. Frame layout (from the INT pulse): lines 0-15 top retrace,
//! 16-47 top border, 48-63 overscan (rendered as border), 64-255 screen,
//! 256-287 bottom border, 288-311 bottom retrace.
//!
//! # Framebuffer
//!
//! 320x256 ARGB32: 256x192 active area plus a 32-pixel border on all sides.
//!
//! # Screen memory layout
//!
//! Bitmap at $4000-$57FF (6144 bytes), attributes at $5800-$5AFF (768 bytes).
//! Bitmap address: `010Y7 Y6Y2 Y1Y0 Y5Y4Y3 X4X3X2X1X0`
//! Attribute address: `0101 10Y7 Y6Y5 Y4Y3 X4X3X2X1X0`

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]

mod palette;

pub use palette::PALETTE;

/// Framebuffer dimensions.
pub const FB_WIDTH: u32 = 320;
pub const FB_HEIGHT: u32 = 256;

const BORDER_WIDTH: u32 = 32;
const SCREEN_WIDTH: u32 = 256;
const SCREEN_HEIGHT: u32 = 192;

const TOP_RETRACE_LINES: u16 = 16;
const TOP_BORDER_LINES: u16 = 48; // lines 16..64, includes overscan
const SCREEN_LINES: u16 = 192; // lines 64..256
const BOTTOM_BORDER_LINES: u16 = 32; // lines 256..288

/// Number of frames between FLASH toggles.
const FLASH_FRAME_COUNT: u8 = 16;

/// Which horizontal zone a T-state falls into, and its target pixel span.
struct Window {
    t_start: u32,
    t_end: u32,
    x_start: u32,
    x_end: u32,
}

/// Cycle-accurate border rasteriser plus frame-end screen raster.
pub struct Ula {
    tstates_per_line: u16,
    lines_per_frame: u16,
    border_tstates: u16,

    /// Absolute T-state at which the current frame's line 0 began.
    frame_start: u64,
    /// Absolute T-state at which the current slice (line) began.
    slice_origin: u64,
    /// Absolute T-state up to which border pixels have been painted.
    drawn_to: u64,

    border: u8,
    framebuffer: Vec<u32>,

    flash_state: bool,
    flash_counter: u8,
}

impl Ula {
    #[must_use]
    pub fn new(tstates_per_line: u16, lines_per_frame: u16) -> Self {
        let border_tstates = if tstates_per_line >= 228 { 26 } else { 24 };
        Self {
            tstates_per_line,
            lines_per_frame,
            border_tstates,
            frame_start: 0,
            slice_origin: 0,
            drawn_to: 0,
            border: 7, // White border on power-up
            framebuffer: vec![0xFF00_0000; (FB_WIDTH * FB_HEIGHT) as usize],
            flash_state: false,
            flash_counter: 0,
        }
    }

    /// Reset the rasteriser for a new frame, anchored at absolute T-state
    /// `origin` (the frame's line-0 start).
    pub fn begin_frame(&mut self, origin: u64) {
        self.frame_start = origin;
        self.slice_origin = origin;
        self.drawn_to = origin;
    }

    /// Record the slice (line) origin. Does not advance any clock.
    pub fn begin_slice(&mut self, origin: u64) {
        self.slice_origin = origin;
    }

    /// Flush border painting to the end of the current slice.
    pub fn end_slice(&mut self, cpu_tstates: u32) {
        let t_now = self.slice_origin + u64::from(cpu_tstates);
        self.border_advance_to(t_now);
    }

    /// Paint border pixels from `drawn_to` up to absolute T-state `t_abs`.
    /// Must be called before any border colour change so the prior colour
    /// is committed to every pixel it actually covered.
    pub fn border_advance_to(&mut self, t_abs: u64) {
        if t_abs <= self.drawn_to {
            return;
        }
        let tstates_per_line = u64::from(self.tstates_per_line);
        let mut t = self.drawn_to;
        while t < t_abs {
            let rel = t - self.frame_start;
            let line = (rel / tstates_per_line) as u16;
            if line >= self.lines_per_frame {
                break;
            }
            let line_off = (rel % tstates_per_line) as u32;
            let line_end_abs = self.frame_start + u64::from(line + 1) * tstates_per_line;
            let seg_end_abs = t_abs.min(line_end_abs);
            let seg_end_off = (seg_end_abs - self.frame_start
                - u64::from(line) * tstates_per_line) as u32;
            self.paint_line_segment(line, line_off, seg_end_off);
            t = seg_end_abs;
        }
        self.drawn_to = t_abs;
    }

    /// Paint the portion of `line` covered by T-state offsets `[from, to)`.
    fn paint_line_segment(&mut self, line: u16, from: u32, to: u32) {
        let Some((y, windows)) = self.line_geometry(line) else {
            return; // retrace — invisible
        };
        let colour = PALETTE[self.border as usize];
        for win in windows {
            let ov_start = from.max(win.t_start);
            let ov_end = to.min(win.t_end);
            if ov_start >= ov_end {
                continue;
            }
            let span = win.t_end - win.t_start;
            let px_span = win.x_end - win.x_start;
            let px_from = win.x_start + (ov_start - win.t_start) * px_span / span;
            let px_to = win.x_start + (ov_end - win.t_start) * px_span / span;
            let px_to = px_to.max(px_from + 1).min(FB_WIDTH);
            let row = (y * FB_WIDTH) as usize;
            for x in px_from..px_to {
                self.framebuffer[row + x as usize] = colour;
            }
        }
    }

    /// Map a raster line to a framebuffer row plus the border windows (in
    /// T-state offsets) visible on that line. `None` for invisible retrace
    /// lines.
    fn line_geometry(&self, line: u16) -> Option<(u32, Vec<Window>)> {
        let tpl = u32::from(self.tstates_per_line);
        let bt = u32::from(self.border_tstates);

        if line < TOP_RETRACE_LINES {
            return None;
        }
        if line < TOP_RETRACE_LINES + TOP_BORDER_LINES {
            let y = (u32::from(line - TOP_RETRACE_LINES) * BORDER_WIDTH) / u32::from(TOP_BORDER_LINES);
            return Some((
                y,
                vec![Window {
                    t_start: 0,
                    t_end: tpl,
                    x_start: 0,
                    x_end: FB_WIDTH,
                }],
            ));
        }
        let screen_start = TOP_RETRACE_LINES + TOP_BORDER_LINES;
        if line < screen_start + SCREEN_LINES {
            let y = BORDER_WIDTH + u32::from(line - screen_start);
            return Some((
                y,
                vec![
                    Window {
                        t_start: 0,
                        t_end: bt,
                        x_start: 0,
                        x_end: BORDER_WIDTH,
                    },
                    Window {
                        t_start: bt + SCREEN_WIDTH / 2,
                        t_end: bt + SCREEN_WIDTH / 2 + bt,
                        x_start: BORDER_WIDTH + SCREEN_WIDTH,
                        x_end: FB_WIDTH,
                    },
                ],
            ));
        }
        let bottom_start = screen_start + SCREEN_LINES;
        if line < bottom_start + BOTTOM_BORDER_LINES {
            let y = BORDER_WIDTH + SCREEN_HEIGHT + u32::from(line - bottom_start);
            return Some((
                y,
                vec![Window {
                    t_start: 0,
                    t_end: tpl,
                    x_start: 0,
                    x_end: FB_WIDTH,
                }],
            ));
        }
        None // bottom retrace
    }

    /// Set the border colour (0-7). Caller must have already advanced
    /// painting to the current T-state via [`Self::border_advance_to`].
    pub fn set_border_colour(&mut self, colour: u8) {
        self.border = colour & 0x07;
    }

    /// Current border colour index (0-7).
    #[must_use]
    pub fn border_colour(&self) -> u8 {
        self.border
    }

    /// Raster the 256x192 active area from VRAM bitmap+attribute bytes.
    /// Called once per frame, after the last slice's `end_slice`. Advances
    /// the FLASH counter.
    pub fn raster_screen(&mut self, read_vram: impl Fn(u16) -> u8) {
        for screen_y in 0..SCREEN_HEIGHT as u8 {
            for char_col in 0..32u8 {
                let bitmap_addr = Self::bitmap_addr(screen_y, char_col);
                let attr_addr = Self::attr_addr(screen_y, char_col);
                let bitmap = read_vram(bitmap_addr);
                let attr = read_vram(attr_addr);

                let flash = attr & 0x80 != 0;
                let bright = attr & 0x40 != 0;
                let paper = (attr >> 3) & 0x07;
                let ink = attr & 0x07;
                let (fg, bg) = if flash && self.flash_state {
                    (paper, ink)
                } else {
                    (ink, paper)
                };
                let bright_offset: u8 = if bright { 8 } else { 0 };
                let fg_colour = PALETTE[(fg + bright_offset) as usize];
                let bg_colour = PALETTE[(bg + bright_offset) as usize];

                let fb_y = BORDER_WIDTH + u32::from(screen_y);
                let fb_x_base = BORDER_WIDTH + u32::from(char_col) * 8;
                for bit in 0..8u8 {
                    let colour = if bitmap & (1 << (7 - bit)) != 0 {
                        fg_colour
                    } else {
                        bg_colour
                    };
                    let idx = (fb_y * FB_WIDTH + fb_x_base + u32::from(bit)) as usize;
                    self.framebuffer[idx] = colour;
                }
            }
        }

        self.flash_counter += 1;
        if self.flash_counter >= FLASH_FRAME_COUNT {
            self.flash_counter = 0;
            self.flash_state = !self.flash_state;
        }
    }

    /// Reference to the framebuffer (ARGB32).
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    #[must_use]
    pub fn framebuffer_width(&self) -> u32 {
        FB_WIDTH
    }

    #[must_use]
    pub fn framebuffer_height(&self) -> u32 {
        FB_HEIGHT
    }

    #[must_use]
    pub fn tstates_per_line(&self) -> u16 {
        self.tstates_per_line
    }

    #[must_use]
    pub fn lines_per_frame(&self) -> u16 {
        self.lines_per_frame
    }

    /// Compute the bitmap address for a given screen Y and character column.
    fn bitmap_addr(screen_y: u8, char_col: u8) -> u16 {
        let y7y6 = (screen_y >> 6) & 0x03;
        let y5y4y3 = (screen_y >> 3) & 0x07;
        let y2y1y0 = screen_y & 0x07;
        0x4000
            | (u16::from(y7y6) << 11)
            | (u16::from(y2y1y0) << 8)
            | (u16::from(y5y4y3) << 5)
            | u16::from(char_col)
    }

    /// Compute the attribute address for a given screen Y and character column.
    fn attr_addr(screen_y: u8, char_col: u8) -> u16 {
        0x5800 | (u16::from(screen_y / 8) << 5) | u16::from(char_col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSTATES_48K: u16 = 224;
    const LINES_PER_FRAME: u16 = 312;

    fn frame_tstates(tpl: u16) -> u64 {
        u64::from(tpl) * u64::from(LINES_PER_FRAME)
    }

    #[test]
    fn border_fills_whole_top_line_at_full_width() {
        let mut ula = Ula::new(TSTATES_48K, LINES_PER_FRAME);
        ula.begin_frame(0);
        ula.set_border_colour(2); // red
        ula.begin_slice(0);
        // Advance through line 16 (first visible top-border line).
        let line_16_end = u64::from(TSTATES_48K) * 17;
        ula.border_advance_to(line_16_end);
        let row0 = &ula.framebuffer()[0..FB_WIDTH as usize];
        assert!(row0.iter().all(|&p| p == PALETTE[2]));
    }

    #[test]
    fn screen_line_leaves_active_area_untouched() {
        let mut ula = Ula::new(TSTATES_48K, LINES_PER_FRAME);
        ula.begin_frame(0);
        ula.set_border_colour(4); // green
        // Advance to the end of line 64 (first screen line).
        let screen_line_start = u64::from(TSTATES_48K) * u64::from(16 + 48);
        let screen_line_end = screen_line_start + u64::from(TSTATES_48K);
        ula.begin_slice(screen_line_start);
        ula.border_advance_to(screen_line_end);
        let y = BORDER_WIDTH; // first screen row
        let row_start = (y * FB_WIDTH) as usize;
        // Left border painted green.
        assert_eq!(ula.framebuffer()[row_start], PALETTE[4]);
        assert_eq!(ula.framebuffer()[row_start + (FB_WIDTH as usize - 1)], PALETTE[4]);
    }

    #[test]
    fn drawn_to_is_monotonic_within_a_frame() {
        let mut ula = Ula::new(TSTATES_48K, LINES_PER_FRAME);
        ula.begin_frame(0);
        let mut last = 0u64;
        for line in 0..LINES_PER_FRAME {
            ula.begin_slice(last);
            ula.end_slice(u32::from(TSTATES_48K));
            assert!(ula.drawn_to >= last);
            last += u64::from(TSTATES_48K);
        }
        assert_eq!(last, frame_tstates(TSTATES_48K));
    }

    #[test]
    fn raster_screen_decodes_ink_and_paper() {
        let mut ula = Ula::new(TSTATES_48K, LINES_PER_FRAME);
        ula.begin_frame(0);
        // All-set bitmap byte, attribute ink=white(7) paper=black(0), no flash/bright.
        let attr = 0x07u8;
        ula.raster_screen(|addr| if addr < 0x5800 { 0xFF } else { attr });
        let y = BORDER_WIDTH;
        let x = BORDER_WIDTH;
        let idx = (y * FB_WIDTH + x) as usize;
        assert_eq!(ula.framebuffer()[idx], PALETTE[7]);
    }

    #[test]
    fn flash_toggles_every_sixteen_frames() {
        let mut ula = Ula::new(TSTATES_48K, LINES_PER_FRAME);
        for _ in 0..FLASH_FRAME_COUNT {
            ula.raster_screen(|_| 0);
        }
        assert!(ula.flash_state);
    }

    #[test]
    fn border_128k_uses_wider_border_window() {
        let ula = Ula::new(228, 311);
        assert_eq!(ula.border_tstates, 26);
    }
}
