//! Device surface (C3): the abstract target for every program-visible side
//! effect. The execution loop only ever talks to a `dyn DeviceSurface`; the
//! windowing/rasterization back end, font rendering, and event pump that
//! would implement this for a real window are out of scope for this crate
//! — [`headless::HeadlessSurface`] is the in-tree
//! reference implementation used by tests and the demo binary.

mod headless;

pub use headless::HeadlessSurface;

/// Text plane dimensions.
pub const COLS: usize = 80;
pub const ROWS: usize = 25;
/// Pixel plane dimensions.
pub const PIXEL_W: usize = 320;
pub const PIXEL_H: usize = 200;
/// The palette has exactly 16 entries; the core only ever writes indices
/// `0..16`. RGB values for those indices are a back end's choice.
pub const PALETTE_LEN: u8 = 16;

/// One character cell: a codepoint and a 4-bit palette index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextCell {
    pub ch: u8,
    pub color: u8,
}

/// Operations the execution loop drives. Implementors own all state the
/// table describes (text/pixel planes, cursor, color,
/// pixel_mode) and are free to choose how it's exposed upward to a real
/// back end — `HeadlessSurface` exposes it as plain slices.
///
/// `draw_line`/`draw_rect`/`fill_rect`/`draw_circle` are default methods
/// expressed purely in terms of `set_pixel`, so an implementor only has to
/// provide pixel-level clipping once to get clipped rasterization of every
/// primitive for free.
pub trait DeviceSurface {
    /// Writes one byte through the cursor/scroll rules below.
    fn putchar(&mut self, c: u8);

    /// Clears the text plane to blanks in `current_color`, homes the
    /// cursor, and switches the surface out of pixel mode.
    fn clear_text(&mut self);

    /// Sets or clears one pixel; out-of-range coordinates are dropped
    /// (clipped), never faulted. Switches the surface into pixel mode.
    fn set_pixel(&mut self, x: u16, y: u16, v: u8);

    /// Zeroes the pixel plane and switches the surface out of pixel mode.
    fn clear_pixels(&mut self);

    /// Updates the 4-bit color used for subsequently written text cells.
    /// `idx >= 16` must be a no-op: implementors are responsible for that
    /// check themselves (see `HeadlessSurface::set_color` for the
    /// reference implementation) — the execution loop calls this
    /// unconditionally and does not clamp `idx` on an implementor's
    /// behalf.
    fn set_color(&mut self, idx: u8);

    /// Moves the text cursor if both coordinates are in range; otherwise
    /// clamps (drops the update).
    fn set_cursor(&mut self, x: u8, y: u8);

    /// Current cursor position.
    fn get_cursor(&self) -> (u8, u8);

    /// Blocks the calling (VM) thread for exactly `ms` milliseconds.
    fn sleep(&mut self, ms: u16);

    /// Sounds a tone of `freq` Hz for `dur_ms` milliseconds, best-effort
    /// non-blocking beyond `dur_ms`.
    fn beep(&mut self, freq: u16, dur_ms: u16);

    /// Blocks until a keyboard codepoint has arrived since this call
    /// began, then returns it. Events delivered between two calls are
    /// coalesced: only the most recently delivered codepoint is
    /// guaranteed to be returned.
    fn read_char(&mut self) -> u8;

    /// Low 16 bits of a wall-clock seconds counter.
    fn now_lo16(&self) -> u16;

    /// Uniform sample in `[0, n]` inclusive.
    fn rand_mod(&mut self, n: u16) -> u16;

    /// Whether the host back end has asked the VM to stop. Checked by the
    /// execution loop only at the three suspension points (`SLEEP_MS`,
    /// `READ_CHAR`, `BEEP`); a tight loop that never suspends never sees
    /// this. Surfaces with nothing to
    /// cancel from can leave this at the default.
    fn shutdown_requested(&self) -> bool {
        false
    }

    fn draw_line(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) {
        bresenham_line(x0 as i32, y0 as i32, x1 as i32, y1 as i32, |x, y| {
            if x >= 0 && y >= 0 {
                self.set_pixel(x as u16, y as u16, 1);
            }
        });
    }

    fn draw_rect(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) {
        self.draw_line(x0, y0, x1, y0);
        self.draw_line(x1, y0, x1, y1);
        self.draw_line(x1, y1, x0, y1);
        self.draw_line(x0, y1, x0, y0);
    }

    fn fill_rect(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) {
        let (xlo, xhi) = (x0.min(x1), x0.max(x1));
        let (ylo, yhi) = (y0.min(y1), y0.max(y1));
        for y in ylo..=yhi {
            for x in xlo..=xhi {
                self.set_pixel(x, y, 1);
            }
        }
    }

    fn draw_circle(&mut self, cx: u16, cy: u16, r: u16) {
        bresenham_circle(cx as i32, cy as i32, r as i32, |x, y| {
            if x >= 0 && y >= 0 {
                self.set_pixel(x as u16, y as u16, 1);
            }
        });
    }
}

/// Bresenham's line algorithm; calls `plot` for every point on the
/// segment, including both endpoints. Coordinates are signed so the
/// midpoint decision arithmetic doesn't need to special-case direction.
fn bresenham_line(x0: i32, y0: i32, x1: i32, y1: i32, mut plot: impl FnMut(i32, i32)) {
    let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
    let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        plot(x, y);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Midpoint circle algorithm; plots all eight octant-symmetric points per
/// step.
fn bresenham_circle(cx: i32, cy: i32, r: i32, mut plot: impl FnMut(i32, i32)) {
    if r < 0 {
        return;
    }
    let mut x = r;
    let mut y = 0;
    let mut err = 0;
    while x >= y {
        for (px, py) in [
            (cx + x, cy + y),
            (cx + y, cy + x),
            (cx - y, cy + x),
            (cx - x, cy + y),
            (cx - x, cy - y),
            (cx - y, cy - x),
            (cx + y, cy - x),
            (cx + x, cy - y),
        ] {
            plot(px, py);
        }
        y += 1;
        err += 1 + 2 * y;
        if 2 * (err - x) + 1 > 0 {
            x -= 1;
            err += 1 - 2 * x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bresenham_line_includes_both_endpoints() {
        let mut pts = Vec::new();
        bresenham_line(0, 0, 3, 0, |x, y| pts.push((x, y)));
        assert_eq!(pts, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn bresenham_circle_hits_the_four_axis_points() {
        let mut pts = Vec::new();
        bresenham_circle(10, 10, 5, |x, y| pts.push((x, y)));
        for p in [(15, 10), (5, 10), (10, 15), (10, 5)] {
            assert!(pts.contains(&p), "missing {p:?}");
        }
    }
}
