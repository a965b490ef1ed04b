use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{trace, warn};

use super::{DeviceSurface, TextCell, COLS, PALETTE_LEN, PIXEL_H, PIXEL_W, ROWS};

/// Single-slot mailbox carrying the most recently delivered keyboard
/// codepoint from a (hypothetical) input-pump thread to the VM thread.
/// Events delivered between two `read_char` calls are coalesced by
/// construction: this holds one slot, not a queue.
#[derive(Default)]
pub struct KeyMailbox {
    slot: Mutex<Option<u8>>,
}

impl KeyMailbox {
    pub fn deliver(&self, codepoint: u8) {
        *self.slot.lock().unwrap() = Some(codepoint);
    }

    fn take(&self) -> Option<u8> {
        self.slot.lock().unwrap().take()
    }
}

/// Reference [`DeviceSurface`] implementation backed by plain owned
/// buffers. Not a rendering back end — there is no window, no font
/// renderer, no event pump here, only the state those things would read
/// and the primitives (mailbox, shutdown flag) they'd synchronize through.
/// Used by the test suite and the demo binary.
pub struct HeadlessSurface {
    text_cells: [TextCell; COLS * ROWS],
    pixels: bitvec::vec::BitVec<u8, bitvec::order::Msb0>,
    cursor_x: u8,
    cursor_y: u8,
    current_color: u8,
    pixel_mode: bool,
    dirty: AtomicBool,
    mailbox: Arc<KeyMailbox>,
    shutdown: Arc<AtomicBool>,
    /// How long a poll iteration of `read_char`'s blocking wait sleeps
    /// between mailbox checks. `None` short-circuits the polling loop
    /// entirely (used by tests, which pre-deliver the key before calling
    /// `read_char`).
    poll_interval: Option<Duration>,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSurface {
    pub fn new() -> Self {
        HeadlessSurface {
            text_cells: [TextCell::default(); COLS * ROWS],
            pixels: bitvec::vec::BitVec::repeat(false, PIXEL_W * PIXEL_H),
            cursor_x: 0,
            cursor_y: 0,
            current_color: 0,
            pixel_mode: false,
            dirty: AtomicBool::new(false),
            mailbox: Arc::new(KeyMailbox::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            poll_interval: Some(Duration::from_millis(100)), // >= 10 Hz
        }
    }

    /// A handle an embedder's input thread can clone to deliver keys
    /// without touching the VM.
    pub fn mailbox(&self) -> Arc<KeyMailbox> {
        Arc::clone(&self.mailbox)
    }

    /// A handle an embedder can clone to request shutdown from outside
    /// the VM thread.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Tests don't want `read_char` to actually poll a wall clock; this
    /// disables the sleep between checks.
    #[cfg(test)]
    pub fn without_polling(mut self) -> Self {
        self.poll_interval = None;
        self
    }

    pub fn text_cells(&self) -> &[TextCell] {
        self.clear_dirty();
        &self.text_cells
    }

    pub fn pixels(&self) -> &bitvec::slice::BitSlice<u8, bitvec::order::Msb0> {
        self.clear_dirty();
        &self.pixels
    }

    pub fn pixel_mode(&self) -> bool {
        self.pixel_mode
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    fn cell_mut(&mut self, x: u8, y: u8) -> &mut TextCell {
        &mut self.text_cells[y as usize * COLS + x as usize]
    }

    fn scroll_one_line(&mut self) {
        // Row `i` receives row `i + 1`, for every row but the last, in
        // one shot: shift the whole "rows 1..ROWS" block down to row 0.
        self.text_cells.copy_within(COLS.., 0);
        let blank = TextCell {
            ch: b' ',
            color: self.current_color,
        };
        let last = (ROWS - 1) * COLS;
        self.text_cells[last..last + COLS].fill(blank);
    }
}

impl DeviceSurface for HeadlessSurface {
    fn putchar(&mut self, c: u8) {
        match c {
            b'\n' => {
                self.cursor_y += 1;
                self.cursor_x = 0;
            }
            b'\r' => self.cursor_x = 0,
            0x08 => self.cursor_x = self.cursor_x.saturating_sub(1),
            b'\t' => self.cursor_x = (self.cursor_x + 4) & !3,
            other => {
                if self.cursor_x as usize == COLS {
                    self.cursor_x = 0;
                    self.cursor_y += 1;
                }
                if self.cursor_y as usize == ROWS {
                    self.scroll_one_line();
                    self.cursor_y = (ROWS - 1) as u8;
                }
                let color = self.current_color;
                let (x, y) = (self.cursor_x, self.cursor_y);
                *self.cell_mut(x, y) = TextCell { ch: other, color };
                self.cursor_x += 1;
            }
        }

        self.mark_dirty();
    }

    fn clear_text(&mut self) {
        let blank = TextCell {
            ch: b' ',
            color: self.current_color,
        };
        self.text_cells.fill(blank);
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.pixel_mode = false;
        self.mark_dirty();
    }

    fn set_pixel(&mut self, x: u16, y: u16, v: u8) {
        if (x as usize) < PIXEL_W && (y as usize) < PIXEL_H {
            let idx = y as usize * PIXEL_W + x as usize;
            self.pixels.set(idx, v != 0);
        } else {
            warn!("SET_PIXEL ({x}, {y}) out of range, dropped");
        }
        self.pixel_mode = true;
        self.mark_dirty();
    }

    fn clear_pixels(&mut self) {
        self.pixels.fill(false);
        self.pixel_mode = false;
        self.mark_dirty();
    }

    fn set_color(&mut self, idx: u8) {
        if idx < PALETTE_LEN {
            self.current_color = idx;
        }
    }

    fn set_cursor(&mut self, x: u8, y: u8) {
        if (x as usize) < COLS && (y as usize) < ROWS {
            self.cursor_x = x;
            self.cursor_y = y;
            self.mark_dirty();
        } else {
            warn!("SET_CURSOR ({x}, {y}) out of range, ignored");
        }
    }

    fn get_cursor(&self) -> (u8, u8) {
        (self.cursor_x, self.cursor_y)
    }

    fn sleep(&mut self, ms: u16) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }

    fn beep(&mut self, freq: u16, dur_ms: u16) {
        trace!("BEEP {freq}Hz for {dur_ms}ms (headless surface: no audio output)");
    }

    fn read_char(&mut self) -> u8 {
        loop {
            if let Some(code) = self.mailbox.take() {
                return code;
            }
            if self.is_shutdown_requested() {
                return 0;
            }
            match self.poll_interval {
                Some(interval) => std::thread::sleep(interval),
                None => return 0,
            }
        }
    }

    fn now_lo16(&self) -> u16 {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        (secs & 0xFFFF) as u16
    }

    fn rand_mod(&mut self, n: u16) -> u16 {
        fastrand::u16(0..=n)
    }

    fn shutdown_requested(&self) -> bool {
        self.is_shutdown_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> HeadlessSurface {
        HeadlessSurface::new().without_polling()
    }

    #[test]
    fn hello_world_lands_at_origin_and_moves_cursor() {
        let mut s = surface();
        for c in b"Hello" {
            s.putchar(*c);
        }
        assert_eq!(s.get_cursor(), (5, 0));
        for (i, c) in b"Hello".iter().enumerate() {
            assert_eq!(s.text_cells()[i].ch, *c);
        }
    }

    #[test]
    fn newline_then_scroll_after_26_lines() {
        // `02 'X' '\n' 00` issued 26 times.
        let mut s = surface();
        for _ in 0..26 {
            s.putchar(b'X');
            s.putchar(b'\n');
        }
        for row in 0..ROWS {
            assert_eq!(s.text_cells()[row * COLS].ch, b'X', "row {row}");
        }
    }

    #[test]
    fn tab_rounds_up_to_multiple_of_four() {
        let mut s = surface();
        s.putchar(b'A');
        s.putchar(b'\t');
        assert_eq!(s.get_cursor().0, 4);
    }

    #[test]
    fn backspace_does_not_go_negative() {
        let mut s = surface();
        s.putchar(0x08);
        assert_eq!(s.get_cursor().0, 0);
    }

    #[test]
    fn pixel_out_of_bounds_is_dropped_but_sets_pixel_mode() {
        let mut s = surface();
        s.set_pixel(400, 300, 1);
        assert!(s.pixel_mode());
        assert!(!s.pixels().any());
    }

    #[test]
    fn clear_text_resets_cursor_and_exits_pixel_mode() {
        let mut s = surface();
        s.set_pixel(0, 0, 1);
        s.putchar(b'A');
        s.clear_text();
        assert_eq!(s.get_cursor(), (0, 0));
        assert!(!s.pixel_mode());
        assert_eq!(s.text_cells()[0].ch, b' ');
    }

    #[test]
    fn read_char_returns_the_most_recently_delivered_key() {
        let mut s = surface();
        let mailbox = s.mailbox();
        mailbox.deliver(b'a');
        mailbox.deliver(b'b');
        assert_eq!(s.read_char(), b'b');
    }

    #[test]
    fn read_char_unblocks_on_shutdown() {
        let mut s = surface();
        s.shutdown_handle().store(true, Ordering::Relaxed);
        assert_eq!(s.read_char(), 0);
    }
}
