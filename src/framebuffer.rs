/// Logical display width in pixels.
pub const DISPLAY_WIDTH: i32 = 160;
/// Logical display height in pixels.
pub const DISPLAY_HEIGHT: i32 = 144;

/// A 160x144 grid of 2-bit color indices, mutated only by the drawing
/// syscalls and presented to the display collaborator on `PAINT_DISPLAY`.
///
/// Every primitive clips silently: off-screen pixels are dropped, never
/// an error.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Framebuffer {
    px: Box<[u8]>,
}

impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer {
            px: vec![0; (DISPLAY_WIDTH * DISPLAY_HEIGHT) as usize].into_boxed_slice(),
        }
    }

    /// Set every pixel to color 0.
    pub fn clear(&mut self) {
        self.px.fill(0);
    }

    pub fn get(&self, x: i32, y: i32) -> u8 {
        if Self::in_bounds(x, y) {
            self.px[(y * DISPLAY_WIDTH + x) as usize]
        } else {
            0
        }
    }

    pub fn set(&mut self, x: i32, y: i32, color: u8) {
        if Self::in_bounds(x, y) {
            self.px[(y * DISPLAY_WIDTH + x) as usize] = color & 0b11;
        }
    }

    fn in_bounds(x: i32, y: i32) -> bool {
        (0..DISPLAY_WIDTH).contains(&x) && (0..DISPLAY_HEIGHT).contains(&y)
    }

    /// Filled or outlined axis-aligned rectangle.
    pub fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, filled: bool, color: u8) {
        if w <= 0 || h <= 0 {
            return;
        }
        if filled {
            for py in y..y + h {
                for px in x..x + w {
                    self.set(px, py, color);
                }
            }
        } else {
            for px in x..x + w {
                self.set(px, y, color);
                self.set(px, y + h - 1, color);
            }
            for py in y..y + h {
                self.set(x, py, color);
                self.set(x + w - 1, py, color);
            }
        }
    }

    /// Circle outline using the midpoint algorithm.
    pub fn draw_circle(&mut self, cx: i32, cy: i32, r: i32, color: u8) {
        if r < 0 {
            return;
        }
        let mut x = r;
        let mut y = 0;
        let mut err = 1 - r;
        while x >= y {
            self.set(cx + x, cy + y, color);
            self.set(cx + y, cy + x, color);
            self.set(cx - y, cy + x, color);
            self.set(cx - x, cy + y, color);
            self.set(cx - x, cy - y, color);
            self.set(cx - y, cy - x, color);
            self.set(cx + y, cy - x, color);
            self.set(cx + x, cy - y, color);
            y += 1;
            if err < 0 {
                err += 2 * y + 1;
            } else {
                x -= 1;
                err += 2 * (y - x) + 1;
            }
        }
    }

    /// Line segment using Bresenham's algorithm, any octant.
    pub fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, color: u8) {
        let dx = (x2 - x1).abs();
        let dy = -(y2 - y1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x1, y1);
        loop {
            self.set(x, y, color);
            if x == x2 && y == y2 {
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
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_pixels(fb: &Framebuffer) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if fb.get(x, y) != 0 {
                    out.push((x, y));
                }
            }
        }
        out
    }

    #[test]
    fn set_masks_color_and_clips() {
        let mut fb = Framebuffer::new();
        fb.set(0, 0, 7);
        assert_eq!(fb.get(0, 0), 3);
        // Off-screen writes are dropped, reads come back 0
        fb.set(-1, 0, 3);
        fb.set(0, DISPLAY_HEIGHT, 3);
        assert_eq!(fb.get(-1, 0), 0);
        assert_eq!(lit_pixels(&fb).len(), 1);
    }

    #[test]
    fn rect_filled_vs_outline() {
        let mut fb = Framebuffer::new();
        fb.draw_rect(1, 1, 4, 3, true, 2);
        assert_eq!(lit_pixels(&fb).len(), 12);

        let mut fb = Framebuffer::new();
        fb.draw_rect(1, 1, 4, 3, false, 2);
        // Perimeter of 4x3: 2*4 + 2*3 - 4 corners counted once
        assert_eq!(lit_pixels(&fb).len(), 10);
        assert_eq!(fb.get(2, 2), 0);
    }

    #[test]
    fn rect_clips_partially_off_screen() {
        let mut fb = Framebuffer::new();
        fb.draw_rect(-2, -2, 4, 4, true, 1);
        assert_eq!(lit_pixels(&fb).len(), 4);
        // Fully off-screen draws nothing and does not error
        fb.draw_rect(200, 200, 10, 10, true, 1);
        assert_eq!(lit_pixels(&fb).len(), 4);
    }

    #[test]
    fn circle_has_four_cardinal_points() {
        let mut fb = Framebuffer::new();
        fb.draw_circle(80, 72, 10, 3);
        assert_eq!(fb.get(90, 72), 3);
        assert_eq!(fb.get(70, 72), 3);
        assert_eq!(fb.get(80, 82), 3);
        assert_eq!(fb.get(80, 62), 3);
        // Interior stays clear
        assert_eq!(fb.get(80, 72), 0);
    }

    #[test]
    fn circle_radius_zero_is_a_point() {
        let mut fb = Framebuffer::new();
        fb.draw_circle(5, 5, 0, 1);
        assert_eq!(lit_pixels(&fb), vec![(5, 5)]);
    }

    #[test]
    fn line_endpoints_and_continuity() {
        let mut fb = Framebuffer::new();
        fb.draw_line(0, 0, DISPLAY_WIDTH - 1, DISPLAY_HEIGHT - 1, 3);
        assert_eq!(fb.get(0, 0), 3);
        assert_eq!(fb.get(DISPLAY_WIDTH - 1, DISPLAY_HEIGHT - 1), 3);

        // dx > dy, so exactly one pixel per column, with y monotonically
        // increasing and never stepping more than one row
        let mut last_y = 0;
        for x in 0..DISPLAY_WIDTH {
            let ys: Vec<i32> = (0..DISPLAY_HEIGHT).filter(|&y| fb.get(x, y) != 0).collect();
            assert_eq!(ys.len(), 1, "column {x}");
            assert!(ys[0] >= last_y && ys[0] - last_y <= 1);
            last_y = ys[0];
        }
    }

    #[test]
    fn line_all_octants_share_endpoints() {
        for &(x2, y2) in &[(10, 3), (3, 10), (-10, 3), (-3, -10), (10, -3)] {
            let mut fb = Framebuffer::new();
            fb.draw_line(20, 20, 20 + x2, 20 + y2, 1);
            assert_eq!(fb.get(20, 20), 1);
            assert_eq!(fb.get(20 + x2, 20 + y2), 1);
        }
    }
}
