//! The syscall runtime: dispatches `SYSCALL <NAME>` vectors to host-facing
//! operations. Every syscall preserves all registers except its documented
//! output register.

use crate::error::RuntimeError;
use crate::runtime::{RunState, Step, DEFAULT_COLOR};
use crate::symbol::{Register, Syscall};

impl RunState {
    /// Dispatch one syscall vector. `EXIT` halts the run; everything else
    /// continues. Vectors outside the recognized set are fatal.
    pub(crate) fn syscall(&mut self, vect: u8) -> Result<Step, RuntimeError> {
        let call = Syscall::from_vector(vect)
            .ok_or(RuntimeError::UnknownSyscall { vector: vect })?;

        match call {
            Syscall::Atoi => {
                let text = self.read_cstring(self.reg(Register::Ax))?;
                self.set_reg(Register::Ax, atoi(&text));
            }
            Syscall::PrintInt => {
                let val = self.reg(Register::Ax) as i16;
                self.host.out.write_str(&val.to_string());
            }
            Syscall::PrintChar => {
                let ch = (self.reg(Register::Ax) & 0xFF) as u8 as char;
                self.host.out.write_str(&ch.to_string());
            }
            Syscall::PrintString => {
                let text = self.read_cstring(self.reg(Register::Ax))?;
                self.host.out.write_str(&text);
            }
            Syscall::Exit => return Ok(Step::Halt),
            Syscall::ReadFile => {
                let path = self.read_cstring(self.reg(Register::Ax))?;
                let dest = self.reg(Register::Bx);
                let max = self.reg(Register::Cx) as usize;
                match self.host.fs.read(&path) {
                    Some(data) => {
                        let count = data.len().min(max);
                        for (i, byte) in data[..count].iter().enumerate() {
                            self.write_byte(dest.wrapping_add(i as u16), *byte)?;
                        }
                        self.set_reg(Register::Ax, count as u16);
                    }
                    // Soft failure: the program checks for -1 itself
                    None => self.set_reg(Register::Ax, -1i16 as u16),
                }
            }
            Syscall::ClearScreen => {
                self.fb.clear();
                self.color = DEFAULT_COLOR;
            }
            Syscall::SetColor => {
                // Out-of-range values are masked to the 2-bit palette
                self.color = (self.reg(Register::Ax) & 0b11) as u8;
            }
            Syscall::DrawRect => {
                let (x, y) = (self.coord(Register::Ax), self.coord(Register::Bx));
                let (w, h) = (self.coord(Register::Cx), self.coord(Register::Dx));
                let filled = self.reg(Register::Ex) != 0;
                let color = self.color;
                self.fb.draw_rect(x, y, w, h, filled, color);
            }
            Syscall::DrawCircle => {
                let (cx, cy) = (self.coord(Register::Ax), self.coord(Register::Bx));
                let r = self.coord(Register::Cx);
                let color = self.color;
                self.fb.draw_circle(cx, cy, r, color);
            }
            Syscall::DrawLine => {
                let (x1, y1) = (self.coord(Register::Ax), self.coord(Register::Bx));
                let (x2, y2) = (self.coord(Register::Cx), self.coord(Register::Dx));
                let color = self.color;
                self.fb.draw_line(x1, y1, x2, y2, color);
            }
            Syscall::PaintDisplay => {
                self.host.display.present(&self.fb);
            }
        }
        Ok(Step::Continue)
    }

    /// Registers hold coordinates as signed 16-bit values; the rasterizer
    /// clips whatever falls outside the display.
    fn coord(&self, r: Register) -> i32 {
        self.reg(r) as i16 as i32
    }

    /// Collect a null-terminated string out of guest memory.
    fn read_cstring(&self, mut addr: u16) -> Result<String, RuntimeError> {
        let mut out = String::new();
        loop {
            let byte = self.read_byte(addr)?;
            if byte == 0 {
                return Ok(out);
            }
            out.push(byte as char);
            addr = addr.wrapping_add(1);
        }
    }
}

/// Parse a decimal integer with an optional leading `-`, stopping at the
/// first non-digit. Matches the guest-visible 16-bit wraparound.
fn atoi(text: &str) -> u16 {
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let mut value: u16 = 0;
    for ch in digits.chars() {
        let Some(d) = ch.to_digit(10) else { break };
        value = value.wrapping_mul(10).wrapping_add(d as u16);
    }
    if neg {
        value.wrapping_neg()
    } else {
        value
    }
}
