use crate::air::{MODE_IMM, MODE_MEM_DIRECT, MODE_MEM_DISP, MODE_MEM_REG, MODE_REG};
use crate::error::RuntimeError;
use crate::framebuffer::Framebuffer;
use crate::host::Host;
use crate::image::ExecutableImage;
use crate::symbol::{InstrKind, Register};

/// Drawing color after construction and after `CLEAR_SCREEN`.
pub const DEFAULT_COLOR: u8 = 3;

/// Condition state set by `CMP` and arithmetic, consumed by the
/// conditional jumps using signed 16-bit semantics.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Flags {
    pub zero: bool,
    pub negative: bool,
    pub overflow: bool,
}

/// Outcome of a single instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Step {
    Continue,
    Halt,
}

/// Outcome of a bounded run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StopReason {
    Halted,
    /// The external step budget ran out before `HALT`/`EXIT`.
    BudgetExhausted,
}

/// Where a decoded operand reads from or writes to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Place {
    Reg(Register),
    Imm(u16),
    Mem(u16),
}

/// Represents complete program state during runtime: one flat memory,
/// eight registers, the program counter, flags, and the syscall-facing
/// state (framebuffer, current color, host collaborators).
pub struct RunState {
    mem: Box<[u8]>,
    reg: [u16; 8],
    pc: u16,
    flags: Flags,
    /// Fetch boundary; running past it is an overrun, not a fault
    image_end: u16,
    pub(crate) color: u8,
    pub(crate) fb: Framebuffer,
    pub(crate) host: Host,
}

impl RunState {
    /// Load an image: bytes at address 0, stack pointer at the top of
    /// memory, program counter at the entry point. The optional guest
    /// argument is copied null-terminated after the data region with its
    /// address in `AX`, or `AX = 0` when absent.
    pub fn new(
        image: &ExecutableImage,
        host: Host,
        arg: Option<&str>,
    ) -> Result<RunState, RuntimeError> {
        let mem_size = image.memory_size();
        let mut mem = vec![0u8; mem_size].into_boxed_slice();
        mem[..image.len()].copy_from_slice(image.bytes());

        let mut reg = [0u16; 8];
        reg[Register::Sp.index()] = mem_size as u16;

        if let Some(arg) = arg {
            let addr = image.len();
            let bytes = arg.as_bytes();
            if addr + bytes.len() + 1 > mem_size {
                return Err(RuntimeError::SegmentationFault {
                    addr: mem_size as u16,
                });
            }
            mem[addr..addr + bytes.len()].copy_from_slice(bytes);
            reg[Register::Ax.index()] = addr as u16;
        }

        Ok(RunState {
            mem,
            reg,
            pc: image.entry(),
            flags: Flags::default(),
            image_end: image.len() as u16,
            color: DEFAULT_COLOR,
            fb: Framebuffer::new(),
            host,
        })
    }

    pub fn reg(&self, r: Register) -> u16 {
        self.reg[r.index()]
    }

    pub fn set_reg(&mut self, r: Register, val: u16) {
        self.reg[r.index()] = val;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.fb
    }

    pub fn read_byte(&self, addr: u16) -> Result<u8, RuntimeError> {
        self.mem
            .get(addr as usize)
            .copied()
            .ok_or(RuntimeError::SegmentationFault { addr })
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) -> Result<(), RuntimeError> {
        match self.mem.get_mut(addr as usize) {
            Some(slot) => {
                *slot = val;
                Ok(())
            }
            None => Err(RuntimeError::SegmentationFault { addr }),
        }
    }

    pub fn read_word(&self, addr: u16) -> Result<u16, RuntimeError> {
        let lo = self.read_byte(addr)?;
        let hi = self.read_byte(addr.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub fn write_word(&mut self, addr: u16, val: u16) -> Result<(), RuntimeError> {
        let [lo, hi] = val.to_le_bytes();
        self.write_byte(addr, lo)?;
        self.write_byte(addr.wrapping_add(1), hi)
    }

    /// Run to completion: `Ok` on `HALT`/`EXIT`, the fatal fault otherwise.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if let Step::Halt = self.step()? {
                return Ok(());
            }
        }
    }

    /// Run with an external step budget, for harnesses that need to
    /// detect runaway programs without changing the core's semantics.
    pub fn run_budgeted(&mut self, max_steps: usize) -> Result<StopReason, RuntimeError> {
        for _ in 0..max_steps {
            if let Step::Halt = self.step()? {
                return Ok(StopReason::Halted);
            }
        }
        Ok(StopReason::BudgetExhausted)
    }

    /// Fetch, decode, and execute a single instruction.
    pub fn step(&mut self) -> Result<Step, RuntimeError> {
        use InstrKind::*;
        let at = self.pc;
        let opcode = self.fetch_byte()?;
        let kind = InstrKind::from_opcode(opcode).ok_or(RuntimeError::IllegalInstruction {
            pc: at,
            byte: opcode,
        })?;

        match kind {
            Mov => {
                let dst = self.fetch_operand()?;
                let src = self.fetch_operand()?;
                let val = self.read_place(src)?;
                self.write_place(dst, val)?;
            }
            Add | Sub => {
                let dst = self.fetch_operand()?;
                let src = self.fetch_operand()?;
                let a = self.read_place(dst)?;
                let b = self.read_place(src)?;
                let (res, flags) = if kind == Add {
                    add_flags(a, b)
                } else {
                    sub_flags(a, b)
                };
                self.flags = flags;
                self.write_place(dst, res)?;
            }
            Cmp => {
                let lhs = self.fetch_operand()?;
                let rhs = self.fetch_operand()?;
                let a = self.read_place(lhs)?;
                let b = self.read_place(rhs)?;
                let (_, flags) = sub_flags(a, b);
                self.flags = flags;
            }
            Mul => {
                // Accumulator form: AX = AX * src, truncated to 16 bits
                let src = self.fetch_operand()?;
                let a = self.reg(Register::Ax) as i16 as i32;
                let b = self.read_place(src)? as i16 as i32;
                let full = a * b;
                let res = full as u16;
                self.flags = Flags {
                    zero: res == 0,
                    negative: res & 0x8000 != 0,
                    overflow: full != res as i16 as i32,
                };
                self.set_reg(Register::Ax, res);
            }
            Inc | Dec => {
                let dst = self.fetch_operand()?;
                let a = self.read_place(dst)?;
                let (res, flags) = if kind == Inc {
                    add_flags(a, 1)
                } else {
                    sub_flags(a, 1)
                };
                self.flags = flags;
                self.write_place(dst, res)?;
            }
            Jmp => {
                let target = self.fetch_operand()?;
                self.pc = self.read_place(target)?;
            }
            Je | Jne | Jl | Jle | Jg | Jge => {
                let target = self.fetch_operand()?;
                if self.cond(kind) {
                    self.pc = self.read_place(target)?;
                }
            }
            Loop => {
                // Fused decrement-and-branch on CX; entering with CX = 0
                // wraps to 0xFFFF and the branch is taken. Flags untouched.
                let target = self.fetch_operand()?;
                let cx = self.reg(Register::Cx).wrapping_sub(1);
                self.set_reg(Register::Cx, cx);
                if cx != 0 {
                    self.pc = self.read_place(target)?;
                }
            }
            Call => {
                let target = self.fetch_operand()?;
                let ret = self.pc;
                self.push(ret)?;
                self.pc = self.read_place(target)?;
            }
            Ret => {
                self.pc = self.pop()?;
            }
            Push => {
                let src = self.fetch_operand()?;
                let val = self.read_place(src)?;
                self.push(val)?;
            }
            Pop => {
                let dst = self.fetch_operand()?;
                let val = self.pop()?;
                self.write_place(dst, val)?;
            }
            Syscall => {
                let vect = self.fetch_byte()?;
                return self.syscall(vect);
            }
            Halt => return Ok(Step::Halt),
        }
        Ok(Step::Continue)
    }

    fn fetch_byte(&mut self) -> Result<u8, RuntimeError> {
        if self.pc >= self.image_end {
            return Err(RuntimeError::ImageOverrun { pc: self.pc });
        }
        let byte = self.mem[self.pc as usize];
        self.pc += 1;
        Ok(byte)
    }

    fn fetch_word(&mut self) -> Result<u16, RuntimeError> {
        let lo = self.fetch_byte()?;
        let hi = self.fetch_byte()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn fetch_operand(&mut self) -> Result<Place, RuntimeError> {
        let at = self.pc;
        let mode = self.fetch_byte()?;
        let tag = mode >> 4;
        let reg = || {
            Register::from_index(mode & 0x0F).ok_or(RuntimeError::IllegalInstruction {
                pc: at,
                byte: mode,
            })
        };
        Ok(match tag {
            MODE_REG => Place::Reg(reg()?),
            MODE_IMM => Place::Imm(self.fetch_word()?),
            MODE_MEM_DIRECT => Place::Mem(self.fetch_word()?),
            MODE_MEM_REG => Place::Mem(self.reg(reg()?)),
            MODE_MEM_DISP => {
                let r = reg()?;
                let offs = self.fetch_word()?;
                Place::Mem(self.reg(r).wrapping_add(offs))
            }
            _ => {
                return Err(RuntimeError::IllegalInstruction {
                    pc: at,
                    byte: mode,
                })
            }
        })
    }

    fn read_place(&self, place: Place) -> Result<u16, RuntimeError> {
        match place {
            Place::Reg(r) => Ok(self.reg(r)),
            Place::Imm(val) => Ok(val),
            Place::Mem(addr) => self.read_word(addr),
        }
    }

    fn write_place(&mut self, place: Place, val: u16) -> Result<(), RuntimeError> {
        match place {
            Place::Reg(r) => {
                self.set_reg(r, val);
                Ok(())
            }
            Place::Mem(addr) => self.write_word(addr, val),
            Place::Imm(_) => Err(RuntimeError::IllegalInstruction {
                pc: self.pc,
                byte: (MODE_IMM) << 4,
            }),
        }
    }

    pub(crate) fn push(&mut self, val: u16) -> Result<(), RuntimeError> {
        let sp = self.reg(Register::Sp).wrapping_sub(2);
        self.write_word(sp, val)?;
        self.set_reg(Register::Sp, sp);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<u16, RuntimeError> {
        let sp = self.reg(Register::Sp);
        if sp as usize >= self.mem.len() {
            return Err(RuntimeError::StackUnderflow);
        }
        let val = self.read_word(sp)?;
        self.set_reg(Register::Sp, sp.wrapping_add(2));
        Ok(val)
    }

    fn cond(&self, kind: InstrKind) -> bool {
        let f = self.flags;
        match kind {
            InstrKind::Je => f.zero,
            InstrKind::Jne => !f.zero,
            InstrKind::Jl => f.negative != f.overflow,
            InstrKind::Jge => f.negative == f.overflow,
            InstrKind::Jle => f.zero || f.negative != f.overflow,
            InstrKind::Jg => !f.zero && f.negative == f.overflow,
            _ => unreachable!("not a conditional jump"),
        }
    }
}

fn add_flags(a: u16, b: u16) -> (u16, Flags) {
    let res = a.wrapping_add(b);
    let flags = Flags {
        zero: res == 0,
        negative: res & 0x8000 != 0,
        overflow: (a ^ res) & (b ^ res) & 0x8000 != 0,
    };
    (res, flags)
}

fn sub_flags(a: u16, b: u16) -> (u16, Flags) {
    let res = a.wrapping_sub(b);
    let flags = Flags {
        zero: res == 0,
        negative: res & 0x8000 != 0,
        overflow: (a ^ b) & (a ^ res) & 0x8000 != 0,
    };
    (res, flags)
}
