//! Host-facing collaborators: filesystem, display surface, and output
//! stream. The VM core only ever talks to these traits; the CLI wires up
//! the std implementations and tests substitute in-memory ones.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write as _;
use std::rc::Rc;

use colored::Colorize;

use crate::framebuffer::{Framebuffer, DISPLAY_HEIGHT, DISPLAY_WIDTH};

/// Backs the `READ_FILE` syscall.
pub trait FileSystem {
    /// Whole-file read; `None` maps to the guest-visible `AX = -1`.
    fn read(&mut self, path: &str) -> Option<Vec<u8>>;
}

/// Backs the `PAINT_DISPLAY` syscall.
pub trait Display {
    fn present(&mut self, fb: &Framebuffer);
}

/// Append-only character sink behind `PRINT_INT`/`PRINT_CHAR`/`PRINT_STRING`.
pub trait OutputSink {
    fn write_str(&mut self, s: &str);
}

/// The set of collaborators one VM instance runs against.
pub struct Host {
    pub fs: Box<dyn FileSystem>,
    pub display: Box<dyn Display>,
    pub out: Box<dyn OutputSink>,
}

impl Host {
    /// Real filesystem, terminal display, stdout.
    pub fn stdio() -> Host {
        Host {
            fs: Box::new(LocalFs),
            display: Box::new(TermDisplay),
            out: Box::new(StdoutSink),
        }
    }
}

/// Reads through to the real filesystem.
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn read(&mut self, path: &str) -> Option<Vec<u8>> {
        std::fs::read(path).ok()
    }
}

/// Writes straight to stdout, flushing so guest output interleaves
/// correctly with the toolchain's own messages.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_str(&mut self, s: &str) {
        print!("{s}");
        let _ = std::io::stdout().flush();
    }
}

/// Four-shade palette for the 2-bit color indices, dark to light.
const PALETTE: [(u8, u8, u8); 4] = [
    (15, 56, 15),
    (48, 98, 48),
    (139, 172, 15),
    (155, 188, 15),
];

/// Renders the framebuffer into the terminal, two pixels per character
/// cell using the upper-half-block glyph.
pub struct TermDisplay;

impl Display for TermDisplay {
    fn present(&mut self, fb: &Framebuffer) {
        let mut frame = String::new();
        for y in (0..DISPLAY_HEIGHT).step_by(2) {
            for x in 0..DISPLAY_WIDTH {
                let (ur, ug, ub) = PALETTE[fb.get(x, y) as usize];
                let (lr, lg, lb) = PALETTE[fb.get(x, y + 1) as usize];
                let cell = "▀".truecolor(ur, ug, ub).on_truecolor(lr, lg, lb);
                frame.push_str(&cell.to_string());
            }
            frame.push('\n');
        }
        print!("{frame}");
        let _ = std::io::stdout().flush();
    }
}

/// In-memory filesystem for tests and self-contained runs.
#[derive(Default)]
pub struct MemFs {
    files: HashMap<String, Vec<u8>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }
}

impl FileSystem for MemFs {
    fn read(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).cloned()
    }
}

/// Output sink that accumulates into a shared buffer. Clone it before
/// handing it to the VM to read what the guest printed afterwards.
#[derive(Clone, Default)]
pub struct BufferedOut(Rc<RefCell<String>>);

impl BufferedOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.0.borrow().clone()
    }
}

impl OutputSink for BufferedOut {
    fn write_str(&mut self, s: &str) {
        self.0.borrow_mut().push_str(s);
    }
}

/// Display that keeps the most recently presented frame. Clone it before
/// handing it to the VM to inspect the frame afterwards.
#[derive(Clone, Default)]
pub struct CaptureDisplay {
    last: Rc<RefCell<Option<Framebuffer>>>,
    presents: Rc<RefCell<usize>>,
}

impl CaptureDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<Framebuffer> {
        self.last.borrow().clone()
    }

    pub fn present_count(&self) -> usize {
        *self.presents.borrow()
    }
}

impl Display for CaptureDisplay {
    fn present(&mut self, fb: &Framebuffer) {
        *self.last.borrow_mut() = Some(fb.clone());
        *self.presents.borrow_mut() += 1;
    }
}

impl Host {
    /// All-in-memory collaborators, for tests.
    pub fn sandboxed(fs: MemFs, display: CaptureDisplay, out: BufferedOut) -> Host {
        Host {
            fs: Box::new(fs),
            display: Box::new(display),
            out: Box::new(out),
        }
    }
}
