//! Native OCR engine interface.
//!
//! `OcrEngine` is the procedural surface of the Ocrad library: open a session,
//! load an image, configure filters/transform/scale, recognize and read the
//! results back. Status-returning calls keep the native convention (`0` on
//! success, negative on failure, details through [`OcrEngine::get_errno`]) so
//! the session adapter decides what a failure means.
//!
//! # Backends
//!
//! - `CliEngine` drives the `ocrad` executable, one process per recognition
//! - tests plug in scripted engines through the same trait
//!
//! Every engine instance owns a [`StagingArea`] for the files it reads and
//! writes; two engine instances never share staged files.

mod cli;
mod staging;

pub use cli::{CliEngine, CliEngineFactory};
pub use staging::StagingArea;

use crate::error::Result;

/// Handle of one open engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u32);

/// Engine error numbers, as reported by `get_errno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    Ok = 0,
    BadArgument = 1,
    MemError = 2,
    SequenceError = 3,
    LibraryError = 4,
}

impl Errno {
    pub fn code(self) -> i32 {
        self as i32
    }
}

pub trait OcrEngine: Send {
    fn version(&self) -> String;

    fn open(&mut self) -> Result<SessionHandle>;
    fn close(&mut self, session: SessionHandle) -> i32;
    fn get_errno(&self, session: SessionHandle) -> i32;

    fn set_image_from_file(&mut self, session: SessionHandle, name: &str, invert: bool) -> i32;
    fn set_exportfile(&mut self, session: SessionHandle, name: &str) -> i32;
    fn add_filter(&mut self, session: SessionHandle, name: &str) -> i32;
    fn transform(&mut self, session: SessionHandle, name: &str) -> i32;
    /// Negative on an unsupported factor.
    fn scale(&mut self, session: SessionHandle, factor: i32) -> i32;
    /// `-1` selects automatic thresholding, otherwise 0..=255.
    fn set_threshold(&mut self, session: SessionHandle, threshold: i32) -> i32;
    fn set_utf8_format(&mut self, session: SessionHandle, enabled: bool) -> i32;
    fn recognize(&mut self, session: SessionHandle, layout: bool) -> i32;

    fn result_blocks(&self, session: SessionHandle) -> i32;
    fn result_lines(&self, session: SessionHandle, block: i32) -> i32;
    fn result_chars_total(&self, session: SessionHandle) -> i32;
    fn result_chars_block(&self, session: SessionHandle, block: i32) -> i32;
    fn result_chars_line(&self, session: SessionHandle, block: i32, line: i32) -> i32;
    /// Recognized text of one line, newline-terminated.
    fn result_line(&self, session: SessionHandle, block: i32, line: i32) -> Option<String>;
    /// Code point of the best guess for the first character, `0` when there is none.
    fn result_first_character(&self, session: SessionHandle) -> i32;

    fn staging(&self) -> &StagingArea;
}

/// Builds fresh, independent engine instances.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn OcrEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Box<dyn OcrEngine>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn OcrEngine>> {
        self()
    }
}
