// Common test utilities for integration tests
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use ocrad_bridge::engine::{EngineFactory, Errno, OcrEngine, SessionHandle, StagingArea};
use ocrad_bridge::Result;

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A verbose report with one block: "Hi" on the first line, "1" on the second.
pub const SAMPLE_REPORT: &str = "\
# Ocr Results File. Created by GNU Ocrad version 0.25
source file in.pnm
total text blocks 1
text block 1 0 0 120 40
lines 2
line 1 chars 2 height 18
 12  10 9 14; 2, 'H'87, 'N'60
 23  10 4 14; 1, 'i'90
line 2 chars 1 height 16
 12  30 8 14; 1, '1'95
";

/// What a [`ScriptedEngine`] answers.
#[derive(Debug, Clone)]
pub struct Script {
    /// Line texts per block, returned by `result_line` with a trailing newline.
    pub blocks: Vec<Vec<String>>,
    /// Written to the export file on `recognize` when one was requested.
    pub report: String,
    pub scale_status: i32,
    pub recognize_status: i32,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            blocks: vec![
                vec!["Hi".to_string(), "1".to_string()],
                vec!["there".to_string()],
            ],
            report: SAMPLE_REPORT.to_string(),
            scale_status: 0,
            recognize_status: 0,
        }
    }
}

/// Observations shared by every engine a probe's factory creates.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    calls: Arc<Mutex<Vec<String>>>,
    inputs: Arc<Mutex<Vec<Vec<u8>>>>,
    roots: Arc<Mutex<Vec<PathBuf>>>,
    created: Arc<AtomicUsize>,
}

impl Probe {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Rasters the engines found staged when loading the image.
    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }

    /// Staging directories of every engine created so far.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn engine(&self, script: Script) -> ScriptedEngine {
        ScriptedEngine::new(script, self.clone())
    }

    pub fn factory(&self, script: Script) -> impl EngineFactory + 'static {
        let probe = self.clone();
        move || -> Result<Box<dyn OcrEngine>> { Ok(Box::new(probe.engine(script.clone()))) }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

/// In-memory engine that logs every call and answers from a [`Script`].
pub struct ScriptedEngine {
    script: Script,
    probe: Probe,
    staging: StagingArea,
    export: Option<String>,
    next_session: u32,
    errno: i32,
}

impl ScriptedEngine {
    pub fn new(script: Script, probe: Probe) -> Self {
        let staging = StagingArea::new().expect("staging area");
        probe.roots.lock().unwrap().push(staging.root().to_path_buf());
        probe.created.fetch_add(1, Ordering::SeqCst);
        Self {
            script,
            probe,
            staging,
            export: None,
            next_session: 1,
            errno: 0,
        }
    }

    fn status(&mut self, status: i32, errno: Errno) -> i32 {
        self.errno = if status < 0 { errno.code() } else { 0 };
        status
    }
}

impl OcrEngine for ScriptedEngine {
    fn version(&self) -> String {
        "scripted".to_string()
    }

    fn open(&mut self) -> Result<SessionHandle> {
        self.probe.record("open");
        let handle = SessionHandle(self.next_session);
        self.next_session += 1;
        Ok(handle)
    }

    fn close(&mut self, _session: SessionHandle) -> i32 {
        self.probe.record("close");
        self.export = None;
        0
    }

    fn get_errno(&self, _session: SessionHandle) -> i32 {
        self.errno
    }

    fn set_image_from_file(&mut self, _session: SessionHandle, name: &str, invert: bool) -> i32 {
        self.probe
            .record(format!("set_image_from_file({name}, {invert})"));
        match self.staging.read_file(name) {
            Ok(bytes) => {
                self.probe.inputs.lock().unwrap().push(bytes);
                self.status(0, Errno::Ok)
            }
            Err(_) => self.status(-1, Errno::BadArgument),
        }
    }

    fn set_exportfile(&mut self, _session: SessionHandle, name: &str) -> i32 {
        self.probe.record(format!("set_exportfile({name})"));
        self.export = Some(name.to_string());
        0
    }

    fn add_filter(&mut self, _session: SessionHandle, name: &str) -> i32 {
        self.probe.record(format!("add_filter({name})"));
        0
    }

    fn transform(&mut self, _session: SessionHandle, name: &str) -> i32 {
        self.probe.record(format!("transform({name})"));
        0
    }

    fn scale(&mut self, _session: SessionHandle, factor: i32) -> i32 {
        self.probe.record(format!("scale({factor})"));
        let status = self.script.scale_status;
        self.status(status, Errno::BadArgument)
    }

    fn set_threshold(&mut self, _session: SessionHandle, threshold: i32) -> i32 {
        self.probe.record(format!("set_threshold({threshold})"));
        0
    }

    fn set_utf8_format(&mut self, _session: SessionHandle, enabled: bool) -> i32 {
        self.probe.record(format!("set_utf8_format({enabled})"));
        0
    }

    fn recognize(&mut self, _session: SessionHandle, layout: bool) -> i32 {
        self.probe.record(format!("recognize({layout})"));
        if self.script.recognize_status < 0 {
            let status = self.script.recognize_status;
            return self.status(status, Errno::LibraryError);
        }
        let written = match &self.export {
            Some(export) => self
                .staging
                .write_file(export, self.script.report.as_bytes())
                .is_ok(),
            None => true,
        };
        if written {
            self.status(0, Errno::Ok)
        } else {
            self.status(-1, Errno::LibraryError)
        }
    }

    fn result_blocks(&self, _session: SessionHandle) -> i32 {
        self.probe.record("result_blocks");
        self.script.blocks.len() as i32
    }

    fn result_lines(&self, _session: SessionHandle, block: i32) -> i32 {
        self.probe.record(format!("result_lines({block})"));
        self.script
            .blocks
            .get(block as usize)
            .map_or(-1, |lines| lines.len() as i32)
    }

    fn result_chars_total(&self, _session: SessionHandle) -> i32 {
        self.script
            .blocks
            .iter()
            .flatten()
            .map(|line| line.chars().count() as i32)
            .sum()
    }

    fn result_chars_block(&self, _session: SessionHandle, block: i32) -> i32 {
        self.script.blocks.get(block as usize).map_or(-1, |lines| {
            lines.iter().map(|line| line.chars().count() as i32).sum()
        })
    }

    fn result_chars_line(&self, _session: SessionHandle, block: i32, line: i32) -> i32 {
        self.script
            .blocks
            .get(block as usize)
            .and_then(|lines| lines.get(line as usize))
            .map_or(-1, |text| text.chars().count() as i32)
    }

    fn result_line(&self, _session: SessionHandle, block: i32, line: i32) -> Option<String> {
        self.probe.record(format!("result_line({block}, {line})"));
        self.script
            .blocks
            .get(block as usize)
            .and_then(|lines| lines.get(line as usize))
            .map(|text| format!("{text}\n"))
    }

    fn result_first_character(&self, _session: SessionHandle) -> i32 {
        self.script
            .blocks
            .iter()
            .flatten()
            .find_map(|line| line.chars().next())
            .map_or(0, |c| c as i32)
    }

    fn staging(&self) -> &StagingArea {
        &self.staging
    }
}

/// A 2x1 RGBA image: one white pixel, one black pixel.
pub fn two_pixels() -> ocrad_bridge::PixelBuffer {
    ocrad_bridge::PixelBuffer::new(2, 1, vec![255, 255, 255, 255, 0, 0, 0, 255])
}

/// The PGM raster [`two_pixels`] normalizes to.
pub fn two_pixels_pgm() -> Vec<u8> {
    let mut expected = b"P5\n2 1\n255\n".to_vec();
    expected.extend_from_slice(&[255, 0]);
    expected
}
