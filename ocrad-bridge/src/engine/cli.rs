use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{OcradError, Result};
use crate::models::StructuredResult;
use crate::options::{FilterName, TransformName};
use crate::report::parse_report;

use super::{EngineFactory, Errno, OcrEngine, SessionHandle, StagingArea};

const MAX_SCALE: i32 = 100;

/// Per-session configuration collected until `recognize` runs the engine.
#[derive(Debug, Default)]
struct CliSession {
    image: Option<PathBuf>,
    invert: bool,
    export: Option<String>,
    filters: Vec<FilterName>,
    transform: Option<TransformName>,
    scale: Option<i32>,
    threshold: Option<i32>,
    utf8: bool,
    errno: i32,
    report: Option<StructuredResult>,
}

impl CliSession {
    fn fail(&mut self, errno: Errno) -> i32 {
        self.errno = errno.code();
        -1
    }

    fn succeed(&mut self) -> i32 {
        self.errno = Errno::Ok.code();
        0
    }

    fn block(&self, block: i32) -> Option<&crate::models::Block> {
        let report = self.report.as_ref()?;
        usize::try_from(block).ok().and_then(|b| report.blocks.get(b))
    }

    fn line(&self, block: i32, line: i32) -> Option<&crate::models::Line> {
        let block = self.block(block)?;
        usize::try_from(line).ok().and_then(|l| block.lines.get(l))
    }
}

/// Command-line arguments for one `ocrad` run.
fn command_args(session: &CliSession, image: &str, export: &str, layout: bool) -> Vec<String> {
    let format = if session.utf8 { "utf8" } else { "byte" };
    let mut args = vec![format!("--format={format}")];
    if session.invert {
        args.push("--invert".to_string());
    }
    for filter in &session.filters {
        args.push(format!("--filter={filter}"));
    }
    if let Some(transform) = session.transform {
        args.push(format!("--transform={transform}"));
    }
    if let Some(scale) = session.scale {
        args.push(format!("--scale={scale}"));
    }
    if let Some(threshold) = session.threshold {
        args.push(format!("--threshold={}%", threshold * 100 / 255));
    }
    if layout {
        args.push("--layout".to_string());
    }
    args.push(format!("--export={export}"));
    args.push(image.to_string());
    args
}

/// `ocrad --version` prints `GNU Ocrad 0.25` on its first line.
fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().last())
        .map(str::to_string)
}

/// The `ocrad` executable behind the native engine interface.
pub struct CliEngine {
    binary: PathBuf,
    version: String,
    staging: StagingArea,
    sessions: HashMap<u32, CliSession>,
    next_session: u32,
}

impl CliEngine {
    /// Probe the executable once; a missing or broken binary makes the
    /// engine unavailable.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let binary = PathBuf::from(&config.binary);
        let output = Command::new(&binary)
            .arg("--version")
            .output()
            .map_err(|e| {
                OcradError::EngineUnavailable(format!(
                    "failed to execute {}: {e}",
                    binary.display()
                ))
            })?;

        if !output.status.success() {
            return Err(OcradError::EngineUnavailable(format!(
                "{} --version exited with {}",
                binary.display(),
                output.status
            )));
        }

        let version = parse_version(&String::from_utf8_lossy(&output.stdout))
            .unwrap_or_else(|| "unknown".to_string());

        let staging = match &config.staging_dir {
            Some(root) => StagingArea::in_dir(root)?,
            None => StagingArea::new()?,
        };

        info!(binary = %binary.display(), version = %version, "Ocrad engine initialized");

        Ok(Self {
            binary,
            version,
            staging,
            sessions: HashMap::new(),
            next_session: 1,
        })
    }

    fn session(&self, session: SessionHandle) -> Option<&CliSession> {
        self.sessions.get(&session.0)
    }

    fn session_mut(&mut self, session: SessionHandle) -> Option<&mut CliSession> {
        self.sessions.get_mut(&session.0)
    }

    fn run(&self, handle: SessionHandle, layout: bool) -> Result<StructuredResult> {
        let internal_export = format!("session-{}.orf", handle.0);
        let Some(session) = self.sessions.get(&handle.0) else {
            return Err(OcradError::Engine(format!("unknown session {}", handle.0)));
        };
        let Some(image) = session.image.as_ref() else {
            return Err(OcradError::Engine("no image loaded".to_string()));
        };

        let export_name = session
            .export
            .clone()
            .unwrap_or_else(|| internal_export.clone());
        let export_path = self.staging.path(&export_name)?;
        let args = command_args(
            session,
            &image.to_string_lossy(),
            &export_path.to_string_lossy(),
            layout,
        );

        debug!(binary = %self.binary.display(), ?args, "Running ocrad");
        let output = Command::new(&self.binary).args(&args).output()?;
        if !output.status.success() {
            return Err(OcradError::Engine(format!(
                "ocrad exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let report = String::from_utf8_lossy(&self.staging.read_file(&export_name)?).into_owned();
        if session.export.is_none() {
            if let Err(e) = self.staging.delete_file(&internal_export) {
                warn!("Failed to remove {}: {}", internal_export, e);
            }
        }

        parse_report(&report)
    }
}

impl OcrEngine for CliEngine {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn open(&mut self) -> Result<SessionHandle> {
        let handle = SessionHandle(self.next_session);
        self.next_session = self.next_session.wrapping_add(1);
        self.sessions.insert(handle.0, CliSession::default());
        Ok(handle)
    }

    fn close(&mut self, session: SessionHandle) -> i32 {
        match self.sessions.remove(&session.0) {
            Some(_) => 0,
            None => -1,
        }
    }

    fn get_errno(&self, session: SessionHandle) -> i32 {
        self.session(session)
            .map(|s| s.errno)
            .unwrap_or(Errno::BadArgument.code())
    }

    fn set_image_from_file(&mut self, session: SessionHandle, name: &str, invert: bool) -> i32 {
        let path = self.staging.path(name).ok().filter(|p| p.is_file());
        let Some(state) = self.session_mut(session) else {
            return -1;
        };
        match path {
            Some(path) => {
                state.image = Some(path);
                state.invert = invert;
                state.report = None;
                state.succeed()
            }
            None => state.fail(Errno::BadArgument),
        }
    }

    fn set_exportfile(&mut self, session: SessionHandle, name: &str) -> i32 {
        let valid = self.staging.path(name).is_ok();
        let Some(state) = self.session_mut(session) else {
            return -1;
        };
        if !valid {
            return state.fail(Errno::BadArgument);
        }
        state.export = Some(name.to_string());
        state.succeed()
    }

    fn add_filter(&mut self, session: SessionHandle, name: &str) -> i32 {
        let Some(state) = self.session_mut(session) else {
            return -1;
        };
        match name.parse::<FilterName>() {
            Ok(filter) => {
                state.filters.push(filter);
                state.succeed()
            }
            Err(_) => state.fail(Errno::BadArgument),
        }
    }

    fn transform(&mut self, session: SessionHandle, name: &str) -> i32 {
        let Some(state) = self.session_mut(session) else {
            return -1;
        };
        match name.parse::<TransformName>() {
            Ok(transform) => {
                state.transform = Some(transform);
                state.succeed()
            }
            Err(_) => state.fail(Errno::BadArgument),
        }
    }

    fn scale(&mut self, session: SessionHandle, factor: i32) -> i32 {
        let Some(state) = self.session_mut(session) else {
            return -1;
        };
        if factor == 0 || factor.abs() > MAX_SCALE {
            return state.fail(Errno::BadArgument);
        }
        state.scale = Some(factor);
        state.succeed()
    }

    fn set_threshold(&mut self, session: SessionHandle, threshold: i32) -> i32 {
        let Some(state) = self.session_mut(session) else {
            return -1;
        };
        match threshold {
            -1 => {
                state.threshold = None;
                state.succeed()
            }
            0..=255 => {
                state.threshold = Some(threshold);
                state.succeed()
            }
            _ => state.fail(Errno::BadArgument),
        }
    }

    fn set_utf8_format(&mut self, session: SessionHandle, enabled: bool) -> i32 {
        let Some(state) = self.session_mut(session) else {
            return -1;
        };
        state.utf8 = enabled;
        state.succeed()
    }

    fn recognize(&mut self, session: SessionHandle, layout: bool) -> i32 {
        let outcome = match self.session(session) {
            None => return -1,
            Some(state) if state.image.is_none() => Err(Errno::SequenceError),
            Some(_) => self.run(session, layout).map_err(|e| {
                warn!("Recognition failed: {}", e);
                Errno::LibraryError
            }),
        };

        let Some(state) = self.session_mut(session) else {
            return -1;
        };
        match outcome {
            Ok(report) => {
                state.report = Some(report);
                state.succeed()
            }
            Err(errno) => state.fail(errno),
        }
    }

    fn result_blocks(&self, session: SessionHandle) -> i32 {
        self.session(session)
            .and_then(|s| s.report.as_ref())
            .map(|r| r.blocks.len() as i32)
            .unwrap_or(-1)
    }

    fn result_lines(&self, session: SessionHandle, block: i32) -> i32 {
        self.session(session)
            .and_then(|s| s.block(block))
            .map(|b| b.lines.len() as i32)
            .unwrap_or(-1)
    }

    fn result_chars_total(&self, session: SessionHandle) -> i32 {
        self.session(session)
            .and_then(|s| s.report.as_ref())
            .map(|r| r.letters.len() as i32)
            .unwrap_or(-1)
    }

    fn result_chars_block(&self, session: SessionHandle, block: i32) -> i32 {
        self.session(session)
            .and_then(|s| s.block(block))
            .map(|b| b.lines.iter().map(|l| l.letters.len() as i32).sum::<i32>())
            .unwrap_or(-1)
    }

    fn result_chars_line(&self, session: SessionHandle, block: i32, line: i32) -> i32 {
        self.session(session)
            .and_then(|s| s.line(block, line))
            .map(|l| l.letters.len() as i32)
            .unwrap_or(-1)
    }

    fn result_line(&self, session: SessionHandle, block: i32, line: i32) -> Option<String> {
        let line = self.session(session)?.line(block, line)?;
        let mut text = line.text();
        text.push('\n');
        Some(text)
    }

    fn result_first_character(&self, session: SessionHandle) -> i32 {
        let Some(report) = self.session(session).and_then(|s| s.report.as_ref()) else {
            return -1;
        };
        report
            .letters
            .first()
            .and_then(|letter| letter.matches.first())
            .and_then(|m| m.letter.chars().next())
            .map(|c| c as i32)
            .unwrap_or(0)
    }

    fn staging(&self) -> &StagingArea {
        &self.staging
    }
}

/// Creates a new [`CliEngine`] per call, each with its own staging directory.
#[derive(Debug, Clone)]
pub struct CliEngineFactory {
    config: EngineConfig,
}

impl CliEngineFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for CliEngineFactory {
    fn create(&self) -> Result<Box<dyn OcrEngine>> {
        Ok(Box::new(CliEngine::new(&self.config)?))
    }
}
