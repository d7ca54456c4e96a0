use tracing::{debug, warn};

use crate::engine::{OcrEngine, SessionHandle};
use crate::error::{OcradError, Result};
use crate::options::{Directive, EnginePlan};

/// Staged name of the input raster.
pub const INPUT_FILE: &str = "/in.pnm";
/// Staged name of the engine's raw report.
pub const EXPORT_FILE: &str = "/out.txt";

/// Run one recognition: stage the raster, open a session, apply the plan and
/// read the output back. The session is closed and every staged file removed
/// on all exit paths.
pub fn run_session(engine: &mut dyn OcrEngine, raster: &[u8], plan: &EnginePlan) -> Result<String> {
    let mut scope = SessionScope::new(engine);
    scope.stage(INPUT_FILE, raster)?;
    scope.open()?;

    for directive in plan.directives() {
        scope.apply(directive)?;
    }

    if plan.exports_raw() {
        scope.read_report()
    } else {
        scope.collect_text()
    }
}

/// Owns the session handle and staged names for the duration of one call.
struct SessionScope<'e> {
    engine: &'e mut dyn OcrEngine,
    handle: Option<SessionHandle>,
    staged: Vec<&'static str>,
}

impl<'e> SessionScope<'e> {
    fn new(engine: &'e mut dyn OcrEngine) -> Self {
        Self {
            engine,
            handle: None,
            staged: Vec::new(),
        }
    }

    fn stage(&mut self, name: &'static str, bytes: &[u8]) -> Result<()> {
        self.staged.push(name);
        self.engine.staging().write_file(name, bytes)
    }

    fn open(&mut self) -> Result<()> {
        let handle = self.engine.open()?;
        debug!(session = handle.0, "Opened engine session");
        self.handle = Some(handle);
        Ok(())
    }

    fn handle(&self) -> Result<SessionHandle> {
        self.handle
            .ok_or_else(|| OcradError::Engine("session is not open".to_string()))
    }

    fn check(&self, operation: &str, status: i32) -> Result<()> {
        if status < 0 {
            let handle = self.handle()?;
            return Err(OcradError::engine_status(
                operation,
                status,
                self.engine.get_errno(handle),
            ));
        }
        Ok(())
    }

    fn apply(&mut self, directive: &Directive) -> Result<()> {
        let handle = self.handle()?;
        debug!(session = handle.0, ?directive, "Applying directive");

        match *directive {
            Directive::LoadImage { invert } => {
                let status = self.engine.set_image_from_file(handle, INPUT_FILE, invert);
                self.check("set_image_from_file", status)
            }
            Directive::ExportRaw => {
                self.staged.push(EXPORT_FILE);
                let status = self.engine.set_exportfile(handle, EXPORT_FILE);
                self.check("set_exportfile", status)
            }
            Directive::AddFilter(filter) => {
                let status = self.engine.add_filter(handle, filter.as_str());
                self.check("add_filter", status)
            }
            Directive::SetTransform(transform) => {
                let status = self.engine.transform(handle, transform.as_str());
                self.check("transform", status)
            }
            Directive::Scale(factor) => {
                let status = self.engine.scale(handle, factor);
                if status < 0 {
                    return Err(OcradError::Engine(format!(
                        "Error scaling image by {factor} (status {status}, errno {})",
                        self.engine.get_errno(handle)
                    )));
                }
                Ok(())
            }
            Directive::Utf8Output => {
                let status = self.engine.set_utf8_format(handle, true);
                self.check("set_utf8_format", status)
            }
            Directive::Recognize => {
                let status = self.engine.recognize(handle, false);
                self.check("recognize", status)
            }
        }
    }

    fn read_report(&mut self) -> Result<String> {
        let report = self.engine.staging().read_text(EXPORT_FILE)?;
        self.engine.staging().delete_file(EXPORT_FILE)?;
        self.staged.retain(|name| *name != EXPORT_FILE);
        Ok(report)
    }

    /// Concatenate every line's text, block order then line order.
    fn collect_text(&mut self) -> Result<String> {
        let handle = self.handle()?;
        let blocks = self.engine.result_blocks(handle);
        self.check("result_blocks", blocks)?;

        let mut text = String::new();
        for block in 0..blocks {
            let lines = self.engine.result_lines(handle, block);
            self.check("result_lines", lines)?;
            for line in 0..lines {
                let content = self.engine.result_line(handle, block, line).ok_or_else(|| {
                    OcradError::Engine(format!("result_line({block}, {line}) returned nothing"))
                })?;
                text.push_str(&content);
            }
        }
        Ok(text)
    }
}

impl Drop for SessionScope<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if self.engine.close(handle) < 0 {
                warn!(session = handle.0, "Failed to close engine session");
            } else {
                debug!(session = handle.0, "Closed engine session");
            }
        }

        for name in self.staged.drain(..) {
            let staging = self.engine.staging();
            if !staging.exists(name) {
                continue;
            }
            if let Err(e) = staging.delete_file(name) {
                warn!("Failed to remove staged file {}: {}", name, e);
            }
        }
    }
}
