//! Result formatting: plain pass-through and the verbose report parser.
//!
//! The engine's report ("ORF") is a line-oriented text format:
//!
//! ```text
//! # Ocr Results File. Created by GNU Ocrad version 0.25
//! source file in.pnm
//! total text blocks 1
//! text block 1 0 0 120 40
//! lines 1
//! line 1 chars 2 height 18
//!  12  10 9 14; 2, 'H'87, 'N'60
//!  23  10 4 14; 1, 'i'90
//! ```
//!
//! Everything before `total text blocks` is skipped. From there on each line
//! must match the production expected at its position; anything else is a
//! [`OcradError::Parse`] naming the 1-based report line.

use std::iter::Enumerate;
use std::str::{FromStr, Lines};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::{OcradError, Result};
use crate::models::{Block, Letter, Line, Match, Recognition, StructuredResult};

/// Receives every raw report line, in order.
pub type LineCallback = Box<dyn FnMut(&str) + Send>;

struct ReportPatterns {
    total_blocks: Regex,
    block: Regex,
    line_count: Regex,
    line: Regex,
    letter: Regex,
}

fn patterns() -> &'static ReportPatterns {
    static PATTERNS: OnceLock<ReportPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ReportPatterns {
        total_blocks: Regex::new(r"^total text blocks (\d+)").expect("valid regex"),
        block: Regex::new(r"^text block (\d+) (\d+) (\d+) (\d+) (\d+)").expect("valid regex"),
        line_count: Regex::new(r"^lines (\d+)").expect("valid regex"),
        line: Regex::new(r"^line (\d+) chars (\d+) height (\d+)").expect("valid regex"),
        letter: Regex::new(r"^\s*(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s*;\s*(\d+)(,?.+)?$")
            .expect("valid regex"),
    })
}

/// Apply the output mode to the adapter's output. Every raw line goes to the
/// line callback first; verbose output is parsed, anything else is returned as is.
pub fn format_output(
    raw: String,
    verbose: bool,
    line_callback: Option<&mut LineCallback>,
) -> Result<Recognition> {
    if let Some(callback) = line_callback {
        for line in raw.lines() {
            callback(line);
        }
    }

    if verbose {
        return Ok(Recognition::Structured(parse_report(&raw)?));
    }
    Ok(Recognition::Text(raw))
}

/// Parse a verbose engine report into blocks, lines and letters.
pub fn parse_report(raw: &str) -> Result<StructuredResult> {
    ReportCursor::new(raw).parse()
}

struct ReportCursor<'a> {
    lines: Enumerate<Lines<'a>>,
    result: StructuredResult,
}

impl<'a> ReportCursor<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            lines: raw.lines().enumerate(),
            result: StructuredResult::default(),
        }
    }

    fn parse(mut self) -> Result<StructuredResult> {
        let block_count: usize = self.skip_to_header()?;
        for _ in 0..block_count {
            let block = self.block()?;
            self.result.blocks.push(block);
        }
        Ok(self.result)
    }

    fn next_line(&mut self, expecting: &str) -> Result<(usize, &'a str)> {
        self.lines
            .next()
            .map(|(index, line)| (index + 1, line))
            .ok_or_else(|| {
                OcradError::Parse(format!("report ended while expecting {expecting}"))
            })
    }

    fn expect(&mut self, pattern: &Regex, expecting: &str) -> Result<(usize, Captures<'a>)> {
        let (number, line) = self.next_line(expecting)?;
        pattern
            .captures(line)
            .map(|caps| (number, caps))
            .ok_or_else(|| {
                OcradError::Parse(format!(
                    "line {number}: expected {expecting}, found {line:?}"
                ))
            })
    }

    fn skip_to_header(&mut self) -> Result<usize> {
        let pattern = &patterns().total_blocks;
        for (index, line) in self.lines.by_ref() {
            if let Some(caps) = pattern.captures(line) {
                return field(&caps, 1, index + 1);
            }
        }
        Err(OcradError::Parse(
            "report has no `total text blocks` header".to_string(),
        ))
    }

    fn block(&mut self) -> Result<Block> {
        let (number, caps) = self.expect(
            &patterns().block,
            "`text block <index> <x> <y> <width> <height>`",
        )?;
        let (x, y, width, height) = (
            field(&caps, 2, number)?,
            field(&caps, 3, number)?,
            field(&caps, 4, number)?,
            field(&caps, 5, number)?,
        );

        let (number, caps) = self.expect(&patterns().line_count, "`lines <count>`")?;
        let line_count: usize = field(&caps, 1, number)?;

        let mut lines = Vec::with_capacity(line_count);
        for _ in 0..line_count {
            let line = self.line()?;
            self.result.lines.push(line.clone());
            lines.push(line);
        }

        Ok(Block {
            x,
            y,
            width,
            height,
            lines,
        })
    }

    fn line(&mut self) -> Result<Line> {
        let (number, caps) = self.expect(
            &patterns().line,
            "`line <index> chars <count> height <height>`",
        )?;
        let char_count: usize = field(&caps, 2, number)?;
        let height = field(&caps, 3, number)?;

        let mut letters = Vec::with_capacity(char_count);
        for _ in 0..char_count {
            let letter = self.letter()?;
            self.result.letters.push(letter.clone());
            letters.push(letter);
        }

        Ok(Line { height, letters })
    }

    fn letter(&mut self) -> Result<Letter> {
        let (number, caps) = self.expect(
            &patterns().letter,
            "letter record `<x> <y> <width> <height>; <count>[, '<glyph>'<confidence>]*`",
        )?;
        let match_count: usize = field(&caps, 5, number)?;
        let tail = caps.get(6).map(|m| m.as_str()).unwrap_or("");
        let matches = parse_matches(tail, match_count, number)?;

        Ok(Letter {
            x: field(&caps, 1, number)?,
            y: field(&caps, 2, number)?,
            width: field(&caps, 3, number)?,
            height: field(&caps, 4, number)?,
            matches,
        })
    }
}

fn field<T: FromStr>(caps: &Captures<'_>, index: usize, line: usize) -> Result<T> {
    let text = caps.get(index).map(|m| m.as_str()).unwrap_or("");
    text.parse().map_err(|_| {
        OcradError::Parse(format!("line {line}: number {text:?} is out of range"))
    })
}

/// Consume `, '<glyph>'<confidence>` groups until the tail is exhausted.
fn parse_matches(tail: &str, expected: usize, line: usize) -> Result<Vec<Match>> {
    let mut rest = tail.trim();
    let mut matches = Vec::with_capacity(expected);

    while let Some(token) = rest.strip_prefix(", ") {
        let (parsed, remainder) = parse_match(token).ok_or_else(|| {
            OcradError::Parse(format!("line {line}: malformed candidate {token:?}"))
        })?;
        matches.push(parsed);
        rest = remainder;
    }

    if !rest.is_empty() {
        return Err(OcradError::Parse(format!(
            "line {line}: unexpected trailing text {rest:?}"
        )));
    }
    if matches.len() != expected {
        return Err(OcradError::Parse(format!(
            "line {line}: record declares {expected} candidates but lists {}",
            matches.len()
        )));
    }
    Ok(matches)
}

/// Parse `'<glyph>'<digits>` at the start of `token`. The glyph is the shortest
/// non-empty text closed by a quote that is directly followed by a digit, so
/// quote and comma glyphs (`'''87`, `','40`) parse unambiguously.
fn parse_match(token: &str) -> Option<(Match, &str)> {
    let body = token.strip_prefix('\'')?;
    let mut chars = body.char_indices();
    chars.next()?;

    for (index, ch) in chars {
        if ch != '\'' {
            continue;
        }
        let after = &body[index + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            continue;
        }
        let confidence = after[..digits].parse().ok()?;
        let found = Match {
            letter: body[..index].to_string(),
            confidence,
        };
        return Some((found, &after[digits..]));
    }
    None
}
