//! Discovery of pass directives in shader source.
//!
//! Passes are declared by the conditional blocks the author writes:
//!
//! ```glsl
//! #ifdef BUFFER_0
//!     ...
//! #elif defined(DOUBLE_BUFFER_0)
//!     ...
//! #elif defined( POSTPROCESSING )
//!     ...
//! #else
//!     // main pass
//! #endif
//! ```
//!
//! Only `#ifdef NAME`, `#if defined(NAME)` and `#elif defined(NAME)` lines
//! count; symbols mentioned anywhere else are ignored.

use crate::error::{BufferFamily, SandboxError, SandboxResult};

/// A recognized pass directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Background,
    Buffer(u32),
    DoubleBuffer(u32),
    Postprocessing,
}

/// Which passes a shader declares.
///
/// Buffer index lists hold each distinct index once, in the order first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveScan {
    pub background: bool,
    pub buffers: Vec<u32>,
    pub double_buffers: Vec<u32>,
    pub postprocessing: bool,
}

impl DirectiveScan {
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn double_buffer_count(&self) -> usize {
        self.double_buffers.len()
    }

    /// Rejects index sets that are not exactly `0..n`.
    ///
    /// Uniform names are derived from indices, so a gap would leave a pass
    /// publishing under a name the shader never reads.
    pub fn validate(&self) -> SandboxResult<()> {
        check_contiguous(BufferFamily::Buffer, &self.buffers)?;
        check_contiguous(BufferFamily::DoubleBuffer, &self.double_buffers)
    }

    fn record(&mut self, directive: Directive) {
        match directive {
            Directive::Background => self.background = true,
            Directive::Postprocessing => self.postprocessing = true,
            Directive::Buffer(i) => push_distinct(&mut self.buffers, i),
            Directive::DoubleBuffer(i) => push_distinct(&mut self.double_buffers, i),
        }
    }
}

fn push_distinct(list: &mut Vec<u32>, index: u32) {
    if !list.contains(&index) {
        list.push(index);
    }
}

fn check_contiguous(family: BufferFamily, indices: &[u32]) -> SandboxResult<()> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    let contiguous = sorted.iter().enumerate().all(|(i, &v)| v as usize == i);
    if contiguous {
        Ok(())
    } else {
        Err(SandboxError::NonContiguousIndices {
            family,
            indices: indices.to_vec(),
        })
    }
}

/// Scans `source` for pass directives.
pub fn scan(source: &str) -> DirectiveScan {
    let mut found = DirectiveScan::default();
    for directive in source.lines().filter_map(parse_line) {
        found.record(directive);
    }
    found
}

/// Parses one line as a directive, if it is one.
pub fn parse_line(line: &str) -> Option<Directive> {
    let line = line.trim_start();

    let symbol = if let Some(rest) = line.strip_prefix("#ifdef") {
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        identifier(rest.trim_start())
    } else if let Some(rest) = line
        .strip_prefix("#elif")
        .or_else(|| line.strip_prefix("#if"))
    {
        defined_symbol(rest)?
    } else {
        return None;
    };

    classify(symbol)
}

/// Extracts `NAME` from ` defined ( NAME )`.
fn defined_symbol(text: &str) -> Option<&str> {
    let rest = text.trim_start().strip_prefix("defined")?;
    let rest = rest.trim_start().strip_prefix('(')?;
    let rest = rest.trim_start();
    let name = identifier(rest);
    rest[name.len()..].trim_start().starts_with(')').then_some(name)
}

fn identifier(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

fn classify(symbol: &str) -> Option<Directive> {
    match symbol {
        "BACKGROUND" => Some(Directive::Background),
        "POSTPROCESSING" => Some(Directive::Postprocessing),
        _ => {
            if let Some(n) = symbol.strip_prefix("DOUBLE_BUFFER_") {
                index(n).map(Directive::DoubleBuffer)
            } else if let Some(n) = symbol.strip_prefix("BUFFER_") {
                index(n).map(Directive::Buffer)
            } else {
                None
            }
        }
    }
}

fn index(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
