use std::collections::VecDeque;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AsmError;

/// Lines starting with this marker steer the parser instead of creating
/// line records.
pub const DIRECTIVE_PREFIX: &str = "\x01\x01";

pub const SETCONTEXT: &str = "SETCONTEXT";
pub const SETLINENO: &str = "SETLINENO";
pub const SETNOEXPANDSTART: &str = "SETNOEXPANDSTART";
pub const SETNOEXPANDEND: &str = "SETNOEXPANDEND";

pub fn directive(name: &str, arg: impl Display) -> String {
    format!("{DIRECTIVE_PREFIX}{name} {arg}")
}

struct Frame {
    spec: String,
    dir: Option<PathBuf>,
    lines: VecDeque<String>,
    is_macro: bool,
}

/// Stack of line sources: the main file, included files and macro bodies.
pub struct Input {
    frames: Vec<Frame>,
    include_paths: Vec<PathBuf>,
    discovered: Vec<PathBuf>,
}

impl Input {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self {
            frames: Vec::new(),
            include_paths,
            discovered: Vec::new(),
        }
    }

    /// An input reading `text` as if it were the file `spec`.
    pub fn from_str(spec: &str, text: &str) -> Self {
        let mut input = Self::new(Vec::new());
        input.push_text(spec, text);
        input
    }

    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    pub fn add_include_path(&mut self, path: impl Into<PathBuf>) {
        self.include_paths.push(path.into());
    }

    /// Opens a source file on top of the stack, followed by `epilogue`.
    pub fn open(&mut self, path: &Path, epilogue: Vec<String>) -> Result<(), AsmError> {
        let bytes = fs::read(path)
            .map_err(|e| AsmError::Include(format!("{}: {e}", path.display())))?;
        tracing::debug!("opened {}", path.display());
        let text = String::from_utf8_lossy(&bytes);
        let mut lines = split_lines(&text);
        lines.extend(epilogue);
        self.frames.push(Frame {
            spec: path.display().to_string(),
            dir: path.parent().map(Path::to_path_buf),
            lines,
            is_macro: false,
        });
        Ok(())
    }

    pub fn push_text(&mut self, spec: &str, text: &str) {
        self.frames.push(Frame {
            spec: spec.to_string(),
            dir: None,
            lines: split_lines(text),
            is_macro: false,
        });
    }

    pub fn push_macro(&mut self, spec: &str, lines: Vec<String>) {
        self.frames.push(Frame {
            spec: spec.to_string(),
            dir: None,
            lines: lines.into(),
            is_macro: true,
        });
    }

    /// Number of macro expansions currently being read.
    pub fn macro_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| frame.is_macro && !frame.lines.is_empty())
            .count()
    }

    /// Next line, leaving the frame it came from on top of the stack.
    pub fn read_line(&mut self) -> Option<String> {
        loop {
            let frame = self.frames.last_mut()?;
            if let Some(line) = frame.lines.pop_front() {
                return Some(line);
            }
            self.frames.pop();
        }
    }

    /// Name of the source the last line was read from.
    pub fn current_spec(&self) -> &str {
        self.frames
            .last()
            .map(|frame| frame.spec.as_str())
            .unwrap_or("")
    }

    /// Finds an include file: next to the including file first, then in
    /// the include paths, then as given.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        let here = self.frames.iter().rev().find_map(|frame| frame.dir.as_ref());
        here.into_iter()
            .chain(self.include_paths.iter())
            .map(|dir| dir.join(path))
            .chain(std::iter::once(path.to_path_buf()))
            .find(|candidate| candidate.is_file())
    }

    pub fn discover(&mut self, path: &Path) {
        if !self.discovered.iter().any(|known| known == path) {
            self.discovered.push(path.to_path_buf());
        }
    }

    /// Every file opened or included so far, in the order found.
    pub fn discovered(&self) -> &[PathBuf] {
        &self.discovered
    }
}

fn split_lines(text: &str) -> VecDeque<String> {
    text.lines().map(str::to_string).collect()
}
