//! Output helpers shared by the commands.

use std::io::{self, Write};
use std::path::Path;

use is_terminal::IsTerminal;

/// Wrap `text` in an ANSI color when stdout is a terminal.
pub fn color(code: &str, text: &str) -> String {
    if io::stdout().is_terminal() {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Write to `path`, or to stdout when there is none.
pub fn write_output(content: &str, path: Option<&Path>) -> Result<(), String> {
    match path {
        Some(path) => std::fs::write(path, content)
            .map_err(|e| format!("Failed to write to {}: {}", path.display(), e)),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Print a status line to stderr unless `quiet`.
pub fn status(msg: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", msg);
    }
}
