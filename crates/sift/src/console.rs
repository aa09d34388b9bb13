//! 🖨️ Console — the lines a human running a sweep actually reads.
//!
//! Keys as they get scheduled, "Processed N megabytes", trip diagnostics, printed rows,
//! the summary. These go to stdout. Logs go to stderr through `tracing`. Never the twain.

use std::io::Write;
#[cfg(test)]
use std::sync::{Arc, Mutex};

use crate::progress::RunProgress;

#[derive(Debug, Clone)]
pub(crate) enum Console {
    /// 📺 real stdout, printed around the progress bar so neither clobbers the other
    Stdout(RunProgress),
    /// 🧪 lines land in a vec for assertions
    #[cfg(test)]
    Captured(Arc<Mutex<Vec<String>>>),
}

impl Console {
    pub(crate) fn line(&self, line: impl AsRef<str>) {
        match self {
            Console::Stdout(progress) => progress.suspend(|| {
                // -- 🔇 stdout went away (piped into `head`, probably). not worth a panic.
                let _ = writeln!(std::io::stdout().lock(), "{}", line.as_ref());
            }),
            #[cfg(test)]
            Console::Captured(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(line.as_ref().to_string());
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn captured() -> (Self, Arc<Mutex<Vec<String>>>) {
        let the_lines = Arc::new(Mutex::new(Vec::new()));
        (Console::Captured(the_lines.clone()), the_lines)
    }
}
