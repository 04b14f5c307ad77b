use std::io::Write;

use tracing::warn;

pub const BANNER: &str = "=================================================";

/// Human-readable progress lines. A broken writer is reported once and then
/// ignored; it never stops the run.
pub struct Progress<W: Write> {
    out: W,
    broken: bool,
}

impl<W: Write> Progress<W> {
    pub fn new(out: W) -> Self {
        Self { out, broken: false }
    }

    pub fn banner(&mut self) {
        self.line(BANNER);
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        if self.broken {
            return;
        }

        let result = writeln!(self.out, "{}", text.as_ref()).and_then(|()| self.out.flush());
        if let Err(err) = result {
            warn!(error = %err, "progress output unavailable; continuing without it");
            self.broken = true;
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
