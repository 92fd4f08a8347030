//! Console sink implementation

use crate::core::{Formatter, LogEvent, Result, Sink, TextFormatter};
#[cfg(feature = "console")]
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;

pub struct ConsoleSink {
    formatter: Arc<dyn Formatter>,
    use_colors: bool,
}

impl ConsoleSink {
    pub fn new(formatter: Arc<dyn Formatter>) -> Self {
        Self {
            formatter,
            use_colors: false,
        }
    }

    /// Colorize lines by level. Only takes effect with the `console` feature.
    #[must_use]
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    fn render(&self, event: &LogEvent) -> String {
        let line = self.formatter.format(event);

        #[cfg(feature = "console")]
        if self.use_colors {
            return line.color(event.level.color_code()).to_string();
        }

        line
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(Arc::new(TextFormatter::new()))
    }
}

impl Sink for ConsoleSink {
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        let output = self.render(event);

        // Route Error and Critical levels to stderr, others to stdout
        if event.level.is_severe() {
            writeln!(std::io::stderr().lock(), "{}", output)?;
        } else {
            writeln!(std::io::stdout().lock(), "{}", output)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        // Flush both stdout and stderr since we write to both
        std::io::stdout().flush()?;
        std::io::stderr().flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}
