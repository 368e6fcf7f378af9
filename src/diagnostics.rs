use std::cell::RefCell;

use rustc_hash::FxHashSet;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    /// Don't show any diagnostics.
    Off,
    /// Report features that were ignored or replaced by a default.
    Warn,
    /// Also report how each node was converted.
    Info,
}

/// Diagnostic reporter for node conversions.
///
/// Messages are printed to stdout prefixed with a level character and the
/// name of the node they relate to, eg. `W| lstm_1: clip is ignored`.
pub struct Diagnostics {
    /// (node, message) pairs which have already been reported at the `Warn`
    /// level. Converters may hit the same condition more than once for a node.
    warned: RefCell<FxHashSet<(String, String)>>,
    level: DiagnosticLevel,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::with_level(DiagnosticLevel::Off)
    }

    pub fn with_level(level: DiagnosticLevel) -> Self {
        Self {
            warned: RefCell::new(FxHashSet::default()),
            level,
        }
    }

    /// Enable reporting of all messages at or above a given level.
    pub fn set_level(&mut self, level: DiagnosticLevel) {
        self.level = level;
    }

    pub fn level(&self) -> DiagnosticLevel {
        self.level
    }

    /// Return true if diagnostic messages are enabled at a given level.
    pub fn enabled(&self, level: DiagnosticLevel) -> bool {
        self.level >= level
    }

    /// Log a diagnostic message for a node at the [`Info`](DiagnosticLevel::Info) level.
    pub fn info(&self, node: &str, message: std::fmt::Arguments<'_>) {
        if self.level < DiagnosticLevel::Info {
            return;
        }
        self.log(DiagnosticLevel::Info, node, &message.to_string());
    }

    /// Log a diagnostic message for a node at the [`Warn`](DiagnosticLevel::Warn) level.
    ///
    /// Returns true if the message was printed, false if it was filtered out
    /// by the level or had already been reported for this node.
    pub fn warn(&self, node: &str, message: std::fmt::Arguments<'_>) -> bool {
        if self.level < DiagnosticLevel::Warn {
            return false;
        }
        let message = message.to_string();
        let key = (node.to_string(), message);
        if self.warned.borrow().contains(&key) {
            return false;
        }
        self.log(DiagnosticLevel::Warn, node, &key.1);
        self.warned.borrow_mut().insert(key);
        true
    }

    fn log(&self, level: DiagnosticLevel, node: &str, message: &str) {
        let level_char = match level {
            DiagnosticLevel::Warn => 'W',
            DiagnosticLevel::Info => 'I',
            DiagnosticLevel::Off => unreachable!(),
        };
        println!("{}| {}: {}", level_char, node, message);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{DiagnosticLevel, Diagnostics};

    #[test]
    fn test_warn_once_per_message() {
        let diag = Diagnostics::with_level(DiagnosticLevel::Warn);

        assert!(diag.warn("lstm", format_args!("alpha ignored")));
        assert!(!diag.warn("lstm", format_args!("alpha ignored")));
        assert!(diag.warn("lstm", format_args!("shared activations")));
        assert!(diag.warn("lstm_2", format_args!("alpha ignored")));
    }

    #[test]
    fn test_levels() {
        let mut diag = Diagnostics::new();
        assert!(!diag.enabled(DiagnosticLevel::Warn));
        assert!(!diag.warn("node", format_args!("ignored")));

        diag.set_level(DiagnosticLevel::Info);
        assert!(diag.enabled(DiagnosticLevel::Warn));
        assert!(diag.enabled(DiagnosticLevel::Info));
        assert_eq!(diag.level(), DiagnosticLevel::Info);
    }
}
