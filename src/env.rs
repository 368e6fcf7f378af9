use crate::diagnostics::DiagnosticLevel;

/// Interpret a string value such as "1" or "no" as a boolean.
pub fn str_as_bool(s: &str) -> bool {
    match s {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => {
            eprintln!("Unrecognized boolean value \"{}\"", s);
            false
        }
    }
}

/// Return whether a feature flag controlled by an environment variable is
/// enabled.
pub fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .as_ref()
        .map(|s| str_as_bool(s))
        .unwrap_or(default)
}

/// Interpret a diagnostic level name such as "warn".
pub fn str_as_diagnostic_level(s: &str) -> Option<DiagnosticLevel> {
    match s.trim().to_ascii_lowercase().as_str() {
        "off" | "0" | "none" => Some(DiagnosticLevel::Off),
        "warn" | "warning" => Some(DiagnosticLevel::Warn),
        "info" | "all" => Some(DiagnosticLevel::Info),
        _ => None,
    }
}

/// Read a diagnostic level from an environment variable.
///
/// Unset variables produce `default`. Unrecognized values are reported and
/// also produce `default`.
pub fn env_diagnostic_level(name: &str, default: DiagnosticLevel) -> DiagnosticLevel {
    let Ok(val) = std::env::var(name) else {
        return default;
    };
    str_as_diagnostic_level(&val).unwrap_or_else(|| {
        eprintln!("Unrecognized diagnostic level \"{}\"", val);
        default
    })
}

#[cfg(test)]
mod tests {
    use onnx_coreml_testing::TestCases;

    use super::{str_as_bool, str_as_diagnostic_level};
    use crate::diagnostics::DiagnosticLevel;

    #[test]
    fn test_str_as_bool() {
        assert!(str_as_bool("yes"));
        assert!(str_as_bool("1"));
        assert!(!str_as_bool("n"));
        assert!(!str_as_bool("maybe"));
    }

    #[test]
    fn test_str_as_diagnostic_level() {
        #[derive(Debug)]
        struct Case {
            value: &'static str,
            expected: Option<DiagnosticLevel>,
        }

        let cases = [
            Case {
                value: "off",
                expected: Some(DiagnosticLevel::Off),
            },
            Case {
                value: "Warn",
                expected: Some(DiagnosticLevel::Warn),
            },
            Case {
                value: " info ",
                expected: Some(DiagnosticLevel::Info),
            },
            Case {
                value: "verbose",
                expected: None,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(str_as_diagnostic_level(case.value), case.expected);
        });
    }
}
