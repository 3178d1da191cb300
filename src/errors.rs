//! Error types for the Forthic core.
//!
//! Every error that can escape the tokenizer or interpreter is a variant of
//! [`ForthicError`]. Errors that are anchored to source code carry the
//! offending Forthic text and a [`CodeLocation`]; [`ForthicError::describe`]
//! renders a report with a caret line under the offending span.

use thiserror::Error;

/// A location in Forthic source code.
///
/// Positions are character offsets into the (unescaped) input string;
/// `end_pos` is exclusive. Line and column are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocation {
    /// Where the code came from (module name, file path, ...).
    pub source: Option<String>,
    pub line: usize,
    pub column: usize,
    pub start_pos: usize,
    pub end_pos: Option<usize>,
}

impl Default for CodeLocation {
    fn default() -> Self {
        Self {
            source: None,
            line: 1,
            column: 1,
            start_pos: 0,
            end_pos: None,
        }
    }
}

impl CodeLocation {
    pub fn new(line: usize, column: usize, start_pos: usize) -> Self {
        Self {
            source: None,
            line,
            column,
            start_pos,
            end_pos: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_end_pos(mut self, end_pos: usize) -> Self {
        self.end_pos = Some(end_pos);
        self
    }
}

/// Errors raised by the Forthic tokenizer and interpreter.
#[derive(Error, Debug)]
pub enum ForthicError {
    #[error("Unknown word: {word}")]
    UnknownWord {
        forthic: String,
        word: String,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    /// A sub-word of a user definition failed. Carries both the call-site
    /// location (from the active tokenizer) and the definition-site location
    /// (recorded on the sub-word at compile time).
    #[error("{message}")]
    WordExecution {
        message: String,
        #[source]
        inner_error: Box<ForthicError>,
        call_location: Option<CodeLocation>,
        definition_location: Option<CodeLocation>,
    },

    #[error("Missing semicolon")]
    MissingSemicolon {
        forthic: String,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    #[error("Extra semicolon")]
    ExtraSemicolon {
        forthic: String,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    #[error("Stack underflow")]
    StackUnderflow {
        forthic: String,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    #[error("Invalid variable name: {varname}")]
    InvalidVariableName {
        forthic: String,
        varname: String,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    #[error("Unknown module: {module_name}")]
    UnknownModule {
        forthic: String,
        module_name: String,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    #[error("Invalid input position")]
    InvalidInputPosition {
        forthic: String,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    #[error("{}", .note.as_deref().unwrap_or("Invalid word name"))]
    InvalidWordName {
        forthic: String,
        note: Option<String>,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    #[error("Unterminated string")]
    UnterminatedString {
        forthic: String,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    /// Dispatch reached a token kind with no handler. Unreachable for
    /// well-formed input; kept for hosts that synthesize errors.
    #[error("Unknown type of token: {token}")]
    UnknownToken {
        forthic: String,
        token: String,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    #[error("Error in module {module_name}: {inner_error}")]
    Module {
        forthic: String,
        module_name: String,
        #[source]
        inner_error: Box<ForthicError>,
        location: Option<CodeLocation>,
    },

    #[error("Too many recovery attempts: {num_attempts} of {max_attempts}")]
    TooManyAttempts {
        forthic: String,
        num_attempts: usize,
        max_attempts: usize,
        location: Option<CodeLocation>,
        #[source]
        cause: Option<Box<ForthicError>>,
    },

    /// Host-initiated cooperative stop. Never suppressed by per-word error
    /// handlers and never given to the recovery callback.
    #[error("Intentional stop: {message}")]
    IntentionalStop { message: String },
}

impl ForthicError {
    /// The Forthic source associated with this error, if any.
    pub fn forthic(&self) -> Option<&str> {
        match self {
            Self::UnknownWord { forthic, .. }
            | Self::MissingSemicolon { forthic, .. }
            | Self::ExtraSemicolon { forthic, .. }
            | Self::StackUnderflow { forthic, .. }
            | Self::InvalidVariableName { forthic, .. }
            | Self::UnknownModule { forthic, .. }
            | Self::InvalidInputPosition { forthic, .. }
            | Self::InvalidWordName { forthic, .. }
            | Self::UnterminatedString { forthic, .. }
            | Self::UnknownToken { forthic, .. }
            | Self::Module { forthic, .. }
            | Self::TooManyAttempts { forthic, .. } => Some(forthic),
            Self::WordExecution { .. } | Self::IntentionalStop { .. } => None,
        }
    }

    /// The primary location of this error. For word-execution errors this is
    /// the call site.
    pub fn location(&self) -> Option<&CodeLocation> {
        match self {
            Self::UnknownWord { location, .. }
            | Self::MissingSemicolon { location, .. }
            | Self::ExtraSemicolon { location, .. }
            | Self::StackUnderflow { location, .. }
            | Self::InvalidVariableName { location, .. }
            | Self::UnknownModule { location, .. }
            | Self::InvalidInputPosition { location, .. }
            | Self::InvalidWordName { location, .. }
            | Self::UnterminatedString { location, .. }
            | Self::UnknownToken { location, .. }
            | Self::Module { location, .. }
            | Self::TooManyAttempts { location, .. } => location.as_ref(),
            Self::WordExecution { call_location, .. } => call_location.as_ref(),
            Self::IntentionalStop { .. } => None,
        }
    }

    /// Render this error against `forthic` source with a caret line under
    /// the offending span. Word-execution errors show both the
    /// definition-site and the call-site spans.
    pub fn describe(&self, forthic: &str) -> String {
        if forthic.is_empty() {
            return self.to_string();
        }

        if let Self::WordExecution {
            message,
            call_location,
            definition_location: Some(def_location),
            ..
        } = self
        {
            let mut result = format!(
                "{} {}:\n{}",
                message,
                location_info("at line", def_location),
                highlight_span(forthic, def_location)
            );
            if let Some(call_location) = call_location {
                result.push_str(&format!(
                    "\nCalled from {}:\n{}",
                    location_info("line", call_location),
                    highlight_span(forthic, call_location)
                ));
            }
            return result;
        }

        let location = match self.location() {
            Some(location) => location,
            None => return self.to_string(),
        };

        format!(
            "{} {}:\n{}",
            self,
            location_info("at line", location),
            highlight_span(forthic, location)
        )
    }
}

fn location_info(lead: &str, location: &CodeLocation) -> String {
    let mut info = format!("{} {}", lead, location.line);
    if let Some(ref source) = location.source {
        info.push_str(&format!(" in {}", source));
    }
    info
}

/// The source lines up to and including the error line, followed by a caret
/// line spanning `[start_pos, end_pos)`.
fn highlight_span(forthic: &str, location: &CodeLocation) -> String {
    let context: Vec<&str> = forthic.split('\n').take(location.line).collect();
    let end_pos = location.end_pos.unwrap_or(location.start_pos + 1);
    let caret_line = " ".repeat(location.column.saturating_sub(1))
        + &"^".repeat(end_pos.saturating_sub(location.start_pos).max(1));
    format!("```\n{}\n{}\n```", context.join("\n"), caret_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_location_default() {
        let loc = CodeLocation::default();
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 1);
        assert_eq!(loc.start_pos, 0);
        assert_eq!(loc.end_pos, None);
        assert_eq!(loc.source, None);
    }

    #[test]
    fn test_code_location_builder() {
        let loc = CodeLocation::new(10, 5, 42)
            .with_source("test.forthic")
            .with_end_pos(50);
        assert_eq!(loc.line, 10);
        assert_eq!(loc.column, 5);
        assert_eq!(loc.start_pos, 42);
        assert_eq!(loc.end_pos, Some(50));
        assert_eq!(loc.source.as_deref(), Some("test.forthic"));
    }

    #[test]
    fn test_describe_standard_error() {
        let forthic = "DUP GARBAGE SWAP";
        let error = ForthicError::UnknownWord {
            forthic: forthic.to_string(),
            word: "GARBAGE".to_string(),
            location: Some(CodeLocation::new(1, 5, 4).with_end_pos(11)),
            cause: None,
        };

        let report = error.describe(forthic);
        assert!(report.contains("Unknown word: GARBAGE"));
        assert!(report.contains("at line 1"));
        assert!(report.contains("    ^^^^^^^"));
    }

    #[test]
    fn test_describe_multiline() {
        let forthic = "DUP\nGARBAGE\nSWAP";
        let error = ForthicError::UnknownWord {
            forthic: forthic.to_string(),
            word: "GARBAGE".to_string(),
            location: Some(CodeLocation::new(2, 1, 4).with_end_pos(11)),
            cause: None,
        };

        let report = error.describe(forthic);
        assert!(report.contains("at line 2"));
        assert!(report.contains("DUP\nGARBAGE"));
        assert!(!report.contains("SWAP"));
    }

    #[test]
    fn test_describe_word_execution_shows_both_spans() {
        let forthic = ": ADD + ;\n1 ADD";
        let inner = ForthicError::StackUnderflow {
            forthic: forthic.to_string(),
            location: None,
            cause: None,
        };
        let error = ForthicError::WordExecution {
            message: "Error executing ADD".to_string(),
            inner_error: Box::new(inner),
            call_location: Some(CodeLocation::new(2, 3, 12).with_end_pos(15)),
            definition_location: Some(CodeLocation::new(1, 7, 6).with_end_pos(7)),
        };

        let report = error.describe(forthic);
        assert!(report.contains("Error executing ADD at line 1"));
        assert!(report.contains("Called from line 2"));
    }

    #[test]
    fn test_describe_without_location() {
        let error = ForthicError::UnknownWord {
            forthic: "DUP".to_string(),
            word: "DUP".to_string(),
            location: None,
            cause: None,
        };
        assert_eq!(error.describe("DUP"), "Unknown word: DUP");
    }

    #[test]
    fn test_intentional_stop_has_no_source_info() {
        let error = ForthicError::IntentionalStop {
            message: "host requested stop".to_string(),
        };
        assert!(error.to_string().contains("Intentional stop"));
        assert_eq!(error.forthic(), None);
        assert!(error.location().is_none());
    }

    #[test]
    fn test_module_error_wraps_inner() {
        let inner = ForthicError::MissingSemicolon {
            forthic: ": UNCLOSED 42".to_string(),
            location: None,
            cause: None,
        };
        let error = ForthicError::Module {
            forthic: String::new(),
            module_name: "jobs".to_string(),
            inner_error: Box::new(inner),
            location: None,
        };

        let msg = error.to_string();
        assert!(msg.contains("Error in module jobs"));
        assert!(msg.contains("Missing semicolon"));
    }

    #[test]
    fn test_too_many_attempts_message() {
        let error = ForthicError::TooManyAttempts {
            forthic: "code".to_string(),
            num_attempts: 4,
            max_attempts: 3,
            location: None,
            cause: None,
        };
        let msg = error.to_string();
        assert!(msg.contains("4 of 3"));
    }
}
