//! Classification of locally typed input lines

use crate::EXIT_SENTINEL;

/// Local directive; handled on this side and never transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Leave the chat (`/q`, `/quit`)
    Quit,
    /// Show available directives (`/help`)
    Help,
    /// Clear the local screen (`/clear`)
    Clear,
}

impl Directive {
    /// Match a trimmed line against the known directives, ignoring case
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.eq_ignore_ascii_case("/q") || line.eq_ignore_ascii_case("/quit") {
            Some(Self::Quit)
        } else if line.eq_ignore_ascii_case("/help") {
            Some(Self::Help)
        } else if line.eq_ignore_ascii_case("/clear") {
            Some(Self::Clear)
        } else {
            None
        }
    }

    /// Usage lines for every directive
    pub fn usage() -> &'static [(&'static str, &'static str)] {
        &[
            ("/q", "Quit"),
            ("/help", "Help"),
            ("/clear", "Clear screen"),
        ]
    }
}

/// A line read from the local input, sorted by what the sender does with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    /// Blank line; ignored
    Empty,
    /// Local directive
    Directive(Directive),
    /// Equal to the exit sentinel; refused so it can never be sent as a message
    Reserved,
    /// Ordinary message to encrypt and send
    Message(String),
}

impl InputLine {
    pub fn classify(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.trim().is_empty() {
            return Self::Empty;
        }
        if let Some(directive) = Directive::parse(line) {
            return Self::Directive(directive);
        }
        if line == EXIT_SENTINEL {
            return Self::Reserved;
        }

        Self::Message(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_are_case_insensitive() {
        assert_eq!(Directive::parse("/q"), Some(Directive::Quit));
        assert_eq!(Directive::parse("/Q"), Some(Directive::Quit));
        assert_eq!(Directive::parse("/quit "), Some(Directive::Quit));
        assert_eq!(Directive::parse("/HELP"), Some(Directive::Help));
        assert_eq!(Directive::parse("/clear"), Some(Directive::Clear));
        assert_eq!(Directive::parse("/qq"), None);
        assert_eq!(Directive::parse("q"), None);
    }

    #[test]
    fn test_classify_lines() {
        assert_eq!(InputLine::classify(""), InputLine::Empty);
        assert_eq!(InputLine::classify("   \r\n"), InputLine::Empty);
        assert_eq!(
            InputLine::classify("/help"),
            InputLine::Directive(Directive::Help)
        );
        assert_eq!(
            InputLine::classify("hello\n"),
            InputLine::Message("hello".to_string())
        );
        assert_eq!(
            InputLine::classify("  keep spacing "),
            InputLine::Message("  keep spacing ".to_string())
        );
    }

    #[test]
    fn test_sentinel_is_never_a_message() {
        assert_eq!(InputLine::classify(EXIT_SENTINEL), InputLine::Reserved);
        assert_eq!(InputLine::classify("__exit__\r\n"), InputLine::Reserved);

        // Anything else that merely contains it is ordinary text
        assert_eq!(
            InputLine::classify("say __exit__"),
            InputLine::Message("say __exit__".to_string())
        );
    }

    #[test]
    fn test_usage_covers_directives() {
        for (command, _) in Directive::usage() {
            assert!(Directive::parse(command).is_some());
        }
    }
}
