use stitch_lexer::LexError;

/// Errors produced while turning script text into a [`crate::Module`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: indentation does not match any enclosing block")]
    Indentation { line: usize },
}

impl ParseError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn indentation(line: usize) -> Self {
        ParseError::Indentation { line }
    }
}
