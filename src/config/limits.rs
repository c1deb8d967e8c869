//! Content limits enforced before a request leaves the client.
//!
//! The backend validates the same bounds; checking them here saves a round
//! trip and gives the author a precise message.

pub const TITLE_MIN_CHARS: usize = 5;
pub const TITLE_MAX_CHARS: usize = 160;
pub const BODY_MIN_CHARS: usize = 10;
pub const BODY_MAX_CHARS: usize = 10_000;
pub const COMMENT_MIN_CHARS: usize = 1;
pub const COMMENT_MAX_CHARS: usize = 4_000;
pub const MAX_CONTEXT_TAGS: usize = 8;

/// Minimum free-text justification for wallet adjustments and badge grants.
pub const JUSTIFICATION_MIN_CHARS: usize = 10;

/// Which piece of user input a length check applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Body,
    Comment,
    Justification,
}

impl Field {
    pub fn bounds(&self) -> (usize, Option<usize>) {
        match self {
            Field::Title => (TITLE_MIN_CHARS, Some(TITLE_MAX_CHARS)),
            Field::Body => (BODY_MIN_CHARS, Some(BODY_MAX_CHARS)),
            Field::Comment => (COMMENT_MIN_CHARS, Some(COMMENT_MAX_CHARS)),
            Field::Justification => (JUSTIFICATION_MIN_CHARS, None),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Body => "body",
            Field::Comment => "comment",
            Field::Justification => "justification",
        }
    }
}

/// Checks the trimmed character count of `value` against the bounds of
/// `field`, returning the message to show on failure.
pub fn check_length(field: Field, value: &str) -> Result<(), String> {
    let (min, max) = field.bounds();
    let len = value.trim().chars().count();
    if len < min {
        return Err(format!(
            "{} must be at least {} characters",
            field.label(),
            min
        ));
    }
    if let Some(max) = max {
        if len > max {
            return Err(format!("{} must be at most {} characters", field.label(), max));
        }
    }
    Ok(())
}
