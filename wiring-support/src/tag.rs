//! Injection tag parsing.
//!
//! A tag is the value attached to a struct field to request injection:
//! `name` optionally followed by `,omitempty`.
//!
//! ```
//! use wiring_support::tag::parse_tag;
//!
//! let tag = parse_tag("primary,omitempty");
//! assert_eq!(tag.name, "primary");
//! assert!(tag.omitempty);
//!
//! let tag = parse_tag("");
//! assert_eq!(tag.name, "");
//! assert!(!tag.omitempty);
//! ```

/// The option that marks a field as optional.
pub const OMITEMPTY: &str = "omitempty";

/// A parsed injection tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tag<'a> {
    /// Lookup name; `""` selects the default binding of the field's type.
    pub name: &'a str,
    /// Tolerate a resolution failure and leave the field untouched.
    pub omitempty: bool,
}

/// Errors reported by [`parse_tag_strict`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("unknown injection option {0:?}; the only supported option is \"omitempty\"")]
    UnknownOption(String),
}

/// Parses a tag, ignoring options it does not understand.
pub fn parse_tag(tag: &str) -> Tag<'_> {
    let mut segments = tag.split(',');
    let name = segments.next().unwrap_or_default();
    let omitempty = segments.any(|option| option == OMITEMPTY);
    Tag { name, omitempty }
}

/// Parses a tag, rejecting unknown options.
///
/// Empty options (`"name,"`) are accepted.
pub fn parse_tag_strict(tag: &str) -> Result<Tag<'_>, TagError> {
    let mut segments = tag.split(',');
    let name = segments.next().unwrap_or_default();
    let mut omitempty = false;
    for option in segments {
        match option {
            OMITEMPTY => omitempty = true,
            "" => {}
            other => return Err(TagError::UnknownOption(other.to_string())),
        }
    }
    Ok(Tag { name, omitempty })
}
