//! Namespaced wire event names.
//!
//! Every message a model produces or consumes travels under a wire event
//! name of the form `<model>:<event>`. The mapping is a pure function and
//! bijective as long as neither component contains the separator, which
//! [`validate_name`] enforces.

/// Separator between the model and event components of a wire name.
pub const SEPARATOR: char = ':';

/// Maximum length of a model or event name.
pub const MAX_NAME_LENGTH: usize = 128;

/// Validate a model or event name.
///
/// Names must be non-empty printable ASCII, at most [`MAX_NAME_LENGTH`]
/// bytes, and must not contain the [`SEPARATOR`]: a `:` in either
/// component would make the wire name ambiguous.
///
/// # Errors
///
/// Returns an error message if the name is invalid.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Name cannot be empty");
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err("Name too long");
    }
    if name.contains(SEPARATOR) {
        return Err("Name cannot contain ':'");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Name contains invalid characters");
    }
    Ok(())
}

/// Build the wire event name for `(model, event)`.
#[must_use]
pub fn wire_name(model: &str, event: &str) -> String {
    let mut name = String::with_capacity(model.len() + event.len() + 1);
    name.push_str(model);
    name.push(SEPARATOR);
    name.push_str(event);
    name
}

/// Split a wire event name back into its `(model, event)` components.
///
/// Inverse of [`wire_name`] for names built from validated components.
#[must_use]
pub fn split_wire_name(wire: &str) -> Option<(&str, &str)> {
    wire.split_once(SEPARATOR)
}
