use thiserror::Error;

/// Errors raised while resolving or validating individual header tags.
#[derive(Debug, Clone, Error)]
pub enum TagError {
    /// Tag name is not owned by any registered trait
    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    /// A required tag was neither provided nor defaultable
    #[error("Missing required tag: {0}")]
    MissingRequiredTag(&'static str),

    /// Value count does not match the trait's arity
    #[error("Tag {tag} expects {expected} value(s), got {actual}")]
    ArityMismatch {
        tag: &'static str,
        expected: String,
        actual: usize,
    },

    /// Value could not be coerced to the trait's numeric or string type
    #[error("Invalid value for tag {tag}: {value}")]
    InvalidValue { tag: &'static str, value: String },

    /// Boolean tags accept only the literal tokens `True` and `False`
    #[error("Invalid boolean for tag {tag}: {value}")]
    InvalidBoolean { tag: &'static str, value: String },

    /// Value is not a member of the trait's choice set
    #[error("Invalid choice for tag {tag}: {value}")]
    InvalidChoice { tag: &'static str, value: String },

    /// Element-type token is not recognized at all
    #[error("Unknown element type: {0}")]
    UnknownElementType(String),

    /// Token is a valid MetaIO type but cannot describe an array element
    #[error("Unsupported element type: {0}")]
    UnsupportedType(String),
}

/// Errors that can occur when loading, saving or validating a [`MetaImage`].
///
/// [`MetaImage`]: crate::MetaImage
#[derive(Debug, Error)]
pub enum MetaImageError {
    /// Tag resolution or coercion failure
    #[error(transparent)]
    Tag(#[from] TagError),

    /// Underlying file or stream error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array shape disagrees with the shape-bearing tags
    #[error("Shape mismatch for tag {tag}: {message}")]
    ShapeMismatch {
        tag: &'static str,
        message: String,
    },

    /// Array element kind disagrees with the `ElementType` tag
    #[error("Type mismatch: tag declares {declared}, array holds {actual}")]
    TypeMismatch { declared: String, actual: String },

    /// Geometric tag has a length inconsistent with the dimensionality
    #[error("Invalid geometry for tag {tag}: expected length {expected}, got {actual}")]
    InvalidGeometry {
        tag: &'static str,
        expected: usize,
        actual: usize,
    },

    /// External payload file referenced by the header does not exist
    #[error("Could not find data for file: {0}")]
    PayloadNotFound(String),

    /// Payload is flagged compressed but neither zlib nor gzip can inflate it
    #[error("Unknown compression type")]
    UnknownCompression,
}
