use thiserror::Error;

/// Fatal errors raised by a BVH build. Cancellation is not an error, see
/// [`crate::BuildOutcome::Cancelled`].
#[derive(Error, Debug)]
pub enum BuildError {
    /// A build parameter is out of range.
    #[error("invalid build settings: {0}")]
    InvalidSettings(String),

    /// Object indices and node indices are stored as `u32`.
    #[error("cannot build a BVH over {0} objects, at most {max} are supported", max = u32::MAX)]
    TooManyObjects(usize),

    /// An object array, scratch buffer or node chunk could not be allocated.
    #[error("could not allocate {what} ({count} elements)")]
    OutOfMemory { what: &'static str, count: usize },

    /// The nested split/partition pool could not be created.
    #[error("could not create nested thread pool: {0}")]
    NestedPool(#[from] rayon::ThreadPoolBuildError),

    /// A subtree task unwound with a panic.
    #[error("a build task panicked: {0}")]
    TaskPanicked(String),

    /// The merged tree is inconsistent.
    #[error("internal error while merging result chunks: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Allocates an empty vector with room for `count` elements, reporting
/// allocation failure instead of aborting.
pub(crate) fn try_vec<T>(count: usize, what: &'static str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(count)
        .map_err(|_| BuildError::OutOfMemory { what, count })?;
    Ok(v)
}
