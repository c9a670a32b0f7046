/// Typed failures returned by the core operations. The HTTP layer maps
/// these to status codes; nothing here is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already exists")]
    AlreadyExists(&'static str),
    #[error("already enrolled in this course")]
    AlreadyEnrolled,
    #[error("not enrolled in this course")]
    NotEnrolled,
    #[error("rating must be an integer between 1 and 5")]
    InvalidRating,
    #[error("{0}")]
    InvalidInput(String),
    #[error("not logged in")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("cart is empty")]
    EmptyCart,
    #[error("session error: {0}")]
    Session(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a storage error is the UNIQUE constraint rejecting the
    /// loser of a race on (user, course) pairs.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
    }
}
