use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Error;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, sqlx::Type, ToSchema,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row id. Returns `None` for ids that can never
            /// exist in storage (zero or negative).
            pub fn new(raw: i64) -> Option<Self> {
                (raw > 0).then_some(Self(raw))
            }

            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw: i64 = s
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("malformed {} id: {s:?}", $label)))?;
                Self::new(raw)
                    .ok_or_else(|| Error::InvalidInput(format!("malformed {} id: {s:?}", $label)))
            }
        }
    };
}

entity_id!(
    /// Identifier of a registered account.
    UserId,
    "user"
);
entity_id!(
    /// Identifier of a course in the catalog.
    CourseId,
    "course"
);
entity_id!(
    /// Identifier of one lesson inside a course.
    LessonId,
    "lesson"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_ids() {
        let id: CourseId = "42".parse().unwrap();
        assert_eq!(id.as_i64(), 42);
    }

    #[test]
    fn rejects_zero_negative_and_garbage() {
        assert!("0".parse::<UserId>().is_err());
        assert!("-3".parse::<UserId>().is_err());
        assert!("abc".parse::<LessonId>().is_err());
    }
}
