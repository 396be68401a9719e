//! Declaration identifiers.
//!
//! Ids are the fully qualified declaration path (`module.path.name`), not
//! interner indices, so they stay stable across compilations of unchanged
//! code and can be persisted next to the cache.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

macro_rules! declaration_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Create an id from a qualified path.
            pub fn new(path: impl AsRef<str>) -> Self {
                $name(Arc::from(path.as_ref()))
            }

            /// The qualified path.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(path: &str) -> Self {
                $name::new(path)
            }
        }

        impl From<String> for $name {
            fn from(path: String) -> Self {
                $name(Arc::from(path))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

declaration_id! {
    /// Identifier of a function definition.
    FunctionId
}

declaration_id! {
    /// Identifier of a test declaration.
    ///
    /// `Ord` on `TestId` defines the report order.
    TestId
}
