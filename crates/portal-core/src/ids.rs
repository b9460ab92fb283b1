//! Numeric identifiers.
//!
//! Request ids travel on the wire as bare JSON numbers, so they are `u64`
//! newtypes rather than prefixed strings. Both id kinds come from an
//! [`IdGenerator`] owned by a single bridge instance.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw value.
            pub const fn from_raw(value: u64) -> Self {
                Self(value)
            }

            /// The raw numeric value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

numeric_id!(RequestId, "JSON-RPC request identifier, unique per bridge instance.");
numeric_id!(ListenerId, "Handle for a registered event listener.");

/// Monotonic id source.
///
/// Starts at 1 and never wraps in practice, so an id is never handed out twice
/// by the same generator and ids sort in allocation order.
pub struct IdGenerator<T> {
    next: AtomicU64,
    _kind: PhantomData<fn() -> T>,
}

impl<T: From<u64>> IdGenerator<T> {
    /// Create a generator whose first id is 1.
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            _kind: PhantomData,
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> T {
        T::from(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl<T: From<u64>> Default for IdGenerator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for IdGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}
