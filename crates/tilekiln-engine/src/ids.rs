//! Typed resource handles and the per-context id source.
//!
//! Every GPU object the context hands out is addressed by one of these ids.
//! The objects themselves live in identity-keyed tables owned by the context,
//! so a handle is `Copy` and carries no lifetime.

use std::fmt;

/// Monotonic id source.
///
/// One allocator per context. Ids are never reused within a context, so a
/// stale handle can only miss a table lookup, never alias a newer object.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Returns the next raw id.
    pub fn next_raw(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    pub fn next<T: From<u64>>(&mut self) -> T {
        T::from(self.next_raw())
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

typed_id!(
    /// Handle to a texture owned by a `GpuContext`.
    TextureId, "texture"
);
typed_id!(
    /// Handle to a vertex or index buffer owned by a `GpuContext`.
    BufferId, "buffer"
);
typed_id!(
    /// Handle to a render target's attachment slot in a `GpuContext`.
    TargetId, "target"
);
typed_id!(
    /// Handle to an auxiliary clock registered on a `GpuContext`.
    ClockId, "clock"
);
typed_id!(
    /// Identity stamp of an image packed into a `TextureAtlas`.
    ImageId, "image"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_zero() {
        let mut ids = IdAllocator::new();
        let a: TextureId = ids.next();
        let b: BufferId = ids.next();
        let c: TextureId = ids.next();
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
        assert!(c > a);
        assert_eq!(ids.issued(), 3);
    }

    #[test]
    fn separate_allocators_are_independent() {
        let mut x = IdAllocator::new();
        let mut y = IdAllocator::new();
        let _: ImageId = x.next();
        let first: ImageId = y.next();
        assert_eq!(first.raw(), 1);
    }

    #[test]
    fn display_names_the_kind() {
        assert_eq!(TargetId::from(7).to_string(), "target#7");
    }
}
