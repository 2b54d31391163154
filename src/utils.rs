use std::fmt;
use std::ops::{Deref, DerefMut};

/// Hides a value from `{:?}` output.
///
/// Used for the guest memory buffer, which is far too large to print, and for
/// boxed closures, which don't implement `Debug`.
pub struct NoDebug<T>(pub T);

impl<T> fmt::Debug for NoDebug<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(omitted)")
    }
}

impl<T> Deref for NoDebug<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for NoDebug<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
