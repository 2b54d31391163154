//! Defines types, traits and conversions for system call arguments and return
//! values.

use cpu::interpret::SyscallOutcome;
use memory::MemoryFault;

use std::fmt;
use std::io;
use std::marker::PhantomData;

/// A file descriptor as passed by the program.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Fd(pub u32);

impl From<u32> for Fd {
    fn from(raw: u32) -> Self {
        Fd(raw)
    }
}

impl fmt::Debug for Fd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as i32)
    }
}

/// A signed `int` argument.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Int(pub i32);

impl From<u32> for Int {
    fn from(raw: u32) -> Self {
        Int(raw as i32)
    }
}

impl fmt::Debug for Int {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Guest pointer to a value of type `T`.
///
/// Might be misaligned or point anywhere, since the program controls it. All
/// accesses through it go through the bounds-checked guest memory.
pub struct UserPtr<T> {
    addr: u32,
    _phantom: PhantomData<*const T>,
}

impl<T> UserPtr<T> {
    pub fn addr(&self) -> u32 {
        self.addr
    }

    pub fn is_null(&self) -> bool {
        self.addr == 0
    }
}

impl<T> Clone for UserPtr<T> {
    fn clone(&self) -> Self {
        Self::from(self.addr)
    }
}

impl<T> Copy for UserPtr<T> {}

impl<T> From<u32> for UserPtr<T> {
    fn from(raw: u32) -> Self {
        Self {
            addr: raw,
            _phantom: PhantomData,
        }
    }
}

impl<T> fmt::Debug for UserPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#010X}", self.addr)
    }
}

/// Marker for a NUL-terminated path name.
#[derive(Debug)]
pub enum CStr {}

/// `struct iovec`
#[derive(Debug)]
pub enum Iovec {}

/// `struct user_desc`
#[derive(Debug)]
pub enum UserDesc {}

/// `struct timespec`
#[derive(Debug)]
pub enum Timespec {}

/// `struct new_utsname`
#[derive(Debug)]
pub enum Utsname {}

/// `struct winsize`
#[derive(Debug)]
pub enum Winsize {}

/// Linux error numbers returned to the program (negated, in `EAX`).
#[allow(bad_style)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    ENOENT = 2,
    ESRCH = 3,
    EIO = 5,
    EBADF = 9,
    ENOMEM = 12,
    EACCES = 13,
    EFAULT = 14,
    EEXIST = 17,
    EISDIR = 21,
    EINVAL = 22,
    EMFILE = 24,
    ENOTTY = 25,
    ESPIPE = 29,
}

impl Errno {
    /// The value the program sees in `EAX`.
    pub fn to_return_value(self) -> u32 {
        (-(self as i32)) as u32
    }
}

/// Faulting guest pointers are reported as `EFAULT`, not as CPU errors.
impl From<MemoryFault> for Errno {
    fn from(_: MemoryFault) -> Self {
        Errno::EFAULT
    }
}

impl From<io::Error> for Errno {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Errno::ENOENT,
            io::ErrorKind::PermissionDenied => Errno::EACCES,
            io::ErrorKind::AlreadyExists => Errno::EEXIST,
            io::ErrorKind::InvalidInput => Errno::EINVAL,
            _ => Errno::EIO,
        }
    }
}

/// The result of most system calls: a non-negative value or an error number.
pub type SysResult = Result<u32, Errno>;

/// Trait for return types of system calls.
///
/// Most calls return a `SysResult`. The ones that end the process return a
/// `SyscallOutcome` directly.
pub trait SyscallReturnValue {
    fn into_outcome(self) -> SyscallOutcome;
}

impl SyscallReturnValue for SysResult {
    fn into_outcome(self) -> SyscallOutcome {
        SyscallOutcome::Return(match self {
            Ok(value) => value,
            Err(errno) => errno.to_return_value(),
        })
    }
}

impl SyscallReturnValue for SyscallOutcome {
    fn into_outcome(self) -> SyscallOutcome {
        self
    }
}

/// Trait for converting the raw argument registers to the right argument
/// types for a system call.
///
/// This is implemented for all tuples of up to 5 elements whose elements
/// implement `From<u32>`. Arguments are taken from `EBX`, `ECX`, `EDX`, `ESI`
/// and `EDI`, in this order; unused registers are ignored.
pub trait FromRawArgs {
    fn from_args(raw: &[u32; 5]) -> Self;
}

macro_rules! tuple_impl {
    ($($tyvar:ident),*) => {
        impl<$($tyvar),*> FromRawArgs for ( $($tyvar,)* )
        where $($tyvar: From<u32>),*
        {
            fn from_args(raw: &[u32; 5]) -> Self {
                let mut _i = raw.iter().cloned();
                (
                    $(
                        $tyvar::from(_i.next().unwrap_or(0))
                    ,)*
                )
            }
        }
    };
}

tuple_impl!();
tuple_impl!(T);
tuple_impl!(T, U);
tuple_impl!(T, U, V);
tuple_impl!(T, U, V, W);
tuple_impl!(T, U, V, W, X);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_conversion() {
        let raw = [3, 0x1000, 0xFFFFFFFF, 4, 5];
        let (fd, buf, n): (Fd, UserPtr<u8>, Int) = FromRawArgs::from_args(&raw);
        assert_eq!(fd, Fd(3));
        assert_eq!(buf.addr(), 0x1000);
        assert_eq!(n, Int(-1));
        assert_eq!(format!("{:?}", buf), "0x00001000");

        let (): () = FromRawArgs::from_args(&raw);
    }

    #[test]
    fn return_values() {
        let ok: SysResult = Ok(7);
        assert_eq!(ok.into_outcome(), SyscallOutcome::Return(7));
        let err: SysResult = Err(Errno::EBADF);
        assert_eq!(err.into_outcome(), SyscallOutcome::Return(-9i32 as u32));
        assert_eq!(SyscallOutcome::Exit(3).into_outcome(), SyscallOutcome::Exit(3));
    }
}
