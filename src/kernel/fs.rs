//! File system calls.

use super::types::*;
use super::Syscall;
use cpu::instr::{OpSize, Segment};

use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Longest path name accepted by `open` and `unlink`, including the NUL.
const PATH_MAX: u32 = 4096;
/// Maximum number of open file descriptors.
const MAX_FILES: usize = 256;
/// Maximum number of buffers passed to `writev`.
const IOV_MAX: u32 = 1024;

const O_ACCMODE: u32 = 0o3;
const O_RDONLY: u32 = 0o0;
const O_WRONLY: u32 = 0o1;
const O_RDWR: u32 = 0o2;
const O_CREAT: u32 = 0o100;
const O_EXCL: u32 = 0o200;
const O_TRUNC: u32 = 0o1000;
const O_APPEND: u32 = 0o2000;

const TCGETS: u32 = 0x5401;
const TIOCGWINSZ: u32 = 0x5413;

const SEEK_SET: u32 = 0;
const SEEK_CUR: u32 = 1;
const SEEK_END: u32 = 2;

/// What a file descriptor refers to.
#[derive(Debug)]
pub enum OpenFile {
    Stdin,
    Stdout,
    Stderr,
    /// A file opened by the program.
    Host(File),
    /// An in-memory file, used to capture output.
    Buffer(Cursor<Vec<u8>>),
}

impl OpenFile {
    /// Creates an empty in-memory file.
    pub fn buffer() -> Self {
        OpenFile::Buffer(Cursor::new(Vec::new()))
    }

    /// Returns the contents of an in-memory file.
    pub fn contents(&self) -> Option<&[u8]> {
        match self {
            OpenFile::Buffer(cursor) => Some(cursor.get_ref()),
            _ => None,
        }
    }

    /// The standard streams count as terminals.
    fn is_terminal(&self) -> bool {
        match self {
            OpenFile::Stdin | OpenFile::Stdout | OpenFile::Stderr => true,
            OpenFile::Host(_) | OpenFile::Buffer(_) => false,
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Errno> {
        match self {
            OpenFile::Host(file) => Ok(file.seek(pos)?),
            OpenFile::Buffer(cursor) => Ok(cursor.seek(pos)?),
            OpenFile::Stdin | OpenFile::Stdout | OpenFile::Stderr => Err(Errno::ESPIPE),
        }
    }
}

impl Read for OpenFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            OpenFile::Stdin => io::stdin().read(buf),
            OpenFile::Host(file) => file.read(buf),
            OpenFile::Buffer(cursor) => cursor.read(buf),
            OpenFile::Stdout | OpenFile::Stderr => Err(io::Error::new(
                io::ErrorKind::PermissionDenied, "output stream not readable",
            )),
        }
    }
}

impl Write for OpenFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OpenFile::Stdout => io::stdout().write(buf),
            OpenFile::Stderr => io::stderr().write(buf),
            OpenFile::Host(file) => file.write(buf),
            OpenFile::Buffer(cursor) => cursor.write(buf),
            OpenFile::Stdin => Err(io::Error::new(
                io::ErrorKind::PermissionDenied, "input stream not writable",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OpenFile::Stdout => io::stdout().flush(),
            OpenFile::Stderr => io::stderr().flush(),
            OpenFile::Host(file) => file.flush(),
            OpenFile::Buffer(_) | OpenFile::Stdin => Ok(()),
        }
    }
}

/// The process's file descriptor table.
#[derive(Debug)]
pub struct FileTable {
    files: Vec<Option<OpenFile>>,
}

impl FileTable {
    /// Creates a table with the standard streams open.
    pub fn new() -> Self {
        Self {
            files: vec![Some(OpenFile::Stdin), Some(OpenFile::Stdout), Some(OpenFile::Stderr)],
        }
    }

    pub fn get(&self, fd: u32) -> Option<&OpenFile> {
        self.files.get(fd as usize).and_then(|file| file.as_ref())
    }

    fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile, Errno> {
        self.files.get_mut(fd.0 as usize)
            .and_then(|file| file.as_mut())
            .ok_or(Errno::EBADF)
    }

    /// Installs `file` as descriptor `fd`, replacing whatever was there.
    pub fn set(&mut self, fd: u32, file: OpenFile) {
        let fd = fd as usize;
        if self.files.len() <= fd {
            self.files.resize_with(fd + 1, || None);
        }
        self.files[fd] = Some(file);
    }

    /// Stores `file` under the lowest free descriptor.
    fn insert(&mut self, file: OpenFile) -> Result<u32, Errno> {
        let fd = match self.files.iter().position(|file| file.is_none()) {
            Some(fd) => fd,
            None if self.files.len() < MAX_FILES => {
                self.files.push(None);
                self.files.len() - 1
            }
            None => return Err(Errno::EMFILE),
        };
        self.files[fd] = Some(file);
        Ok(fd as u32)
    }

    fn remove(&mut self, fd: Fd) -> Result<OpenFile, Errno> {
        self.files.get_mut(fd.0 as usize)
            .and_then(|file| file.take())
            .ok_or(Errno::EBADF)
    }

    /// Closes all descriptors from `first` upwards. Returns how many were
    /// open.
    pub fn close_from(&mut self, first: u32) -> usize {
        self.files.iter_mut()
            .skip(first as usize)
            .filter_map(|file| file.take())
            .count()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Syscall<'a> {
    fn path(&self, path: UserPtr<CStr>) -> Result<String, Errno> {
        let raw = self.mem.read_c_string(Segment::Ds, path.addr(), PATH_MAX)?;
        if raw.len() as u32 >= PATH_MAX {
            return Err(Errno::EINVAL);
        }
        String::from_utf8(raw).map_err(|_| Errno::EINVAL)
    }

    pub fn read(&mut self, (fd, buf, count): (Fd, UserPtr<u8>, u32)) -> SysResult {
        // validate the buffer before consuming any input
        self.mem.read_bytes(Segment::Ds, buf.addr(), count)?;
        let file = self.kernel.files.get_mut(fd)?;

        let mut data = vec![0; count as usize];
        let n = file.read(&mut data)?;
        self.mem.write_bytes(Segment::Ds, buf.addr(), &data[..n])?;
        Ok(n as u32)
    }

    pub fn write(&mut self, (fd, buf, count): (Fd, UserPtr<u8>, u32)) -> SysResult {
        let data = self.mem.read_bytes(Segment::Ds, buf.addr(), count)?;
        let file = self.kernel.files.get_mut(fd)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(count)
    }

    pub fn writev(&mut self, (fd, iov, iovcnt): (Fd, UserPtr<Iovec>, u32)) -> SysResult {
        if iovcnt > IOV_MAX {
            return Err(Errno::EINVAL);
        }

        let mut data = Vec::new();
        for i in 0..iovcnt {
            let entry = iov.addr().wrapping_add(i * 8);
            let base = self.mem.read(Segment::Ds, entry, OpSize::Bits32)?;
            let len = self.mem.read(Segment::Ds, entry.wrapping_add(4), OpSize::Bits32)?;
            data.extend_from_slice(self.mem.read_bytes(Segment::Ds, base, len)?);
        }
        if data.len() > i32::max_value() as usize {
            return Err(Errno::EINVAL);
        }

        let file = self.kernel.files.get_mut(fd)?;
        file.write_all(&data)?;
        file.flush()?;
        Ok(data.len() as u32)
    }

    pub fn open(&mut self, (path, flags, _mode): (UserPtr<CStr>, u32, u32)) -> SysResult {
        let path = self.path(path)?;

        let mut options = OpenOptions::new();
        match flags & O_ACCMODE {
            O_RDONLY => options.read(true),
            O_WRONLY => options.write(true),
            O_RDWR => options.read(true).write(true),
            _ => return Err(Errno::EINVAL),
        };
        if flags & O_APPEND != 0 {
            options.append(true);
        }
        if flags & O_TRUNC != 0 {
            options.truncate(true);
        }
        if flags & O_CREAT != 0 {
            if flags & O_EXCL != 0 {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }

        let file = options.open(&path)?;
        if file.metadata()?.is_dir() {
            return Err(Errno::EISDIR);
        }
        let fd = self.kernel.files.insert(OpenFile::Host(file))?;
        debug!("opened {:?} as fd {}", path, fd);
        Ok(fd)
    }

    pub fn close(&mut self, (fd,): (Fd,)) -> SysResult {
        self.kernel.files.remove(fd)?;
        Ok(0)
    }

    pub fn unlink(&mut self, (path,): (UserPtr<CStr>,)) -> SysResult {
        let path = self.path(path)?;
        fs::remove_file(&path)?;
        Ok(0)
    }

    pub fn ioctl(&mut self, (fd, request, arg): (Fd, u32, UserPtr<Winsize>)) -> SysResult {
        let is_terminal = self.kernel.files.get_mut(fd)?.is_terminal();
        match request {
            TIOCGWINSZ if is_terminal => {
                // rows, columns, then the unused pixel sizes
                for (i, value) in [256, 256, 0, 0].iter().enumerate() {
                    self.mem.write(Segment::Ds, arg.addr().wrapping_add(i as u32 * 2), OpSize::Bits16, *value)?;
                }
                Ok(0)
            }
            TIOCGWINSZ | TCGETS => Err(Errno::ENOTTY),
            _ => {
                warn!("unsupported ioctl {:#X} on fd {:?}", request, fd);
                Err(Errno::EINVAL)
            }
        }
    }

    pub fn llseek(
        &mut self,
        (fd, offset_high, offset_low, result, whence): (Fd, u32, u32, UserPtr<u64>, u32),
    ) -> SysResult {
        let offset = (u64::from(offset_high) << 32 | u64::from(offset_low)) as i64;
        let pos = match whence {
            SEEK_SET if offset >= 0 => SeekFrom::Start(offset as u64),
            SEEK_SET => return Err(Errno::EINVAL),
            SEEK_CUR => SeekFrom::Current(offset),
            SEEK_END => SeekFrom::End(offset),
            _ => return Err(Errno::EINVAL),
        };

        // check the result pointer first, seeking can't be undone
        self.mem.read_bytes(Segment::Ds, result.addr(), 8)?;
        let new = self.kernel.files.get_mut(fd)?.seek(pos)?;
        self.mem.write(Segment::Ds, result.addr(), OpSize::Bits32, new as u32)?;
        self.mem.write(Segment::Ds, result.addr().wrapping_add(4), OpSize::Bits32, (new >> 32) as u32)?;
        Ok(0)
    }
}
