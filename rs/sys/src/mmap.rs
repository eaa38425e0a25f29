#[cfg(test)]
mod tests;

use nix::sys::mman::{mmap, msync, munmap, MapFlags, MsFlags, ProtFlags};
use std::io;
use std::mem::ManuallyDrop;
use std::os::unix::io::AsRawFd;

/// `SharedMmap` contains a read-write `MAP_SHARED` mapping of a file that is
/// automatically unmapped when the value is dropped.
///
/// Teardown can also be requested explicitly with [`SharedMmap::unmap`],
/// which reports the `munmap` result to the caller instead of discarding it.
pub struct SharedMmap {
    addr: *mut std::ffi::c_void,
    len: usize,
}

impl SharedMmap {
    /// Maps `len` bytes of `fd` read-write and shared, starting at offset 0.
    ///
    /// The file must already have been grown to at least `len` bytes;
    /// stores past the end of the backing file raise SIGBUS.
    pub fn of_file<FD: AsRawFd>(fd: &FD, len: usize) -> io::Result<Self> {
        // mmap fails on 0-size requests, which is extremely annoying in
        // practice, so we construct a bogus 0-sized mapping instead.
        if len == 0 {
            return Ok(Self {
                addr: std::ptr::null_mut(),
                len,
            });
        }

        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd.as_raw_fd(),
                /* offset = */ 0,
            )
        }?;
        Ok(Self { addr, len })
    }

    /// Returns start address of the memory mapping.
    pub fn addr(&self) -> *const u8 {
        self.addr as *const u8
    }

    /// Returns the length of the mapped region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the memory region has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a byte slice view of the memory mapping.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.addr(), self.len()) }
    }

    /// Writes `byte` to every byte of the region, faulting in and allocating
    /// every page (or huge mapping) in range.
    pub fn fill(&mut self, byte: u8) {
        if self.len > 0 {
            unsafe { std::ptr::write_bytes(self.addr as *mut u8, byte, self.len) };
        }
    }

    /// Flushes the whole region to the backing file and waits for the write
    /// to complete.
    pub fn sync(&self) -> io::Result<()> {
        if self.len == 0 {
            return Ok(());
        }
        unsafe { msync(self.addr, self.len, MsFlags::MS_SYNC) }?;
        Ok(())
    }

    /// Unmaps the region, consuming the value so that drop does not unmap a
    /// second time.
    pub fn unmap(self) -> io::Result<()> {
        let this = ManuallyDrop::new(self);
        if this.len == 0 {
            return Ok(());
        }
        unsafe { munmap(this.addr, this.len) }?;
        Ok(())
    }
}

impl Drop for SharedMmap {
    fn drop(&mut self) {
        // Backstop for paths that never reached the explicit `unmap` call.
        if self.len > 0 {
            let _ = unsafe { munmap(self.addr, self.len) };
        }
    }
}

impl AsRef<[u8]> for SharedMmap {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
