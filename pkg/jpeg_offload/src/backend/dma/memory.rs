use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::prelude::AsRawFd;

use crate::errors::*;

/// Wrapper around a block of memory mapped to a file by mmap().
/// This wrapper handles ensuring that munmap() is eventually called to clean up the memory.
struct MappedMemory {
    addr: *mut u8,
    length: usize,
}

impl Drop for MappedMemory {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.addr as *mut libc::c_void, self.length) };
    }
}

/// A window of physical memory (device registers or a reserved DMA buffer)
/// mapped into this process.
///
/// The backing file is opened with O_SYNC so accesses bypass the CPU cache.
pub struct MemoryBlock {
    memory: MappedMemory,

    /// Offset of the requested physical address from the page aligned start
    /// of the mapping.
    page_offset: usize,

    size: usize,
    physical_address: u64,
}

unsafe impl Send for MemoryBlock {}
unsafe impl Sync for MemoryBlock {}

impl MemoryBlock {
    pub fn open(path: &str, physical_address: u64, size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)?;

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return Err(err_msg("Failed to query the page size"));
        }
        let page_size = page_size as u64;

        let aligned = physical_address - (physical_address % page_size);
        let page_offset = (physical_address - aligned) as usize;
        let length = page_offset + size;

        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                aligned as libc::off_t,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(format_err!(
                "Failed to mmap {} @ {:#x}: {}",
                path,
                physical_address,
                nix::errno::Errno::last()
            ));
        }

        // File no longer needed after the mmap
        drop(file);

        Ok(Self {
            memory: MappedMemory {
                addr: addr as *mut u8,
                length,
            },
            page_offset,
            size,
            physical_address,
        })
    }

    pub fn physical_address(&self) -> u64 {
        self.physical_address
    }

    pub fn len(&self) -> usize {
        self.size
    }

    fn register_ptr(&self, offset: usize) -> *mut u32 {
        assert!(offset + std::mem::size_of::<u32>() <= self.size);
        unsafe { self.memory.addr.add(self.page_offset + offset) as *mut u32 }
    }

    pub fn read_register(&self, offset: usize) -> u32 {
        unsafe { std::ptr::read_volatile(self.register_ptr(offset)) }
    }

    pub fn write_register(&self, offset: usize, value: u32) {
        unsafe { std::ptr::write_volatile(self.register_ptr(offset), value) }
    }

    pub fn modify_register<F: Fn(u32) -> u32>(&self, offset: usize, f: F) {
        let value = f(self.read_register(offset));
        self.write_register(offset, value);
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.memory.addr.add(self.page_offset), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.memory.addr.add(self.page_offset), self.size)
        }
    }
}
