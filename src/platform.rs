use std::{ptr::NonNull, sync::OnceLock};

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. The allocator, our top level view of this, has nothing
/// to do with the concrete implementations / APIs offered by each kernel.
pub(crate) trait PlatformMemory {
    /// Request a mapping of `len` bytes placed exactly at `addr`. The mapping
    /// must not be silently relocated: if the platform cannot place it there,
    /// this returns `None` and the caller decides what to do next.
    unsafe fn map_at(addr: *mut u8, len: usize) -> Option<NonNull<u8>>;

    /// Request a mapping of `len` bytes wherever the platform prefers.
    unsafe fn map_anywhere(len: usize) -> Option<NonNull<u8>>;

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// The platform we are running on. All syscalls go through this type.
pub(crate) struct Os;

/// Page size of the computer. Queried once, reused afterwards.
#[inline]
pub(crate) fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| unsafe { Os::page_size() })
}

/// Wrapper to use [`Os::map_at`].
#[inline]
pub(crate) unsafe fn map_at(addr: *mut u8, len: usize) -> Option<NonNull<u8>> {
    unsafe { Os::map_at(addr, len) }
}

/// Wrapper to use [`Os::map_anywhere`].
#[inline]
pub(crate) unsafe fn map_anywhere(len: usize) -> Option<NonNull<u8>> {
    unsafe { Os::map_anywhere(len) }
}

#[cfg(unix)]
mod unix {
    use super::{Os, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    // mmap parameters shared by both mapping flavours.
    const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
    const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    const FD: c_int = -1;
    const OFFSET: off_t = 0;

    // Linux can refuse a placement instead of relocating it. On other unixes
    // the address is only a hint, so the result has to be checked after the
    // fact.
    #[cfg(target_os = "linux")]
    const PLACED_FLAGS: c_int = FLAGS | libc::MAP_FIXED_NOREPLACE;
    #[cfg(not(target_os = "linux"))]
    const PLACED_FLAGS: c_int = FLAGS;

    impl PlatformMemory for Os {
        unsafe fn map_at(addr: *mut u8, len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let mapped = mmap(addr as *mut c_void, len as size_t, PROT, PLACED_FLAGS, FD, OFFSET);

                if mapped == libc::MAP_FAILED {
                    return None;
                }

                // Old kernels ignore MAP_FIXED_NOREPLACE and every non-linux
                // unix treats the address as a hint. A relocated mapping is
                // useless to us, so hand it back.
                if mapped != addr as *mut c_void {
                    munmap(mapped, len as size_t);
                    return None;
                }

                NonNull::new(mapped.cast::<u8>())
            }
        }

        unsafe fn map_anywhere(len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let mapped = mmap(std::ptr::null_mut(), len as size_t, PROT, FLAGS, FD, OFFSET);

                match mapped {
                    libc::MAP_FAILED => None,
                    addr => Some(NonNull::new_unchecked(addr).cast::<u8>()),
                }
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use crate::platform::{Os, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    const PROTECTION: Memory::PAGE_PROTECTION_FLAGS = Memory::PAGE_READWRITE;

    impl PlatformMemory for Os {
        unsafe fn map_at(addr: *mut u8, len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let mapped = Memory::VirtualAlloc(
                    Some(addr as *const c_void),
                    len,
                    Memory::MEM_RESERVE | Memory::MEM_COMMIT,
                    PROTECTION,
                );

                let mapped = NonNull::new(mapped.cast::<u8>())?;

                // VirtualAlloc rounds the base down to the allocation
                // granularity, so the reservation can land below the address
                // we asked for.
                if mapped.as_ptr() != addr {
                    let _ = Memory::VirtualFree(mapped.as_ptr().cast(), 0, Memory::MEM_RELEASE);
                    return None;
                }

                Some(mapped)
            }
        }

        unsafe fn map_anywhere(len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let mapped = Memory::VirtualAlloc(
                    None,
                    len,
                    Memory::MEM_RESERVE | Memory::MEM_COMMIT,
                    PROTECTION,
                );

                NonNull::new(mapped.cast::<u8>())
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_a_power_of_two() {
        let size = page_size();

        assert!(size >= 512);
        assert!(size.is_power_of_two());
    }

    #[test]
    fn anywhere_mapping_is_writable() {
        unsafe {
            let len = page_size();
            let addr = map_anywhere(len).expect("could not map one page");

            addr.as_ptr().write(0xAB);
            assert_eq!(addr.as_ptr().read(), 0xAB);
        }
    }
}
