//! Reading a running host process from outside, for validating gamedata
//! signatures without loading into the host.

use log::{debug, error, info, trace, warn};
use std::io;
use sysinfo::System;

use crate::host::{ClassHandle, HostMetadata};
use crate::signature::{Signature, MAX_MATCHES};

/// A committed, readable range of the target's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: usize,
    pub size: usize,
}

const SCAN_CHUNK: usize = 4 * 1024 * 1024;

pub trait ProcessMemoryReader {
    fn attach(&mut self, pid: u32) -> io::Result<()>;
    fn read_memory(&self, address: usize, size: usize) -> io::Result<Vec<u8>>;
    fn detach(&mut self) -> io::Result<()>;
    fn is_attached(&self) -> bool;

    fn readable_regions(&self) -> io::Result<Vec<MemoryRegion>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Region enumeration not supported on this platform",
        ))
    }

    /// Scan every readable region for `signature`. Returns match addresses.
    fn scan_for_signature(&self, signature: &Signature) -> io::Result<Vec<usize>> {
        let regions = self.readable_regions()?;
        let mut results = Vec::new();
        let mut bytes_scanned: u64 = 0;
        let overlap = signature.len().saturating_sub(1);

        info!("Scanning {} regions for \"{}\"", regions.len(), signature);

        for region in &regions {
            let mut off = 0;
            while off < region.size && results.len() < MAX_MATCHES {
                let read_size = SCAN_CHUNK.min(region.size - off);
                let read_addr = region.start + off;
                if let Ok(data) = self.read_memory(read_addr, read_size) {
                    for i in signature.find_all(&data) {
                        results.push(read_addr + i);
                        if results.len() >= MAX_MATCHES {
                            break;
                        }
                    }
                    bytes_scanned += data.len() as u64;
                }
                // Overlap at chunk boundaries to catch cross-boundary matches
                if overlap > 0 && off + SCAN_CHUNK < region.size {
                    off += SCAN_CHUNK - overlap;
                } else {
                    off += SCAN_CHUNK;
                }
            }
            if results.len() >= MAX_MATCHES {
                warn!("Scan capped at {} results", MAX_MATCHES);
                break;
            }
        }

        info!(
            "Scan complete: {} regions, {:.1} MB scanned, {} matches",
            regions.len(),
            bytes_scanned as f64 / (1024.0 * 1024.0),
            results.len(),
        );
        Ok(results)
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
    use windows::Win32::System::Memory::{MEM_COMMIT, MEMORY_BASIC_INFORMATION, VirtualQueryEx};
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};

    #[cfg(target_pointer_width = "64")]
    const MAX_ADDRESS: usize = 0x7FFF_FFFF_0000;
    #[cfg(not(target_pointer_width = "64"))]
    const MAX_ADDRESS: usize = 0x7FFF_0000;

    pub struct WindowsMemoryReader {
        handle: Option<HANDLE>,
    }

    impl WindowsMemoryReader {
        pub fn new() -> Self {
            Self { handle: None }
        }

        fn handle(&self) -> io::Result<HANDLE> {
            self.handle
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "Not attached"))
        }
    }

    impl ProcessMemoryReader for WindowsMemoryReader {
        fn attach(&mut self, pid: u32) -> io::Result<()> {
            self.detach()?;
            info!("Opening process PID={} with PROCESS_VM_READ", pid);
            let handle = unsafe { OpenProcess(PROCESS_VM_READ | PROCESS_QUERY_INFORMATION, false, pid) }
                .map_err(|e| {
                    error!("OpenProcess failed for PID={}: {}", pid, e);
                    io::Error::new(io::ErrorKind::PermissionDenied, e.to_string())
                })?;
            info!("Successfully opened process PID={}, handle={:?}", pid, handle);
            self.handle = Some(handle);
            Ok(())
        }

        fn read_memory(&self, address: usize, size: usize) -> io::Result<Vec<u8>> {
            let handle = self.handle()?;
            let mut buffer = vec![0u8; size];
            let mut bytes_read = 0usize;
            trace!("ReadProcessMemory addr=0x{:X} size={}", address, size);
            unsafe {
                ReadProcessMemory(
                    handle,
                    address as *const _,
                    buffer.as_mut_ptr() as *mut _,
                    size,
                    Some(&mut bytes_read),
                )
            }
            .map_err(|e| {
                debug!("ReadProcessMemory failed at 0x{:X} (size={}): {}", address, size, e);
                io::Error::new(io::ErrorKind::Other, e.to_string())
            })?;
            buffer.truncate(bytes_read);
            Ok(buffer)
        }

        fn detach(&mut self) -> io::Result<()> {
            if let Some(handle) = self.handle.take() {
                info!("Closing process handle {:?}", handle);
                unsafe { CloseHandle(handle) }
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            }
            Ok(())
        }

        fn is_attached(&self) -> bool {
            self.handle.is_some()
        }

        fn readable_regions(&self) -> io::Result<Vec<MemoryRegion>> {
            let handle = self.handle()?;
            let mut regions = Vec::new();
            let mut address: usize = 0x10000; // Skip first 64 KB (null page area)

            while address < MAX_ADDRESS {
                let mut mbi = MEMORY_BASIC_INFORMATION::default();
                let ret = unsafe {
                    VirtualQueryEx(
                        handle,
                        Some(address as *const _),
                        &mut mbi,
                        std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                    )
                };
                if ret == 0 {
                    break;
                }

                let base = mbi.BaseAddress as usize;
                let size = mbi.RegionSize;
                let next = base.wrapping_add(size);
                if next <= base {
                    break; // overflow
                }

                if mbi.State == MEM_COMMIT {
                    let p = mbi.Protect.0;
                    // p != 0, not PAGE_NOACCESS(0x01), not PAGE_GUARD(0x100)
                    if p != 0 && (p & 0x01) == 0 && (p & 0x100) == 0 {
                        regions.push(MemoryRegion { start: base, size });
                    }
                }

                address = next;
            }

            Ok(regions)
        }
    }

    impl Drop for WindowsMemoryReader {
        fn drop(&mut self) {
            let _ = self.detach();
        }
    }
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;

    pub struct LinuxMemoryReader {
        pid: Option<u32>,
    }

    impl LinuxMemoryReader {
        pub fn new() -> Self {
            Self { pid: None }
        }

        fn pid(&self) -> io::Result<u32> {
            self.pid
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "Not attached"))
        }
    }

    /// Parses one `/proc/<pid>/maps` line into a region if it is readable.
    pub(super) fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
        let mut parts = line.split_whitespace();
        let range = parts.next()?;
        let perms = parts.next()?;
        if !perms.starts_with('r') {
            return None;
        }
        let (start, end) = range.split_once('-')?;
        let start = usize::from_str_radix(start, 16).ok()?;
        let end = usize::from_str_radix(end, 16).ok()?;
        let size = end.checked_sub(start).filter(|s| *s > 0)?;
        Some(MemoryRegion { start, size })
    }

    impl ProcessMemoryReader for LinuxMemoryReader {
        fn attach(&mut self, pid: u32) -> io::Result<()> {
            self.detach()?;
            let path = format!("/proc/{}/maps", pid);
            info!("Opening {} for region enumeration", path);
            std::fs::File::open(&path).map_err(|e| {
                error!("Failed to open {}: {}", path, e);
                e
            })?;
            info!("Successfully attached to PID={}", pid);
            self.pid = Some(pid);
            Ok(())
        }

        fn read_memory(&self, address: usize, size: usize) -> io::Result<Vec<u8>> {
            let pid = self.pid()?;
            let mut buffer = vec![0u8; size];
            let local = libc::iovec {
                iov_base: buffer.as_mut_ptr() as *mut libc::c_void,
                iov_len: size,
            };
            let remote = libc::iovec {
                iov_base: address as *mut libc::c_void,
                iov_len: size,
            };
            trace!("process_vm_readv at 0x{:X} size={}", address, size);
            let read = unsafe { libc::process_vm_readv(pid as libc::pid_t, &local, 1, &remote, 1, 0) };
            if read < 0 {
                let err = io::Error::last_os_error();
                debug!("process_vm_readv failed at 0x{:X} (size={}): {}", address, size, err);
                return Err(err);
            }
            buffer.truncate(read as usize);
            Ok(buffer)
        }

        fn detach(&mut self) -> io::Result<()> {
            if let Some(pid) = self.pid.take() {
                info!("Detached from PID={}", pid);
            }
            Ok(())
        }

        fn is_attached(&self) -> bool {
            self.pid.is_some()
        }

        fn readable_regions(&self) -> io::Result<Vec<MemoryRegion>> {
            let pid = self.pid()?;
            let maps = std::fs::read_to_string(format!("/proc/{}/maps", pid))?;
            Ok(maps.lines().filter_map(parse_maps_line).collect())
        }
    }
}

/// Reader for platforms without a process memory backend. Every operation fails.
#[derive(Debug, Default)]
pub struct UnsupportedReader;

impl UnsupportedReader {
    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "Process memory access not supported on this platform",
        )
    }
}

impl ProcessMemoryReader for UnsupportedReader {
    fn attach(&mut self, _pid: u32) -> io::Result<()> {
        Err(Self::unsupported())
    }

    fn read_memory(&self, _address: usize, _size: usize) -> io::Result<Vec<u8>> {
        Err(Self::unsupported())
    }

    fn detach(&mut self) -> io::Result<()> {
        Err(Self::unsupported())
    }

    fn is_attached(&self) -> bool {
        false
    }
}

pub fn create_reader() -> Box<dyn ProcessMemoryReader> {
    #[cfg(windows)]
    {
        Box::new(windows_impl::WindowsMemoryReader::new())
    }
    #[cfg(target_os = "linux")]
    {
        Box::new(linux_impl::LinuxMemoryReader::new())
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        Box::new(UnsupportedReader)
    }
}

/// PID of the first process named `name`.
pub fn find_process(name: &str) -> Option<u32> {
    let mut sys = System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    let found = sys
        .processes()
        .values()
        .find(|p| p.name().to_string_lossy() == name)
        .map(|p| p.pid().as_u32());
    match found {
        Some(pid) => info!("Found process '{}' with PID={}", name, pid),
        None => warn!("Process '{}' not found", name),
    }
    found
}

/// Host metadata answering signature scans and reads against an attached process.
pub struct ProcessScanner {
    reader: Box<dyn ProcessMemoryReader>,
}

impl ProcessScanner {
    pub fn new(reader: Box<dyn ProcessMemoryReader>) -> Self {
        Self { reader }
    }

    pub fn attach(name: &str) -> crate::error::Result<Self> {
        let pid = find_process(name).ok_or_else(|| crate::error::Error::ProcessNotFound(name.to_string()))?;
        let mut reader = create_reader();
        reader.attach(pid)?;
        Ok(Self::new(reader))
    }
}

impl HostMetadata for ProcessScanner {
    fn class_by_name(&self, _name: &str) -> Option<ClassHandle> {
        None
    }

    fn field_offset(&self, _class: ClassHandle, _field: &str) -> Option<i64> {
        None
    }

    fn address_of(&self, _name: &str) -> Option<usize> {
        None
    }

    fn find_signature(&self, signature: &Signature) -> Option<usize> {
        match self.reader.scan_for_signature(signature) {
            Ok(matches) => {
                if matches.len() > 1 {
                    warn!(
                        "Signature \"{}\" matched {} times, using the first",
                        signature,
                        matches.len()
                    );
                }
                matches.first().copied()
            }
            Err(e) => {
                error!("Signature scan failed: {}", e);
                None
            }
        }
    }

    fn read_bytes(&self, address: usize, len: usize) -> Option<Vec<u8>> {
        self.reader
            .read_memory(address, len)
            .ok()
            .filter(|bytes| bytes.len() == len)
    }
}
