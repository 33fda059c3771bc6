//! Linux backend over procfs
//!
//! Memory goes through `/proc/<pid>/mem`, the module table is derived from
//! `/proc/<pid>/maps`. Both require ptrace access to the target
//! (same user and a permissive `kernel.yama.ptrace_scope`, or CAP_SYS_PTRACE).

use super::backend::{attach_error, ProcessBackend};
use crate::core::types::{
    Address, MemoryError, MemoryResult, ProcessArchitecture, ProcessIdentifier, ProcessInfo,
    ProcessModule,
};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A process opened through procfs
#[derive(Debug)]
pub struct LinuxProcess {
    info: ProcessInfo,
    mem: Option<File>,
}

impl LinuxProcess {
    pub fn open(identifier: &ProcessIdentifier) -> MemoryResult<Self> {
        let pid = match identifier {
            ProcessIdentifier::Pid(pid) => *pid,
            ProcessIdentifier::Name(name) => find_pid_by_name(name)?,
        };
        Self::open_pid(pid)
    }

    pub fn open_pid(pid: u32) -> MemoryResult<Self> {
        let proc_dir = proc_path(pid);
        if !proc_dir.exists() {
            return Err(MemoryError::ProcessNotFound(format!("pid {}", pid)));
        }

        let mem = OpenOptions::new()
            .read(true)
            .write(true)
            .open(proc_dir.join("mem"))
            .map_err(|e| attach_error(pid, &e))?;

        let name = process_name(pid).unwrap_or_else(|| format!("pid-{}", pid));
        let architecture = elf_architecture(&proc_dir.join("exe")).unwrap_or_else(|| {
            debug!(pid, "could not read ELF header, assuming host architecture");
            ProcessArchitecture::host()
        });

        Ok(LinuxProcess {
            info: ProcessInfo::new(pid, name, architecture),
            mem: Some(mem),
        })
    }

    fn mem(&self) -> MemoryResult<&File> {
        self.mem
            .as_ref()
            .ok_or_else(|| MemoryError::state(self.info.pid, "process handle was released"))
    }

    fn transfer_error(&self, address: Address, err: io::Error) -> MemoryError {
        if !self.is_alive() || err.raw_os_error() == Some(Errno::ESRCH as i32) {
            MemoryError::state(self.info.pid, "process has exited")
        } else {
            MemoryError::access(address, err.to_string())
        }
    }
}

impl ProcessBackend for LinuxProcess {
    fn info(&self) -> &ProcessInfo {
        &self.info
    }

    fn is_alive(&self) -> bool {
        let pid = Pid::from_raw(self.info.pid as i32);
        match kill(pid, None) {
            Ok(()) | Err(Errno::EPERM) => {}
            Err(_) => return false,
        }
        // A zombie still answers signals but its memory is gone
        match fs::read_to_string(proc_path(self.info.pid).join("stat")) {
            Ok(stat) => !matches!(stat_state(&stat), Some('Z') | Some('X') | None),
            Err(_) => false,
        }
    }

    fn read(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        let mem = self.mem()?;
        let mut done = 0;
        while done < buffer.len() {
            let at = address.as_u64() + done as u64;
            match mem.read_at(&mut buffer[done..], at) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) if done > 0 => break,
                Err(e) => return Err(self.transfer_error(address, e)),
            }
        }
        if done == 0 && !buffer.is_empty() {
            return Err(MemoryError::access(address, "unmapped"));
        }
        Ok(done)
    }

    fn write(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        let mem = self.mem()?;
        let mut done = 0;
        while done < data.len() {
            let at = address.as_u64() + done as u64;
            match mem.write_at(&data[done..], at) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) if done > 0 => break,
                Err(e) => return Err(self.transfer_error(address, e)),
            }
        }
        Ok(done)
    }

    fn modules(&self) -> MemoryResult<Vec<ProcessModule>> {
        let maps = fs::read_to_string(proc_path(self.info.pid).join("maps"))
            .map_err(|_| MemoryError::state(self.info.pid, "process has exited"))?;
        Ok(parse_maps(&maps))
    }

    fn close(&mut self) {
        self.mem = None;
    }
}

fn proc_path(pid: u32) -> PathBuf {
    PathBuf::from("/proc").join(pid.to_string())
}

/// Executable file name, falling back to `comm` when `exe` is unreadable
fn process_name(pid: u32) -> Option<String> {
    let dir = proc_path(pid);
    if let Ok(exe) = fs::read_link(dir.join("exe")) {
        if let Some(name) = exe.file_name() {
            return Some(name.to_string_lossy().into_owned());
        }
    }
    fs::read_to_string(dir.join("comm"))
        .ok()
        .map(|comm| comm.trim_end().to_string())
}

/// First pid, in ascending order, whose executable is named exactly `name`
pub fn find_pid_by_name(name: &str) -> MemoryResult<u32> {
    let entries = fs::read_dir("/proc")
        .map_err(|e| MemoryError::UnsupportedOperation(format!("cannot list /proc: {}", e)))?;

    let mut pids: Vec<u32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    pids.sort_unstable();

    pids.into_iter()
        .find(|&pid| process_name(pid).as_deref() == Some(name))
        .ok_or_else(|| MemoryError::ProcessNotFound(name.to_string()))
}

/// Architecture from the ELF header of the executable
fn elf_architecture(exe: &Path) -> Option<ProcessArchitecture> {
    let mut header = [0u8; 20];
    File::open(exe).ok()?.read_exact(&mut header).ok()?;
    parse_elf_header(&header)
}

fn parse_elf_header(header: &[u8; 20]) -> Option<ProcessArchitecture> {
    if header[..4] != *b"\x7fELF" {
        return None;
    }
    let machine = u16::from_le_bytes([header[18], header[19]]);
    let architecture = match (header[4], machine) {
        (1, 3) => ProcessArchitecture::X86,
        (2, 62) => ProcessArchitecture::X64,
        (1, 40) => ProcessArchitecture::ARM,
        (2, 183) => ProcessArchitecture::ARM64,
        (1, _) => ProcessArchitecture::X86,
        (2, _) => ProcessArchitecture::X64,
        _ => ProcessArchitecture::Unknown,
    };
    Some(architecture)
}

/// State letter from `/proc/<pid>/stat`; the command name may contain spaces
/// and parentheses, so scan from the last `)`.
fn stat_state(stat: &str) -> Option<char> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.trim_start().chars().next()
}

/// Builds the module list from `/proc/<pid>/maps`
///
/// A module spans the first contiguous run of mappings backed by the same
/// file; anonymous mappings (such as `.bss`) may sit inside the run. Later,
/// disjoint mappings of a file that already formed a module are ignored so
/// the resulting ranges never overlap.
pub(crate) fn parse_maps(maps: &str) -> Vec<ProcessModule> {
    let mut modules: Vec<ProcessModule> = Vec::new();
    let mut open: Option<usize> = None;

    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let (Some(range), Some(_perms), Some(_offset), Some(_dev), Some(_inode)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };
        let path = fields.collect::<Vec<_>>().join(" ");

        let Some((start, end)) = range.split_once('-').and_then(|(s, e)| {
            Some((
                u64::from_str_radix(s, 16).ok()?,
                u64::from_str_radix(e, 16).ok()?,
            ))
        }) else {
            continue;
        };

        if path.is_empty() {
            continue;
        }
        if !path.starts_with('/') {
            open = None;
            continue;
        }

        let path = path.trim_end_matches(" (deleted)");
        match open {
            Some(index) if modules[index].path.as_deref() == Some(Path::new(path)) => {
                let module = &mut modules[index];
                module.size = end.saturating_sub(module.base.as_u64());
            }
            _ => {
                if modules
                    .iter()
                    .any(|m| m.path.as_deref() == Some(Path::new(path)))
                {
                    open = None;
                    continue;
                }
                let name = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string());
                modules.push(ProcessModule::new(name, start, end - start).with_path(path));
                open = Some(modules.len() - 1);
            }
        }
    }

    modules
}
