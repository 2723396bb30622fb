use libc::{
    EFD_CLOEXEC, EFD_NONBLOCK, EPOLL_CLOEXEC, c_int, epoll_create1, epoll_ctl, epoll_event,
    epoll_wait, eventfd, read, write,
};
use std::io;
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

/// Creates a close-on-exec `epoll` instance.
pub(crate) fn sys_epoll_create() -> io::Result<OwnedFd> {
    let fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Creates a non-blocking, close-on-exec `eventfd` with a zero counter.
pub(crate) fn sys_eventfd() -> io::Result<OwnedFd> {
    let fd = unsafe { eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Adds `value` to an eventfd counter.
pub(crate) fn sys_eventfd_write(fd: RawFd, value: u64) -> io::Result<()> {
    let n = unsafe {
        write(
            fd,
            &value as *const u64 as *const _,
            mem::size_of::<u64>(),
        )
    };

    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Reads and resets an eventfd counter.
///
/// Returns `WouldBlock` when the counter is already zero.
pub(crate) fn sys_eventfd_read(fd: RawFd) -> io::Result<u64> {
    let mut value: u64 = 0;
    let n = unsafe {
        read(
            fd,
            &mut value as *mut u64 as *mut _,
            mem::size_of::<u64>(),
        )
    };

    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(value)
    }
}

/// Issues an `epoll_ctl` operation.
///
/// `EPOLL_CTL_DEL` ignores `events` and `token`.
pub(crate) fn sys_epoll_ctl(
    epoll: RawFd,
    op: c_int,
    fd: RawFd,
    events: u32,
    token: u64,
) -> io::Result<()> {
    let mut event = epoll_event { events, u64: token };

    let rc = unsafe { epoll_ctl(epoll, op, fd, &mut event) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Waits on `epoll` and fills `buffer` up to its capacity.
///
/// A `timeout_ms` of `-1` blocks until an event or a signal arrives.
pub(crate) fn sys_epoll_wait(
    epoll: RawFd,
    buffer: &mut Vec<epoll_event>,
    timeout_ms: c_int,
) -> io::Result<usize> {
    buffer.clear();

    let capacity = buffer.capacity().min(c_int::MAX as usize) as c_int;
    let n = unsafe { epoll_wait(epoll, buffer.as_mut_ptr(), capacity, timeout_ms) };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    // The kernel initialised the first `n` entries.
    unsafe { buffer.set_len(n as usize) };

    Ok(n as usize)
}
