#![allow(dead_code)]

use singlepoll::Handle;

use std::os::fd::RawFd;
use std::thread;
use std::time::{Duration, Instant};

/// Polls the worker's table until `check` holds, failing after 5 seconds.
pub fn wait_for_table(handle: &Handle, check: impl Fn(&[RawFd]) -> bool) {
    let started = Instant::now();

    loop {
        let fds = handle.registered().expect("Failed to snapshot registrations");
        if check(&fds) {
            return;
        }

        assert!(
            started.elapsed() < Duration::from_secs(5),
            "registration table never reached the expected state: {fds:?}"
        );
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn wait_until_registered(handle: &Handle, fd: RawFd) {
    wait_for_table(handle, |fds| fds.contains(&fd));
}
