mod common;

use common::{wait_for_table, wait_until_registered};
use singlepoll::{
    CancellationToken, Interest, Multiplexer, MultiplexerBuilder, Outcome, WaitError,
};

use std::fs::File;
use std::future::Future;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::pin::pin;
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

fn pair() -> (UnixStream, UnixStream) {
    let (a, b) = UnixStream::pair().expect("Failed to create socket pair");
    a.set_nonblocking(true).expect("Failed to set non-blocking");
    b.set_nonblocking(true).expect("Failed to set non-blocking");
    (a, b)
}

#[test]
fn test_fresh_socket_is_writable() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let (a, _b) = pair();

    let outcome = multiplexer.handle().wait_blocking(
        a.as_raw_fd(),
        Interest::WRITABLE,
        &CancellationToken::new(),
    );

    assert!(matches!(outcome, Ok(Outcome::Ready)));
    assert!(multiplexer.handle().registered().unwrap().is_empty());
}

#[test]
fn test_deadline_cancels_and_removes_registration() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, _b) = pair();

    let started = Instant::now();
    let cancel = CancellationToken::timeout(Duration::from_millis(50));
    let outcome = handle.wait_blocking(a.as_raw_fd(), Interest::READABLE, &cancel);

    assert!(matches!(outcome, Ok(Outcome::Cancelled)));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(started.elapsed() < Duration::from_secs(5));

    // The removal was queued before the snapshot.
    assert!(!handle.registered().unwrap().contains(&a.as_raw_fd()));
}

#[test]
fn test_tcp_readable_after_peer_writes() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("Failed to accept connection");
        thread::sleep(Duration::from_millis(20));
        stream.write_all(b"hello").expect("Failed to write to stream");
        stream
    });

    let mut stream = TcpStream::connect(addr).expect("Failed to connect to listener");
    stream.set_nonblocking(true).expect("Failed to set non-blocking");

    let outcome = handle.wait_blocking(
        stream.as_raw_fd(),
        Interest::READABLE,
        &CancellationToken::new(),
    );
    assert!(matches!(outcome, Ok(Outcome::Ready)));

    let mut buffer = [0; 5];
    stream.read_exact(&mut buffer).expect("Failed to read from stream");
    assert_eq!(&buffer, b"hello");

    peer.join().expect("Thread panicked");
}

#[test]
fn test_many_concurrent_waits_all_resolve() {
    const WAITERS: usize = 16;

    let multiplexer = MultiplexerBuilder::new()
        .event_capacity(4)
        .build()
        .expect("Failed to start multiplexer");
    let handle = multiplexer.handle();

    let pairs: Vec<_> = (0..WAITERS).map(|_| pair()).collect();

    let waiters: Vec<_> = pairs
        .iter()
        .map(|(a, _)| {
            let handle = handle.clone();
            let fd = a.as_raw_fd();
            thread::spawn(move || {
                handle.wait_blocking(fd, Interest::READABLE, &CancellationToken::new())
            })
        })
        .collect();

    wait_for_table(&handle, |fds| fds.len() == WAITERS);

    for (_, b) in &pairs {
        let mut writer = b;
        writer.write_all(b"x").expect("Failed to write to stream");
    }

    for waiter in waiters {
        let outcome = waiter.join().expect("Thread panicked");
        assert!(matches!(outcome, Ok(Outcome::Ready)));
    }

    assert!(handle.registered().unwrap().is_empty());
}

#[test]
fn test_second_wait_on_same_fd_is_refused() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, mut b) = pair();
    let fd = a.as_raw_fd();

    let first_cancel = CancellationToken::new();
    let mut first = pin!(handle.wait(fd, Interest::READABLE, &first_cancel));
    let mut cx = Context::from_waker(Waker::noop());

    assert!(first.as_mut().poll(&mut cx).is_pending());
    wait_until_registered(&handle, fd);

    let second = handle.wait_blocking(fd, Interest::READABLE, &CancellationToken::new());
    assert!(matches!(second, Err(WaitError::AlreadyPending { fd: f }) if f == fd));

    // The first registration is untouched and still resolves normally.
    assert!(handle.registered().unwrap().contains(&fd));
    b.write_all(b"x").expect("Failed to write to stream");
    wait_for_table(&handle, |fds| !fds.contains(&fd));

    assert!(matches!(
        first.as_mut().poll(&mut cx),
        Poll::Ready(Ok(Outcome::Ready))
    ));
}

#[test]
fn test_shutdown_resolves_every_outstanding_wait() {
    const WAITERS: usize = 5;

    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let pairs: Vec<_> = (0..WAITERS).map(|_| pair()).collect();

    let waiters: Vec<_> = pairs
        .iter()
        .map(|(a, _)| {
            let handle = handle.clone();
            let fd = a.as_raw_fd();
            thread::spawn(move || {
                handle.wait_blocking(fd, Interest::READABLE, &CancellationToken::new())
            })
        })
        .collect();

    wait_for_table(&handle, |fds| fds.len() == WAITERS);

    multiplexer.shutdown();
    assert!(multiplexer.is_shut_down());

    for waiter in waiters {
        let outcome = waiter.join().expect("Thread panicked");
        assert!(matches!(outcome, Err(WaitError::Shutdown)));
    }

    let (a, _b) = pair();
    let late = handle.wait_blocking(
        a.as_raw_fd(),
        Interest::WRITABLE,
        &CancellationToken::new(),
    );
    assert!(matches!(late, Err(WaitError::Shutdown)));
    assert!(matches!(handle.registered(), Err(WaitError::Shutdown)));

    // Idempotent.
    multiplexer.shutdown();
}

#[test]
fn test_unsupported_modes() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, _b) = pair();
    let cancel = CancellationToken::new();

    assert!(matches!(
        handle.wait_mode(a.as_raw_fd(), "x", &cancel),
        Err(WaitError::UnsupportedMode)
    ));
    assert!(matches!(
        handle.wait_blocking(a.as_raw_fd(), Interest::new(false, false), &cancel),
        Err(WaitError::UnsupportedMode)
    ));
    assert!(matches!(
        handle.wait_mode_blocking(a.as_raw_fd(), "w", &cancel),
        Ok(Outcome::Ready)
    ));
}

#[test]
fn test_regular_file_is_refused_by_kernel() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let exe = std::env::current_exe().expect("Failed to locate test binary");
    let file = File::open(exe).expect("Failed to open file");

    let outcome = handle.wait_blocking(
        file.as_raw_fd(),
        Interest::READABLE,
        &CancellationToken::new(),
    );

    match outcome {
        Err(err @ WaitError::RegistrationFailed(_)) => {
            assert_eq!(err.os_error().and_then(|e| e.raw_os_error()), Some(libc::EPERM));
        }
        other => panic!("expected RegistrationFailed, got {other:?}"),
    }

    assert!(handle.registered().unwrap().is_empty());
}

#[test]
fn test_negative_fd_is_refused() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");

    let outcome = multiplexer
        .handle()
        .wait_blocking(-1, Interest::READABLE, &CancellationToken::new());

    match outcome {
        Err(err) => assert_eq!(
            err.os_error().and_then(|e| e.raw_os_error()),
            Some(libc::EBADF)
        ),
        Ok(outcome) => panic!("expected an error, got {outcome:?}"),
    }
}

#[test]
fn test_dropping_pending_wait_removes_registration() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, _b) = pair();
    let fd = a.as_raw_fd();
    let cancel = CancellationToken::new();

    {
        let mut wait = Box::pin(handle.wait(fd, Interest::READABLE, &cancel));
        let mut cx = Context::from_waker(Waker::noop());

        assert!(wait.as_mut().poll(&mut cx).is_pending());
        wait_until_registered(&handle, fd);
    }

    assert!(!handle.registered().unwrap().contains(&fd));

    // The descriptor can be waited on again right away.
    let cancel = CancellationToken::timeout(Duration::from_millis(10));
    let outcome = handle.wait_blocking(fd, Interest::READABLE, &cancel);
    assert!(matches!(outcome, Ok(Outcome::Cancelled)));
}

#[test]
fn test_delivered_result_wins_over_later_cancel() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, _b) = pair();
    let fd = a.as_raw_fd();
    let cancel = CancellationToken::new();

    let mut wait = pin!(handle.wait(fd, Interest::WRITABLE, &cancel));
    let mut cx = Context::from_waker(Waker::noop());

    assert!(wait.as_mut().poll(&mut cx).is_pending());

    // Once the fd is gone from the table the worker has resolved it.
    wait_for_table(&handle, |fds| !fds.contains(&fd));
    cancel.cancel();

    assert!(matches!(
        wait.as_mut().poll(&mut cx),
        Poll::Ready(Ok(Outcome::Ready))
    ));
}

#[test]
fn test_unpolled_wait_sends_nothing() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, _b) = pair();

    let wait = handle.wait(a.as_raw_fd(), Interest::READABLE, &CancellationToken::new());
    assert_eq!(wait.fd(), a.as_raw_fd());
    assert_eq!(wait.interest(), Interest::READABLE);

    assert!(handle.registered().unwrap().is_empty());
    drop(wait);
    assert!(handle.registered().unwrap().is_empty());
}

#[test]
fn test_cancelled_token_resolves_without_registering() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, _b) = pair();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = handle.wait_blocking(a.as_raw_fd(), Interest::WRITABLE, &cancel);
    assert!(matches!(outcome, Ok(Outcome::Cancelled)));
    assert!(handle.registered().unwrap().is_empty());
}

#[singlepoll::test(timeout_ms = 5000)]
async fn test_parent_cancel_reaches_awaiting_child() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, _b) = pair();

    let parent = CancellationToken::new();
    let child = parent.child();

    let remote = parent.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        remote.cancel();
    });

    let outcome = handle.wait(a.as_raw_fd(), Interest::READABLE, &child).await;
    assert!(matches!(outcome, Ok(Outcome::Cancelled)));

    canceller.join().expect("Thread panicked");
}

#[singlepoll::test]
async fn test_async_wait_on_both_directions() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, _b) = pair();

    let outcome = handle
        .wait(
            a.as_raw_fd(),
            Interest::READABLE | Interest::WRITABLE,
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(outcome, Ok(Outcome::Ready)));
}

#[test]
fn test_loopback_write_cancel_then_read() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");

    let mut writer = TcpStream::connect(addr).expect("Failed to connect to listener");
    let (reader, _) = listener.accept().expect("Failed to accept connection");
    writer.set_nonblocking(true).expect("Failed to set non-blocking");
    reader.set_nonblocking(true).expect("Failed to set non-blocking");

    let never = CancellationToken::new();

    let started = Instant::now();
    let outcome = handle.wait_blocking(writer.as_raw_fd(), Interest::WRITABLE, &never);
    assert!(matches!(outcome, Ok(Outcome::Ready)));
    assert!(started.elapsed() < Duration::from_secs(1));

    let started = Instant::now();
    let deadline = CancellationToken::timeout(Duration::from_millis(50));
    let outcome = handle.wait_blocking(reader.as_raw_fd(), Interest::READABLE, &deadline);
    assert!(matches!(outcome, Ok(Outcome::Cancelled)));
    assert!(started.elapsed() >= Duration::from_millis(50));

    writer.write_all(&[1]).expect("Failed to write to stream");
    let outcome = handle.wait_blocking(reader.as_raw_fd(), Interest::READABLE, &never);
    assert!(matches!(outcome, Ok(Outcome::Ready)));

    assert!(handle.registered().unwrap().is_empty());
}

#[test]
fn test_child_of_timeout_token_is_cancelled_at_deadline() {
    let multiplexer = Multiplexer::new().expect("Failed to start multiplexer");
    let handle = multiplexer.handle();
    let (a, _b) = pair();

    let started = Instant::now();

    // The parent is a temporary: only the child keeps the deadline alive.
    let child = CancellationToken::timeout(Duration::from_millis(50)).child();
    let outcome = handle.wait_blocking(a.as_raw_fd(), Interest::READABLE, &child);

    assert!(matches!(outcome, Ok(Outcome::Cancelled)));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(!handle.registered().unwrap().contains(&a.as_raw_fd()));
}
