//! Device Control Tests
//!
//! Terminal and FIFO commands issued through the device facade, checked
//! against the simulated host's device state.

use core_types::terminal::LocalFlags;
use core_types::{mkdev, Errno, Termios, Winsize};
use host_api::device::{
    enter_cooked_mode, enter_raw_mode, fifo_close_remote, fifo_set_kernel_read,
    fifo_set_kernel_write, ioctl, tcgetattr, tcsetattr, window_size,
};
use host_api::fs_admin::mknod;
use host_api::ioctl::{encode, Direction, TERMINAL_MAJOR};
use host_api::{HostError, HostOp, TcsetattrAction};
use sim_host::{HostEvent, OpenMode};
use tests_boundary::{host, host_mut, test_bootstrap};

#[test]
fn test_window_size() {
    let mut client = test_bootstrap();
    assert_eq!(window_size(&mut client, 1).unwrap(), Winsize::new(24, 80));

    host_mut(&mut client).set_terminal_size(Winsize::new(40, 120));
    assert_eq!(window_size(&mut client, 1).unwrap(), Winsize::new(40, 120));
}

#[test]
fn test_raw_and_cooked_mode() {
    let mut client = test_bootstrap();
    enter_raw_mode(&mut client, 0).unwrap();
    assert!(host(&client).terminal().raw);

    let termios = tcgetattr(&mut client, 0).unwrap();
    assert!(!termios.lflag.contains(LocalFlags::ICANON));
    assert!(!termios.lflag.contains(LocalFlags::ECHO));

    enter_cooked_mode(&mut client, 0).unwrap();
    assert!(!host(&client).terminal().raw);
    assert_eq!(tcgetattr(&mut client, 0).unwrap(), Termios::default());
}

#[test]
fn test_tcsetattr_round_trip() {
    let mut client = test_bootstrap();
    let mut termios = Termios::default();
    termios.make_raw();
    termios.cc[0] = 3;
    tcsetattr(&mut client, 0, TcsetattrAction::Now, &termios).unwrap();
    assert_eq!(tcgetattr(&mut client, 0).unwrap(), termios);
    assert!(host(&client).terminal().raw);
}

/// Test: deferred actions are refused before reaching the host
#[test]
fn test_tcsetattr_drain_unsupported() {
    let mut client = test_bootstrap();
    let err = tcsetattr(&mut client, 0, TcsetattrAction::Drain, &Termios::default()).unwrap_err();
    assert_eq!(err.code(), Errno::ENOTSUP);
    assert!(host(&client).audit_log().events_for_op(HostOp::Ioctl).is_empty());
}

#[test]
fn test_fifo_controls() {
    let mut client = test_bootstrap();
    mknod(&mut client, b"/dev/fifo0", mkdev(0, 0)).unwrap();
    let fd = host_mut(&mut client)
        .open_for_caller(b"/dev/fifo0", OpenMode::ReadWrite)
        .unwrap();

    fifo_set_kernel_write(&mut client, fd, true).unwrap();
    fifo_set_kernel_read(&mut client, fd, true).unwrap();
    fifo_set_kernel_read(&mut client, fd, false).unwrap();
    fifo_close_remote(&mut client, fd).unwrap();

    let fifo = host(&client).fifo(b"/dev/fifo0").unwrap();
    assert!(fifo.kernel_write);
    assert!(!fifo.kernel_read);
    assert!(fifo.remote_closed);
}

/// Test: FIFO commands share major 0 with "no device class"; the host
/// tells them apart by descriptor, so the terminal rejects them.
#[test]
fn test_fifo_command_on_terminal() {
    let mut client = test_bootstrap();
    let err = fifo_set_kernel_write(&mut client, 0, true).unwrap_err();
    assert!(matches!(err, HostError::HostRejected { code, .. } if code == Errno::ENOTTY));
}

#[test]
fn test_unknown_command_and_bad_fd() {
    let mut client = test_bootstrap();
    let unknown = encode(Direction::None, 0, u32::from(TERMINAL_MAJOR), 0x7f).unwrap();
    let err = ioctl(&mut client, 0, unknown, None).unwrap_err();
    assert_eq!(err.code(), Errno::ENOTTY);

    let err = window_size(&mut client, 9).unwrap_err();
    assert_eq!(err.code(), Errno::EBADF);
    assert!(host(&client).audit_log().has_event(|e| *e
        == HostEvent::Rejected {
            op: HostOp::Ioctl,
            code: Errno::EBADF,
        }));
}

/// Test: device nodes of unknown classes cannot be opened
#[test]
fn test_unknown_device_class() {
    let mut client = test_bootstrap();
    mknod(&mut client, b"/dev/weird", mkdev(42, 1)).unwrap();
    let err = host_mut(&mut client)
        .open_for_caller(b"/dev/weird", OpenMode::Read)
        .unwrap_err();
    assert_eq!(err.code(), Errno::ENODEV);
}
