//! Process and Environment Tests

use core_types::Errno;
use host_api::process::{chdir, clean_inodes, getcwd, getpid, isatty, set_env};
use host_api::{AbiLimits, HostError, HostOp, Redirect, SpawnRequest};
use sim_host::{HostEvent, OpenMode};
use tests_boundary::{host, host_mut, test_bootstrap};

/// Test: getcwd grows its buffer until a long path fits
#[test]
fn test_getcwd_grows_for_long_paths() {
    let mut client = test_bootstrap();
    let segment = [b'd'; 100];
    let mut long = Vec::new();
    for _ in 0..10 {
        long.push(b'/');
        long.extend_from_slice(&segment);
    }
    host_mut(&mut client).create_dir(&long);
    chdir(&mut client, &long).unwrap();

    assert_eq!(getcwd(&mut client).unwrap(), long);

    // 256 and 512 were too small, 1024 fit.
    let rejected = host(&client).audit_log().count_events(|e| {
        *e == HostEvent::Rejected {
            op: HostOp::Getcwd,
            code: Errno::ENOBUFS,
        }
    });
    assert_eq!(rejected, 2);
}

#[test]
fn test_getcwd_short_path_single_call() {
    let mut client = test_bootstrap();
    assert_eq!(getcwd(&mut client).unwrap(), b"/");
    assert_eq!(
        host(&client).audit_log().events_for_op(HostOp::Getcwd),
        vec![
            HostEvent::Invoked { op: HostOp::Getcwd },
            HostEvent::Completed { op: HostOp::Getcwd },
        ]
    );
}

#[test]
fn test_chdir_relative() {
    let mut client = test_bootstrap();
    host_mut(&mut client).create_dir(b"/home/user/src");
    chdir(&mut client, b"/home").unwrap();
    chdir(&mut client, b"user/src").unwrap();
    chdir(&mut client, b"..").unwrap();
    assert_eq!(getcwd(&mut client).unwrap(), b"/home/user");

    let err = chdir(&mut client, b"missing").unwrap_err();
    assert!(matches!(err, HostError::NotFound { .. }));
}

/// Test: environment changes reach children spawned afterwards
#[test]
fn test_set_env_inherited() {
    let mut client = test_bootstrap();
    set_env(&mut client, b"TERM", Some(b"xterm".as_slice())).unwrap();
    set_env(&mut client, b"TMP", Some(b"/tmp".as_slice())).unwrap();
    set_env(&mut client, b"TMP", None).unwrap();

    let outcome = SpawnRequest::builder(b"/bin/echo")
        .env(b"LANG", b"C")
        .build()
        .unwrap()
        .spawn(&mut client)
        .unwrap();
    let env = &host(&client).process(outcome.pid).unwrap().env;
    assert_eq!(env.get(b"TERM".as_slice()), Some(&b"xterm".to_vec()));
    assert_eq!(env.get(b"LANG".as_slice()), Some(&b"C".to_vec()));
    assert!(env.get(b"TMP".as_slice()).is_none());

    let err = set_env(&mut client, b"BAD=NAME", Some(b"x".as_slice())).unwrap_err();
    assert!(matches!(err, HostError::InvalidArgument(_)));
}

#[test]
fn test_isatty_and_getpid() {
    let mut client = test_bootstrap();
    host_mut(&mut client).write_file(b"/tmp/f", b"");
    let fd = host_mut(&mut client)
        .open_for_caller(b"/tmp/f", OpenMode::Read)
        .unwrap();

    assert!(isatty(&mut client, 0).unwrap());
    assert!(!isatty(&mut client, fd).unwrap());
    assert_eq!(getpid(&mut client).unwrap(), 1);
}

/// Test: clean_inodes drops pipes nobody can reach any more
#[test]
fn test_clean_inodes_drops_dead_pipes() {
    let mut client = test_bootstrap();
    let limits = AbiLimits::default();

    SpawnRequest::builder(b"/bin/cat")
        .redirect(Redirect::pipe_in(0, &limits).unwrap())
        .build()
        .unwrap()
        .spawn(&mut client)
        .unwrap();
    assert_eq!(host(&client).pipe_count(), 1);

    clean_inodes(&mut client).unwrap();
    assert_eq!(host(&client).pipe_count(), 0);
}
