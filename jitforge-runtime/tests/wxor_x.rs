//! End-to-end scenario 7: a page the runtime has protected read-execute must fault on write, not
//! silently accept the corruption. Exercised via a subprocess because the expected outcome is the
//! process dying, which would otherwise take the whole test harness down with it.

use std::env;
use std::process::Command;

use jitforge_codegen::Isa;
use jitforge_runtime::{Runtime, TargetIsa};

const MARKER: &str = "JITFORGE_WX_CHILD";

#[cfg(unix)]
#[test]
fn writing_to_an_rx_page_segfaults() {
    if env::var(MARKER).is_ok() {
        attempt_write_and_exit();
    }

    let exe = env::current_exe().expect("current_exe");
    let status = Command::new(exe)
        .arg("--exact")
        .arg("writing_to_an_rx_page_segfaults")
        .env(MARKER, "1")
        .status()
        .expect("failed to spawn child process");

    use std::os::unix::process::ExitStatusExt;
    assert!(
        status.signal().is_some(),
        "expected the child to be killed by a signal for writing to RX memory, got {:?}",
        status
    );
}

#[cfg(unix)]
fn attempt_write_and_exit() -> ! {
    let rt = Runtime::new(TargetIsa::builder(Isa::X86_64).finish());
    let f = rt.add_bytes(&[0xc3]).expect("add_bytes"); // `ret`
    unsafe {
        let ptr = f.address() as *mut u8;
        std::ptr::write_volatile(ptr, 0x90);
    }
    // Reaching this line means the write didn't fault, which is the bug this test exists to catch.
    std::process::exit(1);
}

#[cfg(not(unix))]
#[test]
fn writing_to_an_rx_page_segfaults() {
    // Access-violation handling on Windows needs a SEH probe this crate doesn't set up; the
    // invariant itself (vmem::protect_rx leaves no block RW) is still exercised on unix.
}
