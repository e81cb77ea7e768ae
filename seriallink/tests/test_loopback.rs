//! Test cases for the LoopbackInterface.

use rstest::*;

use seriallink::{InstrumentError, InstrumentInterface, LoopbackInterface};

/// Create a loopback interface that contains no commands.
#[fixture]
fn emp_lbk() -> LoopbackInterface {
    LoopbackInterface::from_strs(&[], &[])
}

/// Ensure `finalize` method passes if an empty loopback interface is used.
#[rstest]
fn finalize_test(mut emp_lbk: LoopbackInterface) {
    emp_lbk.finalize();
}

/// Ensure `finalize` method panics if commands are left in the loopback interface.
#[rstest]
#[case(&["cmd"], &[])]
#[case(&[], &["resp"])]
#[case(&["cmd"], &["resp"])]
#[should_panic]
fn finalize_test_panic(#[case] from_host: &[&str], #[case] from_inst: &[&str]) {
    let mut lbk = LoopbackInterface::from_strs(from_host, from_inst);
    lbk.finalize();
}

#[rstest]
fn sendcmd() {
    let mut lbk = LoopbackInterface::from_strs(&["OUT0", "VSET1:5"], &[]);
    lbk.sendcmd("OUT0").unwrap();
    lbk.sendcmd("VSET1:5").unwrap();
}

#[rstest]
#[should_panic]
fn sendcmd_mismatch() {
    let mut lbk = LoopbackInterface::from_strs(&["OUT0"], &[]);
    let _ = lbk.sendcmd("OUT1");
}

#[rstest]
fn query() {
    let mut lbk = LoopbackInterface::from_strs(&["cmd1", "cmd2"], &["resp1", "resp2"]);
    assert_eq!(lbk.query("cmd1").unwrap(), "resp1");
    assert_eq!(lbk.query("cmd2").unwrap(), "resp2");
}

#[rstest]
fn query_without_answer() {
    let mut lbk = LoopbackInterface::from_strs(&["*IDN?"], &[""]);
    assert_eq!(lbk.query("*IDN?").unwrap(), "");
}

#[rstest]
fn query_raw_bytes() {
    let mut lbk = LoopbackInterface::new(vec!["STATUS?".to_string()], vec![vec![0x22]]);
    assert_eq!(lbk.query_raw("STATUS?").unwrap(), vec![0x22]);
}

#[rstest]
fn read_byte_goes_idle_after_response() {
    let mut lbk = LoopbackInterface::from_strs(&[], &["OK", "X"]);
    assert_eq!(lbk.read_byte().unwrap(), Some(b'O'));
    assert_eq!(lbk.read_byte().unwrap(), Some(b'K'));
    assert_eq!(lbk.read_byte().unwrap(), None);
    assert_eq!(lbk.read_byte().unwrap(), Some(b'X'));
    assert_eq!(lbk.read_byte().unwrap(), None);
}

#[rstest]
fn failing_writes_do_not_consume_commands() {
    let mut lbk = LoopbackInterface::from_strs(&["OUT1"], &[]);
    lbk.fail_next_writes(2);
    for _ in 0..2 {
        match lbk.sendcmd("OUT1") {
            Err(InstrumentError::Command { cmd, .. }) => assert_eq!(cmd, "OUT1"),
            _ => panic!("Expected a command error."),
        }
    }
    lbk.sendcmd("OUT1").unwrap();
}

#[rstest]
fn failing_command_only_fails_that_command() {
    let mut lbk = LoopbackInterface::from_strs(&["VSET1:5", "OUT0"], &[]);
    lbk.fail_command("OUT0", 1);
    lbk.sendcmd("VSET1:5").unwrap();
    assert!(lbk.sendcmd("OUT0").is_err());
    lbk.sendcmd("OUT0").unwrap();
}
