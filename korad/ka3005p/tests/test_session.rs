//! End-to-end tests of a sweep session against the loopback interface.

use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    time::Duration,
};

use rstest::*;

use seriallink::{InstrumentError, InstrumentInterface, LoopbackInterface};

use korad_ka3005p::{Ka3005p, Session, SessionConfig, Sleeper, run_session};

const IDN: &str = "KORAD KA3005P V5.8 SN:03379314";

/// Records every delay instead of sleeping.
#[derive(Default)]
struct RecordingSleeper {
    delays: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

/// Builds a loopback that expects the queries and the given commands. Identity and status are
/// answered first, followed by the given responses.
fn crt_lbk_with(commands: &[&str], responses: &[&str]) -> LoopbackInterface {
    let mut host2inst = vec!["*IDN?".to_string(), "STATUS?".to_string()];
    host2inst.extend(commands.iter().map(|s| s.to_string()));
    let mut inst2host = vec![IDN.as_bytes().to_vec(), vec![0x22]];
    inst2host.extend(responses.iter().map(|s| s.as_bytes().to_vec()));
    LoopbackInterface::new(host2inst, inst2host)
}

fn crt_lbk(commands: &[&str]) -> LoopbackInterface {
    crt_lbk_with(commands, &[])
}

#[fixture]
fn sleeper() -> RecordingSleeper {
    RecordingSleeper::default()
}

/// Commands sent during initialization with the default configuration.
const INIT: [&str; 4] = ["OUT0", "VSET1:5", "ISET1:0.30", "OUT1"];
/// Commands sent during shutdown with the default configuration.
const SHUTDOWN: [&str; 2] = ["VSET1:0.00", "OUT0"];

#[rstest]
fn test_default_session(mut sleeper: RecordingSleeper) {
    let mut commands: Vec<&str> = INIT.to_vec();
    for i in 0..7 {
        commands.push(if i % 2 == 0 { "VSET1:12.0" } else { "VSET1:12.2" });
    }
    commands.extend(SHUTDOWN);
    let mut psu = Ka3005p::new(crt_lbk(&commands));

    let report = run_session(&mut psu, &SessionConfig::default(), &mut sleeper).unwrap();

    assert_eq!(report.identity, IDN);
    assert_eq!(report.status.bits(), "00100010");
    assert_eq!(report.steps, 7);

    let mut expected = vec![secs(1.0), secs(2.0), secs(2.0), secs(0.5), secs(5.0)];
    expected.extend([secs(3.0); 7]);
    expected.push(secs(1.0));
    assert_eq!(sleeper.delays, expected);
}

#[rstest]
fn test_three_value_sweep(mut sleeper: RecordingSleeper) {
    let config = SessionConfig {
        sweep_start: 1.0,
        sweep_bound: 1.3,
        sweep_step: 0.1,
        cycles: 1,
        ..Default::default()
    };
    let mut commands: Vec<&str> = INIT.to_vec();
    commands.extend(["VSET1:1.0", "VSET1:1.1", "VSET1:1.2", "VSET1:1.1"]);
    commands.extend(SHUTDOWN);
    let mut psu = Ka3005p::new(crt_lbk(&commands));

    let report = run_session(&mut psu, &config, &mut sleeper).unwrap();
    assert_eq!(report.steps, 4);
}

/// A single value sweep is rejected before anything is sent to the supply.
#[rstest]
fn test_single_value_sweep_rejected(mut sleeper: RecordingSleeper) {
    let config = SessionConfig {
        sweep_bound: 12.1,
        ..Default::default()
    };
    let mut psu = Ka3005p::new(LoopbackInterface::from_strs(&[], &[]));

    assert!(matches!(
        run_session(&mut psu, &config, &mut sleeper),
        Err(InstrumentError::Configuration(_))
    ));
    assert!(sleeper.delays.is_empty());
}

/// A failure during the sweep still sets the shutdown voltage and switches the output off.
#[rstest]
fn test_shutdown_after_failure(mut sleeper: RecordingSleeper) {
    let config = SessionConfig {
        retry_attempts: 1,
        verify_setpoints: true,
        ..Default::default()
    };
    let mut commands: Vec<&str> = INIT.to_vec();
    commands.extend(["VSET1:12.0", "VSET1?"]);
    commands.extend(SHUTDOWN);
    let mut psu = Ka3005p::new(crt_lbk_with(&commands, &["11.00"]));

    match run_session(&mut psu, &config, &mut sleeper) {
        Err(InstrumentError::Protocol(msg)) => assert!(msg.contains("11")),
        _ => panic!("Expected a protocol error."),
    }
    assert_eq!(sleeper.delays.last(), Some(&secs(1.0)));
}

#[rstest]
fn test_verified_session(mut sleeper: RecordingSleeper) {
    let config = SessionConfig {
        cycles: 0,
        verify_setpoints: true,
        ..Default::default()
    };
    let mut commands: Vec<&str> = INIT.to_vec();
    commands.extend(["VSET1:12.0", "VSET1?"]);
    commands.extend(SHUTDOWN);
    let mut psu = Ka3005p::new(crt_lbk_with(&commands, &["12.00"]));

    let report = run_session(&mut psu, &config, &mut sleeper).unwrap();
    assert_eq!(report.steps, 1);
}

/// Exhausted write retries escalate, and the shutdown is still attempted.
#[rstest]
fn test_write_failure_escalates(mut sleeper: RecordingSleeper) {
    let config = SessionConfig {
        retry_attempts: 2,
        ..Default::default()
    };
    // the first OUT0 of the initialization fails on both attempts, the one of the shutdown works
    let mut interface = crt_lbk(&SHUTDOWN);
    interface.fail_command("OUT0", 2);
    let mut psu = Ka3005p::new(interface);

    match run_session(&mut psu, &config, &mut sleeper) {
        Err(InstrumentError::Command { cmd, .. }) => assert_eq!(cmd, "OUT0"),
        _ => panic!("Expected a command error."),
    }
    assert_eq!(sleeper.delays, vec![secs(1.0), secs(1.0)]);
}

/// Identification and sweep can be run one after the other, e.g., to report the identity before
/// the output is touched.
#[rstest]
fn test_identify_then_sweep(mut sleeper: RecordingSleeper) {
    let mut commands: Vec<&str> = INIT.to_vec();
    for i in 0..7 {
        commands.push(if i % 2 == 0 { "VSET1:12.0" } else { "VSET1:12.2" });
    }
    commands.extend(SHUTDOWN);
    let mut psu = Ka3005p::new(crt_lbk(&commands));
    let config = SessionConfig::default();
    let session = Session::new(&config).unwrap();

    let (identity, status) = session.identify(&mut psu, &mut sleeper).unwrap();
    assert_eq!(identity, IDN);
    assert_eq!(status.raw(), 0x22);
    assert_eq!(sleeper.delays, vec![secs(1.0)]);

    assert_eq!(session.sweep(&mut psu, &mut sleeper).unwrap(), 7);
}

/// If the shutdown voltage cannot be set, the output is still switched off and the voltage
/// error is returned.
#[rstest]
fn test_output_off_after_shutdown_voltage_fails(mut sleeper: RecordingSleeper) {
    let mut commands: Vec<&str> = INIT.to_vec();
    for i in 0..7 {
        commands.push(if i % 2 == 0 { "VSET1:12.0" } else { "VSET1:12.2" });
    }
    commands.push("OUT0");
    let mut interface = crt_lbk(&commands);
    interface.fail_command("VSET1:0.00", 3);
    let mut psu = Ka3005p::new(interface);

    match run_session(&mut psu, &SessionConfig::default(), &mut sleeper) {
        Err(InstrumentError::Command { cmd, .. }) => assert_eq!(cmd, "VSET1:0.00"),
        _ => panic!("Expected a command error."),
    }
    // no settling delay after the failed shutdown voltage
    assert_eq!(sleeper.delays.last(), Some(&secs(3.0)));
    assert_eq!(sleeper.delays.len(), 12);
}

/// Records every command and panics on one of them, like a faulty interface implementation.
struct PanickingInterface {
    writes: Arc<Mutex<Vec<String>>>,
    panic_on: &'static str,
    response: VecDeque<u8>,
}

impl InstrumentInterface for PanickingInterface {
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        let cmd = String::from_utf8_lossy(data).to_string();
        if cmd == self.panic_on {
            panic!("interface failed on {cmd}");
        }
        self.response = match cmd.as_str() {
            "*IDN?" => IDN.bytes().collect(),
            "STATUS?" => VecDeque::from([0x22]),
            _ => VecDeque::new(),
        };
        self.writes.lock().unwrap().push(cmd);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, InstrumentError> {
        Ok(self.response.pop_front())
    }
}

/// A panic inside the interface still sets the shutdown voltage and switches the output off.
#[rstest]
fn test_shutdown_after_panic(mut sleeper: RecordingSleeper) {
    let writes = Arc::new(Mutex::new(Vec::new()));
    let mut psu = Ka3005p::new(PanickingInterface {
        writes: Arc::clone(&writes),
        panic_on: "VSET1:12.2",
        response: VecDeque::new(),
    });

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        run_session(&mut psu, &SessionConfig::default(), &mut sleeper)
    }));
    assert!(result.is_err());

    let mut expected = vec!["*IDN?", "STATUS?"];
    expected.extend(INIT);
    expected.push("VSET1:12.0");
    expected.extend(SHUTDOWN);
    assert_eq!(*writes.lock().unwrap(), expected);
    assert_eq!(sleeper.delays.last(), Some(&secs(1.0)));
}
