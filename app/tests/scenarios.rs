//! End-to-end behavior of a built application.

use std::sync::Arc;

use reflex_app::{
    ApplicationOptions, RealTimeApplication, FUNCTION_PREPARE, FUNCTION_START, FUNCTION_STOP,
    PAYLOAD_NEXT_STATE,
};
use reflex_config::{parse, Node};
use reflex_error::{ErrorKind, Result};
use reflex_gam::{CycleContext, Gam, GamFactory, SetupContext, SignalSlot};
use reflex_memory::DataSource as _;
use reflex_message::{Message, MessageHub, SharedMessage, DEFAULT_POLL_INTERVAL};
use reflex_timer::Timeout;

#[derive(Default)]
struct CycleWriterGam {
    output: Option<SignalSlot<i32>>,
}

impl Gam for CycleWriterGam {
    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        self.output = Some(ctx.output_slot_at::<i32>(0)?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut CycleContext<'_>) -> Result<()> {
        let slot = self.output.expect("setup ran");
        let cycle = ctx.cycle() as i32;
        ctx.write(slot).fill(cycle);
        Ok(())
    }
}

#[derive(Default)]
struct DoublerGam {
    input: Option<SignalSlot<i32>>,
    output: Option<SignalSlot<i32>>,
}

impl Gam for DoublerGam {
    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        self.input = Some(ctx.input_slot_at::<i32>(0)?);
        self.output = Some(ctx.output_slot_at::<i32>(0)?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut CycleContext<'_>) -> Result<()> {
        let value = ctx.read(self.input.expect("setup ran"))[0];
        ctx.write(self.output.expect("setup ran")).fill(2 * value);
        Ok(())
    }
}

struct ConstWriterGam {
    value: i32,
    output: Option<SignalSlot<i32>>,
}

impl Gam for ConstWriterGam {
    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        self.output = Some(ctx.output_slot_at::<i32>(0)?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut CycleContext<'_>) -> Result<()> {
        let slot = self.output.expect("setup ran");
        let value = self.value;
        ctx.write(slot).fill(value);
        Ok(())
    }
}

#[derive(Default)]
struct EchoGam {
    input: Option<SignalSlot<i32>>,
    output: Option<SignalSlot<i32>>,
}

impl Gam for EchoGam {
    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        self.input = Some(ctx.input_slot_at::<i32>(0)?);
        self.output = Some(ctx.output_slot_at::<i32>(0)?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut CycleContext<'_>) -> Result<()> {
        let value = ctx.read(self.input.expect("setup ran"))[0];
        ctx.write(self.output.expect("setup ran")).fill(value);
        Ok(())
    }
}

fn test_factory() -> GamFactory {
    let mut factory = GamFactory::new();
    factory
        .register("CycleWriterGam", |_| Ok(Box::new(CycleWriterGam::default())))
        .expect("register");
    factory
        .register("DoublerGam", |_| Ok(Box::new(DoublerGam::default())))
        .expect("register");
    factory
        .register("ConstWriterGam", |parameters| {
            let value = parameters.get_i64("Value").unwrap_or(0) as i32;
            Ok(Box::new(ConstWriterGam {
                value,
                output: None,
            }))
        })
        .expect("register");
    factory
        .register("EchoGam", |_| Ok(Box::new(EchoGam::default())))
        .expect("register");
    factory
}

fn build_stepped(text: &str) -> (RealTimeApplication, MessageHub) {
    let config = parse(text).expect("configuration parses");
    let hub = MessageHub::new();
    let app = RealTimeApplication::build(
        &config,
        &test_factory(),
        hub.clone(),
        ApplicationOptions {
            stepped: true,
            ..ApplicationOptions::default()
        },
    )
    .expect("application builds");
    (app, hub)
}

fn read_i32(app: &RealTimeApplication, datasource: &str, signal: &str, bank: usize) -> i32 {
    let ds = app.datasource(datasource).expect("datasource exists");
    let index = ds
        .registry()
        .signal_index(signal)
        .expect("signal exists");
    let mut bytes = [0u8; 4];
    ds.arena()
        .read_signal(bank, index, &mut bytes)
        .expect("signal readable");
    i32::from_le_bytes(bytes)
}

const TWO_MODULE_PIPELINE: &str = r#"
    Functions = {
        Counter = {
            Class = CycleWriterGam
            OutputSignals = { sigX = { DataSource = DDB1 Type = int32 } }
        }
        Doubler = {
            Class = DoublerGam
            InputSignals = { sigX = { DataSource = DDB1 Type = int32 } }
            OutputSignals = { sigY = { DataSource = DDB1 Type = int32 } }
        }
    }
    Data = { DDB1 = { Class = GamDataSource } }
    States = {
        Run = { Threads = { Main = { Functions = { Counter Doubler } } } }
    }
    Scheduler = { Class = GamScheduler TimingDataSource = Timings }
"#;

#[test]
fn two_module_pipeline_propagates_within_the_cycle() {
    let (app, _hub) = build_stepped(TWO_MODULE_PIPELINE);
    app.start().expect("start");
    app.scheduler()
        .run_cycles(5, Timeout::from_millis(5_000))
        .expect("five cycles");
    app.stop_current_state_execution().expect("stop");

    let ds = app.datasource("DDB1").expect("DDB1");
    let bank = ds.arena().active_buffer();
    // the fifth cycle is cycle number 4: sigY = 2 * 4
    assert_eq!(read_i32(&app, "DDB1", "sigY", bank), 8);
    assert_eq!(read_i32(&app, "DDB1", "sigX", bank), 4);
}

const STATE_CHANGE_WITH_DEFAULT: &str = r#"
    Functions = {
        Writer7 = {
            Class = ConstWriterGam
            Value = 7
            OutputSignals = { sigZ = { DataSource = DDB1 Type = int32 } }
        }
        Mirror = {
            Class = EchoGam
            InputSignals = { sigZ = { DataSource = DDB1 Type = int32 Default = 42 } }
            OutputSignals = { sigZEcho = { DataSource = DDB1 Type = int32 } }
        }
    }
    Data = { DDB1 = { Class = GamDataSource } }
    States = {
        S1 = { Threads = { Main = { Functions = { Writer7 } } } }
        S2 = { Threads = { Main = { Functions = { Mirror } } } }
    }
    Scheduler = { Class = GamScheduler TimingDataSource = Timings }
"#;

#[test]
fn entering_a_state_applies_defaults_over_stale_values() {
    let (app, _hub) = build_stepped(STATE_CHANGE_WITH_DEFAULT);
    app.start().expect("start S1");
    app.scheduler()
        .run_cycles(3, Timeout::from_millis(5_000))
        .expect("S1 cycles");
    // S1 wrote 7 into both banks over the alternating cycles
    assert_eq!(read_i32(&app, "DDB1", "sigZ", 0), 7);
    assert_eq!(read_i32(&app, "DDB1", "sigZ", 1), 7);

    app.prepare_next_state("S2").expect("prepare S2");
    app.start_next_state_execution().expect("swap to S2");
    app.scheduler()
        .run_cycles(1, Timeout::from_millis(5_000))
        .expect("first S2 cycle");
    app.stop_current_state_execution().expect("stop");

    let ds = app.datasource("DDB1").expect("DDB1");
    let bank = ds.arena().active_buffer();
    assert_eq!(
        read_i32(&app, "DDB1", "sigZEcho", bank),
        42,
        "the first S2 cycle reads the default, not the stale 7"
    );
}

#[test]
fn after_a_state_change_only_the_new_state_executes() {
    let text = r#"
        Functions = {
            WriterA = {
                Class = ConstWriterGam
                Value = 7
                OutputSignals = { sigA = { DataSource = DDB1 Type = int32 } }
            }
            WriterB = {
                Class = ConstWriterGam
                Value = 9
                OutputSignals = { sigB = { DataSource = DDB1 Type = int32 } }
            }
        }
        Data = { DDB1 = { Class = GamDataSource } }
        States = {
            S1 = { Threads = { Main = { Functions = { WriterA } } } }
            S2 = { Threads = { Main = { Functions = { WriterB } } } }
        }
        Scheduler = { Class = GamScheduler TimingDataSource = Timings }
    "#;
    let (app, _hub) = build_stepped(text);
    app.start().expect("start S1");
    app.scheduler()
        .run_cycles(2, Timeout::from_millis(5_000))
        .expect("S1 cycles");

    app.prepare_next_state("S2").expect("prepare");
    app.start_next_state_execution().expect("swap");
    let sig_a_before = (
        read_i32(&app, "DDB1", "sigA", 0),
        read_i32(&app, "DDB1", "sigA", 1),
    );
    app.scheduler()
        .run_cycles(4, Timeout::from_millis(5_000))
        .expect("S2 cycles");
    app.stop_current_state_execution().expect("stop");

    assert_eq!(app.scheduler().current_state(), None);
    let ds = app.datasource("DDB1").expect("DDB1");
    let bank = ds.arena().active_buffer();
    assert_eq!(read_i32(&app, "DDB1", "sigB", bank), 9);
    let sig_a_after = (
        read_i32(&app, "DDB1", "sigA", 0),
        read_i32(&app, "DDB1", "sigA", 1),
    );
    assert_eq!(sig_a_before, sig_a_after, "S1 pipelines no longer run");
}

#[test]
fn double_prepare_is_idempotent_and_reported() {
    let (app, _hub) = build_stepped(STATE_CHANGE_WITH_DEFAULT);
    app.prepare_next_state("S1").expect("first prepare");
    app.prepare_next_state("S1").expect("second prepare");
    assert_eq!(app.scheduler().superseded_count(), 1);
    app.start_next_state_execution().expect("start");
    assert_eq!(app.scheduler().current_state().as_deref(), Some("S1"));
    app.stop_current_state_execution().expect("stop");
}

#[test]
fn lifecycle_commands_arrive_as_messages() {
    let (app, hub) = build_stepped(STATE_CHANGE_WITH_DEFAULT);

    let mut payload = Node::new();
    payload.insert(PAYLOAD_NEXT_STATE, "S1");
    let prepare = SharedMessage::new(
        Message::new(app.name(), FUNCTION_PREPARE).with_payload(payload),
    );
    hub.send_message_and_wait_reply(&prepare, Timeout::from_millis(1_000), DEFAULT_POLL_INTERVAL)
        .expect("prepare acknowledged");
    assert_eq!(
        prepare.with(|m| m.payload.get_str("Status").map(str::to_owned)),
        Some("NoError".to_owned())
    );

    let start = SharedMessage::new(Message::new(app.name(), FUNCTION_START));
    hub.send_message_and_wait_reply(&start, Timeout::from_millis(1_000), DEFAULT_POLL_INTERVAL)
        .expect("start acknowledged");
    assert_eq!(app.scheduler().current_state().as_deref(), Some("S1"));

    // a prepare naming an unknown state reports its error kind in the reply
    let mut payload = Node::new();
    payload.insert(PAYLOAD_NEXT_STATE, "Ghost");
    let bad = SharedMessage::new(
        Message::new(app.name(), FUNCTION_PREPARE).with_payload(payload),
    );
    hub.send_message_and_wait_reply(&bad, Timeout::from_millis(1_000), DEFAULT_POLL_INTERVAL)
        .expect("the reply still arrives");
    assert_eq!(
        bad.with(|m| m.payload.get_str("Status").map(str::to_owned)),
        Some("Initialisation".to_owned())
    );

    let stop = SharedMessage::new(Message::new(app.name(), FUNCTION_STOP));
    hub.send_message_and_wait_reply(&stop, Timeout::from_millis(1_000), DEFAULT_POLL_INTERVAL)
        .expect("stop acknowledged");
    assert_eq!(app.scheduler().current_state(), None);
}

#[test]
fn unknown_destination_is_refused_immediately() {
    let (_app, hub) = build_stepped(STATE_CHANGE_WITH_DEFAULT);
    let message = SharedMessage::new(Message::new("nope", "Anything"));
    let err = hub.send_message(&message).expect_err("no recipient");
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
}

#[test]
fn timing_counters_are_published() {
    let (app, _hub) = build_stepped(TWO_MODULE_PIPELINE);
    app.start().expect("start");
    app.scheduler()
        .run_cycles(3, Timeout::from_millis(5_000))
        .expect("cycles");
    app.stop_current_state_execution().expect("stop");

    let timing = Arc::clone(app.timing());
    let bank = timing.arena().active_buffer();
    let count_index = timing.cycle_count_index("Main").expect("thread counter");
    assert_eq!(timing.read_u64(bank, count_index), 3);
    let exec_index = timing.exec_time_index("Doubler").expect("module counter");
    let _ = timing.read_u64(bank, exec_index);
    let transitions = timing.read_u64(bank, timing.state_transitions_index());
    assert_eq!(transitions, 1, "one state entry so far");
}
