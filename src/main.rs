//! Gatesim - digital logic simulation demo
//!
//! Builds one of a few built-in circuits, runs the threaded simulator with
//! ticking enabled for a while, and prints what it observes.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug gatesim --circuit counter --bits 4 --frequency 20 --duration-ms 1500
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use gatesim_core::{
    circuit::{Circuit, ComponentId, PointId},
    components::{Buffer, Clock, Constant, Gate, GateOp, InputPin, JkFlipFlop, Not},
    engine::DEFAULT_ITERATION_LIMIT,
    error::Result,
    validate_circuit, CircuitState, Simulator, SimulatorConfig, SimulatorEvent, StateId, Value,
};
use tracing_subscriber::EnvFilter;

/// Built-in demo circuits
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Demo {
    /// Clock driving a ripple chain of toggling flip-flops
    Counter,
    /// Odd inverter ring that never settles
    Ring,
    /// Two constants fighting over one wire
    Conflict,
}

/// Digital logic simulator demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Which circuit to simulate
    #[arg(short, long, value_enum, default_value_t = Demo::Counter)]
    circuit: Demo,

    /// Counter width in flip-flops
    #[arg(short, long, default_value_t = 3)]
    bits: usize,

    /// Tick frequency in Hz (0 disables ticking)
    #[arg(short, long, default_value_t = 8.0)]
    frequency: f64,

    /// How long to run, in milliseconds
    #[arg(short, long, default_value_t = 2000)]
    duration_ms: u64,

    /// Propagation passes before a circuit is declared oscillating
    #[arg(short, long, default_value_t = DEFAULT_ITERATION_LIMIT)]
    iteration_limit: usize,

    /// Shuffle propagation order with this seed
    #[arg(long)]
    seed: Option<u64>,
}

/// A demo circuit plus what to poke and what to watch.
struct DemoCircuit {
    circuit: Arc<Circuit>,
    /// Inputs driven in order once the circuit has settled
    kicks: Vec<(ComponentId, Value)>,
    probes: Vec<(String, PointId)>,
}

fn counter(bits: usize) -> Result<DemoCircuit> {
    let mut b = Circuit::builder("counter");
    let clk = b.point("clk");
    let high = b.point("high");
    b.add_component("clock", Arc::new(Clock::new(1, 1)), &[clk])?;
    b.add_component("one", Arc::new(Constant::new(Value::ONE)), &[high])?;

    let mut probes = Vec::new();
    let mut clock_in = clk;
    for i in 0..bits.max(1) {
        let q = b.point(&format!("q{i}"));
        let nq = b.point(&format!("nq{i}"));
        b.add_component(&format!("ff{i}"), Arc::new(JkFlipFlop::new()), &[high, high, clock_in, q])?;
        // Ripple on the falling edge of the previous stage
        b.add_component(&format!("inv{i}"), Arc::new(Not::new(1)), &[q, nq])?;
        probes.push((format!("q{i}"), q));
        clock_in = nq;
    }
    Ok(DemoCircuit {
        circuit: Arc::new(b.build()),
        kicks: Vec::new(),
        probes,
    })
}

fn ring() -> Result<DemoCircuit> {
    let mut b = Circuit::builder("ring");
    let hold = b.point("hold");
    let a = b.point("a");
    let x = b.point("x");
    let y = b.point("y");
    let input = b.add_component("hold", Arc::new(InputPin::new(1)), &[hold])?;
    b.add_component("nor", Arc::new(Gate::new(GateOp::Nor, 2, 1)), &[hold, a, x])?;
    b.add_component("not1", Arc::new(Not::new(1)), &[x, y])?;
    b.add_component("not2", Arc::new(Not::new(1)), &[y, a])?;
    Ok(DemoCircuit {
        circuit: Arc::new(b.build()),
        // Settle with the ring held, then release it
        kicks: vec![(input, Value::ONE), (input, Value::ZERO)],
        probes: vec![("a".to_string(), a), ("x".to_string(), x), ("y".to_string(), y)],
    })
}

fn conflict() -> Result<DemoCircuit> {
    let mut b = Circuit::builder("conflict");
    let bus = b.point("bus");
    let out = b.point("out");
    b.add_component("high", Arc::new(Constant::new(Value::ONE)), &[bus])?;
    b.add_component("low", Arc::new(Constant::new(Value::ZERO)), &[bus])?;
    b.add_component("buf", Arc::new(Buffer::new(1)), &[bus, out])?;
    Ok(DemoCircuit {
        circuit: Arc::new(b.build()),
        kicks: Vec::new(),
        probes: vec![("bus".to_string(), bus), ("out".to_string(), out)],
    })
}

fn wait_for_propagation(events: &Receiver<SimulatorEvent>) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(remaining) {
            Ok(SimulatorEvent::PropagationCompleted) => return,
            Ok(_) => {}
            Err(_) => return,
        }
    }
}

fn describe(sim: &Simulator, probes: &[(String, PointId)]) -> String {
    probes
        .iter()
        .map(|(name, point)| match sim.value(*point) {
            Some(v) => format!("{name}={v}"),
            None => format!("{name}=?"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // Build and validate the demo circuit
    let demo = match args.circuit {
        Demo::Counter => counter(args.bits)?,
        Demo::Ring => ring()?,
        Demo::Conflict => conflict()?,
    };
    validate_circuit(&demo.circuit)?;

    let config = SimulatorConfig::new()
        .with_iteration_limit(args.iteration_limit)
        .with_tick_frequency(args.frequency)
        .with_randomize(args.seed);
    let mut sim = Simulator::new(config)?;
    let events = sim.subscribe();

    sim.set_circuit_state(CircuitState::new(Arc::clone(&demo.circuit)));
    sim.request_propagate();
    wait_for_propagation(&events);
    println!("settled: {}", describe(&sim, &demo.probes));

    for &(component, value) in &demo.kicks {
        sim.drive_input(component, value);
        wait_for_propagation(&events);
        println!("drove {component} to {value}: {}", describe(&sim, &demo.probes));
    }

    sim.set_ticking(true);
    let deadline = Instant::now() + Duration::from_millis(args.duration_ms);
    let mut ticks = 0usize;
    while sim.is_running() {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break;
        };
        match events.recv_timeout(remaining) {
            Ok(SimulatorEvent::TickCompleted) => {
                ticks += 1;
                println!("tick {ticks}: {}", describe(&sim, &demo.probes));
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    sim.set_ticking(false);

    println!(
        "ticks={ticks} running={} oscillating={} exception={}",
        sim.is_running(),
        sim.is_oscillating(),
        sim.is_exception_encountered()
    );
    let oscillating = sim.oscillation_points();
    if !oscillating.is_empty() {
        let circuit = &demo.circuit;
        let names: Vec<&str> = oscillating
            .iter()
            .filter(|(state, _)| *state == StateId::ROOT)
            .map(|(_, point)| circuit.point_name(*point))
            .collect();
        println!("oscillating points: {}", names.join(", "));
    }

    sim.shutdown();
    Ok(())
}
