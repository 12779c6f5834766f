//! Fixed-point propagation over a circuit state.
//!
//! Work proceeds in passes. A pass first applies every pending value change
//! to its bundle, re-merges the affected threads and marks the components on
//! changed bundles dirty, then evaluates every dirty component. A component
//! whose output differs from what it last drove queues a new change for the
//! next pass. Propagation stops when a pass leaves no work behind, or when
//! the pass budget runs out, in which case the circuit is declared
//! oscillating.

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, trace, warn};

use crate::circuit::{Circuit, ComponentId, ElementKind, PinBinding, PinRef, PointId};
use crate::components::PinDirection;
use crate::error::ComponentFault;
use crate::state::{CircuitState, DriverKey, StateId};
use crate::value::Value;
use crate::wires::BundleId;

use super::SimulatorConfig;

/// A value change waiting to be applied to a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingChange {
    state: StateId,
    point: PointId,
    driver: DriverKey,
    value: Value,
}

/// A set of points touched while propagating, each qualified by the state
/// node it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationPoints {
    points: BTreeSet<(StateId, PointId)>,
}

impl PropagationPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: StateId, point: PointId) {
        self.points.insert((state, point));
    }

    pub fn contains(&self, state: StateId, point: PointId) -> bool {
        self.points.contains(&(state, point))
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateId, PointId)> + '_ {
        self.points.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<(StateId, PointId)> {
        self.iter().collect()
    }
}

/// How a call to [`Propagator::propagate`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagateOutcome {
    /// No work remains
    Quiescent { passes: usize },
    /// The pass budget ran out with work still pending
    Oscillating { passes: usize },
}

/// Drives a [`CircuitState`] towards a fixed point.
pub struct Propagator {
    state: CircuitState,
    /// Changes to apply at the start of the next pass
    worklist: Vec<PendingChange>,
    /// Components to evaluate in the next pass, in marking order
    dirty: VecDeque<(StateId, ComponentId)>,
    queued: HashSet<(StateId, ComponentId)>,
    iteration_limit: usize,
    /// Shuffles each pass when set
    rng: Option<StdRng>,
    oscillating: bool,
    oscillation_points: PropagationPoints,
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator")
            .field("pending", &self.worklist.len())
            .field("dirty", &self.dirty.len())
            .field("iteration_limit", &self.iteration_limit)
            .field("randomized", &self.rng.is_some())
            .field("oscillating", &self.oscillating)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

impl Propagator {
    /// Wrap a state. Every component is evaluated on the first pass.
    pub fn new(state: CircuitState, config: &SimulatorConfig) -> Self {
        let mut propagator = Self {
            state,
            worklist: Vec::new(),
            dirty: VecDeque::new(),
            queued: HashSet::new(),
            iteration_limit: config.iteration_limit.max(1),
            rng: config.randomize.map(StdRng::seed_from_u64),
            oscillating: false,
            oscillation_points: PropagationPoints::new(),
        };
        propagator.mark_all_dirty();
        propagator
    }

    pub fn state(&self) -> &CircuitState {
        &self.state
    }

    /// Give the state back, dropping any pending work.
    pub fn into_state(self) -> CircuitState {
        self.state
    }

    pub fn iteration_limit(&self) -> usize {
        self.iteration_limit
    }

    /// Whether the last propagation gave up. Cleared only by [`Propagator::reset`].
    pub fn is_oscillating(&self) -> bool {
        self.oscillating
    }

    /// Points that kept changing near the end of the last propagation.
    pub fn oscillation_points(&self) -> &PropagationPoints {
        &self.oscillation_points
    }

    /// Whether another pass would do anything.
    pub fn has_pending(&self) -> bool {
        !self.worklist.is_empty() || !self.dirty.is_empty()
    }

    fn mark_dirty(&mut self, state: StateId, component: ComponentId) {
        if self.queued.insert((state, component)) {
            self.dirty.push_back((state, component));
        }
    }

    fn mark_node_dirty(&mut self, state: StateId) {
        let count = self.state.node_ref(state).circuit().component_count();
        for c in 0..count {
            self.mark_dirty(state, ComponentId(c));
        }
    }

    fn mark_all_dirty(&mut self) {
        let ids: Vec<StateId> = self.state.ids().collect();
        for id in ids {
            self.mark_node_dirty(id);
        }
    }

    /// Return the state to its initial values and schedule a full
    /// re-evaluation. Clears the oscillation flag.
    pub fn reset(&mut self) {
        self.state.reset();
        self.worklist.clear();
        self.dirty.clear();
        self.queued.clear();
        self.oscillating = false;
        self.oscillation_points.clear();
        self.mark_all_dirty();
        debug!(nodes = self.state.len(), "circuit state reset");
    }

    /// Advance every clocked component one tick. Returns how many asked to
    /// be re-evaluated.
    pub fn tick(&mut self) -> usize {
        let mut count = 0;
        let ids: Vec<StateId> = self.state.ids().collect();
        for id in ids {
            let circuit = Arc::clone(self.state.node_ref(id).circuit());
            for element in circuit.elements() {
                let ElementKind::Logic(component) = &element.kind else {
                    continue;
                };
                if component.tick(self.state.node_mut(id).data_mut(element.id)) {
                    self.mark_dirty(id, element.id);
                    count += 1;
                }
            }
        }
        trace!(count, "tick applied");
        count
    }

    /// Feed an external value to a component, such as an input pin. When the
    /// component accepts it, its outputs are recomputed immediately and the
    /// resulting change waits for the next pass. Returns whether the
    /// component accepted a new value.
    pub fn poke(&mut self, state: StateId, component: ComponentId, value: Value) -> Result<bool, ComponentFault> {
        let Some(node) = self.state.node(state) else {
            return Ok(false);
        };
        let circuit = Arc::clone(node.circuit());
        let Some(element) = circuit.elements().get(component.0) else {
            return Ok(false);
        };
        let ElementKind::Logic(logic) = &element.kind else {
            return Ok(false);
        };
        if !logic.poke(self.state.node_mut(state).data_mut(component), value) {
            return Ok(false);
        }
        self.evaluate(state, component)?;
        Ok(true)
    }

    /// Run passes until nothing is pending or the pass budget runs out.
    ///
    /// Points still changing in the last quarter of the budget are recorded
    /// as oscillation points.
    pub fn propagate(&mut self) -> Result<PropagateOutcome, ComponentFault> {
        self.oscillation_points.clear();
        let watch_from = self.iteration_limit - self.iteration_limit / 4;
        let mut passes = 0;
        while self.has_pending() {
            if passes >= self.iteration_limit {
                self.oscillating = true;
                warn!(
                    passes,
                    points = self.oscillation_points.len(),
                    "propagation did not settle, circuit is oscillating"
                );
                return Ok(PropagateOutcome::Oscillating { passes });
            }
            passes += 1;
            if passes > watch_from {
                let mut points = std::mem::take(&mut self.oscillation_points);
                let result = self.pass(Some(&mut points));
                self.oscillation_points = points;
                result?;
            } else {
                self.pass(None)?;
            }
        }
        trace!(passes, "propagation settled");
        Ok(PropagateOutcome::Quiescent { passes })
    }

    /// Run exactly one pass, recording every point whose value changed.
    /// Returns whether work remains.
    pub fn step(&mut self, points: &mut PropagationPoints) -> Result<bool, ComponentFault> {
        self.pass(Some(points))?;
        Ok(self.has_pending())
    }

    fn pass(&mut self, mut record: Option<&mut PropagationPoints>) -> Result<(), ComponentFault> {
        let mut changes = self.take_latest_changes();
        if let Some(rng) = self.rng.as_mut() {
            changes.shuffle(rng);
        }

        let mut touched: Vec<(StateId, BundleId)> = Vec::new();
        for change in changes {
            let node = self.state.node_mut(change.state);
            let bundle = node.circuit().wires().bundle_of(change.point);
            if node.set_driver(bundle, change.driver, change.value) {
                touched.push((change.state, bundle));
            }
        }
        touched.sort_unstable();
        touched.dedup();

        let mut start = 0;
        while start < touched.len() {
            let state = touched[start].0;
            let end = start + touched[start..].iter().take_while(|(s, _)| *s == state).count();
            let bundles: Vec<BundleId> = touched[start..end].iter().map(|(_, b)| *b).collect();
            start = end;

            let changed = self.state.node_mut(state).settle(&bundles);
            let node = self.state.node_ref(state);
            let circuit = Arc::clone(node.circuit());
            let parent = node.parent();
            for bundle in changed {
                if let Some(points) = record.as_deref_mut() {
                    for &p in &circuit.wires().bundle(bundle).points {
                        points.insert(state, p);
                    }
                }
                for &c in circuit.components_on(bundle) {
                    self.mark_dirty(state, c);
                }
                if circuit.has_output_port(bundle) {
                    if let Some((parent_state, owner)) = parent {
                        self.mark_dirty(parent_state, owner);
                    }
                }
            }
        }

        let mut batch: Vec<(StateId, ComponentId)> = self.dirty.drain(..).collect();
        self.queued.clear();
        if let Some(rng) = self.rng.as_mut() {
            batch.shuffle(rng);
        }
        for (i, &(state, component)) in batch.iter().enumerate() {
            if let Err(fault) = self.evaluate(state, component) {
                // Unevaluated components stay dirty for the next attempt
                for &(s, c) in &batch[i + 1..] {
                    self.mark_dirty(s, c);
                }
                return Err(fault);
            }
        }
        Ok(())
    }

    /// Drain the worklist, keeping only the newest value per driver so that
    /// application order within a pass cannot matter.
    fn take_latest_changes(&mut self) -> Vec<PendingChange> {
        let mut latest: HashMap<(StateId, PointId, DriverKey), usize> = HashMap::new();
        let mut changes: Vec<PendingChange> = Vec::with_capacity(self.worklist.len());
        for change in self.worklist.drain(..) {
            match latest.entry((change.state, change.point, change.driver)) {
                Entry::Occupied(slot) => changes[*slot.get()].value = change.value,
                Entry::Vacant(slot) => {
                    slot.insert(changes.len());
                    changes.push(change);
                }
            }
        }
        changes
    }

    /// Record a component output and queue the change if it is new.
    fn drive(&mut self, state: StateId, component: ComponentId, pin: usize, point: PointId, value: Value) {
        if self.state.node_mut(state).set_pin_value(component, pin, value) {
            self.worklist.push(PendingChange {
                state,
                point,
                driver: DriverKey::Pin(PinRef { component, pin }),
                value,
            });
        }
    }

    fn evaluate(&mut self, state: StateId, component: ComponentId) -> Result<(), ComponentFault> {
        let circuit: Arc<Circuit> = Arc::clone(self.state.node_ref(state).circuit());
        let element = circuit.element(component);
        match &element.kind {
            ElementKind::Logic(logic) => {
                let node = self.state.node_mut(state);
                let inputs: Vec<Value> = element.pins.iter().map(|b| node.read_pin(b)).collect();
                let data = node.data_mut(component);
                let outputs = match panic::catch_unwind(AssertUnwindSafe(|| logic.recompute_outputs(&inputs, data))) {
                    Ok(Ok(outputs)) => outputs,
                    Ok(Err(mut fault)) => {
                        fault.component = element.name.clone();
                        return Err(fault);
                    }
                    Err(payload) => return Err(ComponentFault::new(&element.name, panic_message(payload))),
                };
                for (pin, value) in outputs {
                    let Some(binding) = element.pins.get(pin) else {
                        return Err(ComponentFault::new(
                            &element.name,
                            format!("output on nonexistent pin {pin}"),
                        ));
                    };
                    self.drive(state, component, pin, binding.point, value);
                }
            }
            ElementKind::Subcircuit(inner) => {
                let Some((child, created)) = self.state.child_of(state, component) else {
                    return Ok(());
                };
                if created {
                    trace!(parent = %state, %child, circuit = %inner.name, "instantiated sub-circuit state");
                    self.mark_node_dirty(child);
                }
                for (i, port) in inner.ports().iter().enumerate() {
                    let binding = &element.pins[i];
                    match port.spec.direction {
                        PinDirection::Input => {
                            let node = self.state.node_mut(state);
                            let value = node.read_pin(binding);
                            if node.set_pin_value(component, i, value) {
                                self.worklist.push(PendingChange {
                                    state: child,
                                    point: port.point,
                                    driver: DriverKey::Port(i),
                                    value,
                                });
                            }
                        }
                        PinDirection::Output => {
                            let value = self.state.node_ref(child).read_pin(&PinBinding {
                                point: port.point,
                                spec: port.spec,
                            });
                            self.drive(state, component, i, binding.point, value);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitBuilder;
    use crate::components::{Buffer, Clock, Constant, Gate, GateOp, InputPin, LogicComponent, Not};
    use crate::components::{InstanceData, Outputs, PinSpec};

    fn settle(circuit: Circuit) -> Propagator {
        let mut p = Propagator::new(CircuitState::new(Arc::new(circuit)), &SimulatorConfig::default());
        assert!(matches!(p.propagate(), Ok(PropagateOutcome::Quiescent { .. })));
        p
    }

    fn value(p: &Propagator, name: &str) -> Value {
        p.state().value_named(name).unwrap()
    }

    #[test]
    fn test_constant_through_inverter() {
        let mut b = CircuitBuilder::new("inv");
        let a = b.point("a");
        let y = b.point("y");
        b.add_component("one", Arc::new(Constant::new(Value::ONE)), &[a]).unwrap();
        b.add_component("not", Arc::new(Not::new(1)), &[a, y]).unwrap();
        let p = settle(b.build());
        assert_eq!(value(&p, "a"), Value::ONE);
        assert_eq!(value(&p, "y"), Value::ZERO);
        assert!(!p.has_pending());
    }

    #[test]
    fn test_conflicting_drivers_give_error() {
        let mut b = CircuitBuilder::new("conflict");
        let a = b.point("a");
        let y = b.point("y");
        let z = b.point("z");
        b.add_component("one", Arc::new(Constant::new(Value::ONE)), &[a]).unwrap();
        b.add_component("zero", Arc::new(Constant::new(Value::ZERO)), &[a]).unwrap();
        b.add_component("buf", Arc::new(Buffer::new(1)), &[a, y]).unwrap();
        b.add_component("and", Arc::new(Gate::new(GateOp::And, 2, 1)), &[a, a, z]).unwrap();
        let p = settle(b.build());
        assert_eq!(value(&p, "a"), Value::ERROR);
        assert_eq!(value(&p, "y"), Value::ERROR);
        // Both gate inputs read the conflicted bundle
        assert_eq!(value(&p, "z"), Value::ERROR);
    }

    #[test]
    fn test_undriven_wire_floats() {
        let mut b = CircuitBuilder::new("float");
        let a = b.point("a");
        let y = b.point("y");
        b.add_component("buf", Arc::new(Buffer::new(1)), &[a, y]).unwrap();
        let p = settle(b.build());
        assert_eq!(value(&p, "a"), Value::FLOATING);
        assert_eq!(value(&p, "y"), Value::FLOATING);
    }

    fn ring() -> Circuit {
        let mut b = CircuitBuilder::new("ring");
        let a = b.point("a");
        let y = b.point("y");
        b.wire(y, a).unwrap();
        b.add_component("one", Arc::new(Constant::new(Value::ONE)), &[y]).unwrap();
        b.add_component("not", Arc::new(Not::new(1)), &[a, y]).unwrap();
        b.build()
    }

    #[test]
    fn test_inverter_ring_oscillates() {
        // NOR feeding itself; held stable while `kick` is high
        let mut b = CircuitBuilder::new("ring");
        let a = b.point("a");
        let y = b.point("y");
        let kick = b.point("kick");
        b.wire(y, a).unwrap();
        b.add_component("in", Arc::new(InputPin::new(1)), &[kick]).unwrap();
        b.add_component("nor", Arc::new(Gate::new(GateOp::Nor, 2, 1)), &[kick, a, y]).unwrap();
        let config = SimulatorConfig::default().with_iteration_limit(40);
        let mut p = Propagator::new(CircuitState::new(Arc::new(b.build())), &config);

        p.poke(StateId::ROOT, ComponentId(0), Value::ONE).unwrap();
        assert!(matches!(p.propagate(), Ok(PropagateOutcome::Quiescent { .. })));
        assert_eq!(value(&p, "y"), Value::ZERO);

        p.poke(StateId::ROOT, ComponentId(0), Value::ZERO).unwrap();
        assert_eq!(p.propagate(), Ok(PropagateOutcome::Oscillating { passes: 40 }));
        assert!(p.is_oscillating());
        assert!(p.oscillation_points().contains(StateId::ROOT, a));
        assert!(p.oscillation_points().contains(StateId::ROOT, y));
        assert!(!p.oscillation_points().contains(StateId::ROOT, kick));

        // Sticky until reset
        p.poke(StateId::ROOT, ComponentId(0), Value::ONE).unwrap();
        p.propagate().unwrap();
        assert!(p.is_oscillating());
        p.reset();
        assert!(!p.is_oscillating());
        assert!(p.oscillation_points().is_empty());
    }

    #[test]
    fn test_ring_with_constant_is_conflict_not_oscillation() {
        let p = settle(ring());
        assert_eq!(value(&p, "a"), Value::ERROR);
    }

    fn two_gate_chain() -> (Circuit, [PointId; 3]) {
        let mut b = CircuitBuilder::new("chain");
        let a = b.point("a");
        let m = b.point("m");
        let y = b.point("y");
        b.add_component("in", Arc::new(InputPin::new(1)), &[a]).unwrap();
        b.add_component("g1", Arc::new(Not::new(1)), &[a, m]).unwrap();
        b.add_component("g2", Arc::new(Not::new(1)), &[m, y]).unwrap();
        (b.build(), [a, m, y])
    }

    #[test]
    fn test_step_advances_one_pass() {
        let (circuit, [a, m, _]) = two_gate_chain();
        let mut p = Propagator::new(CircuitState::new(Arc::new(circuit)), &SimulatorConfig::default());
        p.propagate().unwrap();
        let g1 = ComponentId(1);
        let g2 = ComponentId(2);
        assert_eq!(p.state().pin_value(g1, 1), Value::ONE);
        assert_eq!(p.state().pin_value(g2, 1), Value::ZERO);

        assert!(p.poke(StateId::ROOT, ComponentId(0), Value::ONE).unwrap());
        let mut points = PropagationPoints::new();
        assert!(p.step(&mut points).unwrap());
        // G1 has recomputed, G2 has not seen the change yet
        assert_eq!(p.state().pin_value(g1, 1), Value::ZERO);
        assert_eq!(p.state().pin_value(g2, 1), Value::ZERO);
        assert!(points.contains(StateId::ROOT, a));
        assert!(!points.contains(StateId::ROOT, m));

        points.clear();
        assert!(p.step(&mut points).unwrap());
        assert_eq!(p.state().pin_value(g2, 1), Value::ONE);
        assert!(points.contains(StateId::ROOT, m));

        points.clear();
        assert!(!p.step(&mut points).unwrap());
        assert_eq!(value(&p, "y"), Value::ONE);
    }

    #[test]
    fn test_randomized_order_reaches_same_state() {
        // Ripple-carry adder of two 3-bit inputs
        let build = || {
            let mut b = CircuitBuilder::new("adder");
            let mut carry = b.point("c0");
            b.add_component("c0", Arc::new(Constant::new(Value::ZERO)), &[carry]).unwrap();
            for i in 0..3 {
                let x = b.point(&format!("x{i}"));
                let y = b.point(&format!("y{i}"));
                let xy = b.point(&format!("xy{i}"));
                let s = b.point(&format!("s{i}"));
                let and1 = b.point(&format!("and1_{i}"));
                let and2 = b.point(&format!("and2_{i}"));
                let next = b.point(&format!("c{}", i + 1));
                let bit = |n: usize| Value::from((0b101 >> i) & 1 == 1 && n == 0 || (0b011 >> i) & 1 == 1 && n == 1);
                b.add_component(&format!("x{i}"), Arc::new(Constant::new(bit(0))), &[x]).unwrap();
                b.add_component(&format!("y{i}"), Arc::new(Constant::new(bit(1))), &[y]).unwrap();
                b.add_component(&format!("xor1_{i}"), Arc::new(Gate::new(GateOp::Xor, 2, 1)), &[x, y, xy]).unwrap();
                b.add_component(&format!("xor2_{i}"), Arc::new(Gate::new(GateOp::Xor, 2, 1)), &[xy, carry, s]).unwrap();
                b.add_component(&format!("and1_{i}"), Arc::new(Gate::new(GateOp::And, 2, 1)), &[x, y, and1]).unwrap();
                b.add_component(&format!("and2_{i}"), Arc::new(Gate::new(GateOp::And, 2, 1)), &[xy, carry, and2]).unwrap();
                b.add_component(&format!("or_{i}"), Arc::new(Gate::new(GateOp::Or, 2, 1)), &[and1, and2, next]).unwrap();
                carry = next;
            }
            Arc::new(b.build())
        };

        let reference = settle((*build()).clone());
        // 5 + 3 = 8
        assert_eq!(value(&reference, "s0"), Value::ZERO);
        assert_eq!(value(&reference, "s1"), Value::ZERO);
        assert_eq!(value(&reference, "s2"), Value::ZERO);
        assert_eq!(value(&reference, "c3"), Value::ONE);

        for seed in 0..8u64 {
            let config = SimulatorConfig::default().with_randomize(Some(seed));
            let mut p = Propagator::new(CircuitState::new(build()), &config);
            p.propagate().unwrap();
            assert_eq!(p.state().snapshot(), reference.state().snapshot(), "seed {seed}");
        }
    }

    #[test]
    fn test_repeated_pokes_keep_latest_value() {
        let mut b = CircuitBuilder::new("poked");
        let a = b.point("a");
        let y = b.point("y");
        b.add_component("in", Arc::new(InputPin::new(1)), &[a]).unwrap();
        b.add_component("not", Arc::new(Not::new(1)), &[a, y]).unwrap();
        let circuit = Arc::new(b.build());

        for seed in 0..16u64 {
            let config = SimulatorConfig::default().with_randomize(Some(seed));
            let mut p = Propagator::new(CircuitState::new(Arc::clone(&circuit)), &config);
            p.propagate().unwrap();
            assert!(p.poke(StateId::ROOT, ComponentId(0), Value::ONE).unwrap());
            assert!(p.poke(StateId::ROOT, ComponentId(0), Value::ZERO).unwrap());
            p.propagate().unwrap();
            assert_eq!(p.state().pin_value(ComponentId(0), 0), Value::ZERO, "seed {seed}");
            assert_eq!(value(&p, "a"), Value::ZERO, "seed {seed}");
            assert_eq!(value(&p, "y"), Value::ONE, "seed {seed}");
        }
    }

    #[derive(Debug)]
    struct Faulty {
        panic: bool,
    }

    impl LogicComponent for Faulty {
        fn kind(&self) -> &'static str {
            "FAULTY"
        }

        fn pins(&self) -> Vec<PinSpec> {
            vec![PinSpec::input(1), PinSpec::output(1)]
        }

        fn recompute_outputs(&self, inputs: &[Value], _data: Option<&mut InstanceData>) -> Result<Outputs, ComponentFault> {
            if inputs[0] == Value::ONE {
                if self.panic {
                    panic!("boom");
                }
                return Err(ComponentFault::new(self.kind(), "refused"));
            }
            Ok(vec![(1, inputs[0])])
        }
    }

    fn faulty_circuit(panic: bool) -> Propagator {
        let mut b = CircuitBuilder::new("faulty");
        let a = b.point("a");
        let y = b.point("y");
        b.add_component("in", Arc::new(InputPin::new(1)), &[a]).unwrap();
        b.add_component("bad", Arc::new(Faulty { panic }), &[a, y]).unwrap();
        settle(b.build())
    }

    #[test]
    fn test_component_fault_is_reported() {
        let mut p = faulty_circuit(false);
        p.poke(StateId::ROOT, ComponentId(0), Value::ONE).unwrap();
        let fault = p.propagate().unwrap_err();
        assert_eq!(fault.component, "bad");
        assert_eq!(fault.message, "refused");

        // The circuit is usable again once the input goes back
        p.poke(StateId::ROOT, ComponentId(0), Value::ZERO).unwrap();
        assert!(p.propagate().is_ok());
        assert_eq!(value(&p, "y"), Value::ZERO);
    }

    #[test]
    fn test_component_panic_is_contained() {
        let mut p = faulty_circuit(true);
        p.poke(StateId::ROOT, ComponentId(0), Value::ONE).unwrap();
        let fault = p.propagate().unwrap_err();
        assert_eq!(fault.component, "bad");
        assert!(fault.message.contains("boom"));
    }

    #[test]
    fn test_tick_reevaluates_clock() {
        let mut b = CircuitBuilder::new("clk");
        let c = b.point("clk");
        b.add_component("clk", Arc::new(Clock::new(1, 1)), &[c]).unwrap();
        let mut p = settle(b.build());
        assert_eq!(value(&p, "clk"), Value::ZERO);
        assert_eq!(p.tick(), 1);
        p.propagate().unwrap();
        assert_eq!(value(&p, "clk"), Value::ONE);
        p.tick();
        p.propagate().unwrap();
        assert_eq!(value(&p, "clk"), Value::ZERO);
    }

    #[test]
    fn test_reset_restores_initial_outputs() {
        let (circuit, _) = two_gate_chain();
        let mut p = settle(circuit);
        p.poke(StateId::ROOT, ComponentId(0), Value::ONE).unwrap();
        p.propagate().unwrap();
        assert_eq!(value(&p, "y"), Value::ONE);

        p.reset();
        assert_eq!(value(&p, "y"), Value::FLOATING);
        p.propagate().unwrap();
        assert_eq!(value(&p, "a"), Value::ZERO);
        assert_eq!(value(&p, "y"), Value::ZERO);
    }

    #[test]
    fn test_subcircuit_ports() {
        let inner = {
            let mut b = CircuitBuilder::new("inv");
            let i = b.point("i");
            let o = b.point("o");
            b.add_port("i", i, PinDirection::Input, 1).unwrap();
            b.add_port("o", o, PinDirection::Output, 1).unwrap();
            b.add_component("not", Arc::new(Not::new(1)), &[i, o]).unwrap();
            Arc::new(b.build())
        };
        let mut b = CircuitBuilder::new("top");
        let x = b.point("x");
        let m = b.point("m");
        let y = b.point("y");
        b.add_component("in", Arc::new(InputPin::new(1)), &[x]).unwrap();
        b.add_subcircuit("u1", Arc::clone(&inner), &[x, m]).unwrap();
        b.add_subcircuit("u2", inner, &[m, y]).unwrap();
        let mut p = settle(b.build());

        assert_eq!(p.state().len(), 3);
        assert_eq!(value(&p, "m"), Value::ONE);
        assert_eq!(value(&p, "y"), Value::ZERO);

        p.poke(StateId::ROOT, ComponentId(0), Value::ONE).unwrap();
        p.propagate().unwrap();
        assert_eq!(value(&p, "m"), Value::ZERO);
        assert_eq!(value(&p, "y"), Value::ONE);
        let child = p.state().node(StateId::ROOT).unwrap().child(ComponentId(1)).unwrap();
        let inner_out = p.state().node(child).unwrap().circuit().find_point("o").unwrap();
        assert_eq!(p.state().value_in(child, inner_out).unwrap(), Value::ZERO);
    }
}
