//! Per-instance circuit state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::circuit::{Circuit, ComponentId, ElementKind, PinBinding, PinRef, PointId};
use crate::components::InstanceData;
use crate::value::{Lane, Value};
use crate::wires::{BundleId, BundleWidth, ThreadId};

use super::StateId;

/// Who is driving a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DriverKey {
    /// An output pin of a component in the same state
    Pin(PinRef),
    /// The parent instance driving input port `n` of this sub-circuit state
    Port(usize),
}

/// Mutable state of one circuit occurrence.
pub struct StateNode {
    circuit: Arc<Circuit>,
    /// Parent state and the sub-circuit component this node instantiates
    parent: Option<(StateId, ComponentId)>,
    /// Child state per component, for sub-circuit instances
    children: Vec<Option<StateId>>,
    /// Last value each component drove (or was fed, for sub-circuit inputs) per pin
    pin_values: Vec<Vec<Value>>,
    /// Driver contributions per bundle
    drivers: Vec<Vec<(DriverKey, Value)>>,
    /// Merged value per thread
    thread_values: Vec<Lane>,
    /// Assembled value per bundle
    bundle_values: Vec<Value>,
    /// Opaque component state blocks
    data: Vec<Option<InstanceData>>,
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("circuit", &self.circuit.name)
            .field("parent", &self.parent)
            .field("bundle_values", &self.bundle_values)
            .finish_non_exhaustive()
    }
}

fn initial_bundle_value(width: &BundleWidth) -> Value {
    match width {
        BundleWidth::Unset => Value::floating(0),
        BundleWidth::Fixed(w) => Value::floating(*w),
        BundleWidth::Conflict(ws) => Value::error(ws.iter().copied().max().unwrap_or(1)),
    }
}

impl StateNode {
    pub(crate) fn new(circuit: Arc<Circuit>, parent: Option<(StateId, ComponentId)>) -> Self {
        let wires = circuit.wires();
        let count = circuit.component_count();
        let mut node = Self {
            parent,
            children: vec![None; count],
            pin_values: Vec::with_capacity(count),
            drivers: vec![Vec::new(); wires.bundle_count()],
            thread_values: vec![Lane::Floating; wires.thread_count()],
            bundle_values: wires.bundles().iter().map(|b| initial_bundle_value(&b.width)).collect(),
            data: Vec::with_capacity(count),
            circuit: Arc::clone(&circuit),
        };
        for element in circuit.elements() {
            node.pin_values
                .push(element.pins.iter().map(|p| Value::floating(p.spec.width)).collect());
            node.data.push(match &element.kind {
                ElementKind::Logic(component) => component.create_data(),
                ElementKind::Subcircuit(_) => None,
            });
        }
        node
    }

    /// Clear every value to floating and recreate component state.
    /// Child links are kept; the arena resets children separately.
    pub(crate) fn reset(&mut self) {
        let wires = self.circuit.wires();
        for (values, element) in self.pin_values.iter_mut().zip(self.circuit.elements()) {
            for (v, pin) in values.iter_mut().zip(&element.pins) {
                *v = Value::floating(pin.spec.width);
            }
        }
        for drivers in &mut self.drivers {
            drivers.clear();
        }
        self.thread_values.fill(Lane::Floating);
        for (value, bundle) in self.bundle_values.iter_mut().zip(wires.bundles()) {
            *value = initial_bundle_value(&bundle.width);
        }
        for (slot, element) in self.data.iter_mut().zip(self.circuit.elements()) {
            *slot = match &element.kind {
                ElementKind::Logic(component) => component.create_data(),
                ElementKind::Subcircuit(_) => None,
            };
        }
    }

    pub fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }

    /// Parent state and instantiating component, for sub-circuit states.
    pub fn parent(&self) -> Option<(StateId, ComponentId)> {
        self.parent
    }

    /// Child state of a sub-circuit component, if it has been evaluated.
    pub fn child(&self, component: ComponentId) -> Option<StateId> {
        self.children.get(component.0).copied().flatten()
    }

    /// All instantiated children.
    pub fn children(&self) -> impl Iterator<Item = StateId> + '_ {
        self.children.iter().filter_map(|c| *c)
    }

    pub(crate) fn set_child(&mut self, component: ComponentId, child: StateId) {
        self.children[component.0] = Some(child);
    }

    /// Current value of the bundle containing `point`.
    pub fn value_at(&self, point: PointId) -> Value {
        self.bundle_values[self.circuit.wires().bundle_of(point).0]
    }

    /// Value seen by a pin of the given width.
    pub(crate) fn read_pin(&self, binding: &PinBinding) -> Value {
        let bundle = self.circuit.wires().bundle_of(binding.point);
        match self.circuit.wires().bundle(bundle).width {
            BundleWidth::Fixed(_) => self.bundle_values[bundle.0],
            BundleWidth::Conflict(_) => Value::error(binding.spec.width),
            BundleWidth::Unset => Value::floating(binding.spec.width),
        }
    }

    /// Last value driven on (or fed into) a component pin.
    pub fn pin_value(&self, component: ComponentId, pin: usize) -> Value {
        self.pin_values[component.0][pin]
    }

    pub(crate) fn set_pin_value(&mut self, component: ComponentId, pin: usize, value: Value) -> bool {
        let slot = &mut self.pin_values[component.0][pin];
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }

    /// Merged value of a thread.
    pub fn thread_value(&self, thread: ThreadId) -> Lane {
        self.thread_values[thread.0]
    }

    /// Opaque state block of a component.
    pub fn data(&self, component: ComponentId) -> Option<&InstanceData> {
        self.data.get(component.0).and_then(Option::as_ref)
    }

    pub(crate) fn data_mut(&mut self, component: ComponentId) -> Option<&mut InstanceData> {
        self.data.get_mut(component.0).and_then(Option::as_mut)
    }

    /// Record a driver contribution. Returns true when it changed.
    pub(crate) fn set_driver(&mut self, bundle: BundleId, key: DriverKey, value: Value) -> bool {
        let drivers = &mut self.drivers[bundle.0];
        match drivers.iter_mut().find(|(k, _)| *k == key) {
            Some((_, current)) if *current == value => false,
            Some((_, current)) => {
                *current = value;
                true
            }
            None => {
                drivers.push((key, value));
                true
            }
        }
    }

    /// Merge of every contribution on a bundle.
    fn bundle_drive(&self, bundle: BundleId, width: u8) -> Value {
        self.drivers[bundle.0]
            .iter()
            .fold(Value::floating(width), |acc, (_, v)| acc.merge(v))
    }

    /// Re-merge the threads of the touched bundles and reassemble every
    /// bundle sharing one of those threads. Returns the bundles whose value
    /// changed.
    pub(crate) fn settle(&mut self, touched: &[BundleId]) -> Vec<BundleId> {
        let circuit = Arc::clone(&self.circuit);
        let wires = circuit.wires();

        let mut threads: Vec<ThreadId> = Vec::new();
        let mut affected: Vec<BundleId> = Vec::new();
        for &b in touched {
            let bundle = wires.bundle(b);
            if bundle.threads.is_empty() {
                affected.push(b);
            } else {
                threads.extend_from_slice(&bundle.threads);
            }
        }
        threads.sort_unstable();
        threads.dedup();

        let mut drives: HashMap<BundleId, Value> = HashMap::new();
        for &t in &threads {
            let mut lane = Lane::Floating;
            for &(b, l) in wires.thread_members(t) {
                let drive = *drives.entry(b).or_insert_with(|| {
                    let width = match wires.bundle(b).width {
                        BundleWidth::Fixed(w) => w,
                        _ => 0,
                    };
                    self.bundle_drive(b, width)
                });
                lane = lane.merge(drive.lane(l));
                affected.push(b);
            }
            self.thread_values[t.0] = lane;
        }
        affected.sort_unstable();
        affected.dedup();

        let mut changed = Vec::new();
        for b in affected {
            let bundle = wires.bundle(b);
            let value = match &bundle.width {
                BundleWidth::Fixed(_) => {
                    let lanes: Vec<Lane> = bundle.threads.iter().map(|t| self.thread_values[t.0]).collect();
                    Value::from_lanes(&lanes)
                }
                other => initial_bundle_value(other),
            };
            if self.bundle_values[b.0] != value {
                self.bundle_values[b.0] = value;
                changed.push(b);
            }
        }
        changed
    }

    /// Values of every bundle and pin, for comparing states.
    pub(crate) fn snapshot(&self) -> (Vec<Value>, Vec<Vec<Value>>) {
        (self.bundle_values.clone(), self.pin_values.clone())
    }
}
