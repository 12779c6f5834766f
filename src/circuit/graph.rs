//! Circuit connectivity snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{ComponentId, PinRef, PointId, SegmentId};
use crate::components::{LogicComponent, PinDirection, PinSpec};
use crate::error::{GatesimError, Result};
use crate::value::MAX_WIDTH;
use crate::wires::{BundleId, SplitEnd, SplitterSpec, WireBundleResolver, WireLayout};

/// What a component instance is.
#[derive(Debug, Clone)]
pub enum ElementKind {
    /// A catalog component evaluated through [`LogicComponent`]
    Logic(Arc<dyn LogicComponent>),
    /// An instance of another circuit; pin `i` maps to port `i` of the child
    Subcircuit(Arc<Circuit>),
}

/// A pin of a placed component, bound to the point it sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinBinding {
    pub point: PointId,
    pub spec: PinSpec,
}

/// A placed component instance.
#[derive(Debug, Clone)]
pub struct Element {
    pub id: ComponentId,
    pub name: String,
    pub kind: ElementKind,
    pub pins: Vec<PinBinding>,
}

/// A boundary point of a circuit used as a sub-circuit.
///
/// Input ports are driven by the parent; output ports drive the parent.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub point: PointId,
    pub spec: PinSpec,
}

/// An immutable circuit ready for simulation.
///
/// The connectivity is fixed for the lifetime of the value. Editing goes
/// through [`Circuit::edit`], which hands back a builder that keeps the wire
/// resolver's current classes so only the edited region is recomputed.
#[derive(Debug, Clone)]
pub struct Circuit {
    /// Circuit name (used in logs and error messages)
    pub name: String,

    /// Mapping from point names to point IDs
    point_map: HashMap<String, PointId>,

    /// Reverse mapping from point IDs to names
    point_names: Vec<String>,

    /// All component instances, indexed by [`ComponentId`]
    elements: Vec<Element>,

    /// Boundary ports, in pin order for parent instances
    ports: Vec<Port>,

    /// Pins attached at each point
    point_pins: Vec<Vec<PinRef>>,

    /// Components with a pin on each bundle
    bundle_components: Vec<Vec<ComponentId>>,

    /// Output ports sitting on each bundle
    bundle_output_ports: Vec<bool>,

    /// Resolved bundle/thread layout
    wires: Arc<WireLayout>,

    /// Resolver kept for incremental edits
    resolver: WireBundleResolver,
}

impl Circuit {
    /// Start building a new circuit.
    pub fn builder(name: impl Into<String>) -> CircuitBuilder {
        CircuitBuilder::new(name)
    }

    /// Reopen this circuit for editing.
    pub fn edit(&self) -> CircuitBuilder {
        CircuitBuilder {
            name: self.name.clone(),
            point_map: self.point_map.clone(),
            point_names: self.point_names.clone(),
            elements: self.elements.clone(),
            ports: self.ports.clone(),
            resolver: self.resolver.clone(),
        }
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, id: ComponentId) -> &Element {
        &self.elements[id.0]
    }

    pub fn component_count(&self) -> usize {
        self.elements.len()
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn point_count(&self) -> usize {
        self.point_names.len()
    }

    /// Find a point ID by name.
    pub fn find_point(&self, name: &str) -> Option<PointId> {
        self.point_map.get(name).copied()
    }

    /// Get the name of a point.
    pub fn point_name(&self, point: PointId) -> &str {
        &self.point_names[point.0]
    }

    /// Find a component by instance name.
    pub fn find_component(&self, name: &str) -> Option<ComponentId> {
        self.elements.iter().find(|e| e.name == name).map(|e| e.id)
    }

    /// The resolved wire layout.
    pub fn wires(&self) -> &WireLayout {
        &self.wires
    }

    /// Pins attached at `point`.
    pub fn pins_at(&self, point: PointId) -> &[PinRef] {
        &self.point_pins[point.0]
    }

    /// Components with at least one pin on `bundle`.
    pub fn components_on(&self, bundle: BundleId) -> &[ComponentId] {
        &self.bundle_components[bundle.0]
    }

    /// Whether an output port sits on `bundle`.
    pub fn has_output_port(&self, bundle: BundleId) -> bool {
        self.bundle_output_ports[bundle.0]
    }

    /// Pin specs this circuit presents when instantiated as a sub-circuit.
    pub fn port_specs(&self) -> Vec<PinSpec> {
        self.ports.iter().map(|p| p.spec).collect()
    }
}

/// Incremental constructor for [`Circuit`].
#[derive(Debug, Clone)]
pub struct CircuitBuilder {
    name: String,
    point_map: HashMap<String, PointId>,
    point_names: Vec<String>,
    elements: Vec<Element>,
    ports: Vec<Port>,
    resolver: WireBundleResolver,
}

impl CircuitBuilder {
    /// Create an empty builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            point_map: HashMap::new(),
            point_names: Vec::new(),
            elements: Vec::new(),
            ports: Vec::new(),
            resolver: WireBundleResolver::new(),
        }
    }

    /// Get or create the point with the given name.
    pub fn point(&mut self, name: &str) -> PointId {
        if let Some(&id) = self.point_map.get(name) {
            return id;
        }
        let id = self.resolver.add_point();
        self.point_map.insert(name.to_string(), id);
        self.point_names.push(name.to_string());
        id
    }

    /// Look up an existing point by name.
    pub fn find_point(&self, name: &str) -> Result<PointId> {
        self.point_map
            .get(name)
            .copied()
            .ok_or_else(|| GatesimError::point_not_found(name))
    }

    /// Draw a wire segment between two points.
    pub fn wire(&mut self, a: PointId, b: PointId) -> Result<SegmentId> {
        self.resolver.add_segment(a, b)
    }

    /// Draw a wire segment between two named points, creating them as needed.
    pub fn wire_named(&mut self, a: &str, b: &str) -> Result<SegmentId> {
        let a = self.point(a);
        let b = self.point(b);
        self.wire(a, b)
    }

    /// Erase a wire segment.
    pub fn remove_wire(&mut self, segment: SegmentId) -> Result<()> {
        self.resolver.remove_segment(segment)
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.elements.iter().any(|e| e.name == name) {
            return Err(GatesimError::DuplicateComponent {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn bind_pins(&mut self, name: &str, specs: &[PinSpec], points: &[PointId]) -> Result<Vec<PinBinding>> {
        if specs.len() != points.len() {
            return Err(GatesimError::PinCountMismatch {
                name: name.to_string(),
                expected: specs.len(),
                actual: points.len(),
            });
        }
        for spec in specs {
            if spec.width == 0 || spec.width > MAX_WIDTH {
                return Err(GatesimError::InvalidWidth {
                    name: name.to_string(),
                    width: spec.width as usize,
                    max: MAX_WIDTH as usize,
                });
            }
        }
        let mut bindings = Vec::with_capacity(specs.len());
        for (spec, &point) in specs.iter().zip(points) {
            self.resolver.add_end(point, spec.width)?;
            bindings.push(PinBinding { point, spec: *spec });
        }
        Ok(bindings)
    }

    fn push_element(&mut self, name: &str, kind: ElementKind, specs: &[PinSpec], points: &[PointId]) -> Result<ComponentId> {
        self.check_name(name)?;
        let pins = self.bind_pins(name, specs, points)?;
        let id = ComponentId(self.elements.len());
        self.elements.push(Element {
            id,
            name: name.to_string(),
            kind,
            pins,
        });
        Ok(id)
    }

    /// Place a catalog component with its pins on the given points, in pin order.
    pub fn add_component(
        &mut self,
        name: &str,
        component: Arc<dyn LogicComponent>,
        points: &[PointId],
    ) -> Result<ComponentId> {
        let specs = component.pins();
        self.push_element(name, ElementKind::Logic(component), &specs, points)
    }

    /// Place an instance of another circuit; pin `i` attaches to port `i` of `circuit`.
    pub fn add_subcircuit(&mut self, name: &str, circuit: Arc<Circuit>, points: &[PointId]) -> Result<ComponentId> {
        let specs = circuit.port_specs();
        self.push_element(name, ElementKind::Subcircuit(circuit), &specs, points)
    }

    /// Declare a boundary port at `point`. Returns the port (and parent pin) index.
    pub fn add_port(&mut self, name: &str, point: PointId, direction: PinDirection, width: u8) -> Result<usize> {
        if width == 0 || width > MAX_WIDTH {
            return Err(GatesimError::InvalidWidth {
                name: name.to_string(),
                width: width as usize,
                max: MAX_WIDTH as usize,
            });
        }
        self.resolver.add_end(point, width)?;
        self.ports.push(Port {
            name: name.to_string(),
            point,
            spec: PinSpec { width, direction },
        });
        Ok(self.ports.len() - 1)
    }

    /// Place a splitter joining lanes of the `width`-lane bundle at
    /// `combined` to the bundles at each end.
    pub fn add_splitter(&mut self, combined: PointId, width: u8, ends: Vec<SplitEnd>) -> Result<()> {
        if width == 0 || width > MAX_WIDTH {
            return Err(GatesimError::InvalidWidth {
                name: "splitter".to_string(),
                width: width as usize,
                max: MAX_WIDTH as usize,
            });
        }
        self.resolver.add_splitter(SplitterSpec { combined, width, ends })
    }

    /// Resolve wiring and freeze the circuit.
    pub fn build(mut self) -> Circuit {
        let wires = self.resolver.rebuild();

        let mut point_pins: Vec<Vec<PinRef>> = vec![Vec::new(); self.point_names.len()];
        for element in &self.elements {
            for (pin, binding) in element.pins.iter().enumerate() {
                point_pins[binding.point.0].push(PinRef {
                    component: element.id,
                    pin,
                });
            }
        }

        let mut bundle_components: Vec<Vec<ComponentId>> = vec![Vec::new(); wires.bundle_count()];
        for (point, pins) in point_pins.iter().enumerate() {
            let bundle = wires.bundle_of(PointId(point));
            for pin in pins {
                let list = &mut bundle_components[bundle.0];
                if !list.contains(&pin.component) {
                    list.push(pin.component);
                }
            }
        }

        let mut bundle_output_ports = vec![false; wires.bundle_count()];
        for port in &self.ports {
            if port.spec.direction == PinDirection::Output {
                bundle_output_ports[wires.bundle_of(port.point).0] = true;
            }
        }

        Circuit {
            name: self.name,
            point_map: self.point_map,
            point_names: self.point_names,
            elements: self.elements,
            ports: self.ports,
            point_pins,
            bundle_components,
            bundle_output_ports,
            wires,
            resolver: self.resolver,
        }
    }
}
