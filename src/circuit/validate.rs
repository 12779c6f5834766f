//! Circuit validation.

use crate::error::{GatesimError, Result};
use crate::wires::BundleWidth;

use super::{Circuit, ElementKind};

/// Validate a circuit for simulation.
///
/// Checks:
/// - The circuit has at least one component or port
/// - No bundle has ends of conflicting widths
/// - Every sub-circuit instance is itself valid
pub fn validate_circuit(circuit: &Circuit) -> Result<()> {
    if circuit.elements().is_empty() && circuit.ports().is_empty() {
        return Err(GatesimError::topology(format!(
            "Circuit '{}' has no components",
            circuit.name
        )));
    }

    for bundle in circuit.wires().bundles() {
        if let BundleWidth::Conflict(widths) = &bundle.width {
            let point = bundle
                .points
                .first()
                .map(|&p| circuit.point_name(p).to_string())
                .unwrap_or_default();
            return Err(GatesimError::WidthConflict {
                point,
                widths: widths.clone(),
            });
        }
    }

    for element in circuit.elements() {
        if let ElementKind::Subcircuit(child) = &element.kind {
            validate_circuit(child)?;
        }
    }

    Ok(())
}
