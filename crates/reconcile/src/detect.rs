use ethereal_core::{DesiredRecord, InstanceLookup, ReconcileAction};

/// Classify one record against the lookup of its instance.
///
/// A failed lookup never yields a corrective action: creating under
/// uncertainty could duplicate an instance that already exists.
pub fn decide(record: &DesiredRecord, lookup: &InstanceLookup, default_image: &str) -> ReconcileAction {
    match lookup {
        InstanceLookup::Failed(_) => ReconcileAction::NoOp,
        InstanceLookup::Missing => ReconcileAction::Create,
        InstanceLookup::Found(inst) => {
            if inst.image.as_deref() == Some(record.effective_image(default_image)) {
                ReconcileAction::NoOp
            } else {
                ReconcileAction::Recreate
            }
        }
    }
}
