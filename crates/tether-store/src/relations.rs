//! Relation engine: cache-side graph edits
//!
//! The store-side half of cascade maintenance is the decouple/populate
//! statements in [`crate::statements`]; this module owns the in-memory
//! half, expressed as explicit edits on shared record handles so cached
//! object graphs stay consistent without reloading anything.

use tether_core::record::SharedDyn;
use tracing::debug;

use crate::statements::CompiledStatements;

/// Clear the back-reference of every child currently held in the doomed
/// record's collections, iff it still points at `owner_id`
pub(crate) fn detach_cached_children(
    record: &SharedDyn,
    statements: &CompiledStatements,
    owner_id: i64,
) {
    for relation in &statements.relations {
        let children = record.borrow().collection(relation.field);
        for child in children {
            let cleared = child
                .borrow_mut()
                .clear_reference_if(relation.inverse, owner_id);
            if cleared {
                debug!(
                    child_type = relation.target,
                    field = relation.inverse,
                    owner_id,
                    "cleared cached back-reference"
                );
            }
        }
    }
}

/// Splice a doomed child out of the matching collections of a cached
/// parent, preserving the order of the remaining elements
pub(crate) fn splice_child_from_parent(
    parent: &SharedDyn,
    parent_statements: &CompiledStatements,
    child_type: &str,
    inverse_field: &str,
    child_id: i64,
) {
    for relation in &parent_statements.relations {
        if relation.target == child_type && relation.inverse == inverse_field {
            parent
                .borrow_mut()
                .remove_from_collection(relation.field, child_id);
            debug!(
                child_type,
                field = relation.field,
                child_id,
                "spliced child out of cached parent collection"
            );
        }
    }
}
