//! Best-effort return-shape inference.
//!
//! Separate from extraction and opt-in. Mutations should declare their
//! shape with `@returns`; this pass only fills shapes that were left
//! undeclared, guessing from the template's leading keyword. Declared
//! shapes are never overwritten.

use tracing::debug;

use super::directive::ReturnShape;
use super::metadata::SchemaMetadata;
use crate::compiler::{classify, QueryKind};

/// Returns the number of mutation fields whose shape was inferred.
pub fn infer_return_shapes(metadata: &mut SchemaMetadata) -> usize {
    let mut inferred = 0;
    for field in metadata
        .mutations
        .iter_mut()
        .filter(|f| f.return_shape.is_none())
    {
        let Some(kind) = field.template().and_then(|t| classify(t).ok()) else {
            continue;
        };
        let shape = match kind {
            QueryKind::Read if field.list => ReturnShape::Rows,
            QueryKind::Read => ReturnShape::Row,
            QueryKind::Insert | QueryKind::Update | QueryKind::Delete => ReturnShape::Ack,
        };
        debug!(field = %field.name, shape = %shape, "return shape inferred");
        field.return_shape = Some(shape);
        inferred += 1;
    }
    inferred
}
