use cartage_resource::{LatLngBounds, TileId};
use std::sync::Arc;

/// Lists the tiles needed to cover a region.
///
/// The projection is the implementor's business. Sessions clamp the zoom
/// range to each tile source before asking, and ask nothing for empty bounds.
pub trait TileEnumerator: Send + Sync {
    /// Every tile intersecting `bounds` at each integer zoom level from
    /// `min_zoom` to `max_zoom`, in a stable order.
    fn tiles(&self, bounds: &LatLngBounds, min_zoom: f64, max_zoom: f64) -> Vec<TileId>;
}

pub type TileEnumeratorHandle = Arc<dyn TileEnumerator>;
