//! Viewport composition.
//!
//! The render loop asks for a rectangle of the map at some zoom and gets an
//! image back straight away. Tiles not yet in memory show as background and
//! are produced in the background; see [`ViewCompositor`].

mod compositor;

pub use compositor::{
    ComposedView, PreloadSummary, TileReadyCallback, ViewCompositor, BACKGROUND,
    DEFAULT_PRELOAD_PARALLELISM,
};
