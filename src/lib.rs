//! scorelayout: incremental layout engine for staff and tablature scores.
//!
//! A [`Document`] is built measure by measure through [`MeasureEditor`]s.
//! Every edit only marks the document dirty; `layout` resolves beams,
//! ties and slurs, breaks and stretches rows, and positions everything in
//! units of the renderer's staff space. Drawing goes through the
//! [`renderer::DrawSurface`] trait, with an SVG surface included.
//!
//! # Example
//! ```no_run
//! use scorelayout::{render_document_to_svg, Document, LayoutConfig};
//!
//! let mut doc = Document::new(LayoutConfig::default().with_measures_per_row(4))?;
//! let mut m = doc.add_measure()?;
//! m.set_time_signature("3/4")?;
//! m.add_note(0, "E4", "4")?;
//! m.add_note(0, "G4", "2")?;
//! let svg = render_document_to_svg(&mut doc, 10.0)?;
//! println!("{svg}");
//! # Ok::<(), scorelayout::ScoreError>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod playback;
pub mod renderer;
pub mod theory;

pub use config::{LayoutConfig, StaffConfig, StaffKind};
pub use engine::{Document, Header, MeasureEditor, MusicObject, ObjRef};
pub use error::{Result, ScoreError};
pub use geometry::Rect;
pub use playback::{generate_playback_map, playback_map_to_json, PlaybackMap};
pub use renderer::{DrawSurface, Renderer};

use renderer::svg_builder::{empty_svg, SvgBuilder};

/// Lay out and draw a document to an SVG string.
///
/// `unit_size` is the staff space in SVG user units.
pub fn render_document_to_svg(doc: &mut Document, unit_size: f64) -> Result<String> {
    doc.layout(&Renderer::headless(unit_size))?;
    if doc.measures().is_empty() && doc.header().map_or(true, |h| h.is_empty()) {
        return Ok(empty_svg("Empty document"));
    }
    let mut view = doc.rect();
    view.inflate(unit_size);
    let mut svg = SvgBuilder::new(view);
    {
        let mut r = Renderer::new(unit_size, &mut svg);
        doc.draw(&mut r)?;
    }
    Ok(svg.build())
}

/// Serialize the layout configuration of a document to JSON.
pub fn config_to_json(config: &LayoutConfig) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}
