//! The music-object layout engine.
//!
//! Every notational object lives in an arena on [`Document`] and refers
//! to its structural parent by a typed id. Containers own their children
//! through id lists: a row lists measures, a measure lists columns, a
//! column lists one symbol per voice.

mod annotations;
mod arcs;
mod beams;
mod document;
mod editor;
mod glyphs;
mod header;
mod layout_groups;
mod measure;
mod row;
mod staff;
mod symbols;

use serde::Serialize;

use crate::geometry::Rect;
use crate::renderer::Renderer;

pub use annotations::{
    Annotation, AnnotationAnchor, AnnotationKind, Extension, ExtensionSegment, ExtensionSpan, Target,
    VerticalPos,
};
pub use arcs::{ArcDirection, ArcFragment, ArcKind, ArcProps, ArcSpan, ObjArc};
pub use beams::{BeamSegment, ObjBeamGroup};
pub use document::{Document, PitchPick};
pub use editor::MeasureEditor;
pub use glyphs::{BarLineKind, ObjBarLine, ObjSignature, SignatureGlyph};
pub use header::Header;
pub use layout_groups::{GroupMember, LayoutGroup};
pub use measure::{Measure, MeasureEnd, Navigation, RhythmColumn};
pub use row::Row;
pub use staff::StaffDef;
pub use symbols::{NoteHead, ObjAccidental, ObjArpeggio, StemDir, Symbol, SymbolKind};

macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
            pub struct $name(pub(crate) usize);

            impl $name {
                pub fn index(self) -> usize {
                    self.0
                }
            }
        )*
    };
}

define_id!(
    RowId,
    MeasureId,
    ColumnId,
    /// A note group or rest.
    SymbolId,
    ArcId,
    BeamId,
    AnnotationId,
    ExtensionId,
    LayoutGroupId,
);

/// Reference to any pickable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjRef {
    Document,
    Header,
    Row(RowId),
    Measure(MeasureId),
    Column(ColumnId),
    Symbol(SymbolId),
    BarLine(MeasureId),
    Beam(BeamId),
    Arc(ArcId),
    Annotation(AnnotationId),
    Extension(ExtensionId),
}

/// Contract shared by every laid-out object.
///
/// `layout` is not part of the trait: each object needs different sibling
/// state, so the document calls inherent layout methods in dependency
/// order. Once laid out, any object can be moved, drawn and hit-tested
/// uniformly.
pub trait MusicObject {
    fn rect(&self) -> Rect;

    /// Translate computed geometry in place.
    fn offset(&mut self, dx: f64, dy: f64);

    /// Stateless; a no-op on a headless renderer.
    fn draw(&self, renderer: &mut Renderer<'_>);

    fn hit(&self, x: f64, y: f64) -> bool {
        self.rect().contains(x, y)
    }
}
