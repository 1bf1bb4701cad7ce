//! Score header: centered title, credits right-aligned below it.

use serde::Serialize;

use super::MusicObject;
use crate::geometry::Rect;
use crate::renderer::constants::*;
use crate::renderer::{Renderer, TextAnchor};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Header {
    pub title: Option<String>,
    pub composer: Option<String>,
    pub arranger: Option<String>,
    #[serde(skip)]
    lines: Vec<HeaderLine>,
    #[serde(skip)]
    rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
struct HeaderLine {
    text: String,
    x: f64,
    y: f64,
    size: f64,
    anchor: TextAnchor,
}

impl Header {
    pub fn new(title: &str) -> Self {
        Self { title: Some(title.to_string()), ..Default::default() }
    }

    pub fn with_composer(mut self, composer: &str) -> Self {
        self.composer = Some(composer.to_string());
        self
    }

    pub fn with_arranger(mut self, arranger: &str) -> Self {
        self.arranger = Some(arranger.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.composer.is_none() && self.arranger.is_none()
    }

    /// Lay the header out across `width`, starting at the top-left origin.
    pub(crate) fn layout(&mut self, width: f64, r: &Renderer<'_>) {
        let unit = r.unit_size();
        self.lines.clear();
        let mut y = 0.0;
        let mut rect = Rect::point(0.0, 0.0);
        if let Some(title) = &self.title {
            let size = TITLE_SIZE * unit;
            let w = r.text_width(title, size);
            let cx = width / 2.0;
            self.lines.push(HeaderLine { text: title.clone(), x: cx, y: y + size / 2.0, size, anchor: TextAnchor::Middle });
            rect.expand(&Rect::new(cx - w / 2.0, y, cx + w / 2.0, y + size));
            y += size * 1.3;
        }
        let credits = self
            .composer
            .iter()
            .cloned()
            .chain(self.arranger.iter().map(|a| format!("Arr. {a}")));
        for text in credits {
            let size = CREDIT_SIZE * unit;
            let w = r.text_width(&text, size);
            rect.expand(&Rect::new(width - w, y, width, y + size));
            self.lines.push(HeaderLine { text, x: width, y: y + size / 2.0, size, anchor: TextAnchor::End });
            y += size * 1.3;
        }
        self.rect = rect;
    }
}

impl MusicObject for Header {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        for line in &mut self.lines {
            line.x += dx;
            line.y += dy;
        }
        self.rect.offset(dx, dy);
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        r.draw_debug_rect(&self.rect);
        let Some(s) = r.surface() else { return };
        for line in &self.lines {
            s.text(line.x, line.y, &line.text, line.size, TEXT_COLOR, line.anchor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credits_are_right_aligned_below_title() {
        let mut h = Header::new("Etude").with_composer("F. Sor").with_arranger("M. Giuliani");
        let r = Renderer::headless(10.0);
        h.layout(500.0, &r);
        assert_eq!(h.lines.len(), 3);
        assert_eq!(h.lines[0].x, 250.0);
        assert_eq!(h.lines[2].text, "Arr. M. Giuliani");
        assert_eq!(h.rect().right, 500.0);
        assert!(h.lines[1].y > h.lines[0].y);
    }

    #[test]
    fn empty_header_has_no_extent() {
        let mut h = Header::default();
        assert!(h.is_empty());
        h.layout(500.0, &Renderer::headless(10.0));
        assert!(h.rect().is_empty());
    }
}
