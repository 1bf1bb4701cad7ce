//! SVG builder: accumulates SVG elements and produces the final string.

use crate::geometry::Rect;

use super::{DrawSurface, TextAnchor};

pub struct SvgBuilder {
    elements: Vec<String>,
    view: Rect,
}

impl SvgBuilder {
    /// Builder whose viewBox covers `view`.
    pub fn new(view: Rect) -> Self {
        Self { elements: Vec::new(), view }
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn build(self) -> String {
        let (w, h) = (self.view.width(), self.view.height());
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="{:.1} {:.1} {:.1} {:.1}" width="{:.1}" height="{:.1}" style="font-family: 'Georgia', 'Times New Roman', serif;">"#,
            self.view.left, self.view.top, w, h, w, h
        );
        svg.push('\n');
        for el in &self.elements {
            svg.push_str("  ");
            svg.push_str(el);
            svg.push('\n');
        }
        svg.push_str("</svg>\n");
        svg
    }
}

impl DrawSurface for SvgBuilder {
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: &str, width: f64) {
        self.elements.push(format!(
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="{:.2}" stroke-linecap="round"/>"#,
            x1, y1, x2, y2, color, width
        ));
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str, stroke: &str, stroke_width: f64) {
        if stroke_width > 0.0 {
            self.elements.push(format!(
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" stroke="{}" stroke-width="{:.2}"/>"#,
                x, y, w, h, fill, stroke, stroke_width
            ));
        } else {
            self.elements.push(format!(
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
                x, y, w, h, fill
            ));
        }
    }

    fn ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, filled: bool, color: &str, stroke_width: f64) {
        if filled {
            self.elements.push(format!(
                r#"<ellipse cx="{:.1}" cy="{:.1}" rx="{:.1}" ry="{:.1}" fill="{}" stroke="none" transform="rotate(-15,{:.1},{:.1})"/>"#,
                cx, cy, rx, ry, color, cx, cy
            ));
        } else {
            self.elements.push(format!(
                r#"<ellipse cx="{:.1}" cy="{:.1}" rx="{:.1}" ry="{:.1}" fill="none" stroke="{}" stroke-width="{:.2}" transform="rotate(-15,{:.1},{:.1})"/>"#,
                cx,
                cy,
                rx - stroke_width / 2.0,
                ry - stroke_width / 2.0,
                color,
                stroke_width,
                cx,
                cy
            ));
        }
    }

    fn path(&mut self, d: &str, fill: &str, stroke: &str, stroke_width: f64) {
        self.elements.push(format!(
            r#"<path d="{}" fill="{}" stroke="{}" stroke-width="{:.2}" stroke-linecap="round"/>"#,
            d, fill, stroke, stroke_width
        ));
    }

    fn text(&mut self, x: f64, y: f64, content: &str, size: f64, fill: &str, anchor: TextAnchor) {
        let escaped = escape(content);
        let anchor = match anchor {
            TextAnchor::Start => "start",
            TextAnchor::Middle => "middle",
            TextAnchor::End => "end",
        };
        self.elements.push(format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="{:.1}" fill="{}" text-anchor="{}" dominant-baseline="central">{}</text>"#,
            x, y, size, fill, anchor, escaped
        ));
    }

    fn image(&mut self, x: f64, y: f64, w: f64, h: f64, href: &str) {
        self.elements.push(format!(
            r#"<image x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" href="{}"/>"#,
            x,
            y,
            w,
            h,
            escape(href).replace('"', "&quot;")
        ));
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Placeholder SVG for a document that has nothing to draw.
pub fn empty_svg(message: &str) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 400 100\">\
         <text x=\"200\" y=\"50\" text-anchor=\"middle\" font-size=\"14\" fill=\"gray\">{}</text>\
         </svg>",
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_escaped() {
        let mut svg = SvgBuilder::new(Rect::new(0.0, 0.0, 100.0, 50.0));
        svg.text(1.0, 2.0, "A<B & C>", 10.0, "#000", TextAnchor::Middle);
        let out = svg.build();
        assert!(out.contains("A&lt;B &amp; C&gt;"));
        assert!(out.contains(r#"viewBox="0.0 0.0 100.0 50.0""#));
    }
}
