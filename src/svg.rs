//! SVG generation from render commands.

use crate::element::{Color, ObjectFit};
use crate::render::{Rect, RenderCommand, RenderTree, TextLineRender};

/// Options for SVG generation.
#[derive(Debug, Clone)]
pub struct SvgOptions {
    /// Include XML declaration
    pub xml_declaration: bool,
    /// Decimal precision for coordinates
    pub precision: usize,
    /// Fill painted under everything else
    pub background: Option<Color>,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            xml_declaration: true,
            precision: 2,
            background: None,
        }
    }
}

/// Generate SVG string from render tree.
pub fn generate_svg(tree: &RenderTree, options: &SvgOptions) -> String {
    let mut svg = SvgBuilder::new(tree.width, tree.height, options);

    if let Some(background) = options.background {
        let rect = Rect {
            x: 0.0,
            y: 0.0,
            width: tree.width,
            height: tree.height,
        };
        svg.render_fill_rect(&rect, &background, &[0.0; 4]);
    }

    for command in &tree.commands {
        svg.render_command(command);
    }

    svg.finish()
}

struct SvgBuilder<'a> {
    output: String,
    options: &'a SvgOptions,
    clip_id_counter: u32,
}

impl<'a> SvgBuilder<'a> {
    fn new(width: f32, height: f32, options: &'a SvgOptions) -> Self {
        let mut output = String::new();

        if options.xml_declaration {
            output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        }

        output.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" \
             xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
             width=\"{:.p$}\" height=\"{:.p$}\" \
             viewBox=\"0 0 {:.p$} {:.p$}\">",
            width,
            height,
            width,
            height,
            p = options.precision
        ));

        Self {
            output,
            options,
            clip_id_counter: 0,
        }
    }

    fn render_command(&mut self, cmd: &RenderCommand) {
        match cmd {
            RenderCommand::FillRect {
                rect,
                color,
                border_radius,
            } => {
                self.render_fill_rect(rect, color, border_radius);
            }

            RenderCommand::Text {
                font_family,
                font_size,
                font_weight,
                color,
                accent_color,
                lines,
            } => {
                self.render_text(
                    font_family,
                    *font_size,
                    *font_weight,
                    color,
                    accent_color.as_ref(),
                    lines,
                );
            }

            RenderCommand::Image {
                rect,
                src,
                object_fit,
                border_radius,
            } => {
                self.render_image(rect, src, *object_fit, border_radius);
            }
        }
    }

    fn render_fill_rect(
        &mut self,
        rect: &Rect,
        color: &Color,
        border_radius: &[f32; 4],
    ) {
        if color.a == 0 {
            return;
        }

        let p = self.options.precision;
        let has_radius = border_radius.iter().any(|&r| r > 0.0);

        if has_radius && !all_same(border_radius) {
            // Different corner radii - use path
            self.output.push_str(&format!(
                "<path d=\"{}\" fill=\"{}\"/>",
                rounded_rect_path(rect, border_radius, p),
                color.to_css()
            ));
        } else if has_radius {
            // Same radius on all corners
            self.output.push_str(&format!(
                "<rect x=\"{:.p$}\" y=\"{:.p$}\" width=\"{:.p$}\" height=\"{:.p$}\" \
                 rx=\"{:.p$}\" fill=\"{}\"/>",
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                border_radius[0],
                color.to_css(),
                p = p
            ));
        } else {
            // No radius
            self.output.push_str(&format!(
                "<rect x=\"{:.p$}\" y=\"{:.p$}\" width=\"{:.p$}\" height=\"{:.p$}\" \
                 fill=\"{}\"/>",
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                color.to_css(),
                p = p
            ));
        }
    }

    fn render_text(
        &mut self,
        font_family: &str,
        font_size: f32,
        font_weight: u16,
        color: &Color,
        accent_color: Option<&Color>,
        lines: &[TextLineRender],
    ) {
        let p = self.options.precision;

        if lines.is_empty() {
            return;
        }

        self.output.push_str(&format!(
            "<text xml:space=\"preserve\" fill=\"{}\" \
             font-family=\"{}\" \
             font-size=\"{:.p$}\" \
             font-weight=\"{}\">",
            color.to_css(),
            escape_xml(font_family),
            font_size,
            font_weight,
            p = p
        ));
        for line in lines {
            self.output.push_str(&format!(
                "<tspan x=\"{:.p$}\" y=\"{:.p$}\">",
                line.x,
                line.y,
                p = p
            ));
            for span in &line.spans {
                match accent_color.filter(|_| span.accent) {
                    Some(accent) => self.output.push_str(&format!(
                        "<tspan fill=\"{}\">{}</tspan>",
                        accent.to_css(),
                        escape_xml(&span.text)
                    )),
                    None => self.output.push_str(&escape_xml(&span.text)),
                }
            }
            self.output.push_str("</tspan>");
        }
        self.output.push_str("</text>");
    }

    fn render_image(
        &mut self,
        rect: &Rect,
        src: &str,
        object_fit: ObjectFit,
        border_radius: &[f32; 4],
    ) {
        let p = self.options.precision;
        let aspect = match object_fit {
            ObjectFit::Contain => "xMidYMid meet",
            ObjectFit::Cover => "xMidYMid slice",
            ObjectFit::Fill => "none",
        };
        let has_radius = border_radius.iter().any(|&r| r > 0.0);

        if has_radius {
            // Need to clip the image
            let clip_id = self.clip_id_counter;
            self.clip_id_counter += 1;

            self.output.push_str("<defs>");
            self.output
                .push_str(&format!("<clipPath id=\"img-clip-{}\">", clip_id));

            if all_same(border_radius) {
                self.output.push_str(&format!(
                    "<rect x=\"{:.p$}\" y=\"{:.p$}\" width=\"{:.p$}\" height=\"{:.p$}\" rx=\"{:.p$}\"/>",
                    rect.x, rect.y, rect.width, rect.height, border_radius[0],
                    p = p
                ));
            } else {
                self.output.push_str(&format!(
                    "<path d=\"{}\"/>",
                    rounded_rect_path(rect, border_radius, p)
                ));
            }

            self.output.push_str("</clipPath></defs>");

            self.output.push_str(&format!(
                "<image x=\"{:.p$}\" y=\"{:.p$}\" width=\"{:.p$}\" height=\"{:.p$}\" \
                 preserveAspectRatio=\"{}\" xlink:href=\"{}\" clip-path=\"url(#img-clip-{})\"/>",
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                aspect,
                escape_xml(src),
                clip_id,
                p = p
            ));
        } else {
            self.output.push_str(&format!(
                "<image x=\"{:.p$}\" y=\"{:.p$}\" width=\"{:.p$}\" height=\"{:.p$}\" \
                 preserveAspectRatio=\"{}\" xlink:href=\"{}\"/>",
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                aspect,
                escape_xml(src),
                p = p
            ));
        }
    }

    fn finish(mut self) -> String {
        self.output.push_str("</svg>");
        self.output
    }
}

/// Generate SVG path for rounded rectangle.
fn rounded_rect_path(rect: &Rect, radii: &[f32; 4], precision: usize) -> String {
    let [tl, tr, br, bl] = *radii;
    let (x, y, w, h) = (rect.x, rect.y, rect.width, rect.height);

    // Clamp radii to fit in rect
    let max_radius = (w / 2.0).min(h / 2.0);
    let tl = tl.min(max_radius);
    let tr = tr.min(max_radius);
    let br = br.min(max_radius);
    let bl = bl.min(max_radius);

    format!(
        "M {:.p$},{:.p$} \
         L {:.p$},{:.p$} \
         Q {:.p$},{:.p$} {:.p$},{:.p$} \
         L {:.p$},{:.p$} \
         Q {:.p$},{:.p$} {:.p$},{:.p$} \
         L {:.p$},{:.p$} \
         Q {:.p$},{:.p$} {:.p$},{:.p$} \
         L {:.p$},{:.p$} \
         Q {:.p$},{:.p$} {:.p$},{:.p$} \
         Z",
        // Start after top-left corner
        x + tl,
        y,
        // Top edge to top-right corner
        x + w - tr,
        y,
        // Top-right corner
        x + w,
        y,
        x + w,
        y + tr,
        // Right edge to bottom-right corner
        x + w,
        y + h - br,
        // Bottom-right corner
        x + w,
        y + h,
        x + w - br,
        y + h,
        // Bottom edge to bottom-left corner
        x + bl,
        y + h,
        // Bottom-left corner
        x,
        y + h,
        x,
        y + h - bl,
        // Left edge to top-left corner
        x,
        y + tl,
        // Top-left corner
        x,
        y,
        x + tl,
        y,
        p = precision
    )
}

fn all_same(arr: &[f32; 4]) -> bool {
    arr.iter().all(|&x| (x - arr[0]).abs() < 0.001)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("<test>"), "&lt;test&gt;");
        assert_eq!(escape_xml("a & b"), "a &amp; b");
    }

    #[test]
    fn test_all_same() {
        assert!(all_same(&[5.0, 5.0, 5.0, 5.0]));
        assert!(!all_same(&[5.0, 5.0, 0.0, 5.0]));
    }

    fn tree(commands: Vec<RenderCommand>) -> RenderTree {
        RenderTree {
            commands,
            width: 100.0,
            height: 50.0,
        }
    }

    #[test]
    fn test_background_painted_first() {
        let options = SvgOptions {
            xml_declaration: false,
            background: Color::parse("#3B1A35"),
            ..Default::default()
        };
        let svg = generate_svg(&tree(vec![]), &options);
        insta::assert_snapshot!(svg, @r###"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="100.00" height="50.00" viewBox="0 0 100.00 50.00"><rect x="0.00" y="0.00" width="100.00" height="50.00" fill="#3b1a35"/></svg>"###);
    }

    #[test]
    fn test_accent_span_gets_accent_fill() {
        let line = TextLineRender {
            x: 0.0,
            y: 16.0,
            spans: vec![
                crate::render::TextSpan {
                    text: "Hi ".into(),
                    accent: false,
                },
                crate::render::TextSpan {
                    text: "there".into(),
                    accent: true,
                },
            ],
        };
        let svg = generate_svg(
            &tree(vec![RenderCommand::Text {
                font_family: "sans-serif".into(),
                font_size: 16.0,
                font_weight: 400,
                color: Color::WHITE,
                accent_color: Color::parse("#ff0000"),
                lines: vec![line],
            }]),
            &SvgOptions::default(),
        );
        assert!(svg.contains("<tspan x=\"0.00\" y=\"16.00\">Hi <tspan fill=\"#ff0000\">there</tspan></tspan>"));
    }

    #[test]
    fn test_image_object_fit() {
        let svg = generate_svg(
            &tree(vec![RenderCommand::Image {
                rect: Rect {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                },
                src: "data:image/png;base64,AAAA".into(),
                object_fit: ObjectFit::Cover,
                border_radius: [0.0; 4],
            }]),
            &SvgOptions::default(),
        );
        assert!(svg.contains("preserveAspectRatio=\"xMidYMid slice\""));
    }
}
