//! Replays overlay display lists onto a 2D canvas

use inksign_core::{
    AnnotationId, DrawCommand, Point, Rect, SignatureCache, Stroke, SurfaceLayout, TextAlign,
    TextDecoration,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

const LINE_HEIGHT: f64 = inksign_core::render::LINE_HEIGHT;

/// CSS `pointer-events` for the overlay. It only takes input while it
/// owns the pointer; otherwise clicks reach the page image underneath.
pub fn pointer_events(captures: bool) -> &'static str {
    if captures {
        "auto"
    } else {
        "none"
    }
}

/// Overlay canvas stacked on top of one page image
pub struct OverlaySurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    image: HtmlImageElement,
}

impl OverlaySurface {
    pub fn new(canvas: HtmlCanvasElement, image: HtmlImageElement) -> Result<Self, JsValue> {
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("Canvas has no 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()?;
        Ok(Self { canvas, ctx, image })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    pub fn image(&self) -> &HtmlImageElement {
        &self.image
    }

    pub fn set_pointer_events(&self, captures: bool) -> Result<(), JsValue> {
        self.canvas
            .style()
            .set_property("pointer-events", pointer_events(captures))
    }

    /// Same cursor on both layers, whichever one the pointer is over
    pub fn set_cursor(&self, cursor: &str) -> Result<(), JsValue> {
        self.canvas.style().set_property("cursor", cursor)?;
        self.image.style().set_property("cursor", cursor)
    }

    /// On-screen rect of the page image element
    pub fn image_rect(&self) -> Rect {
        let r = self.image.get_bounding_client_rect();
        Rect::new(r.left(), r.top(), r.width(), r.height())
    }

    /// Pin the canvas over the image and size its backing store
    pub fn layout(&self, layout: &SurfaceLayout) -> Result<(), JsValue> {
        let style = self.canvas.style();
        let css = layout.css;
        let parent = self
            .canvas
            .offset_parent()
            .map(|p| p.get_bounding_client_rect());
        let (left, top) = match parent {
            Some(p) => (css.x - p.left(), css.y - p.top()),
            None => (css.x, css.y),
        };
        style.set_property("position", "absolute")?;
        style.set_property("left", &format!("{}px", left))?;
        style.set_property("top", &format!("{}px", top))?;
        style.set_property("width", &format!("{}px", css.width.max(0.0)))?;
        style.set_property("height", &format!("{}px", css.height.max(0.0)))?;

        let (w, h) = (layout.backing_width(), layout.backing_height());
        if self.canvas.width() != w {
            self.canvas.set_width(w);
        }
        if self.canvas.height() != h {
            self.canvas.set_height(h);
        }
        Ok(())
    }

    pub fn replay(
        &self,
        commands: &[DrawCommand],
        cache: &SignatureCache<HtmlImageElement>,
    ) -> Result<(), JsValue> {
        for cmd in commands {
            self.draw(cmd, cache)?;
        }
        Ok(())
    }

    fn draw(
        &self,
        cmd: &DrawCommand,
        cache: &SignatureCache<HtmlImageElement>,
    ) -> Result<(), JsValue> {
        let ctx = &self.ctx;
        match cmd {
            DrawCommand::Begin { scale, .. } => {
                ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)?;
                ctx.clear_rect(0.0, 0.0, self.canvas.width() as f64, self.canvas.height() as f64);
                ctx.set_transform(*scale, 0.0, 0.0, *scale, 0.0, 0.0)?;
            }
            DrawCommand::Save => ctx.save(),
            DrawCommand::Restore => ctx.restore(),
            DrawCommand::Rotate { center, degrees } => {
                ctx.translate(center.x, center.y)?;
                ctx.rotate(degrees.to_radians())?;
                ctx.translate(-center.x, -center.y)?;
            }
            DrawCommand::Rect {
                rect,
                radius,
                fill,
                stroke,
            } => {
                ctx.begin_path();
                if *radius > 0.0 {
                    rounded_rect_path(ctx, *rect, *radius)?;
                } else {
                    ctx.rect(rect.x, rect.y, rect.width, rect.height);
                }
                if let Some(fill) = fill {
                    ctx.set_fill_style_str(&fill.to_css());
                    ctx.fill();
                }
                if let Some(stroke) = stroke {
                    self.stroke(stroke)?;
                }
            }
            DrawCommand::Ellipse { rect, fill, stroke } => {
                let c = rect.center();
                ctx.begin_path();
                ctx.ellipse(
                    c.x,
                    c.y,
                    rect.width / 2.0,
                    rect.height / 2.0,
                    0.0,
                    0.0,
                    std::f64::consts::TAU,
                )?;
                if let Some(fill) = fill {
                    ctx.set_fill_style_str(&fill.to_css());
                    ctx.fill();
                }
                if let Some(stroke) = stroke {
                    self.stroke(stroke)?;
                }
            }
            DrawCommand::Line { from, to, stroke } => {
                ctx.begin_path();
                ctx.move_to(from.x, from.y);
                ctx.line_to(to.x, to.y);
                self.stroke(stroke)?;
            }
            DrawCommand::Polyline { points, stroke } => {
                let Some((first, rest)) = points.split_first() else {
                    return Ok(());
                };
                ctx.begin_path();
                ctx.move_to(first.x, first.y);
                for p in rest {
                    ctx.line_to(p.x, p.y);
                }
                ctx.set_line_join("round");
                ctx.set_line_cap("round");
                self.stroke(stroke)?;
            }
            DrawCommand::Text {
                lines,
                origin,
                font,
                size_px,
                color,
                align,
                decoration,
            } => {
                ctx.set_font(font);
                ctx.set_fill_style_str(&color.to_css());
                ctx.set_text_baseline("top");
                ctx.set_text_align(match align {
                    TextAlign::Left => "left",
                    TextAlign::Center => "center",
                    TextAlign::Right => "right",
                });
                for (i, line) in lines.iter().enumerate() {
                    let y = origin.y + i as f64 * size_px * LINE_HEIGHT;
                    ctx.fill_text(line, origin.x, y)?;
                    if *decoration != TextDecoration::None {
                        let at = Point::new(origin.x, y);
                        self.decorate(line, at, *size_px, *align, *decoration, &color.to_css())?;
                    }
                }
            }
            DrawCommand::Image { id, rect } => self.draw_signature(*id, *rect, cache)?,
        }
        Ok(())
    }

    fn stroke(&self, stroke: &Stroke) -> Result<(), JsValue> {
        let ctx = &self.ctx;
        let dash = js_sys::Array::new();
        if let Some([on, off]) = stroke.dash {
            dash.push(&JsValue::from_f64(on));
            dash.push(&JsValue::from_f64(off));
        }
        ctx.set_line_dash(&dash)?;
        ctx.set_stroke_style_str(&stroke.color.to_css());
        ctx.set_line_width(stroke.width);
        ctx.stroke();
        Ok(())
    }

    fn decorate(
        &self,
        line: &str,
        at: Point,
        size: f64,
        align: TextAlign,
        decoration: TextDecoration,
        color: &str,
    ) -> Result<(), JsValue> {
        let width = self.ctx.measure_text(line)?.width();
        let x = match align {
            TextAlign::Left => at.x,
            TextAlign::Center => at.x - width / 2.0,
            TextAlign::Right => at.x - width,
        };
        let y = match decoration {
            TextDecoration::Underline => at.y + size * 0.95,
            _ => at.y + size * 0.55,
        };
        self.ctx.set_fill_style_str(color);
        self.ctx.fill_rect(x, y, width, (size / 14.0).max(1.0));
        Ok(())
    }

    fn draw_signature(
        &self,
        id: AnnotationId,
        rect: Rect,
        cache: &SignatureCache<HtmlImageElement>,
    ) -> Result<(), JsValue> {
        if let Some(img) = cache.get(id) {
            self.ctx.draw_image_with_html_image_element_and_dw_and_dh(
                img,
                rect.x,
                rect.y,
                rect.width,
                rect.height,
            )?;
        }
        Ok(())
    }
}

fn rounded_rect_path(ctx: &CanvasRenderingContext2d, r: Rect, radius: f64) -> Result<(), JsValue> {
    let radius = radius.min(r.width / 2.0).min(r.height / 2.0);
    ctx.move_to(r.x + radius, r.y);
    ctx.arc_to(r.right(), r.y, r.right(), r.bottom(), radius)?;
    ctx.arc_to(r.right(), r.bottom(), r.x, r.bottom(), radius)?;
    ctx.arc_to(r.x, r.bottom(), r.x, r.y, radius)?;
    ctx.arc_to(r.x, r.y, r.right(), r.y, radius)?;
    ctx.close_path();
    Ok(())
}
