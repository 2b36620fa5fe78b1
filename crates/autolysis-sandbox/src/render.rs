//! Raster chart rendering
//!
//! Draws a figure onto a white RGB canvas and writes it as PNG. Only
//! geometry is drawn: titles, labels and tick text are not rendered.

use crate::canvas::{Axes, BoxStats, Figure, Mark, MarkKind, Rect, PALETTE};
use crate::error::SnippetError;
use image::{ImageFormat, Rgb, RgbImage};
use std::f64::consts::TAU;
use std::path::Path;

const WHITE: [u8; 3] = [255, 255, 255];
const FRAME: [u8; 3] = [40, 40, 40];
const MISSING_CELL: [u8; 3] = [230, 230, 230];
const TICKS: usize = 5;

/// Rasterize `figure` and write it to `path` as PNG
pub(crate) fn render_png(figure: &Figure, path: &Path) -> Result<(), SnippetError> {
    rasterize(figure)
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| SnippetError::render(path, e.to_string()))
}

/// Pixel rectangle `[left, right) x [top, bottom)`
#[derive(Debug, Clone, Copy)]
struct Area {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Area {
    fn width(&self) -> f64 {
        self.right - self.left
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Data-to-pixel transform of one axes
#[derive(Debug, Clone, Copy)]
struct Transform {
    area: Area,
    x: (f64, f64),
    y: (f64, f64),
}

impl Transform {
    fn px(&self, x: f64) -> f64 {
        self.area.left + (x - self.x.0) / (self.x.1 - self.x.0) * self.area.width()
    }

    fn py(&self, y: f64) -> f64 {
        self.area.bottom - (y - self.y.0) / (self.y.1 - self.y.0) * self.area.height()
    }
}

pub(crate) fn rasterize(figure: &Figure) -> RgbImage {
    let mut image = RgbImage::from_pixel(figure.width, figure.height, Rgb(WHITE));
    let panel_w = f64::from(figure.width) / figure.cols as f64;
    let panel_h = f64::from(figure.height) / figure.rows as f64;

    for (i, axes) in figure.axes.iter().enumerate() {
        let (row, col) = (i / figure.cols, i % figure.cols);
        let (x0, y0) = (col as f64 * panel_w, row as f64 * panel_h);
        let area = Area {
            left: x0 + panel_w * 0.12,
            top: y0 + panel_h * 0.08,
            right: x0 + panel_w * 0.95,
            bottom: y0 + panel_h * 0.88,
        };
        draw_axes(&mut image, axes, area);
    }
    image
}

fn draw_axes(image: &mut RgbImage, axes: &Axes, area: Area) {
    let only_pies = !axes.marks.is_empty()
        && axes.marks.iter().all(|m| matches!(m.kind, MarkKind::Pie(_)));
    if only_pies {
        for mark in &axes.marks {
            if let MarkKind::Pie(values) = &mark.kind {
                draw_pie(image, area, values);
            }
        }
        return;
    }

    let transform = Transform {
        area,
        x: axes.xlim.map_or_else(|| padded(x_extent(axes)), normalized),
        y: axes.ylim.map_or_else(|| padded(y_extent(axes)), normalized),
    };

    for mark in &axes.marks {
        draw_mark(image, &transform, mark);
    }
    draw_frame(image, area);
}

fn normalized((lo, hi): (f64, f64)) -> (f64, f64) {
    if (hi - lo).abs() < f64::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

fn padded(extent: Option<(f64, f64)>) -> (f64, f64) {
    let (lo, hi) = normalized(extent.unwrap_or((0.0, 1.0)));
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

fn extend(extent: &mut Option<(f64, f64)>, v: f64) {
    if !v.is_finite() {
        return;
    }
    *extent = Some(match *extent {
        Some((lo, hi)) => (lo.min(v), hi.max(v)),
        None => (v, v),
    });
}

fn x_extent(axes: &Axes) -> Option<(f64, f64)> {
    let mut extent = None;
    for mark in &axes.marks {
        match &mark.kind {
            MarkKind::Line(points) | MarkKind::Points(points) => {
                points.iter().for_each(|(x, _)| extend(&mut extent, *x));
            }
            MarkKind::Rects(rects) => rects.iter().for_each(|r| {
                extend(&mut extent, r.x0);
                extend(&mut extent, r.x1);
            }),
            MarkKind::Box(stats) => {
                extend(&mut extent, stats.position - 0.5);
                extend(&mut extent, stats.position + 0.5);
            }
            MarkKind::Heatmap(rows) => {
                extend(&mut extent, 0.0);
                extend(&mut extent, rows.iter().map(Vec::len).max().unwrap_or(0) as f64);
            }
            MarkKind::VLine(x) => extend(&mut extent, *x),
            MarkKind::HLine(_) | MarkKind::Pie(_) => {}
        }
    }
    extent
}

fn y_extent(axes: &Axes) -> Option<(f64, f64)> {
    let mut extent = None;
    for mark in &axes.marks {
        match &mark.kind {
            MarkKind::Line(points) | MarkKind::Points(points) => {
                points.iter().for_each(|(_, y)| extend(&mut extent, *y));
            }
            MarkKind::Rects(rects) => rects.iter().for_each(|r| {
                extend(&mut extent, r.y0);
                extend(&mut extent, r.y1);
            }),
            MarkKind::Box(stats) => {
                extend(&mut extent, stats.low);
                extend(&mut extent, stats.high);
            }
            MarkKind::Heatmap(rows) => {
                extend(&mut extent, 0.0);
                extend(&mut extent, rows.len() as f64);
            }
            MarkKind::HLine(y) => extend(&mut extent, *y),
            MarkKind::VLine(_) | MarkKind::Pie(_) => {}
        }
    }
    extent
}

fn draw_mark(image: &mut RgbImage, t: &Transform, mark: &Mark) {
    let clip = t.area;
    match &mark.kind {
        MarkKind::Line(points) => {
            for pair in points.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                draw_line(image, clip, (t.px(a.0), t.py(a.1)), (t.px(b.0), t.py(b.1)), mark.color);
            }
            if points.len() == 1 {
                let (x, y) = points[0];
                draw_dot(image, clip, t.px(x), t.py(y), 2.0, mark.color);
            }
        }
        MarkKind::Points(points) => {
            for (x, y) in points {
                draw_dot(image, clip, t.px(*x), t.py(*y), 3.0, mark.color);
            }
        }
        MarkKind::Rects(rects) => {
            for r in rects {
                fill_data_rect(image, t, *r, mark.color);
            }
        }
        MarkKind::Box(stats) => draw_box(image, t, stats, mark.color),
        MarkKind::Heatmap(rows) => draw_heatmap(image, t, rows),
        MarkKind::HLine(y) => {
            let py = t.py(*y);
            draw_line(image, clip, (clip.left, py), (clip.right, py), mark.color);
        }
        MarkKind::VLine(x) => {
            let px = t.px(*x);
            draw_line(image, clip, (px, clip.top), (px, clip.bottom), mark.color);
        }
        MarkKind::Pie(values) => draw_pie(image, clip, values),
    }
}

fn draw_box(image: &mut RgbImage, t: &Transform, stats: &BoxStats, color: [u8; 3]) {
    let clip = t.area;
    let half = 0.3;
    let (left, right) = (t.px(stats.position - half), t.px(stats.position + half));
    let center = t.px(stats.position);
    fill_rect(image, clip, left, t.py(stats.q3), right, t.py(stats.q1), color);
    draw_line(image, clip, (left, t.py(stats.median)), (right, t.py(stats.median)), FRAME);
    draw_line(image, clip, (center, t.py(stats.q3)), (center, t.py(stats.high)), FRAME);
    draw_line(image, clip, (center, t.py(stats.q1)), (center, t.py(stats.low)), FRAME);
    let (cap_l, cap_r) = (t.px(stats.position - half / 2.0), t.px(stats.position + half / 2.0));
    draw_line(image, clip, (cap_l, t.py(stats.high)), (cap_r, t.py(stats.high)), FRAME);
    draw_line(image, clip, (cap_l, t.py(stats.low)), (cap_r, t.py(stats.low)), FRAME);
}

/// Row 0 is drawn at the top
fn draw_heatmap(image: &mut RgbImage, t: &Transform, rows: &[Vec<f64>]) {
    let finite = rows.iter().flatten().copied().filter(|v| v.is_finite());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let n = rows.len() as f64;
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            let color = if value.is_finite() {
                let share = if hi > lo { (value - lo) / (hi - lo) } else { 0.5 };
                coolwarm(share)
            } else {
                MISSING_CELL
            };
            let rect = Rect {
                x0: c as f64,
                x1: c as f64 + 1.0,
                y0: n - r as f64 - 1.0,
                y1: n - r as f64,
            };
            fill_data_rect(image, t, rect, color);
        }
    }
}

/// Diverging blue-white-red ramp over `[0, 1]`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn coolwarm(share: f64) -> [u8; 3] {
    let blue = [59.0, 76.0, 192.0];
    let mid = [221.0, 221.0, 221.0];
    let red = [180.0, 4.0, 38.0];
    let s = share.clamp(0.0, 1.0);
    let (from, to, k) = if s < 0.5 {
        (blue, mid, s * 2.0)
    } else {
        (mid, red, (s - 0.5) * 2.0)
    };
    let lerp = |i: usize| (from[i] + (to[i] - from[i]) * k).round() as u8;
    [lerp(0), lerp(1), lerp(2)]
}

/// Slices start at three o'clock and run counter-clockwise
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn draw_pie(image: &mut RgbImage, area: Area, values: &[f64]) {
    let positive: Vec<f64> = values.iter().map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 }).collect();
    let total: f64 = positive.iter().sum();
    if total <= 0.0 {
        return;
    }
    let mut bounds = Vec::with_capacity(positive.len());
    let mut acc = 0.0;
    for v in &positive {
        acc += v / total;
        bounds.push(acc);
    }

    let cx = (area.left + area.right) / 2.0;
    let cy = (area.top + area.bottom) / 2.0;
    let radius = area.width().min(area.height()) * 0.45;
    let (x_lo, x_hi) = ((cx - radius).floor().max(0.0), (cx + radius).ceil());
    let (y_lo, y_hi) = ((cy - radius).floor().max(0.0), (cy + radius).ceil());

    for py in y_lo as u32..=y_hi as u32 {
        for px in x_lo as u32..=x_hi as u32 {
            let (dx, dy) = (f64::from(px) - cx, cy - f64::from(py));
            if dx.hypot(dy) > radius {
                continue;
            }
            let fraction = dy.atan2(dx).rem_euclid(TAU) / TAU;
            let slice = bounds.iter().position(|b| fraction < *b).unwrap_or(bounds.len() - 1);
            put(image, px, py, PALETTE[slice % PALETTE.len()]);
        }
    }
}

fn draw_frame(image: &mut RgbImage, area: Area) {
    let Area {
        left,
        top,
        right,
        bottom,
    } = area;
    let full = Area {
        left: 0.0,
        top: 0.0,
        right: f64::from(image.width()),
        bottom: f64::from(image.height()),
    };
    draw_line(image, full, (left, top), (right, top), FRAME);
    draw_line(image, full, (left, bottom), (right, bottom), FRAME);
    draw_line(image, full, (left, top), (left, bottom), FRAME);
    draw_line(image, full, (right, top), (right, bottom), FRAME);
    for i in 0..=TICKS {
        let share = i as f64 / TICKS as f64;
        let x = left + share * area.width();
        let y = bottom - share * area.height();
        draw_line(image, full, (x, bottom), (x, bottom + 4.0), FRAME);
        draw_line(image, full, (left - 4.0, y), (left, y), FRAME);
    }
}

fn fill_data_rect(image: &mut RgbImage, t: &Transform, r: Rect, color: [u8; 3]) {
    fill_rect(image, t.area, t.px(r.x0), t.py(r.y1), t.px(r.x1), t.py(r.y0), color);
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fill_rect(image: &mut RgbImage, clip: Area, x0: f64, y0: f64, x1: f64, y1: f64, color: [u8; 3]) {
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
        return;
    }
    let (l, r) = (x0.min(x1).max(clip.left), x0.max(x1).min(clip.right));
    let (t, b) = (y0.min(y1).max(clip.top), y0.max(y1).min(clip.bottom));
    if l >= r || t >= b {
        return;
    }
    for py in t.round() as u32..b.round().max(t.round() + 1.0) as u32 {
        for px in l.round() as u32..r.round().max(l.round() + 1.0) as u32 {
            put(image, px, py, color);
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn draw_dot(image: &mut RgbImage, clip: Area, cx: f64, cy: f64, radius: f64, color: [u8; 3]) {
    if !(cx.is_finite() && cy.is_finite()) {
        return;
    }
    let lo_x = (cx - radius).max(clip.left).floor();
    let hi_x = (cx + radius).min(clip.right).ceil();
    let lo_y = (cy - radius).max(clip.top).floor();
    let hi_y = (cy + radius).min(clip.bottom).ceil();
    if lo_x > hi_x || lo_y > hi_y {
        return;
    }
    for py in lo_y as u32..=hi_y as u32 {
        for px in lo_x as u32..=hi_x as u32 {
            if (f64::from(px) - cx).hypot(f64::from(py) - cy) <= radius {
                put(image, px, py, color);
            }
        }
    }
}

/// Two-pixel line, clipped to `clip` before stepping
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn draw_line(image: &mut RgbImage, clip: Area, a: (f64, f64), b: (f64, f64), color: [u8; 3]) {
    let Some(((x0, y0), (x1, y1))) = clip_segment(clip, a, b) else {
        return;
    };
    let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0);
    for i in 0..=steps as u32 {
        let k = f64::from(i) / steps;
        let (x, y) = (x0 + (x1 - x0) * k, y0 + (y1 - y0) * k);
        let (px, py) = (x.round().max(0.0) as u32, y.round().max(0.0) as u32);
        put(image, px, py, color);
        put(image, px + 1, py, color);
        put(image, px, py + 1, color);
    }
}

/// Liang-Barsky clipping; `None` when the segment misses the area
fn clip_segment(clip: Area, a: (f64, f64), b: (f64, f64)) -> Option<((f64, f64), (f64, f64))> {
    if ![a.0, a.1, b.0, b.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    let edges = [
        (-dx, a.0 - clip.left),
        (dx, clip.right - a.0),
        (-dy, a.1 - clip.top),
        (dy, clip.bottom - a.1),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }
    if t0 > t1 {
        return None;
    }
    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

fn put(image: &mut RgbImage, x: u32, y: u32, color: [u8; 3]) {
    if x < image.width() && y < image.height() {
        image.put_pixel(x, y, Rgb(color));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;

    fn figure_with(kind: MarkKind) -> Figure {
        let mut canvas = Canvas::new((320, 240), 4000);
        let axes = canvas.gca().unwrap();
        canvas.axes_mut(axes).unwrap().push(kind, Some([255, 0, 0]));
        canvas.finish().unwrap()
    }

    fn count_color(image: &RgbImage, color: [u8; 3]) -> usize {
        image.pixels().filter(|p| p.0 == color).count()
    }

    #[test]
    fn line_is_drawn() {
        let image = rasterize(&figure_with(MarkKind::Line(vec![(0.0, 0.0), (1.0, 1.0)])));
        assert_eq!(image.dimensions(), (320, 240));
        assert!(count_color(&image, [255, 0, 0]) > 100);
    }

    #[test]
    fn bars_fill_area() {
        let rects = vec![Rect {
            x0: -0.4,
            x1: 0.4,
            y0: 0.0,
            y1: 3.0,
        }];
        let image = rasterize(&figure_with(MarkKind::Rects(rects)));
        assert!(count_color(&image, [255, 0, 0]) > 1000);
    }

    #[test]
    fn empty_figure_is_white_with_frame() {
        let canvas_figure = {
            let mut canvas = Canvas::new((100, 100), 4000);
            canvas.open(1, 1, None).unwrap();
            canvas.finish().unwrap()
        };
        let image = rasterize(&canvas_figure);
        assert!(count_color(&image, FRAME) > 0);
        assert!(count_color(&image, WHITE) > 5000);
    }

    #[test]
    fn clipping_rejects_outside_segments() {
        let area = Area {
            left: 0.0,
            top: 0.0,
            right: 10.0,
            bottom: 10.0,
        };
        assert!(clip_segment(area, (-5.0, -5.0), (-1.0, -1.0)).is_none());
        let ((x0, _), (x1, _)) = clip_segment(area, (-5.0, 5.0), (15.0, 5.0)).unwrap();
        assert_eq!((x0, x1), (0.0, 10.0));
        assert!(clip_segment(area, (f64::NAN, 0.0), (1.0, 1.0)).is_none());
    }

    #[test]
    fn png_roundtrip_keeps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph_1.png");
        render_png(&figure_with(MarkKind::Pie(vec![1.0, 2.0])), &path).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 240));
    }
}
