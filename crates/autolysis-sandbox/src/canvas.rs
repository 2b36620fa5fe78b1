//! Per-block figure state
//!
//! A [`Canvas`] is created for one block and dropped with it. It owns every
//! figure the block opens; nothing survives into the next block.

use crate::error::SnippetError;

/// Pixels per inch of figure size
pub(crate) const DPI: f64 = 100.0;

/// Matplotlib's default color cycle
pub(crate) const PALETTE: [[u8; 3]; 10] = [
    [31, 119, 180],
    [255, 127, 14],
    [44, 160, 44],
    [214, 39, 40],
    [148, 103, 189],
    [140, 86, 75],
    [227, 119, 194],
    [127, 127, 127],
    [188, 189, 34],
    [23, 190, 207],
];

/// Color name, single-letter code or `#rrggbb`
pub(crate) fn parse_color(spec: &str) -> Option<[u8; 3]> {
    let spec = spec.trim().to_ascii_lowercase();
    if let Some(hex) = spec.strip_prefix('#') {
        if hex.len() == 6 {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            return Some([channel(0)?, channel(2)?, channel(4)?]);
        }
        return None;
    }
    if let Some(n) = spec.strip_prefix("c").and_then(|n| n.parse::<usize>().ok()) {
        return PALETTE.get(n).copied();
    }
    Some(match spec.as_str() {
        "b" | "blue" => [0, 0, 255],
        "g" | "green" => [0, 128, 0],
        "r" | "red" => [255, 0, 0],
        "c" | "cyan" => [0, 191, 191],
        "m" | "magenta" => [191, 0, 191],
        "y" | "yellow" => [191, 191, 0],
        "k" | "black" => [0, 0, 0],
        "w" | "white" => [255, 255, 255],
        "orange" => [255, 165, 0],
        "purple" => [128, 0, 128],
        "gray" | "grey" => [128, 128, 128],
        "skyblue" => [135, 206, 235],
        "steelblue" => [70, 130, 180],
        "navy" => [0, 0, 128],
        "teal" => [0, 128, 128],
        "salmon" => [250, 128, 114],
        "coral" => [255, 127, 80],
        "pink" => [255, 192, 203],
        "brown" => [165, 42, 42],
        "gold" => [255, 215, 0],
        "lightblue" => [173, 216, 230],
        "lightgreen" => [144, 238, 144],
        "darkblue" => [0, 0, 139],
        "darkgreen" => [0, 100, 0],
        "darkred" => [139, 0, 0],
        _ => return None,
    })
}

/// Handle to one axes of one figure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AxesRef {
    pub(crate) figure: usize,
    pub(crate) axes: usize,
}

/// Rectangle in data coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Rect {
    pub(crate) x0: f64,
    pub(crate) x1: f64,
    pub(crate) y0: f64,
    pub(crate) y1: f64,
}

/// Five-number summary drawn as a box
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BoxStats {
    pub(crate) position: f64,
    pub(crate) low: f64,
    pub(crate) q1: f64,
    pub(crate) median: f64,
    pub(crate) q3: f64,
    pub(crate) high: f64,
}

impl BoxStats {
    /// Whiskers reach the furthest values within 1.5 IQR of the box
    pub(crate) fn from_values(position: f64, values: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let sorted = autolysis_table::stats::sorted(&finite);
        let q = |p| autolysis_table::stats::quantile_sorted(&sorted, p);
        let (q1, median, q3) = (q(0.25)?, q(0.5)?, q(0.75)?);
        let reach = 1.5 * (q3 - q1);
        let low = sorted.iter().copied().find(|v| *v >= q1 - reach).unwrap_or(q1);
        let high = sorted.iter().rev().copied().find(|v| *v <= q3 + reach).unwrap_or(q3);
        Some(Self {
            position,
            low,
            q1,
            median,
            q3,
            high,
        })
    }
}

/// Drawable element
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MarkKind {
    Line(Vec<(f64, f64)>),
    Points(Vec<(f64, f64)>),
    Rects(Vec<Rect>),
    Box(BoxStats),
    Heatmap(Vec<Vec<f64>>),
    HLine(f64),
    VLine(f64),
    Pie(Vec<f64>),
}

/// Element with its color
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Mark {
    pub(crate) kind: MarkKind,
    pub(crate) color: [u8; 3],
}

/// One plotting area
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Axes {
    pub(crate) marks: Vec<Mark>,
    pub(crate) xlim: Option<(f64, f64)>,
    pub(crate) ylim: Option<(f64, f64)>,
    pub(crate) title: Option<String>,
    pub(crate) xlabel: Option<String>,
    pub(crate) ylabel: Option<String>,
    categories: Vec<String>,
    next_color: usize,
}

impl Axes {
    /// Add a mark, taking the next cycle color unless one is given
    pub(crate) fn push(&mut self, kind: MarkKind, color: Option<[u8; 3]>) {
        let color = color.unwrap_or_else(|| {
            let c = PALETTE[self.next_color % PALETTE.len()];
            self.next_color += 1;
            c
        });
        self.marks.push(Mark { kind, color });
    }

    /// Position of a categorical tick, assigned on first use
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn category(&mut self, label: &str) -> f64 {
        if let Some(i) = self.categories.iter().position(|c| c == label) {
            return i as f64;
        }
        self.categories.push(label.to_string());
        (self.categories.len() - 1) as f64
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

/// One figure: a grid of axes and a pixel size
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Figure {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) axes: Vec<Axes>,
    current_axes: usize,
}

impl Figure {
    fn new(width: u32, height: u32, rows: usize, cols: usize) -> Self {
        Self {
            width,
            height,
            rows,
            cols,
            axes: vec![Axes::default(); rows * cols],
            current_axes: 0,
        }
    }

    /// Whether any axes holds a mark
    pub(crate) fn has_marks(&self) -> bool {
        self.axes.iter().any(|a| !a.is_empty())
    }
}

/// Which figures `plt.close` removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseTarget {
    Current,
    All,
    Figure(usize),
}

/// Figure registry for one block
#[derive(Debug)]
pub(crate) struct Canvas {
    figures: Vec<Option<Figure>>,
    current: Option<usize>,
    saved: Option<Figure>,
    default_size: (u32, u32),
    max_dimension: u32,
}

impl Canvas {
    pub(crate) fn new(default_size: (u32, u32), max_dimension: u32) -> Self {
        Self {
            figures: Vec::new(),
            current: None,
            saved: None,
            default_size,
            max_dimension,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn pixels(&self, inches: Option<(f64, f64)>) -> (u32, u32) {
        let clamp = |px: f64| px.round().clamp(50.0, f64::from(self.max_dimension)) as u32;
        match inches {
            Some((w, h)) if w.is_finite() && h.is_finite() => (clamp(w * DPI), clamp(h * DPI)),
            _ => self.default_size,
        }
    }

    /// Open a figure with a `rows` x `cols` grid and make it current
    pub(crate) fn open(
        &mut self,
        rows: usize,
        cols: usize,
        inches: Option<(f64, f64)>,
    ) -> Result<usize, SnippetError> {
        if rows == 0 || cols == 0 || rows * cols > 64 {
            return Err(SnippetError::value_error(format!(
                "invalid subplot grid {rows}x{cols}"
            )));
        }
        let (width, height) = self.pixels(inches);
        self.figures.push(Some(Figure::new(width, height, rows, cols)));
        let id = self.figures.len() - 1;
        self.current = Some(id);
        Ok(id)
    }

    /// Current figure, opening one when none is open
    pub(crate) fn current_figure(&mut self) -> Result<usize, SnippetError> {
        match self.current {
            Some(id) => Ok(id),
            None => self.open(1, 1, None),
        }
    }

    /// Current axes of the current figure
    pub(crate) fn gca(&mut self) -> Result<AxesRef, SnippetError> {
        let figure = self.current_figure()?;
        let axes = self.figure(figure)?.current_axes;
        Ok(AxesRef { figure, axes })
    }

    pub(crate) fn figure(&self, id: usize) -> Result<&Figure, SnippetError> {
        self.figures
            .get(id)
            .and_then(Option::as_ref)
            .ok_or_else(|| SnippetError::value_error(format!("figure {id} is closed")))
    }

    pub(crate) fn figure_mut(&mut self, id: usize) -> Result<&mut Figure, SnippetError> {
        self.figures
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or_else(|| SnippetError::value_error(format!("figure {id} is closed")))
    }

    pub(crate) fn axes_mut(&mut self, target: AxesRef) -> Result<&mut Axes, SnippetError> {
        self.figure_mut(target.figure)?
            .axes
            .get_mut(target.axes)
            .ok_or_else(|| SnippetError::value_error("axes index out of range"))
    }

    /// `plt.subplot(rows, cols, index)` on the current figure, 1-based index
    pub(crate) fn subplot(&mut self, rows: usize, cols: usize, index: usize) -> Result<AxesRef, SnippetError> {
        if rows == 0 || cols == 0 || rows * cols > 64 || index == 0 || index > rows * cols {
            return Err(SnippetError::value_error(format!(
                "invalid subplot specification {rows}, {cols}, {index}"
            )));
        }
        let id = self.current_figure()?;
        let figure = self.figure_mut(id)?;
        if (figure.rows, figure.cols) != (rows, cols) {
            let first = figure.axes.first().cloned().unwrap_or_default();
            figure.rows = rows;
            figure.cols = cols;
            figure.axes = vec![Axes::default(); rows * cols];
            figure.axes[0] = first;
        }
        figure.current_axes = index - 1;
        Ok(AxesRef {
            figure: id,
            axes: index - 1,
        })
    }

    /// Make `target` the current axes and its figure current
    pub(crate) fn activate(&mut self, target: AxesRef) -> Result<(), SnippetError> {
        let figure = self.figure_mut(target.figure)?;
        if target.axes >= figure.axes.len() {
            return Err(SnippetError::value_error("axes index out of range"));
        }
        figure.current_axes = target.axes;
        self.current = Some(target.figure);
        Ok(())
    }

    /// Every axes of a figure in row-major order
    pub(crate) fn axes_of(&self, figure: usize) -> Result<Vec<AxesRef>, SnippetError> {
        let count = self.figure(figure)?.axes.len();
        Ok((0..count).map(|axes| AxesRef { figure, axes }).collect())
    }

    pub(crate) fn close(&mut self, target: CloseTarget) {
        match target {
            CloseTarget::All => {
                self.figures.iter_mut().for_each(|f| *f = None);
                self.current = None;
            }
            CloseTarget::Current => {
                if let Some(id) = self.current.take() {
                    self.figures[id] = None;
                }
                self.current = self.figures.iter().rposition(Option::is_some);
            }
            CloseTarget::Figure(id) => {
                if let Some(slot) = self.figures.get_mut(id) {
                    *slot = None;
                }
                if self.current == Some(id) {
                    self.current = self.figures.iter().rposition(Option::is_some);
                }
            }
        }
    }

    /// `plt.clf()`: reset the current figure to a single empty axes
    pub(crate) fn clear_figure(&mut self) -> Result<(), SnippetError> {
        let id = self.current_figure()?;
        let figure = self.figure_mut(id)?;
        *figure = Figure::new(figure.width, figure.height, 1, 1);
        Ok(())
    }

    /// Resize a figure from inches
    pub(crate) fn resize(&mut self, id: usize, inches: (f64, f64)) -> Result<(), SnippetError> {
        let (width, height) = self.pixels(Some(inches));
        let figure = self.figure_mut(id)?;
        figure.width = width;
        figure.height = height;
        Ok(())
    }

    /// `savefig`: remember the figure in case the block closes it afterwards
    pub(crate) fn snapshot(&mut self, id: usize) -> Result<(), SnippetError> {
        self.saved = Some(self.figure(id)?.clone());
        Ok(())
    }

    /// Figure to render once the block ends: the current one, else the last saved
    pub(crate) fn finish(mut self) -> Option<Figure> {
        let current = self.current.and_then(|id| self.figures.get_mut(id)?.take());
        current.or(self.saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> Canvas {
        Canvas::new((640, 480), 4000)
    }

    #[test]
    fn drawing_opens_a_figure() {
        let mut canvas = canvas();
        let axes = canvas.gca().unwrap();
        canvas.axes_mut(axes).unwrap().push(MarkKind::HLine(0.0), None);
        let figure = canvas.finish().unwrap();
        assert_eq!((figure.width, figure.height), (640, 480));
        assert!(figure.has_marks());
    }

    #[test]
    fn close_leaves_nothing() {
        let mut canvas = canvas();
        canvas.open(1, 1, None).unwrap();
        canvas.close(CloseTarget::Current);
        assert!(canvas.finish().is_none());
    }

    #[test]
    fn saved_figure_survives_close() {
        let mut canvas = canvas();
        let id = canvas.open(1, 1, Some((8.0, 4.0))).unwrap();
        canvas.snapshot(id).unwrap();
        canvas.close(CloseTarget::All);
        let figure = canvas.finish().unwrap();
        assert_eq!((figure.width, figure.height), (800, 400));
    }

    #[test]
    fn colors() {
        assert_eq!(parse_color("#ff0000"), Some([255, 0, 0]));
        assert_eq!(parse_color("C1"), Some(PALETTE[1]));
        assert_eq!(parse_color("k"), Some([0, 0, 0]));
        assert_eq!(parse_color("not-a-color"), None);
    }

    #[test]
    fn categories_are_stable() {
        let mut axes = Axes::default();
        assert_eq!(axes.category("a"), 0.0);
        assert_eq!(axes.category("b"), 1.0);
        assert_eq!(axes.category("a"), 0.0);
    }

    #[test]
    fn box_whiskers_exclude_outliers() {
        let stats = BoxStats::from_values(0.0, &[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.high, 4.0);
        assert_eq!(stats.low, 1.0);
    }
}
