use serde::Serialize;

/// Render target shared between the host and the active module.
///
/// The host owns the figure and lends it mutably to the module for the
/// duration of one invocation. Modules are expected to call [`Figure::clear`]
/// and repaint everything before returning; the host never merges output
/// from two invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Figure {
    title: Option<String>,
    panels: Vec<Panel>,
    revision: u64,
}

impl Figure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all panels and the title, starting a new revision.
    pub fn clear(&mut self) {
        self.title = None;
        self.panels.clear();
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Append a panel below the existing ones and return it for plotting.
    pub fn add_panel(&mut self, label: impl Into<String>) -> &mut Panel {
        self.panels.push(Panel::new(label));
        let last = self.panels.len() - 1;
        &mut self.panels[last]
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    /// Number of times the figure has been cleared. The host uses it to tell
    /// whether a module repainted.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub label: String,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub series: Vec<Series>,
}

impl Panel {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            x_label: None,
            y_label: None,
            series: Vec::new(),
        }
    }

    pub fn with_axes(&mut self, x: impl Into<String>, y: impl Into<String>) -> &mut Self {
        self.x_label = Some(x.into());
        self.y_label = Some(y.into());
        self
    }

    /// Plot `ys` against `xs`. Extra samples on either side are ignored.
    pub fn plot<X, Y>(&mut self, label: impl Into<String>, xs: X, ys: Y) -> &mut Self
    where
        X: IntoIterator<Item = f32>,
        Y: IntoIterator<Item = f32>,
    {
        let points = xs.into_iter().zip(ys).map(|(x, y)| [x, y]).collect();
        self.series.push(Series {
            label: label.into(),
            points,
        });
        self
    }

    pub fn point_count(&self) -> usize {
        self.series.iter().map(|series| series.points.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub points: Vec<[f32; 2]>,
}

impl Series {
    /// Smallest and largest finite y value, if any.
    pub fn y_range(&self) -> Option<(f32, f32)> {
        self.points
            .iter()
            .map(|point| point[1])
            .filter(|y| y.is_finite())
            .fold(None, |range, y| match range {
                None => Some((y, y)),
                Some((min, max)) => Some((min.min(y), max.max(y))),
            })
    }
}
