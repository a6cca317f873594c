//! The square window of resident columns centered on the viewer.

use crate::terrain_state::voxels::chunk::ColumnCoord;

use super::generation_order::GenerationOrder;

/// Columns that entered and left the window after the viewer moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowShift {
    /// Columns inside the new window but not the old one.
    pub entered: Vec<ColumnCoord>,
    /// Columns inside the old window but not the new one.
    pub exited: Vec<ColumnCoord>,
}

impl WindowShift {
    /// Whether the move changed nothing.
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

#[inline]
fn chebyshev(a: ColumnCoord, b: ColumnCoord) -> i32 {
    (a.x - b.x).abs().max((a.y - b.y).abs())
}

/// Resident and visible regions around the viewer column.
///
/// Both regions are Chebyshev squares: a column belongs to the resident window when it
/// is at most `radius` columns away from the center on both axes, and is visible when it
/// is at most `view_radius` away.
#[derive(Debug, Clone)]
pub struct StreamingWindow {
    center: ColumnCoord,
    view_radius: i32,
    order: GenerationOrder,
}

impl StreamingWindow {
    /// Creates a window around `center`.
    ///
    /// `view_radius` is capped at `radius`.
    pub fn new(center: ColumnCoord, radius: i32, view_radius: i32) -> Self {
        let order = GenerationOrder::new(radius);
        StreamingWindow {
            center,
            view_radius: view_radius.min(order.radius()),
            order,
        }
    }

    /// Column the window is centered on.
    pub fn center(&self) -> ColumnCoord {
        self.center
    }

    /// Resident radius in columns.
    pub fn radius(&self) -> i32 {
        self.order.radius()
    }

    /// Visible radius in columns.
    pub fn view_radius(&self) -> i32 {
        self.view_radius
    }

    /// Number of columns inside the window.
    pub fn area(&self) -> usize {
        self.order.len()
    }

    /// Whether `column` is resident.
    pub fn contains(&self, column: ColumnCoord) -> bool {
        chebyshev(column, self.center) <= self.radius()
    }

    /// Whether `column` should be rendered.
    pub fn is_visible(&self, column: ColumnCoord) -> bool {
        chebyshev(column, self.center) <= self.view_radius
    }

    /// Spiral rank of `column` relative to the center, `None` outside the window.
    pub fn rank(&self, column: ColumnCoord) -> Option<usize> {
        self.order.rank(column - self.center)
    }

    /// Every column of the window in spiral order.
    pub fn columns_by_rank(&self) -> Vec<ColumnCoord> {
        let mut columns = self.columns_around(self.center);
        columns.sort_by_key(|&column| self.rank(column));
        columns
    }

    fn columns_around(&self, center: ColumnCoord) -> Vec<ColumnCoord> {
        let radius = self.radius();
        (-radius..=radius)
            .flat_map(|dz| (-radius..=radius).map(move |dx| (dx, dz)))
            .map(|(dx, dz)| ColumnCoord::new(center.x + dx, center.y + dz))
            .collect()
    }

    /// Moves the window to `center`.
    ///
    /// # Returns
    /// The symmetric difference between the old and new windows.
    pub fn recenter(&mut self, center: ColumnCoord) -> WindowShift {
        if center == self.center {
            return WindowShift::default();
        }
        let previous = std::mem::replace(&mut self.center, center);
        let radius = self.radius();

        WindowShift {
            entered: self
                .columns_around(center)
                .into_iter()
                .filter(|&column| chebyshev(column, previous) > radius)
                .collect(),
            exited: self
                .columns_around(previous)
                .into_iter()
                .filter(|&column| !self.contains(column))
                .collect(),
        }
    }
}
