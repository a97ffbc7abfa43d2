use serde::{Deserialize, Serialize};

/// Bars are drawn wider than `width / bins` so the audible low end fills the panel
const BAR_WIDTH_SCALE: f32 = 2.5;
const BAR_GAP: f32 = 1.0;

/// Drawing surface dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelSize {
    pub width: f32,
    pub height: f32,
}

impl Default for PanelSize {
    fn default() -> Self {
        Self {
            width: 500.0,
            height: 96.0,
        }
    }
}

/// One bar, anchored at the bottom of the panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f32,
    pub width: f32,
    pub height: f32,
}

impl Bar {
    /// Top edge in canvas coordinates (origin top-left)
    pub fn y(&self, panel: PanelSize) -> f32 {
        panel.height - self.height
    }
}

/// A complete frame; it replaces whatever was drawn before
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub panel: PanelSize,
    pub bars: Vec<Bar>,
}

impl Frame {
    pub fn peak_height(&self) -> f32 {
        self.bars.iter().map(|b| b.height).fold(0.0, f32::max)
    }
}

/// Lay out one snapshot left to right
///
/// Heights scale 0-255 onto the panel height. Bars starting beyond the
/// right edge are dropped.
pub fn layout_bars(snapshot: &[u8], panel: PanelSize) -> Frame {
    if snapshot.is_empty() || panel.width <= 0.0 {
        return Frame {
            panel,
            bars: Vec::new(),
        };
    }

    let width = panel.width / snapshot.len() as f32 * BAR_WIDTH_SCALE;
    let mut bars = Vec::with_capacity(snapshot.len());
    let mut x = 0.0;

    for &magnitude in snapshot {
        if x >= panel.width {
            break;
        }
        bars.push(Bar {
            x,
            width,
            height: magnitude as f32 / 255.0 * panel.height,
        });
        x += width + BAR_GAP;
    }

    Frame { panel, bars }
}
