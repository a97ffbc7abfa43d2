//! Live frequency bars drawn while a session records
//!
//! `layout` turns a snapshot into bar geometry; `render_loop` samples the
//! analysis tap once per display refresh and feeds a `FrameSink`.

mod layout;
mod render_loop;

pub use layout::{layout_bars, Bar, Frame, PanelSize};
pub use render_loop::{FrameBuffer, FrameSink, VisualizationHandle};
