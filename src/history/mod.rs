//! Bounded in-memory lag history

mod store;
mod window;

pub use store::{StoreError, StoreStats, TimeSeriesStore};
pub use window::{plot_points, HistoryWindow, PlotPoint};
