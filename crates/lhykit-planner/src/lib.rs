//! # LhyKit Planner
//!
//! Cut primitive model and the plot planner that discretizes it into
//! coordinate and laser-state events for the device driver.

pub mod cutcode;
pub mod planner;
pub mod plotter;
pub mod raster;

pub use cutcode::{
    CutCommon, CutPrimitive, MajorAxis, PlotPoint, RasterDirection, RasterImage,
};
pub use planner::{
    Plan, PlannerEvent, PlotPlanner, PLOT_AXIS, PLOT_DIRECTION, PLOT_FINISH, PLOT_JOG, PLOT_ON,
    PLOT_RAPID, PLOT_SETTING,
};
pub use plotter::{LineWalk, PolylineWalk, Step};
pub use raster::RasterWalk;
