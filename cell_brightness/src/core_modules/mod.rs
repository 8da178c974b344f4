pub mod aggregator;
pub mod brightness;
pub mod cell_detector;
pub mod grid_layout;
pub mod intensity_grid;
pub mod record;
pub mod region;
pub mod statistics;
pub mod threshold;
