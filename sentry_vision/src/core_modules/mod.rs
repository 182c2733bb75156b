pub mod background;
pub mod change_detector;
pub mod frame;
pub mod incident;
pub mod overlay;
pub mod region;
pub mod streak;
