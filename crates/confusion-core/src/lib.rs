mod calibration;
mod features;
mod landmarks;
mod normalize;
mod pipeline;
mod state;
mod window;

pub use calibration::*;
pub use features::*;
pub use landmarks::*;
pub use normalize::*;
pub use pipeline::*;
pub use state::*;
pub use window::*;
