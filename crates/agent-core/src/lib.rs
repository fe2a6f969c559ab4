// ESNODE | Source Available BUSL-1.1 | Copyright (c) 2024 Estimatedstocks AB

pub mod drivers;

pub use drivers::{Driver, Reading, SensorType};
