mod common;

mod lock;
mod params;
mod registry;
mod scheduler;
