pub mod detection;
pub mod engine;
pub mod recognition;
pub mod shared;
pub mod tracking;
pub mod video;

#[cfg(test)]
mod testing;
