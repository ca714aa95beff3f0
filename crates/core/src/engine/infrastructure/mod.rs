pub mod detection_loop;
pub mod recognition_pool;
