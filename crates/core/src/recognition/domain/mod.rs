pub mod face_embedder;
pub mod identity_store;
pub mod recognition_result;
