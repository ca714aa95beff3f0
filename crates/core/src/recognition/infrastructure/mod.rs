pub mod arcface_embedder;
