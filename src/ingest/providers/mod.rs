pub mod hf_papers;
