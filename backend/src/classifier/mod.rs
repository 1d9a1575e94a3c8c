pub mod client;
pub mod gradio;
