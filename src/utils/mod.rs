pub mod image_processor;
