pub mod compressor;
pub mod edit_distance;
pub mod name_filter;
