mod builder;
mod source;
mod synthetic;
#[cfg(test)]
mod tests;

pub use builder::FrameSourceBuilder;
pub use source::FrameSource;
pub use synthetic::SyntheticFrameSource;
