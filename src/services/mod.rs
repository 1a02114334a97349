//! Services separating image I/O from the compositing logic

pub mod io;

pub use io::ImageIOService;
