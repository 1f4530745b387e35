pub mod heading;
pub mod swim;
pub mod vonmises;
