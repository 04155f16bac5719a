pub mod bytes;
pub mod html;
