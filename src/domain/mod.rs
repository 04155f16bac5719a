//! Domain types shared by the render pipeline.

pub mod extensions;
pub mod slug;
