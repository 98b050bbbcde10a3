//! Wire types shared between the item-drop server and its clients.

pub mod objects;
pub mod signature;
