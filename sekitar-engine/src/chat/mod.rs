pub mod actions;
pub mod handlers;
pub mod menus;
