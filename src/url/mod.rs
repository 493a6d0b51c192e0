//! URL handling module for Theme Harvester
//!
//! Listing URLs carry the package identity in their `itemName` query
//! parameter; downloaded archives are named after it. This module extracts
//! that identity and resolves links found on marketplace pages.

mod item;
mod resolve;

pub use item::extract_item_name;
pub use resolve::resolve_link;
